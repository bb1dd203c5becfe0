//! Common types for sparse multi-view reconstruction.
//!
//! Every crate in this workspace that deals with reconstruction depends on the
//! types in this crate: [`Feature`] identity tokens, per-image observations
//! ([`SceneView`]), and reconstructed point clouds ([`Model`]). The crate is
//! deliberately small so that downstream crates can interoperate without
//! pulling in any estimation code.
//!
//! All coordinates use [`nalgebra`] value types (`Point2`, `Point3`), which are
//! re-exported here so downstream crates agree on the linear-algebra version.

mod feature;
mod model;
mod view;

pub use feature::*;
pub use model::*;
pub use nalgebra;
pub use view::*;
