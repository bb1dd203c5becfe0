//! Incremental sparse multi-view reconstruction.
//!
//! This crate ties the estimation crates together into the full pipeline:
//! [`choose_pairs`] selects which view pairs are worth reconstructing,
//! [`TwoViewReconstructor`] turns one pair into candidate models by
//! essential-matrix estimation, pose disambiguation, and triangulation, and
//! [`MultipleViewReconstructor`] folds every pair's best-aligned candidate
//! into a single global [`sfm_core::Model`].
//!
//! The [`io`] module loads and stores the inputs the pipeline consumes:
//! per-view feature correspondences and camera calibration matrices.
//!
//! Per-pair and per-candidate failures are isolated and recovered locally;
//! only the total absence of any successful reconstruction surfaces to the
//! caller.

pub mod io;

mod chooser;
mod multi_view;
mod two_view;

pub use chooser::*;
pub use multi_view::*;
pub use two_view::*;
