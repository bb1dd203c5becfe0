//! Computational geometry for sparse multi-view reconstruction:
//! least-squares ray triangulation and rigid model alignment
//! (absolute orientation).

mod absolute_orientation;
mod triangulation;

pub use absolute_orientation::*;
pub use triangulation::*;
