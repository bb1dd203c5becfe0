//! Eight-point estimation of the essential matrix relating two calibrated
//! views of the same rigid scene.
//!
//! Given a [`Camera`] and two [`SceneView`]s, the estimator collects their
//! common features, undistorts and normalizes the observations, and solves
//! the epipolar constraint `transpose(x2) * E * x1 = 0` as a linear
//! least-squares problem: the vectorized essential matrix is the eigenvector
//! of the smallest-magnitude eigenvalue of `transpose(A) * A`, where `A` has
//! one row of outer-product terms per correspondence. The unconstrained
//! estimate is then refined to rank 2 by zeroing its third singular value.

use float_ord::FloatOrd;
use nalgebra::{Dynamic, Matrix3, OMatrix, OVector, Vector3, U9};
use sfm_core::{Feature, SceneView};
use sfm_pinhole::{Camera, EssentialMatrix};
use thiserror::Error;

/// The design matrix of the epipolar equation: one row per correspondence.
pub type DesignMatrix = OMatrix<f64, Dynamic, U9>;

#[derive(Debug, Error)]
pub enum EightPointError {
    /// The two views do not share enough features for the linear system to
    /// be determined.
    #[error("need at least 8 common features, got {0}")]
    InsufficientMatches(usize),
    /// The eigendecomposition or singular value decomposition did not
    /// converge, which indicates degenerate (collinear or coplanar) input.
    #[error("decomposition failed to converge during estimation")]
    ConvergenceFailed,
}

/// Observer hook notified at each intermediate stage of estimation.
///
/// Purely observational: implementations cannot affect the result. All
/// methods default to doing nothing, so an observer only implements the
/// stages it cares about.
pub trait EstimatorObserver {
    /// The homogeneous normalized image points of one view. `view_index` is
    /// 0 for the first view and 1 for the second.
    fn normalized_points(&mut self, _view_index: usize, _points: &[Vector3<f64>]) {}

    /// The assembled design matrix.
    fn design_matrix(&mut self, _a: &DesignMatrix) {}

    /// The null-space eigenvector that vectorizes the essential matrix.
    fn null_vector(&mut self, _e: &OVector<f64, U9>) {}

    /// The unconstrained (not yet rank-2) essential matrix.
    fn unrefined_matrix(&mut self, _e: &Matrix3<f64>) {}
}

/// An observer that ignores every stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EstimatorObserver for NoopObserver {}

/// The outcome of eight-point estimation: the unconstrained essential matrix,
/// its rank-2 refinement, and the algebraic error of each.
#[derive(Debug, Clone, Copy)]
pub struct EssentialEstimate {
    /// The unconstrained linear estimate.
    pub essential: EssentialMatrix,
    /// Algebraic error of the unconstrained estimate: the sum over all
    /// correspondences of `(transpose(x2) * E * x1)^2`.
    pub error: f64,
    /// The estimate with the rank-2 constraint enforced.
    pub refined: EssentialMatrix,
    /// Algebraic error of the refined estimate.
    pub refined_error: f64,
}

/// Performs the eight-point algorithm by Richard Hartley and Andrew
/// Zisserman over the common features of two views.
#[derive(Debug, Clone, Copy)]
pub struct EightPoint {
    /// Convergence threshold for the eigen and singular value solvers.
    pub epsilon: f64,
    /// Iteration cap for the eigen and singular value solvers.
    pub max_iterations: usize,
}

impl Default for EightPoint {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
        }
    }
}

impl EightPoint {
    pub fn new() -> Self {
        Default::default()
    }

    /// Estimates the essential matrix relating `view1` and `view2`, both
    /// captured by `camera`.
    pub fn estimate(
        &self,
        camera: &Camera,
        view1: &SceneView,
        view2: &SceneView,
    ) -> Result<EssentialEstimate, EightPointError> {
        self.estimate_with_observer(camera, view1, view2, &mut NoopObserver)
    }

    /// Like [`EightPoint::estimate`], additionally notifying `observer` at
    /// each intermediate stage.
    pub fn estimate_with_observer(
        &self,
        camera: &Camera,
        view1: &SceneView,
        view2: &SceneView,
        observer: &mut dyn EstimatorObserver,
    ) -> Result<EssentialEstimate, EightPointError> {
        let common = view1.common_features(view2);
        if common.len() < 8 {
            return Err(EightPointError::InsufficientMatches(common.len()));
        }

        let points1 = normalized_points(camera, view1, &common);
        let points2 = normalized_points(camera, view2, &common);
        observer.normalized_points(0, &points1);
        observer.normalized_points(1, &points2);

        let a = encode_epipolar_equation(&points1, &points2);
        observer.design_matrix(&a);

        let ata = a.transpose() * &a;
        let eigens = ata
            .try_symmetric_eigen(self.epsilon, self.max_iterations)
            .ok_or(EightPointError::ConvergenceFailed)?;
        let eigenvector = eigens
            .eigenvalues
            .iter()
            .enumerate()
            .min_by_key(|&(_, &value)| FloatOrd(value.abs()))
            .map(|(ix, _)| eigens.eigenvectors.column(ix).into_owned())
            .ok_or(EightPointError::ConvergenceFailed)?;
        observer.null_vector(&eigenvector);

        // The null vector lists the matrix entries row by row.
        let essential = EssentialMatrix(Matrix3::from_row_slice(eigenvector.as_slice()));
        observer.unrefined_matrix(&essential.0);
        let error = algebraic_error(&essential, &points1, &points2);

        let refined = essential
            .recondition(self.epsilon, self.max_iterations)
            .ok_or(EightPointError::ConvergenceFailed)?;
        let refined_error = algebraic_error(&refined, &points1, &points2);

        Ok(EssentialEstimate {
            essential,
            error,
            refined,
            refined_error,
        })
    }
}

/// Undistorts and normalizes each common feature of one view into a
/// homogeneous coordinate on the virtual image plane.
fn normalized_points(camera: &Camera, view: &SceneView, common: &[Feature]) -> Vec<Vector3<f64>> {
    common
        .iter()
        .map(|&feature| {
            let p = camera.undistort(
                view.location(feature)
                    .expect("common features are present in both views"),
            );
            camera.inv_intrinsics() * Vector3::new(p.x, p.y, 1.0)
        })
        .collect()
}

fn encode_epipolar_equation(points1: &[Vector3<f64>], points2: &[Vector3<f64>]) -> DesignMatrix {
    let mut a = DesignMatrix::zeros(points1.len());
    for (i, (p1, p2)) in points1.iter().zip(points2).enumerate() {
        let (x1, y1) = (p1.x / p1.z, p1.y / p1.z);
        let (x2, y2) = (p2.x / p2.z, p2.y / p2.z);
        let row = [
            x1 * x2,
            y1 * x2,
            x2,
            x1 * y2,
            y1 * y2,
            y2,
            x1,
            y1,
            1.0,
        ];
        for (j, value) in row.into_iter().enumerate() {
            a[(i, j)] = value;
        }
    }
    a
}

fn algebraic_error(
    essential: &EssentialMatrix,
    points1: &[Vector3<f64>],
    points2: &[Vector3<f64>],
) -> f64 {
    points1
        .iter()
        .zip(points2)
        .map(|(p1, p2)| essential.residual(p1, p2).powi(2))
        .sum()
}
