//! Pinhole camera model with radial/tangential distortion correction, plus
//! the [`EssentialMatrix`] type that relates two calibrated views.
//!
//! The camera converts raw pixel coordinates into ideal (pinhole) coordinates
//! and provides the cheirality test used to vote between candidate poses.

mod essential;

pub use essential::*;

use sfm_core::nalgebra::{Matrix3, Point2, Point3, Rotation3, Unit, Vector3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    /// The supplied 3x3 intrinsic matrix has no inverse.
    #[error("intrinsic matrix is not invertible")]
    SingularIntrinsics,
}

/// Radial (`k1`, `k2`) and tangential (`p1`, `p2`) lens distortion
/// coefficients. The default of all zeros is an ideal pinhole lens.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
}

impl Distortion {
    pub fn new(k1: f64, k2: f64, p1: f64, p2: f64) -> Self {
        Self { k1, k2, p1, p2 }
    }
}

/// Intrinsic calibration of a camera: the 3x3 intrinsic matrix (focal
/// lengths and principal point), its precomputed inverse, and the lens
/// distortion coefficients.
///
/// Immutable once constructed; all estimators use it read-only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    intrinsics: Matrix3<f64>,
    inv_intrinsics: Matrix3<f64>,
    distortion: Distortion,
}

impl Camera {
    /// Creates a camera from a 3x3 intrinsic matrix and distortion
    /// coefficients. Fails if the intrinsic matrix is singular.
    pub fn new(intrinsics: Matrix3<f64>, distortion: Distortion) -> Result<Self, CameraError> {
        let inv_intrinsics = intrinsics
            .try_inverse()
            .ok_or(CameraError::SingularIntrinsics)?;
        Ok(Self {
            intrinsics,
            inv_intrinsics,
            distortion,
        })
    }

    /// Creates an undistorted pinhole camera from a 3x3 intrinsic matrix.
    pub fn pinhole(intrinsics: Matrix3<f64>) -> Result<Self, CameraError> {
        Self::new(intrinsics, Distortion::default())
    }

    /// Creates a camera from focal lengths and principal point, with no skew.
    #[rustfmt::skip]
    pub fn from_parameters(
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        distortion: Distortion,
    ) -> Result<Self, CameraError> {
        Self::new(
            Matrix3::new(
                fx,  0.0, cx,
                0.0, fy,  cy,
                0.0, 0.0, 1.0,
            ),
            distortion,
        )
    }

    pub fn intrinsics(&self) -> &Matrix3<f64> {
        &self.intrinsics
    }

    pub fn inv_intrinsics(&self) -> &Matrix3<f64> {
        &self.inv_intrinsics
    }

    pub fn distortion(&self) -> Distortion {
        self.distortion
    }

    /// Corrects a raw pixel coordinate for lens distortion.
    ///
    /// The point is normalized through the inverse intrinsics, the forward
    /// radial/tangential polynomial is evaluated at the normalized
    /// coordinate, and the result is reprojected through the intrinsics.
    /// This approximates the inverse distortion model rather than solving it
    /// exactly, which is accurate for small coefficients only; callers must
    /// tolerate residual distortion at high `k1`/`k2`. For a pinhole camera
    /// (all coefficients zero) this is the identity.
    pub fn undistort(&self, point: Point2<f64>) -> Point2<f64> {
        let n = self.inv_intrinsics * Vector3::new(point.x, point.y, 1.0);
        let (x, y) = (n.x / n.z, n.y / n.z);
        let Distortion { k1, k2, p1, p2 } = self.distortion;
        let r2 = x * x + y * y;
        let radial = 1.0 + k1 * r2 + k2 * r2 * r2;
        let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        let p = self.intrinsics * Vector3::new(xd, yd, 1.0);
        Point2::new(p.x / p.z, p.y / p.z)
    }

    /// The ideal ray through a pixel, in the camera frame: the pixel is
    /// undistorted, back-projected through the inverse intrinsics, and
    /// normalized to unit length.
    pub fn ray(&self, point: Point2<f64>) -> Unit<Vector3<f64>> {
        let p = self.undistort(point);
        Unit::new_normalize(self.inv_intrinsics * Vector3::new(p.x, p.y, 1.0))
    }

    /// Whether `point` lies behind the camera whose pose is `(rotation,
    /// translation)`: true iff the camera-frame z coordinate of the
    /// transformed point is non-positive.
    pub fn is_point_behind_camera(
        &self,
        point: &Point3<f64>,
        translation: &Vector3<f64>,
        rotation: &Rotation3<f64>,
    ) -> bool {
        ((rotation * point).coords + translation).z <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsics() -> Matrix3<f64> {
        Matrix3::new(800.0, 0.0, 320.0, 0.0, 850.0, 240.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn pinhole_undistort_is_identity() {
        let camera = Camera::pinhole(intrinsics()).unwrap();
        let p = Point2::new(411.5, 187.25);
        assert!((camera.undistort(p) - p).norm() < 1e-9);
    }

    #[test]
    fn undistort_fixes_the_principal_point() {
        // At the principal point the normalized coordinate is the origin,
        // where the distortion polynomial has no effect.
        let camera = Camera::new(intrinsics(), Distortion::new(0.1, -0.02, 0.001, 0.002)).unwrap();
        let principal = Point2::new(320.0, 240.0);
        assert!((camera.undistort(principal) - principal).norm() < 1e-9);
    }

    #[test]
    fn ray_points_at_the_scene_point() {
        let camera = Camera::pinhole(intrinsics()).unwrap();
        let scene = Vector3::new(0.4, -0.3, 2.5);
        let pixel = {
            let p = intrinsics() * (scene / scene.z);
            Point2::new(p.x, p.y)
        };
        let ray = camera.ray(pixel);
        assert!((ray.into_inner() - scene.normalize()).norm() < 1e-9);
    }

    #[test]
    fn cheirality_test() {
        let camera = Camera::pinhole(intrinsics()).unwrap();
        let rotation = Rotation3::identity();
        let translation = Vector3::zeros();
        assert!(!camera.is_point_behind_camera(&Point3::new(0.0, 0.0, 1.0), &translation, &rotation));
        assert!(camera.is_point_behind_camera(&Point3::new(0.0, 0.0, -1.0), &translation, &rotation));
        // Translating the camera frame forward past the point puts it behind.
        let pushed = Vector3::new(0.0, 0.0, -2.0);
        assert!(camera.is_point_behind_camera(&Point3::new(0.0, 0.0, 1.0), &pushed, &rotation));
    }

    #[test]
    fn singular_intrinsics_are_rejected() {
        assert!(Camera::pinhole(Matrix3::zeros()).is_err());
    }
}
