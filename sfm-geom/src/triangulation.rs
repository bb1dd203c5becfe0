use nalgebra::{Matrix3, Point2, Point3, Rotation3, Unit, Vector3};
use sfm_pinhole::Camera;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriangulationError {
    /// Triangulation needs at least two rays.
    #[error("need at least 2 observations to triangulate, got {0}")]
    NotEnoughObservations(usize),
    /// The normal equations could not be solved, which happens when the rays
    /// are near-parallel or coincident.
    #[error("normal equations are singular (near-parallel or coincident rays)")]
    SingularSystem,
}

/// One view's observation of a feature: the view's rotation, its optical
/// center in the reference frame, and the ideal ray through the observed
/// pixel in the view's own camera frame.
#[derive(Debug, Clone, Copy)]
pub struct RayObservation {
    pub rotation: Rotation3<f64>,
    pub center: Vector3<f64>,
    pub bearing: Unit<Vector3<f64>>,
}

impl RayObservation {
    /// The observation's ray direction expressed in the reference frame.
    fn reference_direction(&self) -> Unit<Vector3<f64>> {
        Unit::new_normalize(self.rotation.inverse() * self.bearing.into_inner())
    }
}

/// Computes the point minimizing the sum of squared perpendicular distances
/// to all observation rays.
///
/// For each observation the projector `M = I - v * transpose(v)` maps any
/// point onto the plane orthogonal to the ray direction `v`; accumulating
/// `transpose(M) * M` and `transpose(M) * M * center` over all observations
/// and solving the resulting normal equations yields the least-squares
/// intersection.
pub fn triangulate(observations: &[RayObservation]) -> Result<Point3<f64>, TriangulationError> {
    if observations.len() < 2 {
        return Err(TriangulationError::NotEnoughObservations(
            observations.len(),
        ));
    }

    let mut a = Matrix3::zeros();
    let mut b = Vector3::zeros();
    for observation in observations {
        let v = observation.reference_direction().into_inner();
        let m = Matrix3::identity() - v * v.transpose();
        let mtm = m.transpose() * m;
        a += mtm;
        b += mtm * observation.center;
    }

    a.lu()
        .solve(&b)
        .filter(|x| x.iter().all(|n| n.is_finite()))
        .map(Point3::from)
        .ok_or(TriangulationError::SingularSystem)
}

/// Two-view convenience form of [`triangulate`] with the first view fixed as
/// the reference frame (identity rotation, zero translation) and the second
/// view at the relative pose `x2 = rotation * x1 + translation`.
///
/// ```
/// use nalgebra::{Point2, Rotation3, Vector3};
/// use sfm_pinhole::Camera;
/// use sfm_geom::triangulate_two_view;
///
/// let camera = Camera::from_parameters(800.0, 800.0, 320.0, 240.0, Default::default()).unwrap();
/// let rotation = Rotation3::from_euler_angles(0.05, -0.02, 0.01);
/// let translation = Vector3::new(-0.5, 0.1, 0.05);
/// let point = Vector3::new(0.3, -0.2, 3.0);
///
/// let project = |p: &Vector3<f64>| {
///     let q = camera.intrinsics() * (p / p.z);
///     Point2::new(q.x, q.y)
/// };
/// let triangulated = triangulate_two_view(
///     &camera,
///     &rotation,
///     &translation,
///     project(&point),
///     project(&(rotation * point + translation)),
/// )
/// .unwrap();
/// assert!((triangulated.coords - point).norm() < 1e-9);
/// ```
pub fn triangulate_two_view(
    camera: &Camera,
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    point1: Point2<f64>,
    point2: Point2<f64>,
) -> Result<Point3<f64>, TriangulationError> {
    // The second camera's optical center in the reference frame.
    let center2 = -(rotation.inverse() * translation);
    triangulate(&[
        RayObservation {
            rotation: Rotation3::identity(),
            center: Vector3::zeros(),
            bearing: camera.ray(point1),
        },
        RayObservation {
            rotation: *rotation,
            center: center2,
            bearing: camera.ray(point2),
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::from_parameters(700.0, 700.0, 300.0, 200.0, Default::default()).unwrap()
    }

    fn project(camera: &Camera, p: &Vector3<f64>) -> Point2<f64> {
        let q = camera.intrinsics() * (p / p.z);
        Point2::new(q.x, q.y)
    }

    #[test]
    fn noiseless_two_view_triangulation_is_exact() {
        let camera = camera();
        let rotation = Rotation3::from_euler_angles(0.1, -0.05, 0.02);
        let translation = Vector3::new(-1.0, 0.2, 0.1);
        for point in [
            Vector3::new(0.4, 0.3, 2.0),
            Vector3::new(-0.6, -0.1, 3.5),
            Vector3::new(0.0, 0.8, 5.0),
        ] {
            let triangulated = triangulate_two_view(
                &camera,
                &rotation,
                &translation,
                project(&camera, &point),
                project(&camera, &(rotation * point + translation)),
            )
            .unwrap();
            let relative = (triangulated.coords - point).norm() / point.norm();
            assert!(relative < 1e-9);
        }
    }

    #[test]
    fn three_observations_agree_on_the_point() {
        let camera = camera();
        let point = Vector3::new(0.2, -0.4, 4.0);
        let poses = [
            (Rotation3::identity(), Vector3::zeros()),
            (
                Rotation3::from_euler_angles(0.05, 0.1, 0.0),
                Vector3::new(-0.8, 0.0, 0.1),
            ),
            (
                Rotation3::from_euler_angles(-0.1, 0.05, 0.02),
                Vector3::new(0.6, -0.4, 0.2),
            ),
        ];
        let observations: Vec<RayObservation> = poses
            .iter()
            .map(|(rotation, translation)| RayObservation {
                rotation: *rotation,
                center: -(rotation.inverse() * translation),
                bearing: camera.ray(project(&camera, &(rotation * point + translation))),
            })
            .collect();
        let triangulated = triangulate(&observations).unwrap();
        assert!((triangulated.coords - point).norm() < 1e-9);
    }

    #[test]
    fn one_observation_is_rejected() {
        let observation = RayObservation {
            rotation: Rotation3::identity(),
            center: Vector3::zeros(),
            bearing: Unit::new_normalize(Vector3::new(0.0, 0.0, 1.0)),
        };
        assert!(matches!(
            triangulate(&[observation]),
            Err(TriangulationError::NotEnoughObservations(1))
        ));
    }

    #[test]
    fn parallel_rays_are_singular() {
        // Both rays point exactly along +z from different centers, so the
        // normal equations lose rank along that axis.
        let bearing = Unit::new_normalize(Vector3::new(0.0, 0.0, 1.0));
        let a = RayObservation {
            rotation: Rotation3::identity(),
            center: Vector3::zeros(),
            bearing,
        };
        let b = RayObservation {
            rotation: Rotation3::identity(),
            center: Vector3::new(1.0, 0.0, 0.0),
            bearing,
        };
        assert!(matches!(
            triangulate(&[a, b]),
            Err(TriangulationError::SingularSystem)
        ));
    }
}
