use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use sfm_core::nalgebra::{Matrix3, Rotation3, Unit, Vector3, SVD};
use thiserror::Error;

/// A candidate rotation must have a determinant within this distance of +1
/// to count as a proper rotation.
const DETERMINANT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Error)]
pub enum DecomposeError {
    /// Singular value decomposition of the essential matrix did not converge.
    #[error("svd of the essential matrix failed to converge")]
    SvdFailed,
    /// The determinant filter did not leave exactly two proper rotations,
    /// which means the matrix is not a usable essential matrix.
    #[error("determinant filter left {0} rotations, expected exactly 2")]
    DegenerateRotations(usize),
}

/// A 3x3 essential matrix: rank 2, defined up to scale, satisfying
/// `transpose(x2) * E * x1 = 0` for homogeneous normalized image coordinates
/// `x1` in the first view and `x2` in the second.
///
/// The essential matrix embodies the epipolar constraint between two
/// calibrated views of the same rigid scene: it encodes the relative
/// rotation and the direction (not the length) of the relative translation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct EssentialMatrix(pub Matrix3<f64>);

impl EssentialMatrix {
    /// The essential matrix of the relative pose `x2 = rotation * x1 +
    /// translation`, formed as the cross-product matrix of the translation
    /// times the rotation.
    ///
    /// ```
    /// use sfm_pinhole::EssentialMatrix;
    /// use sfm_core::nalgebra::{Rotation3, Vector3};
    /// let rotation = Rotation3::from_euler_angles(0.1, 0.2, 0.3);
    /// let translation = Vector3::new(0.3, -0.1, 0.2);
    /// let essential = EssentialMatrix::from_pose(&rotation, &translation);
    /// // Any point observed in both views satisfies the epipolar constraint.
    /// let x = Vector3::new(0.5, -0.2, 3.0);
    /// let x2 = rotation * x + translation;
    /// assert!(essential.residual(&(x / x.z), &(x2 / x2.z)).abs() < 1e-12);
    /// ```
    pub fn from_pose(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Self {
        Self(translation.cross_matrix() * rotation.matrix())
    }

    /// The signed algebraic epipolar residual `transpose(x2) * E * x1` for a
    /// pair of homogeneous normalized image coordinates. Zero for an exact
    /// correspondence.
    pub fn residual(&self, x1: &Vector3<f64>, x2: &Vector3<f64>) -> f64 {
        (x2.transpose() * self.0 * x1)[0]
    }

    /// Enforces the rank-2 constraint by forcing the third singular value to
    /// zero and reassembling the matrix. Returns `None` if the singular
    /// value decomposition does not converge.
    pub fn recondition(self, epsilon: f64, max_iterations: usize) -> Option<Self> {
        let mut svd = self.try_svd(true, true, epsilon, max_iterations)?;
        svd.singular_values[2] = 0.0;
        svd.recompose().ok().map(Self)
    }

    /// Decomposes the essential matrix into its two candidate rotations and
    /// one translation direction.
    ///
    /// With `E = U * S * transpose(V)`, the translation direction is the
    /// third column of `U` (sign ambiguous) and the rotation candidates are
    /// `U * W * transpose(V)` and `U * transpose(W) * transpose(V)` where `W`
    /// is the 90-degree-about-z permutation matrix. Each candidate and its
    /// negation are filtered by determinant; exactly the two proper rotations
    /// must survive, otherwise the matrix is degenerate and the pair it came
    /// from cannot be reconstructed.
    pub fn decompose(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Result<PoseDecomposition, DecomposeError> {
        let svd = SVD::try_new(self.0, true, true, epsilon, max_iterations)
            .ok_or(DecomposeError::SvdFailed)?;
        let u = svd.u.ok_or(DecomposeError::SvdFailed)?;
        let v_t = svd.v_t.ok_or(DecomposeError::SvdFailed)?;
        let translation = Unit::new_normalize(u.column(2).into_owned());
        let rotations = proper_rotations(&u, &v_t)?;
        Ok(PoseDecomposition {
            rotations,
            translation,
        })
    }
}

/// Filters the rotation candidates `U * W * transpose(V)`,
/// `U * transpose(W) * transpose(V)`, and their negations down to the
/// proper rotations by determinant. Exactly two must survive.
fn proper_rotations(
    u: &Matrix3<f64>,
    v_t: &Matrix3<f64>,
) -> Result<[Rotation3<f64>; 2], DecomposeError> {
    let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let mut rotations = Vec::with_capacity(2);
    for candidate in [u * w * v_t, u * w.transpose() * v_t] {
        for m in [candidate, -candidate] {
            if (m.determinant() - 1.0).abs() < DETERMINANT_TOLERANCE {
                rotations.push(Rotation3::from_matrix_unchecked(m));
            }
        }
    }
    <[Rotation3<f64>; 2]>::try_from(rotations)
        .map_err(|rotations| DecomposeError::DegenerateRotations(rotations.len()))
}

/// The result of decomposing an essential matrix: two candidate rotations
/// and a unit translation direction of ambiguous sign, giving four full pose
/// hypotheses.
#[derive(Debug, Clone, Copy)]
pub struct PoseDecomposition {
    pub rotations: [Rotation3<f64>; 2],
    pub translation: Unit<Vector3<f64>>,
}

impl PoseDecomposition {
    /// The four pose hypotheses `(R1, +t)`, `(R2, +t)`, `(R1, -t)`,
    /// `(R2, -t)`. Cheirality voting over triangulated points decides
    /// between them.
    pub fn poses(&self) -> [(Rotation3<f64>, Vector3<f64>); 4] {
        let [r1, r2] = self.rotations;
        let t = self.translation.into_inner();
        [(r1, t), (r2, t), (r1, -t), (r2, -t)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recondition_zeroes_the_third_singular_value() {
        let essential = EssentialMatrix(Matrix3::new(
            0.6, -0.1, 0.3, 0.2, 0.8, -0.4, -0.3, 0.5, 0.7,
        ));
        let refined = essential.recondition(1e-12, 1000).unwrap();
        let svd = refined.0.svd(false, false);
        assert!(svd.singular_values[2].abs() < 1e-10);
        // The two leading singular values are untouched.
        let original = essential.0.svd(false, false);
        assert!((svd.singular_values[0] - original.singular_values[0]).abs() < 1e-9);
        assert!((svd.singular_values[1] - original.singular_values[1]).abs() < 1e-9);
    }

    #[test]
    fn decompose_recovers_the_pose_up_to_ambiguity() {
        let rotation = Rotation3::from_euler_angles(0.2, 0.3, 0.4);
        let translation = Vector3::new(-0.8, 0.4, 0.5);
        let essential = EssentialMatrix::from_pose(&rotation, &translation);

        let decomposition = essential.decompose(1e-9, 1000).unwrap();
        let rotation_recovered = decomposition.rotations.iter().any(|r| {
            r.rotation_to(&rotation).angle() < 1e-6
        });
        assert!(rotation_recovered);

        let direction = translation.normalize();
        let t = decomposition.translation.into_inner();
        assert!((1.0 - t.dot(&direction).abs()) < 1e-6);
    }

    #[test]
    fn non_orthogonal_factors_leave_no_proper_rotation() {
        // Scaling one factor pushes every candidate determinant away from
        // +1, so the filter rejects all four and the decomposition fails.
        let u = Matrix3::identity() * 2.0;
        let v_t = Matrix3::identity();
        assert!(matches!(
            proper_rotations(&u, &v_t),
            Err(DecomposeError::DegenerateRotations(0))
        ));
    }

    #[test]
    fn reflected_factors_still_leave_two_proper_rotations() {
        // An orthogonal factor with determinant -1 flips which of each
        // candidate pair survives, but exactly two always do.
        let reflection = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0);
        let rotations = proper_rotations(&reflection, &Matrix3::identity()).unwrap();
        for rotation in rotations {
            assert!((rotation.matrix().determinant() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn decomposed_rotations_are_proper() {
        let essential = EssentialMatrix::from_pose(
            &Rotation3::from_euler_angles(-0.1, 0.05, 0.2),
            &Vector3::new(0.3, 0.1, -0.2),
        );
        let decomposition = essential.decompose(1e-9, 1000).unwrap();
        for rotation in decomposition.rotations {
            assert!((rotation.matrix().determinant() - 1.0).abs() < 1e-9);
        }
        assert_eq!(decomposition.poses().len(), 4);
    }
}
