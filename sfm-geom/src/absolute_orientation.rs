use nalgebra::{Matrix3, Point3, Vector3};
use sfm_core::Model;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrientationError {
    /// The two models place no feature in common, so no alignment exists.
    #[error("models share no common features")]
    NoCommonFeatures,
    /// The common points are degenerate (all coincident, or collapsing the
    /// cross-covariance), so scale or rotation cannot be recovered.
    #[error("common points are degenerate, cannot recover the alignment")]
    Degenerate,
}

/// The rigid alignment (rotation, uniform scale, translation) that best maps
/// the first model's frame onto the second model's frame over their common
/// features, minimizing `sum(|s * R * p1 + T - p2|^2)` --- the absolute
/// orientation (orthogonal Procrustes) problem.
///
/// The fitted rotation is orthogonal by construction but its handedness is
/// not constrained, so it may be a reflection when the two models are
/// mirror images of each other. That is deliberate: candidate two-view
/// models come in mirrored pairs, and alignment error is what
/// disambiguates them.
#[derive(Debug, Clone, Copy)]
pub struct AbsoluteOrientation {
    rotation: Matrix3<f64>,
    scale: f64,
    translation: Vector3<f64>,
    error: f64,
}

impl AbsoluteOrientation {
    /// Fits the alignment mapping `model1`'s frame into `model2`'s frame
    /// over their common features.
    pub fn between(model1: &Model, model2: &Model) -> Result<Self, OrientationError> {
        let common = model1.common_features(model2);
        if common.is_empty() {
            return Err(OrientationError::NoCommonFeatures);
        }

        let points1: Vec<Vector3<f64>> = common
            .iter()
            .map(|&f| {
                model1
                    .point(f)
                    .expect("common features are present in both models")
                    .coords
            })
            .collect();
        let points2: Vec<Vector3<f64>> = common
            .iter()
            .map(|&f| {
                model2
                    .point(f)
                    .expect("common features are present in both models")
                    .coords
            })
            .collect();

        let n = common.len() as f64;
        let mean1 = points1.iter().sum::<Vector3<f64>>() / n;
        let mean2 = points2.iter().sum::<Vector3<f64>>() / n;
        let centered1: Vec<Vector3<f64>> = points1.iter().map(|p| p - mean1).collect();
        let centered2: Vec<Vector3<f64>> = points2.iter().map(|p| p - mean2).collect();

        let spread1: f64 = centered1.iter().map(|p| p.norm_squared()).sum();
        let spread2: f64 = centered2.iter().map(|p| p.norm_squared()).sum();
        if spread1 <= 0.0 {
            return Err(OrientationError::Degenerate);
        }
        let scale = (spread2 / spread1).sqrt();

        // Cross-covariance of the centered sets, and the rotation recovered
        // from its symmetric square: R = transpose(M) * V * diag(1/sqrt(d)) *
        // transpose(V) with Q = M * transpose(M) = V * diag(d) * transpose(V).
        let m = centered1
            .iter()
            .zip(&centered2)
            .fold(Matrix3::zeros(), |acc, (p1, p2)| acc + p1 * p2.transpose());
        let eigen = (m * m.transpose()).symmetric_eigen();
        let mut inv_sqrt = Matrix3::zeros();
        for i in 0..3 {
            let d = eigen.eigenvalues[i];
            if d <= f64::EPSILON {
                return Err(OrientationError::Degenerate);
            }
            inv_sqrt[(i, i)] = 1.0 / d.sqrt();
        }
        let v = eigen.eigenvectors;
        let rotation = m.transpose() * v * inv_sqrt * v.transpose();

        let translation = mean2 - scale * rotation * mean1;
        let error = points1
            .iter()
            .zip(&points2)
            .map(|(p1, p2)| (scale * rotation * p1 + translation - p2).norm_squared())
            .sum();

        Ok(Self {
            rotation,
            scale,
            translation,
            error,
        })
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    /// The sum of squared residuals `|s * R * p1 + T - p2|^2` over all
    /// common features, in the second model's units.
    pub fn error(&self) -> f64 {
        self.error
    }

    /// Maps a model's full point set (not just the common subset) from the
    /// first model's frame into the second model's frame.
    pub fn apply(&self, model: &Model) -> Model {
        let mut result = Model::new();
        for (feature, point) in model.points() {
            result.add_point(
                feature,
                Point3::from(self.scale * self.rotation * point.coords + self.translation),
            );
        }
        result
    }

    /// Maps a model's full point set from the second model's frame back into
    /// the first model's frame. The fitted rotation is orthogonal, so its
    /// transpose is its inverse.
    pub fn apply_inverse(&self, model: &Model) -> Model {
        let inverse = self.rotation.transpose() / self.scale;
        let mut result = Model::new();
        for (feature, point) in model.points() {
            result.add_point(
                feature,
                Point3::from(inverse * (point.coords - self.translation)),
            );
        }
        result
    }
}
