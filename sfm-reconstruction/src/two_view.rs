use log::debug;
use nalgebra::{Rotation3, Vector3};
use sfm_core::{Feature, Model, SceneView};
use sfm_eight_point::{EightPoint, EightPointError};
use sfm_geom::{triangulate_two_view, TriangulationError};
use sfm_pinhole::{Camera, DecomposeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TwoViewError {
    #[error(transparent)]
    Estimation(#[from] EightPointError),
    #[error(transparent)]
    Decomposition(#[from] DecomposeError),
    /// Every pose hypothesis failed triangulation, so the pair contributes
    /// nothing.
    #[error("all pose hypotheses failed triangulation")]
    NoValidCandidate,
}

/// Reconstructs candidate models from a pair of views.
///
/// The refined essential matrix is decomposed into two rotations and a
/// translation direction, giving four pose hypotheses. Each hypothesis is
/// triangulated into a candidate model and scored by its cheirality count:
/// the number of points lying behind either camera, measured in both the
/// reference frame and the second camera's frame. A hypothesis whose
/// triangulation fails is dropped, not fatal to the pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoViewReconstructor {
    pub eight_point: EightPoint,
}

impl TwoViewReconstructor {
    pub fn new() -> Self {
        Default::default()
    }

    /// Reconstructs the candidate models for one view pair.
    ///
    /// With `all_models` set, every surviving hypothesis is returned
    /// unfiltered. Otherwise the two extremal candidates are returned: the
    /// one with the most points behind a camera first, then the one with the
    /// fewest. The correct pose has a near-zero count and its antipode the
    /// largest; the caller disambiguates the two by alignment error against
    /// the running global model.
    pub fn possible_models(
        &self,
        camera: &Camera,
        view1: &SceneView,
        view2: &SceneView,
        all_models: bool,
    ) -> Result<Vec<Model>, TwoViewError> {
        let estimate = self.eight_point.estimate(camera, view1, view2)?;
        debug!(
            "essential matrix estimated, algebraic error {:.3e} refined to {:.3e}",
            estimate.error, estimate.refined_error
        );
        let decomposition = estimate
            .refined
            .decompose(self.eight_point.epsilon, self.eight_point.max_iterations)?;

        let common = view1.common_features(view2);
        let mut candidates: Vec<(Model, usize)> = Vec::with_capacity(4);
        for (rotation, translation) in decomposition.poses() {
            match reconstruct_candidate(camera, &common, view1, view2, &rotation, &translation) {
                Ok(candidate) => candidates.push(candidate),
                Err(err) => debug!("dropping pose hypothesis: {}", err),
            }
        }
        if candidates.is_empty() {
            return Err(TwoViewError::NoValidCandidate);
        }

        if all_models {
            return Ok(candidates.into_iter().map(|(model, _)| model).collect());
        }

        // The maximum count is the model behind both cameras, the minimum
        // the one in front; return them in that order.
        let mut result = Vec::with_capacity(2);
        let max = index_of_max(&candidates);
        result.push(candidates.remove(max).0);
        if !candidates.is_empty() {
            let min = index_of_min(&candidates);
            result.push(candidates.remove(min).0);
        }
        Ok(result)
    }
}

/// Triangulates every common feature under one pose hypothesis, returning
/// the candidate model and its behind-camera count.
fn reconstruct_candidate(
    camera: &Camera,
    common: &[Feature],
    view1: &SceneView,
    view2: &SceneView,
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
) -> Result<(Model, usize), TriangulationError> {
    let identity = Rotation3::identity();
    let origin = Vector3::zeros();
    let mut model = Model::new();
    let mut behind = 0;
    for &feature in common {
        let location1 = view1
            .location(feature)
            .expect("common features are present in both views");
        let location2 = view2
            .location(feature)
            .expect("common features are present in both views");
        let point = triangulate_two_view(camera, rotation, translation, location1, location2)?;
        if camera.is_point_behind_camera(&point, translation, rotation) {
            behind += 1;
        }
        if camera.is_point_behind_camera(&point, &origin, &identity) {
            behind += 1;
        }
        model.add_point(feature, point);
    }
    Ok((model, behind))
}

/// Index of the first candidate with the largest behind-camera count.
fn index_of_max(candidates: &[(Model, usize)]) -> usize {
    let mut best = 0;
    for (i, (_, count)) in candidates.iter().enumerate().skip(1) {
        if *count > candidates[best].1 {
            best = i;
        }
    }
    best
}

/// Index of the first candidate with the smallest behind-camera count.
fn index_of_min(candidates: &[(Model, usize)]) -> usize {
    let mut best = 0;
    for (i, (_, count)) in candidates.iter().enumerate().skip(1) {
        if *count < candidates[best].1 {
            best = i;
        }
    }
    best
}
