use crate::{choose_pairs, ChooseError, TwoViewReconstructor};
use log::{debug, info};
use sfm_core::{Feature, Model, SceneView};
use sfm_geom::AbsoluteOrientation;
use sfm_pinhole::Camera;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error(transparent)]
    Pairs(#[from] ChooseError),
    /// No view pair produced a candidate that could be reconstructed and
    /// aligned, so there is nothing to return.
    #[error("no view pair produced a usable reconstruction")]
    NoUsablePairs,
}

/// Folds two-view candidate models from every selected view pair into a
/// single global sparse model.
///
/// The first successful pair's candidates seed the global model. Each
/// subsequent candidate is aligned onto the global frame by absolute
/// orientation over its shared features, and the pair's best-aligned
/// (lowest residual) candidate is merged in by running per-feature
/// averaging. The global frame is therefore the frame of the first
/// reconstructed pair, up to that pair's arbitrary scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipleViewReconstructor {
    pub two_view: TwoViewReconstructor,
}

impl MultipleViewReconstructor {
    pub fn new() -> Self {
        Default::default()
    }

    /// Reconstructs a global sparse model from all views.
    ///
    /// All views share the calibration in `camera`. Pairs and candidates
    /// that fail are logged and skipped; the error returns only when no
    /// pair contributes at all.
    pub fn reconstruct(
        &self,
        camera: &Camera,
        views: &[SceneView],
    ) -> Result<Model, ReconstructionError> {
        let pairs = choose_pairs(views)?;
        info!(
            "selected {} of {} view pairs for reconstruction",
            pairs.len(),
            views.len() * (views.len() - 1) / 2
        );

        let mut global: Option<Model> = None;
        let mut counts: HashMap<Feature, u32> = HashMap::new();

        for (i, j) in pairs {
            let candidates =
                match self
                    .two_view
                    .possible_models(camera, &views[i], &views[j], false)
                {
                    Ok(candidates) => candidates,
                    Err(err) => {
                        debug!("pair ({i}, {j}) failed reconstruction: {err}");
                        continue;
                    }
                };

            match &mut global {
                None => {
                    let seed = candidates
                        .into_iter()
                        .next()
                        .expect("possible_models returns at least one candidate on success");
                    for feature in seed.features() {
                        counts.insert(feature, 1);
                    }
                    info!("pair ({i}, {j}) seeds the global model with {} points", seed.len());
                    global = Some(seed);
                }
                Some(global) => {
                    let mut best: Option<(AbsoluteOrientation, Model)> = None;
                    for candidate in candidates {
                        let orientation = match AbsoluteOrientation::between(&candidate, global) {
                            Ok(orientation) => orientation,
                            Err(err) => {
                                debug!("pair ({i}, {j}) candidate cannot be aligned: {err}");
                                continue;
                            }
                        };
                        if !orientation.error().is_finite() {
                            continue;
                        }
                        if best
                            .as_ref()
                            .map(|(b, _)| orientation.error() < b.error())
                            .unwrap_or(true)
                        {
                            best = Some((orientation, candidate));
                        }
                    }
                    match best {
                        Some((orientation, candidate)) => {
                            debug!(
                                "pair ({i}, {j}) merged with alignment error {:.3e}",
                                orientation.error()
                            );
                            global.merge(&orientation.apply(&candidate), &mut counts);
                        }
                        None => debug!("pair ({i}, {j}) contributed no alignable candidate"),
                    }
                }
            }
        }

        global.ok_or(ReconstructionError::NoUsablePairs)
    }
}
