use crate::Feature;
use float_ord::FloatOrd;
use nalgebra::Point2;
use std::collections::BTreeMap;

/// One image's observations: the 2d pixel location of every feature tracked
/// in that image.
///
/// A feature maps to at most one location per view. Iteration and
/// intersection order is ascending feature id, which keeps everything built
/// from a view (design matrices, candidate models) deterministic.
#[derive(Debug, Clone, Default)]
pub struct SceneView {
    locations: BTreeMap<Feature, Point2<f64>>,
}

impl SceneView {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the location of a feature in this view, replacing any previous
    /// location.
    pub fn set_location(&mut self, feature: Feature, location: Point2<f64>) {
        self.locations.insert(feature, location);
    }

    /// Removes a feature from this view, returning its location if it was
    /// tracked.
    pub fn remove_feature(&mut self, feature: Feature) -> Option<Point2<f64>> {
        self.locations.remove(&feature)
    }

    /// The pixel location of `feature` in this view.
    pub fn location(&self, feature: Feature) -> Option<Point2<f64>> {
        self.locations.get(&feature).copied()
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.locations.contains_key(&feature)
    }

    /// All features tracked in this view, in ascending id order.
    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.locations.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// The ordered intersection of this view's features with another view's.
    pub fn common_features(&self, other: &SceneView) -> Vec<Feature> {
        self.features().filter(|&f| other.contains(f)).collect()
    }

    /// The tracked feature nearest to `point` in pixel distance.
    pub fn nearest_feature(&self, point: &Point2<f64>) -> Option<Feature> {
        self.locations
            .iter()
            .min_by_key(|(_, location)| FloatOrd((*location - point).norm()))
            .map(|(&feature, _)| feature)
    }
}
