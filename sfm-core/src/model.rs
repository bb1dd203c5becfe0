use crate::Feature;
use nalgebra::Point3;
use std::collections::{BTreeMap, HashMap};

/// A reconstructed point cloud: the 3d position of every feature the
/// reconstruction has placed so far.
///
/// Each feature maps to at most one point per model. Models are produced per
/// view pair by triangulation and folded into a running global model with
/// [`Model::merge`].
#[derive(Debug, Clone, Default)]
pub struct Model {
    points: BTreeMap<Feature, Point3<f64>>,
}

impl Model {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a point to this model, replacing any previous position for the
    /// feature.
    pub fn add_point(&mut self, feature: Feature, point: Point3<f64>) {
        self.points.insert(feature, point);
    }

    pub fn point(&self, feature: Feature) -> Option<Point3<f64>> {
        self.points.get(&feature).copied()
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.points.contains_key(&feature)
    }

    /// All features placed in this model, in ascending id order.
    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.points.keys().copied()
    }

    /// All `(feature, point)` entries, in ascending feature id order.
    pub fn points(&self) -> impl Iterator<Item = (Feature, Point3<f64>)> + '_ {
        self.points.iter().map(|(&f, &p)| (f, p))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The ordered intersection of this model's features with another
    /// model's.
    pub fn common_features(&self, other: &Model) -> Vec<Feature> {
        self.features().filter(|&f| other.contains(f)).collect()
    }

    /// The centroid of all points, or `None` for an empty model.
    pub fn center(&self) -> Option<Point3<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .values()
            .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords);
        Some(Point3::from(sum / self.points.len() as f64))
    }

    /// The largest distance from any point to the centroid, or `None` for an
    /// empty model. Used by hosts to fit a view volume around the model.
    pub fn max_distance_from_center(&self) -> Option<f64> {
        let center = self.center()?;
        self.points
            .values()
            .map(|p| (p - center).norm())
            .fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.max(d))))
    }

    /// Merges an aligned model into this one.
    ///
    /// Features new to this model are inserted directly with an observation
    /// count of 1. Features already present are replaced by the running
    /// weighted average `(old * count + incoming) / (count + 1)` and their
    /// count incremented, so a feature's position is the mean of every
    /// observation fused so far, each weighted equally.
    pub fn merge(&mut self, incoming: &Model, counts: &mut HashMap<Feature, u32>) {
        for (feature, point) in incoming.points() {
            match self.points.get_mut(&feature) {
                Some(existing) => {
                    let count = counts.get(&feature).copied().unwrap_or(1);
                    *existing = Point3::from(
                        (existing.coords * count as f64 + point.coords) / (count + 1) as f64,
                    );
                    counts.insert(feature, count + 1);
                }
                None => {
                    self.points.insert(feature, point);
                    counts.insert(feature, 1);
                }
            }
        }
    }
}
