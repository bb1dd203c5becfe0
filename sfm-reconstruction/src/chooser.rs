use itertools::Itertools;
use sfm_core::SceneView;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChooseError {
    /// Pair selection needs at least two views.
    #[error("need at least 2 views to select pairs, got {0}")]
    NotEnoughViews(usize),
}

/// Selects which view pairs are worth the cost of two-view reconstruction.
///
/// The threshold is self-calibrating: every unordered pair whose
/// common-feature count is at least the arithmetic mean of all pairwise
/// counts is selected, in canonical `(i, j)` order with `i < j`. No tunable
/// parameter is exposed.
pub fn choose_pairs(views: &[SceneView]) -> Result<Vec<(usize, usize)>, ChooseError> {
    if views.len() < 2 {
        return Err(ChooseError::NotEnoughViews(views.len()));
    }

    let counts: Vec<((usize, usize), usize)> = (0..views.len())
        .tuple_combinations()
        .map(|(i, j)| ((i, j), views[i].common_features(&views[j]).len()))
        .collect();
    let mean = counts.iter().map(|&(_, count)| count).sum::<usize>() as f64 / counts.len() as f64;

    Ok(counts
        .into_iter()
        .filter(|&(_, count)| count as f64 >= mean)
        .map(|(pair, _)| pair)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use sfm_core::Feature;

    /// A view observing the features with the given ids, all at the origin.
    fn view_with(ids: &[u64]) -> SceneView {
        let mut view = SceneView::new();
        for &id in ids {
            view.set_location(Feature::new(id), Point2::new(0.0, 0.0));
        }
        view
    }

    #[test]
    fn keeps_exactly_the_pairs_at_or_above_the_mean() {
        // Pairwise common-feature counts: (0,1) -> 4, (0,2) -> 2, (1,2) -> 0.
        // Mean is 2, so (0,1) and (0,2) are kept and (1,2) is dropped.
        let views = vec![
            view_with(&[1, 2, 3, 4, 5, 6]),
            view_with(&[1, 2, 3, 4]),
            view_with(&[5, 6, 7]),
        ];
        assert_eq!(choose_pairs(&views).unwrap(), vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn uniform_overlap_keeps_every_pair() {
        let views = vec![
            view_with(&[1, 2, 3]),
            view_with(&[1, 2, 3]),
            view_with(&[1, 2, 3]),
        ];
        assert_eq!(
            choose_pairs(&views).unwrap(),
            vec![(0, 1), (0, 2), (1, 2)]
        );
    }

    #[test]
    fn fewer_than_two_views_is_an_explicit_error() {
        assert!(matches!(
            choose_pairs(&[]),
            Err(ChooseError::NotEnoughViews(0))
        ));
        assert!(matches!(
            choose_pairs(&[SceneView::new()]),
            Err(ChooseError::NotEnoughViews(1))
        ));
    }
}
