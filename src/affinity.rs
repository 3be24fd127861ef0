//! Weighted fusion of geometric and scalar similarities into one affinity.
//!
//! The geometry similarity always comes first; scalar similarities follow in
//! channel order. Weights are non-negative and must sum to 1, so the combined
//! matrix keeps the unit diagonal and the [0,1] value range of its inputs.

use ndarray::Array2;

use crate::error::ClusterError;

/// Validate the (weights, channel names) pair before any matrix is built.
/// An empty weight list is only legal with an empty channel list (geometry
/// alone); the single-entry list `[1]` is accepted as the explicit form of the
/// same thing.
pub fn validate_weights(
    weights: &[f64],
    scalar_types: &[String],
    tolerance: f64,
) -> Result<(), ClusterError> {
    if scalar_types.is_empty() {
        return match weights {
            [] => Ok(()),
            [w] if (*w - 1.).abs() <= tolerance => Ok(()),
            _ => Err(ClusterError::WeightSpec(format!(
                "{} weights given but no scalar channels",
                weights.len()
            ))),
        };
    }
    if weights.is_empty() {
        return Err(ClusterError::WeightSpec(format!(
            "{} scalar channels given but no weights",
            scalar_types.len()
        )));
    }
    if weights.len() != scalar_types.len() + 1 {
        return Err(ClusterError::WeightSpec(format!(
            "expected {} weights (geometry + {} channels), got {}",
            scalar_types.len() + 1,
            scalar_types.len(),
            weights.len()
        )));
    }
    if let Some(w) = weights.iter().find(|w| **w < 0.) {
        return Err(ClusterError::WeightSpec(format!("negative weight {:.3e}", w)));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.).abs() > tolerance {
        return Err(ClusterError::WeightSum { sum, tol: tolerance });
    }
    Ok(())
} // end of validate_weights

/// W = w[0]·S_geometry + Σ w[c]·S_c. Call [validate_weights] first; with no
/// scalar similarities the geometry matrix passes through untouched.
pub fn combine(
    geometry: Array2<f64>,
    scalars: Vec<Array2<f64>>,
    weights: &[f64],
) -> Array2<f64> {
    if scalars.is_empty() {
        return geometry;
    }
    let mut combined = geometry * weights[0];
    for (similarity, &w) in scalars.iter().zip(&weights[1..]) {
        combined.scaled_add(w, similarity);
    }
    combined
} // end of combine

//=======================================================================

#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::arr2;

    #[test]
    fn geometry_alone() {
        assert!(validate_weights(&[], &[], 1e-9).is_ok());
        assert!(validate_weights(&[1.], &[], 1e-9).is_ok());
        let g = arr2(&[[1., 0.5], [0.5, 1.]]);
        let w = combine(g.clone(), vec![], &[]);
        assert_eq!(w, g);
    }

    #[test]
    fn weight_spec_mismatch() {
        let types = vec!["FA".to_string()];
        assert!(matches!(
            validate_weights(&[], &types, 1e-9),
            Err(ClusterError::WeightSpec(_))
        ));
        assert!(matches!(
            validate_weights(&[0.5, 0.5], &[], 1e-9),
            Err(ClusterError::WeightSpec(_))
        ));
        // wrong length
        assert!(matches!(
            validate_weights(&[0.5, 0.3, 0.2], &types, 1e-9),
            Err(ClusterError::WeightSpec(_))
        ));
    }

    #[test]
    fn weight_sum_violation() {
        let types = vec!["FA".to_string()];
        assert!(matches!(
            validate_weights(&[0.5, 0.4], &types, 1e-9),
            Err(ClusterError::WeightSum { .. })
        ));
        assert!(validate_weights(&[0.6, 0.4], &types, 1e-9).is_ok());
    }

    #[test]
    fn combination_is_exact() {
        let g = arr2(&[[1., 0.2], [0.2, 1.]]);
        let s = arr2(&[[1., 0.8], [0.8, 1.]]);
        let w = combine(g, vec![s], &[0.75, 0.25]);
        assert!((w[[0, 1]] - (0.75 * 0.2 + 0.25 * 0.8)).abs() < 1e-15);
        assert!((w[[0, 0]] - 1.).abs() < 1e-15);
        assert!((w[[1, 0]] - w[[0, 1]]).abs() < 1e-15);
    }
} // end of mod tests
