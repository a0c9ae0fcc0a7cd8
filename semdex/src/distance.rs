//! Distance metrics for comparing embedding vectors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The distance function an index ranks by. Lower is always closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 − (a·b)/(‖a‖·‖b‖)`, in `[0, 2]`.
    #[default]
    Cosine,
    /// Euclidean (L2) distance.
    Euclidean,
    /// `1 − a·b`, for embeddings that are already normalized.
    InnerProduct,
}

impl DistanceMetric {
    /// Stable identifier used in persisted indexes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::InnerProduct => "inner_product",
        }
    }

    /// Compute the distance between two vectors.
    ///
    /// # Errors
    ///
    /// - [`RagError::DimensionMismatch`] if the lengths differ.
    /// - [`RagError::InvalidVector`] for cosine distance when either vector
    ///   has zero magnitude.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(RagError::DimensionMismatch { expected: a.len(), actual: b.len() });
        }
        match self {
            Self::Cosine => {
                let dot = dot(a, b);
                let norm_a = norm(a);
                let norm_b = norm(b);
                if norm_a == 0.0 || norm_b == 0.0 {
                    return Err(RagError::InvalidVector(
                        "cosine distance is undefined for a zero-magnitude vector".to_string(),
                    ));
                }
                let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
                Ok((1.0 - similarity) as f32)
            }
            Self::Euclidean => {
                let sum: f64 = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| {
                        let d = f64::from(*x) - f64::from(*y);
                        d * d
                    })
                    .sum();
                Ok(sum.sqrt() as f32)
            }
            Self::InnerProduct => Ok((1.0 - dot(a, b)) as f32),
        }
    }

    /// Reject vectors this metric cannot rank.
    ///
    /// Every metric rejects empty and non-finite vectors; cosine also rejects
    /// zero-magnitude vectors.
    pub fn check(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(RagError::InvalidVector("vector has no components".to_string()));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::InvalidVector("vector has non-finite components".to_string()));
        }
        if *self == Self::Cosine && norm(vector) == 0.0 {
            return Err(RagError::InvalidVector(
                "cosine distance is undefined for a zero-magnitude vector".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// f64 accumulation keeps identical vectors at distance 0 for large dimensions.
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

fn norm(a: &[f32]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_orthogonal_opposite() {
        let a = [1.0, 2.0, 3.0];
        assert!(DistanceMetric::Cosine.distance(&a, &a).unwrap().abs() < 1e-6);

        let x = [1.0, 0.0];
        let y = [0.0, 1.0];
        assert!((DistanceMetric::Cosine.distance(&x, &y).unwrap() - 1.0).abs() < 1e-6);

        let z = [-1.0, 0.0];
        assert!((DistanceMetric::Cosine.distance(&x, &z).unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_scale_invariant() {
        let d = DistanceMetric::Cosine.distance(&[1.0, 1.0], &[10.0, 10.0]).unwrap();
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn cosine_rejects_zero_vector() {
        let err = DistanceMetric::Cosine.distance(&[0.0, 0.0], &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, RagError::InvalidVector(_)));
        assert!(DistanceMetric::Cosine.check(&[0.0, 0.0]).is_err());
        assert!(DistanceMetric::Euclidean.check(&[0.0, 0.0]).is_ok());
    }

    #[test]
    fn euclidean_and_inner_product() {
        let d = DistanceMetric::Euclidean.distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 1e-6);

        let d = DistanceMetric::InnerProduct.distance(&[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn length_mismatch_is_reported() {
        let err = DistanceMetric::Euclidean.distance(&[1.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 1, actual: 2 }));
    }

    #[test]
    fn check_rejects_empty_and_nan() {
        assert!(DistanceMetric::Euclidean.check(&[]).is_err());
        assert!(DistanceMetric::InnerProduct.check(&[f32::NAN]).is_err());
    }

    #[test]
    fn serializes_as_snake_case() {
        assert_eq!(serde_json::to_string(&DistanceMetric::InnerProduct).unwrap(), "\"inner_product\"");
        assert_eq!(DistanceMetric::Cosine.to_string(), "cosine");
    }
}
