//! Fixed-dimension vector math
//!
//! Pure functions over embedding vectors. Every binary operation checks
//! that both operands share a dimension and fails with
//! [`Error::DimensionMismatch`] otherwise.
//!
//! Accumulation happens in `f64` so similarity scores compared against
//! configured thresholds do not drift with vector length.

use crate::error::{Error, Result};

/// An embedding vector. All vectors in one process share the same length.
pub type Vector = Vec<f32>;

fn check_dims(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Dot product of two vectors.
pub fn dot(a: &[f32], b: &[f32]) -> Result<f64> {
    check_dims(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum())
}

/// Euclidean (L2) norm.
pub fn norm(a: &[f32]) -> f64 {
    a.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt()
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns `0.0` when either vector has zero norm, so a degenerate input
/// never propagates NaN into score comparisons.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    let d = dot(a, b)?;
    let denom = norm(a) * norm(b);
    if denom <= f64::EPSILON {
        return Ok(0.0);
    }
    Ok((d / denom).clamp(-1.0, 1.0))
}

/// Running-mean update: `old + (new - old) / (n + 1)`, element-wise.
///
/// `n` is the number of samples already folded into `old`. The result is the
/// mean of `n + 1` samples, computed in O(D) without the sample history.
pub fn incremental_mean(old: &[f32], new: &[f32], n: u64) -> Result<Vector> {
    check_dims(old, new)?;
    let divisor = (n + 1) as f64;
    Ok(old
        .iter()
        .zip(new.iter())
        .map(|(o, x)| {
            let o = *o as f64;
            (o + (*x as f64 - o) / divisor) as f32
        })
        .collect())
}

/// Arithmetic mean of a non-empty set of vectors.
pub fn mean(vectors: &[Vector]) -> Result<Vector> {
    let first = vectors
        .first()
        .ok_or_else(|| Error::InvalidInput("mean of zero vectors".to_string()))?;
    let mut acc = vec![0.0f64; first.len()];
    for v in vectors {
        check_dims(first, v)?;
        for (a, x) in acc.iter_mut().zip(v.iter()) {
            *a += *x as f64;
        }
    }
    let n = vectors.len() as f64;
    Ok(acc.into_iter().map(|a| (a / n) as f32).collect())
}

/// Reject empty or non-finite vectors, and vectors of the wrong dimension.
pub fn validate(v: &[f32], dimension: usize) -> Result<()> {
    if v.is_empty() {
        return Err(Error::InvalidInput("embedding is empty".to_string()));
    }
    if v.len() != dimension {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            actual: v.len(),
        });
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(Error::InvalidInput(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-9);
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        let sim = cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(sim, 0.0);
        assert!(!sim.is_nan());
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_incremental_mean_first_sample() {
        // n = 0: the update replaces the (meaningless) old value entirely
        let out = incremental_mean(&[9.0, 9.0], &[1.0, 3.0], 0).unwrap();
        assert_eq!(out, vec![1.0, 3.0]);
    }

    #[test]
    fn test_incremental_mean_dimension_mismatch() {
        assert!(incremental_mean(&[1.0], &[1.0, 2.0], 1).is_err());
    }

    #[test]
    fn test_mean_empty() {
        assert!(matches!(mean(&[]), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate() {
        assert!(validate(&[0.1, 0.2], 2).is_ok());
        assert!(matches!(validate(&[], 2), Err(Error::InvalidInput(_))));
        assert!(matches!(
            validate(&[0.1], 2),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            validate(&[f32::NAN, 0.1], 2),
            Err(Error::InvalidInput(_))
        ));
    }

    proptest! {
        #[test]
        fn incremental_mean_matches_batch_mean(
            samples in prop::collection::vec(
                prop::collection::vec(-10.0f32..10.0, 8),
                1..40,
            )
        ) {
            let mut centroid = samples[0].clone();
            for (i, s) in samples.iter().enumerate().skip(1) {
                centroid = incremental_mean(&centroid, s, i as u64).unwrap();
            }
            let expected = mean(&samples).unwrap();
            for (c, e) in centroid.iter().zip(expected.iter()) {
                prop_assert!((c - e).abs() < 1e-3, "centroid {} vs mean {}", c, e);
            }
        }

        #[test]
        fn cosine_is_bounded(
            a in prop::collection::vec(-5.0f32..5.0, 6),
            b in prop::collection::vec(-5.0f32..5.0, 6),
        ) {
            let sim = cosine_similarity(&a, &b).unwrap();
            prop_assert!((-1.0..=1.0).contains(&sim));
        }
    }
}
