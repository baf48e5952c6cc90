/// Raw cosine similarity in `[-1, 1]`
///
/// Empty vectors, mismatched lengths and zero-norm vectors yield `None`.
#[inline]
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some((dot / denom).clamp(-1.0, 1.0))
}

/// Cosine similarity rescaled to `[0, 1]` via `(x + 1) / 2`
///
/// Anything [`cosine`] rejects scores 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    cosine(a, b).map_or(0.0, |x| (x + 1.0) / 2.0)
}

/// Scale a vector to unit length in place; zero vectors are left alone
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in vector.iter_mut() {
            *x = (*x as f64 / norm) as f32;
        }
    }
}

/// Round to four decimal places
#[inline]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let a = [0.3, -1.2, 4.0, 0.5];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_opposite_vectors() {
        let a = [0.3f32, -1.2, 4.0, 0.5];
        let neg: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!(cosine_similarity(&a, &neg).abs() < 1e-9);
    }

    #[test]
    fn test_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_normalize_and_round() {
        let mut v = vec![3.0f32, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        assert_eq!(round4(0.123456), 0.1235);
    }
}
