use crate::config::Number;
use wide::f32x8;

/// Compute the squared Euclidean (L2) distance between two vectors using
/// SIMD operations. Returns `None` when the lengths differ.
pub fn squared_l2_distance_simd(a: &[Number], b: &[Number]) -> Option<Number> {
    if a.len() != b.len() {
        crate::config::verbose_print(&format!(
            "Vector length mismatch: {} vs {}",
            a.len(),
            b.len()
        ));
        return None;
    }

    let mut acc = f32x8::splat(0.0);

    let len = a.len();
    let simd_len = len - (len % 8);

    // SIMD loop
    for i in (0..simd_len).step_by(8) {
        let va = f32x8::new([
            a[i],
            a[i + 1],
            a[i + 2],
            a[i + 3],
            a[i + 4],
            a[i + 5],
            a[i + 6],
            a[i + 7],
        ]);
        let vb = f32x8::new([
            b[i],
            b[i + 1],
            b[i + 2],
            b[i + 3],
            b[i + 4],
            b[i + 5],
            b[i + 6],
            b[i + 7],
        ]);
        let diff = va - vb;
        acc += diff * diff;
    }

    let mut total = acc.reduce_add();

    // Handle remaining elements
    for i in simd_len..len {
        let d = a[i] - b[i];
        total += d * d;
    }

    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squared_l2_scalar(a: &[Number], b: &[Number]) -> Number {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[test]
    fn matches_scalar_reference_on_simd_width() {
        let a: Vec<Number> = (0..16).map(|i| i as Number * 0.5).collect();
        let b: Vec<Number> = (0..16).map(|i| 8.0 - i as Number).collect();
        let simd = squared_l2_distance_simd(&a, &b).unwrap();
        let scalar = squared_l2_scalar(&a, &b);
        assert!((simd - scalar).abs() < 1e-4, "{} vs {}", simd, scalar);
    }

    #[test]
    fn matches_scalar_reference_on_odd_length() {
        // 11 is not a multiple of the SIMD lane width, so the tail loop runs.
        let a: Vec<Number> = (0..11).map(|i| (i as Number).sin()).collect();
        let b: Vec<Number> = (0..11).map(|i| (i as Number).cos()).collect();
        let simd = squared_l2_distance_simd(&a, &b).unwrap();
        let scalar = squared_l2_scalar(&a, &b);
        assert!((simd - scalar).abs() < 1e-5, "{} vs {}", simd, scalar);
    }

    #[test]
    fn identical_vectors_have_zero_distance() {
        let a = vec![0.25_f32; 24];
        assert_eq!(squared_l2_distance_simd(&a, &a), Some(0.0));
    }

    #[test]
    fn length_mismatch_returns_none() {
        let a = vec![1.0_f32; 8];
        let b = vec![1.0_f32; 9];
        assert_eq!(squared_l2_distance_simd(&a, &b), None);
    }
}
