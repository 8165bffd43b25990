//! Evenly spaced frame selection.

/// Pick `count` frame indices spread over a clip of `total` frames.
///
/// A single sample lands in the middle of the clip. Two or more always
/// include the first and last frame; short clips repeat indices rather than
/// returning fewer than `count`.
pub fn sample_indices(total: usize, count: usize) -> Vec<usize> {
    let total = total.max(1);
    let last = total - 1;

    match count {
        0 => Vec::new(),
        1 => vec![total / 2],
        _ => (0..count)
            .map(|k| {
                let pos = (k as f64 * last as f64 / (count - 1) as f64).round();
                (pos.max(0.0) as usize).min(last)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_is_midpoint() {
        assert_eq!(sample_indices(300, 1), vec![150]);
        assert_eq!(sample_indices(7, 1), vec![3]);
        assert_eq!(sample_indices(1, 1), vec![0]);
    }

    #[test]
    fn five_over_three_hundred() {
        assert_eq!(sample_indices(300, 5), vec![0, 75, 150, 224, 299]);
    }

    #[test]
    fn short_clip_repeats_indices() {
        assert_eq!(sample_indices(2, 5), vec![0, 0, 1, 1, 1]);
        assert_eq!(sample_indices(1, 3), vec![0, 0, 0]);
    }

    #[test]
    fn zero_total_behaves_like_one_frame() {
        assert_eq!(sample_indices(0, 4), vec![0, 0, 0, 0]);
        assert_eq!(sample_indices(0, 1), vec![0]);
    }

    #[test]
    fn bounds_hold_for_all_small_inputs() {
        for total in 1..=60 {
            for count in 1..=12 {
                let idx = sample_indices(total, count);
                assert_eq!(idx.len(), count, "T={total} K={count}");
                assert!(idx.iter().all(|&i| i < total));
                assert!(idx.windows(2).all(|w| w[0] <= w[1]));
                if count == 1 {
                    assert_eq!(idx[0], total / 2);
                } else {
                    assert_eq!(idx[0], 0);
                    assert_eq!(idx[count - 1], total - 1);
                }
            }
        }
    }
}
