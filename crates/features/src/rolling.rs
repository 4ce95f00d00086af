//! Trailing-window statistics.
//!
//! Windows cover the most recent `window` observations including the
//! current one. Early rows use whatever history exists (minimum one
//! observation), so every row gets a value.

use std::collections::VecDeque;

/// Statistics over the current window contents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStats {
    /// Mean of the window.
    pub mean: f64,
    /// Sum of the window.
    pub sum: f64,
    /// Observations currently in the window (at most the window size).
    pub count: usize,
}

/// Rolling sum/mean calculator over a fixed-size window.
pub struct RollingWindow {
    /// Window size in observations.
    window: usize,
    /// Values currently in the window.
    values: VecDeque<f64>,
    /// Sum of `values`.
    sum: f64,
}

impl RollingWindow {
    /// Create a new rolling window. A zero window is treated as one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            values: VecDeque::with_capacity(window),
            sum: 0.0,
        }
    }

    /// Add an observation and return the statistics including it.
    pub fn push(&mut self, value: f64) -> RollingStats {
        if self.is_full() {
            self.values.pop_front();
        }

        self.values.push_back(value);
        // Full windows are re-summed from the buffer; warm-up accumulates.
        if self.is_full() {
            self.sum = self.values.iter().sum();
        } else {
            self.sum += value;
        }
        self.stats()
    }

    /// Statistics over the current contents.
    pub fn stats(&self) -> RollingStats {
        let count = self.values.len();
        let mean = if count > 0 { self.sum / count as f64 } else { 0.0 };
        RollingStats {
            mean,
            sum: self.sum,
            count,
        }
    }

    fn is_full(&self) -> bool {
        self.values.len() >= self.window
    }
}

/// Trailing mean with warm-up; defined for every row.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut rolling = RollingWindow::new(window);
    values.iter().map(|&v| Some(rolling.push(v).mean)).collect()
}

/// Trailing sum with warm-up; defined for every row.
pub fn rolling_sum(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut rolling = RollingWindow::new(window);
    values.iter().map(|&v| Some(rolling.push(v).sum)).collect()
}

/// `values[i] / values[i - periods] - 1`.
///
/// Undefined for the first `periods` rows and where the base value is zero.
pub fn pct_change(values: &[f64], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let base = *values.get(i.checked_sub(periods)?)?;
            if base == 0.0 {
                None
            } else {
                Some(values[i] / base - 1.0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_warm_up_uses_available_rows() {
        let mut rolling = RollingWindow::new(3);
        let first = rolling.push(2.0);
        assert_eq!(first.count, 1);
        assert_relative_eq!(first.mean, 2.0);

        let second = rolling.push(4.0);
        assert_eq!(second.count, 2);
        assert_relative_eq!(second.mean, 3.0);
    }

    #[test]
    fn test_window_drops_oldest() {
        let mut rolling = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            rolling.push(v);
        }
        let stats = rolling.stats();
        assert_eq!(stats.count, 3);
        assert_relative_eq!(stats.sum, 9.0);
        assert_relative_eq!(stats.mean, 3.0);
    }

    #[test]
    fn test_constant_series() {
        let means = rolling_mean(&[100.0; 12], 10);
        assert!(means.iter().all(|m| *m == Some(100.0)));

        let sums = rolling_sum(&[10.0; 12], 10);
        assert_eq!(sums[0], Some(10.0));
        assert_eq!(sums[4], Some(50.0));
        for sum in &sums[9..] {
            assert_relative_eq!(sum.unwrap(), 100.0);
        }
    }

    #[test]
    fn test_zero_window_behaves_as_one() {
        let means = rolling_mean(&[1.0, 5.0, 9.0], 0);
        assert_eq!(means, vec![Some(1.0), Some(5.0), Some(9.0)]);
    }

    #[test]
    fn test_pct_change() {
        let changes = pct_change(&[100.0, 110.0, 99.0, 0.0, 5.0], 1);
        assert_eq!(changes[0], None);
        assert_relative_eq!(changes[1].unwrap(), 0.1);
        assert_relative_eq!(changes[2].unwrap(), -0.1);
        assert_relative_eq!(changes[3].unwrap(), -1.0);
        assert_eq!(changes[4], None);
    }

    #[test]
    fn test_full_window_sum_matches_contents() {
        let mut rolling = RollingWindow::new(2);
        rolling.push(1e16);
        rolling.push(1.0);
        // The large value has left the window entirely.
        let stats = rolling.push(1.0);
        assert_eq!(stats.sum, 2.0);
        assert_eq!(stats.mean, 1.0);
        assert_eq!(rolling.stats(), stats);
    }

    proptest! {
        #[test]
        fn prop_mean_matches_direct_window(
            values in prop::collection::vec(-1e6f64..1e6, 1..60),
            window in 1usize..15,
        ) {
            let means = rolling_mean(&values, window);
            for (i, mean) in means.iter().enumerate() {
                let start = (i + 1).saturating_sub(window);
                let slice = &values[start..=i];
                let expected = slice.iter().sum::<f64>() / slice.len() as f64;
                prop_assert!((mean.unwrap() - expected).abs() <= 1e-6 * (1.0 + expected.abs()));
            }
        }

        #[test]
        fn prop_later_rows_do_not_change_earlier_stats(
            values in prop::collection::vec(0.0f64..1e4, 2..60),
            window in 1usize..15,
            replacement in 0.0f64..1e4,
            pick in any::<prop::sample::Index>(),
        ) {
            let j = pick.index(values.len());
            let mut changed = values.clone();
            changed[j] = replacement;

            let before_mean = rolling_mean(&values, window);
            let after_mean = rolling_mean(&changed, window);
            let before_sum = rolling_sum(&values, window);
            let after_sum = rolling_sum(&changed, window);
            for i in 0..j {
                prop_assert_eq!(before_mean[i], after_mean[i]);
                prop_assert_eq!(before_sum[i], after_sum[i]);
            }
        }
    }
}
