//! Forward-looking binary labels.

/// Label each row by whether the value `horizon` rows ahead is strictly higher.
///
/// Must run on a symbol's complete series before any row is filtered, so
/// that `i + horizon` still refers to the right observation. Rows whose
/// lookahead falls past the end get `None`.
pub fn forward_labels(values: &[f64], horizon: usize) -> Vec<Option<u8>> {
    values
        .iter()
        .enumerate()
        .map(|(i, &current)| {
            let ahead = *values.get(i.checked_add(horizon)?)?;
            Some(u8::from(ahead > current))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_and_falling() {
        let labels = forward_labels(&[1.0, 2.0, 1.5, 3.0], 1);
        assert_eq!(labels, vec![Some(1), Some(0), Some(1), None]);
    }

    #[test]
    fn test_equal_is_not_a_rise() {
        let labels = forward_labels(&[100.0; 12], 5);
        assert_eq!(labels.iter().filter(|l| l.is_some()).count(), 7);
        assert!(labels[..7].iter().all(|l| *l == Some(0)));
        assert!(labels[7..].iter().all(|l| l.is_none()));
    }

    #[test]
    fn test_horizon_longer_than_series() {
        assert_eq!(forward_labels(&[1.0, 2.0], 5), vec![None, None]);
        assert!(forward_labels(&[], 1).is_empty());
    }
}
