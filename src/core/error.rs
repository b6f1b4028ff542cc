use thiserror::Error;

/// Construction-time configuration errors.
///
/// Numeric degeneracies inside a tick (zero-sum weights, zero-radius pulses)
/// are recovered internally and never show up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("grid_size must be in [{min}, {max}], got {size}")]
    GridSize { size: usize, min: usize, max: usize },

    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("{field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: f32 },

    #[error("{field} must be finite")]
    NotFinite { field: &'static str },

    #[error("{field} range is inverted: [{min}, {max}]")]
    InvertedRange {
        field: &'static str,
        min: f32,
        max: f32,
    },

    #[error("{field} must be >= 1")]
    Zero { field: &'static str },

    #[error("{field} cannot be changed on a live session")]
    Immutable { field: &'static str },

    #[error("{field} has {got} cells, expected {expected}")]
    FieldLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },
}

pub(crate) fn check_finite(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field })
    }
}

/// Closed interval check, rejecting NaN/Inf.
pub(crate) fn check_range(
    field: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

pub(crate) fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    check_range(field, value, 0.0, 1.0)
}

pub(crate) fn check_non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::Negative { field, value });
    }
    Ok(())
}

/// `[min, max]` must be ordered and lie within `[lo, hi]`.
pub(crate) fn check_interval(
    field: &'static str,
    interval: [f32; 2],
    lo: f32,
    hi: f32,
) -> Result<(), ConfigError> {
    let [min, max] = interval;
    check_range(field, min, lo, hi)?;
    check_range(field, max, lo, hi)?;
    if min > max {
        return Err(ConfigError::InvertedRange { field, min, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_checks_reject_nan_and_bounds() {
        assert!(check_unit("alpha", 0.5).is_ok());
        assert_eq!(
            check_unit("alpha", f32::NAN),
            Err(ConfigError::NotFinite { field: "alpha" })
        );
        assert!(matches!(
            check_unit("alpha", 1.5),
            Err(ConfigError::OutOfRange { field: "alpha", .. })
        ));
        assert!(matches!(
            check_non_negative("strength", -0.1),
            Err(ConfigError::Negative { .. })
        ));
    }

    #[test]
    fn interval_must_be_ordered() {
        assert!(check_interval("range", [0.1, 0.9], 0.0, 1.0).is_ok());
        assert!(matches!(
            check_interval("range", [0.9, 0.1], 0.0, 1.0),
            Err(ConfigError::InvertedRange { .. })
        ));
        let msg = check_interval("range", [0.9, 0.1], 0.0, 1.0)
            .unwrap_err()
            .to_string();
        assert_eq!(msg, "range range is inverted: [0.9, 0.1]");
    }
}
