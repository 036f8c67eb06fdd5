//! Unit conversion from metering units to billing units
//!
//! The metering service reports everything per minute:
//! - `ram` in MB·minutes → GB·hours
//! - `disk` in GB·minutes → GB·hours
//! - anything else (`vm`, `cpu`, ...) in unit·minutes → unit·hours

use crate::types::Measure;

const MINUTES_PER_HOUR: f64 = 60.0;
const MB_PER_GB: f64 = 1024.0;

/// Result of converting one measure
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// Numeric value in billing units
    Converted(f64),
    /// Non-numeric input, passed through unchanged
    Unconvertible(serde_json::Value),
}

impl Conversion {
    pub fn value(&self) -> Option<f64> {
        match self {
            Conversion::Converted(v) => Some(*v),
            Conversion::Unconvertible(_) => None,
        }
    }
}

/// Convert a raw numeric value for `metric` into its billing unit
pub fn convert_value(metric: &str, raw: f64) -> f64 {
    match metric {
        "ram" => raw / MINUTES_PER_HOUR / MB_PER_GB,
        "disk" => raw / MINUTES_PER_HOUR,
        _ => raw / MINUTES_PER_HOUR,
    }
}

/// Convert a measure, leaving non-numeric values untouched
pub fn convert(metric: &str, raw: &Measure) -> Conversion {
    match raw {
        Measure::Number(n) => Conversion::Converted(convert_value(metric, *n)),
        Measure::Raw(v) => Conversion::Unconvertible(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_ram_mb_minutes_to_gb_hours() {
        assert_close(convert_value("ram", 61440.0), 1.0);
    }

    #[test]
    fn test_disk_gb_minutes_to_gb_hours() {
        assert_close(convert_value("disk", 60.0), 1.0);
    }

    #[test]
    fn test_vm_and_cpu_minutes_to_hours() {
        assert_close(convert_value("vm", 120.0), 2.0);
        assert_close(convert_value("cpu", 120.0), 2.0);
    }

    #[test]
    fn test_unknown_metric_uses_hours() {
        assert_close(convert_value("gpu", 30.0), 0.5);
    }

    #[test]
    fn test_convert_number() {
        assert_eq!(
            convert("vm", &Measure::Number(120.0)),
            Conversion::Converted(2.0)
        );
    }

    #[test]
    fn test_convert_null_passes_through() {
        let out = convert("ram", &Measure::Raw(serde_json::Value::Null));
        assert_eq!(out, Conversion::Unconvertible(serde_json::Value::Null));
        assert!(out.value().is_none());
    }

    #[test]
    fn test_convert_string_passes_through() {
        let raw = serde_json::Value::String("n/a".into());
        assert_eq!(
            convert("cpu", &Measure::Raw(raw.clone())),
            Conversion::Unconvertible(raw)
        );
    }
}
