//! Reference range resolution and value classification.
//!
//! Classification never fails: a value that does not parse, or a test with no
//! usable bounds for the patient's sex, degrades to `NotApplicable`.

use serde::{Deserialize, Serialize};

use crate::models::{ReferenceRange, ResultStatus, Sex, TestDefinition};

/// A closed numeric interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Place a value relative to the interval. Both ends are inclusive.
    pub fn classify(&self, value: f64) -> ResultStatus {
        if value < self.min {
            ResultStatus::Low
        } else if value > self.max {
            ResultStatus::High
        } else {
            ResultStatus::Normal
        }
    }
}

/// Parse an entered value as a finite decimal.
pub fn parse_value(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Parse a `"<min> - <max>"` descriptor.
///
/// Every hyphen is tried as the separator, so negative bounds such as
/// `"-5 - 5"` parse. Anything else yields `None`.
pub fn parse_range_descriptor(text: &str) -> Option<Bounds> {
    let text = text.trim();
    text.match_indices('-').find_map(|(idx, _)| {
        let min = parse_value(&text[..idx])?;
        let max = parse_value(&text[idx + 1..])?;
        Some(Bounds::new(min, max))
    })
}

/// Structured bounds when both are present, otherwise the parsed descriptor.
pub fn resolve_bounds(range: &ReferenceRange) -> Option<Bounds> {
    match (range.min, range.max) {
        (Some(min), Some(max)) => Some(Bounds::new(min, max)),
        _ => range.text.as_deref().and_then(parse_range_descriptor),
    }
}

/// Classify a raw value for a test and the patient's sex.
pub fn classify(raw_value: &str, definition: &TestDefinition, sex: Sex) -> ResultStatus {
    let Some(value) = parse_value(raw_value) else {
        tracing::debug!(test = %definition.code, value = raw_value, "Non-numeric value");
        return ResultStatus::NotApplicable;
    };

    match resolve_bounds(definition.range_for(sex)) {
        Some(bounds) => bounds.classify(value),
        None => {
            tracing::debug!(
                test = %definition.code,
                sex = sex.as_code(),
                "No reference range configured"
            );
            ResultStatus::NotApplicable
        }
    }
}

/// Human-readable range for reports.
///
/// Full numeric bounds render as `"min - max"`. Otherwise the descriptor text is
/// shown as entered, falling back to whichever single bound exists.
pub fn format_range(range: &ReferenceRange) -> String {
    if let (Some(min), Some(max)) = (range.min, range.max) {
        return format!("{} - {}", min, max);
    }

    if let Some(text) = range.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return text.to_string();
    }

    range
        .min
        .or(range.max)
        .map(|bound| bound.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glucose() -> TestDefinition {
        let mut test = TestDefinition::new(
            "GLU".into(),
            "Glucose".into(),
            "chemistry".into(),
            "mg/dL".into(),
        );
        test.male_range = ReferenceRange::numeric(70.0, 110.0);
        test.female_range = ReferenceRange::descriptor("65-99");
        test
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(" 12.5 "), Some(12.5));
        assert_eq!(parse_value("-3"), Some(-3.0));
        assert_eq!(parse_value("Positive"), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("inf"), None);
    }

    #[test]
    fn test_parse_descriptor() {
        assert_eq!(parse_range_descriptor("65-99"), Some(Bounds::new(65.0, 99.0)));
        assert_eq!(
            parse_range_descriptor(" 3.5 - 5.1 "),
            Some(Bounds::new(3.5, 5.1))
        );
        assert_eq!(
            parse_range_descriptor("-5 - 5"),
            Some(Bounds::new(-5.0, 5.0))
        );
        assert_eq!(
            parse_range_descriptor("-10--2"),
            Some(Bounds::new(-10.0, -2.0))
        );
    }

    #[test]
    fn test_malformed_descriptor_is_undefined() {
        assert_eq!(parse_range_descriptor("Negative"), None);
        assert_eq!(parse_range_descriptor("65 to 99"), None);
        assert_eq!(parse_range_descriptor("65-"), None);
        assert_eq!(parse_range_descriptor("-"), None);
        assert_eq!(parse_range_descriptor("a-b"), None);
    }

    #[test]
    fn test_zero_bound_is_present() {
        let range = ReferenceRange::numeric(0.0, 5.0);
        assert_eq!(resolve_bounds(&range), Some(Bounds::new(0.0, 5.0)));

        let mut test = glucose();
        test.male_range = range;
        assert_eq!(classify("0", &test, Sex::Male), ResultStatus::Normal);
        assert_eq!(classify("-0.1", &test, Sex::Male), ResultStatus::Low);
    }

    #[test]
    fn test_partial_numeric_falls_back_to_text() {
        let range = ReferenceRange {
            min: Some(1.0),
            max: None,
            text: Some("2 - 8".into()),
        };
        assert_eq!(resolve_bounds(&range), Some(Bounds::new(2.0, 8.0)));

        let bare = ReferenceRange {
            min: Some(1.0),
            max: None,
            text: None,
        };
        assert_eq!(resolve_bounds(&bare), None);
    }

    #[test]
    fn test_classify_by_sex() {
        let test = glucose();
        assert_eq!(classify("120", &test, Sex::Male), ResultStatus::High);
        assert_eq!(classify("69.9", &test, Sex::Male), ResultStatus::Low);
        assert_eq!(classify("110", &test, Sex::Male), ResultStatus::Normal);
        assert_eq!(classify("80", &test, Sex::Female), ResultStatus::Normal);
        assert_eq!(classify("105", &test, Sex::Female), ResultStatus::High);
    }

    #[test]
    fn test_classify_not_applicable() {
        let test = glucose();
        assert_eq!(classify("Positive", &test, Sex::Male), ResultStatus::NotApplicable);

        let bare = TestDefinition::new("CRP".into(), "CRP".into(), "".into(), "".into());
        assert_eq!(classify("4", &bare, Sex::Female), ResultStatus::NotApplicable);
    }

    #[test]
    fn test_format_range() {
        assert_eq!(format_range(&ReferenceRange::numeric(70.0, 110.0)), "70 - 110");
        assert_eq!(format_range(&ReferenceRange::numeric(0.5, 1.2)), "0.5 - 1.2");
        assert_eq!(format_range(&ReferenceRange::descriptor("Negative")), "Negative");
        assert_eq!(format_range(&ReferenceRange::default()), "");

        let lower_only = ReferenceRange {
            min: Some(40.0),
            max: None,
            text: None,
        };
        assert_eq!(format_range(&lower_only), "40");
    }
}
