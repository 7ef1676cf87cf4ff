//! Test catalog models.

use serde::{Deserialize, Serialize};

use super::patient::Sex;

/// One sex-specific reference interval.
///
/// Either bound may be absent. `text` carries a free-text descriptor such as
/// `"65 - 99"` or `"Negative"` for tests without structured bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReferenceRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub text: Option<String>,
}

impl ReferenceRange {
    /// Structured numeric range.
    pub fn numeric(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            text: None,
        }
    }

    /// Free-text descriptor only.
    pub fn descriptor(text: impl Into<String>) -> Self {
        Self {
            min: None,
            max: None,
            text: Some(text.into()),
        }
    }

    /// True when nothing at all is configured.
    pub fn is_empty(&self) -> bool {
        self.min.is_none()
            && self.max.is_none()
            && self.text.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

/// A single orderable laboratory test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestDefinition {
    /// Stable test code, also used by instruments in the device feed
    pub code: String,
    pub name: String,
    /// Clinical category (e.g., "hematology", "chemistry")
    pub category: String,
    /// Report sub-category; takes precedence over category for grouping
    pub subcategory: Option<String>,
    pub unit: String,
    pub price: f64,
    pub active: bool,
    /// Deterministic ordering on entry sheets and reports
    pub display_order: u32,
    pub male_range: ReferenceRange,
    pub female_range: ReferenceRange,
}

impl TestDefinition {
    /// Create a new test definition with required fields.
    pub fn new(code: String, name: String, category: String, unit: String) -> Self {
        Self {
            code,
            name,
            category,
            subcategory: None,
            unit,
            price: 0.0,
            active: true,
            display_order: 0,
            male_range: ReferenceRange::default(),
            female_range: ReferenceRange::default(),
        }
    }

    /// Reference range for the given sex.
    pub fn range_for(&self, sex: Sex) -> &ReferenceRange {
        match sex {
            Sex::Male => &self.male_range,
            Sex::Female => &self.female_range,
        }
    }

    /// Report grouping key: sub-category, then category, then test name.
    pub fn report_group(&self) -> &str {
        non_blank(self.subcategory.as_deref())
            .or_else(|| non_blank(Some(&self.category)))
            .unwrap_or(self.name.trim())
    }
}

/// A bundle of tests ordered together for a single price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestPanel {
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    /// Bundled price (not derived from the member tests)
    pub price: f64,
    pub active: bool,
    /// Member test codes, in panel order
    pub test_codes: Vec<String>,
}

impl TestPanel {
    /// Create a new panel with required fields.
    pub fn new(code: String, name: String) -> Self {
        Self {
            code,
            name,
            category: None,
            price: 0.0,
            active: true,
            test_codes: Vec::new(),
        }
    }

    /// Report grouping key: category, then panel name.
    pub fn report_group(&self) -> &str {
        non_blank(self.category.as_deref()).unwrap_or(self.name.trim())
    }

    /// Sum of the member tests' individual prices, for comparison with the bundled price.
    pub fn individual_price_sum(&self, members: &[TestDefinition]) -> f64 {
        members
            .iter()
            .filter(|t| self.test_codes.contains(&t.code))
            .map(|t| t.price)
            .sum()
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
