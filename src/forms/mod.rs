pub mod keywords;
pub mod package;
pub mod search;
pub mod tags;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

pub use keywords::InstitutionKeywordForm;
pub use package::{FileUploadForm, PackageForm, ZipUploadForm};
pub use search::CatalogSearchForm;
pub use tags::{
    AbstractTagForm, ContributorTagForm, DateRangeTagForm, DoiTagForm, GeoLocationTagForm,
    LineageTagForm, SdgTagForm,
};

/// Raw submitted fields, keyed by field name. Fields like multi-selects may
/// carry several values.
pub type FieldMap = HashMap<String, Vec<String>>;

/// Parse an application/x-www-form-urlencoded body or query string.
pub fn parse_urlencoded(input: &str) -> FieldMap {
    let mut fields: FieldMap = HashMap::new();
    for (name, value) in url::form_urlencoded::parse(input.as_bytes()) {
        fields.entry(name.into_owned()).or_default().push(value.into_owned());
    }
    fields
}

/// First submitted value for a field, trimmed; `None` when absent or blank.
pub fn field_value(fields: &FieldMap, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(|values| values.first())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// All submitted values for a field, blanks dropped.
pub fn field_values(fields: &FieldMap, name: &str) -> Vec<String> {
    fields
        .get(name)
        .map(|values| {
            values
                .iter()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Checkbox semantics: present with any non-empty value means checked.
pub fn field_flag(fields: &FieldMap, name: &str) -> bool {
    field_value(fields, name).is_some()
}

/// Per-field validation messages, in field order. An empty set means the
/// form passed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormErrors {
    errors: Vec<(String, String)>,
}

impl FormErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push((field.into(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(f, m)| (f.as_str(), m.as_str()))
    }
}

/// DOI: prefix `10.` with a 4+ digit registrant code, then a suffix.
pub static DOI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^10\.\d{4,}(\.\d+)*/[-._;()/:a-zA-Z0-9]+$").unwrap()
});

/// ORCID identifier: four dash-separated groups, X check digit allowed.
pub static ORCID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{4}-\d{4}-\d{3}[\dX]$").unwrap());

/// Research Organization Registry id: 9 characters, crockford-ish alphabet.
pub static ROR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0[a-hj-km-np-tv-z0-9]{6}\d{2}$").unwrap());

pub fn parse_date(value: &str) -> Option<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Parse a float field, recording an error when unparseable.
pub fn parse_float(
    value: Option<&str>,
    field: &str,
    errors: &mut FormErrors,
) -> Option<f64> {
    match value {
        Some(raw) => match raw.parse::<f64>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.add(field, "Expecting a number.");
                None
            }
        },
        None => None,
    }
}

pub fn check_latitude(value: f64, field: &str, errors: &mut FormErrors) {
    if !(-90.0..=90.0).contains(&value) {
        errors.add(field, "Latitude must be between -90 and 90.");
    }
}

pub fn check_longitude(value: f64, field: &str, errors: &mut FormErrors) {
    if !(-180.0..=180.0).contains(&value) {
        errors.add(field, "Longitude must be between -180 and 180.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencoded_parsing_collects_repeated_fields() {
        let fields = parse_urlencoded("a=1&b=x&a=2&empty=");
        assert_eq!(field_values(&fields, "a"), vec!["1", "2"]);
        assert_eq!(field_value(&fields, "b").as_deref(), Some("x"));
        assert_eq!(field_value(&fields, "empty"), None);
        assert_eq!(field_value(&fields, "missing"), None);
    }

    #[test]
    fn flags_require_a_value() {
        let fields = parse_urlencoded("checked=on&blank=");
        assert!(field_flag(&fields, "checked"));
        assert!(!field_flag(&fields, "blank"));
        assert!(!field_flag(&fields, "missing"));
    }

    #[test]
    fn doi_pattern_accepts_registered_shapes() {
        assert!(DOI_PATTERN.is_match("10.1234/abc-def.1"));
        assert!(DOI_PATTERN.is_match("10.15493/SARVA.KOPPEN.10000130"));
        assert!(!DOI_PATTERN.is_match("11.1234/abc"));
        assert!(!DOI_PATTERN.is_match("10.12/short"));
        assert!(!DOI_PATTERN.is_match("10.1234/"));
    }

    #[test]
    fn orcid_pattern_allows_x_check_digit() {
        assert!(ORCID_PATTERN.is_match("0000-0002-1825-0097"));
        assert!(ORCID_PATTERN.is_match("0000-0002-1694-233X"));
        assert!(!ORCID_PATTERN.is_match("0000-0002-1825-00971"));
        assert!(!ORCID_PATTERN.is_match("orcid.org/0000-0002-1825-0097"));
    }

    #[test]
    fn ror_pattern_is_nine_characters() {
        assert!(ROR_PATTERN.is_match("03rp50x72"));
        assert!(!ROR_PATTERN.is_match("3rp50x72"));
        assert!(!ROR_PATTERN.is_match("03rp50x7"));
    }
}
