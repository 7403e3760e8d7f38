use serde_json::{Map, Value, json};

use super::{FieldMap, FormErrors, ROR_PATTERN, field_value};

/// Proposal form for an institution keyword not yet in the vocabulary.
#[derive(Clone, Debug, Default)]
pub struct InstitutionKeywordForm {
    /// Full name of the institution.
    pub key: Option<String>,
    pub abbr: Option<String>,
    pub ror: Option<String>,
}

impl InstitutionKeywordForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            key: field_value(fields, "key"),
            abbr: field_value(fields, "abbr"),
            ror: field_value(fields, "ror"),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        match &self.key {
            None => errors.add("key", "Please enter the institution's name."),
            Some(key) if key.chars().count() < 2 => {
                errors.add("key", "The institution name must be at least 2 characters.");
            }
            Some(_) => {}
        }
        if let Some(ror) = &self.ror {
            if !ROR_PATTERN.is_match(ror) {
                errors.add("ror", "Expecting a 9-character ROR.");
            }
        }
        errors
    }

    /// Keyword proposal payload: key plus any optional attributes supplied.
    pub fn payload(&self) -> Value {
        let mut data = Map::new();
        if let Some(abbr) = &self.abbr {
            data.insert("abbr".to_string(), json!(abbr));
        }
        if let Some(ror) = &self.ror {
            data.insert("ror".to_string(), json!(ror));
        }
        json!({ "key": self.key, "data": data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::parse_urlencoded;

    #[test]
    fn key_is_required_and_trimmed() {
        let form = InstitutionKeywordForm::from_fields(&parse_urlencoded("key=++"));
        assert!(form.validate().get("key").is_some());

        let form = InstitutionKeywordForm::from_fields(&parse_urlencoded("key=X"));
        assert!(form.validate().get("key").is_some());

        let form = InstitutionKeywordForm::from_fields(&parse_urlencoded(
            "key=South+African+Environmental+Observation+Network",
        ));
        assert!(form.validate().is_empty());
    }

    #[test]
    fn bad_ror_is_rejected_and_good_ror_travels_in_data() {
        let form =
            InstitutionKeywordForm::from_fields(&parse_urlencoded("key=SAEON&ror=https://ror"));
        assert_eq!(form.validate().get("ror"), Some("Expecting a 9-character ROR."));

        let form =
            InstitutionKeywordForm::from_fields(&parse_urlencoded("key=SAEON&ror=03rp50x72&abbr=SAEON"));
        assert!(form.validate().is_empty());
        let payload = form.payload();
        assert_eq!(payload["data"]["ror"], "03rp50x72");
        assert_eq!(payload["data"]["abbr"], "SAEON");
    }
}
