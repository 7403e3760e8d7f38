use serde_json::{Map, Value, json};

use super::{
    DOI_PATTERN, FieldMap, FormErrors, ORCID_PATTERN, check_latitude, check_longitude,
    field_flag, field_value, field_values, parse_date, parse_float,
};

pub const AUTHOR_ROLES: &[&str] = &["originator", "principalInvestigator"];
pub const CONTRIBUTOR_ROLES: &[&str] = &[
    "resourceProvider",
    "custodian",
    "owner",
    "distributor",
    "pointOfContact",
    "processor",
];

pub const SHAPE_POINT: &str = "point";
pub const SHAPE_BOX: &str = "box";

/// Abstracts and lineage statements below this length are not publishable.
const MIN_NARRATIVE_LEN: usize = 100;

#[derive(Clone, Debug, Default)]
pub struct DoiTagForm {
    pub doi: Option<String>,
}

impl DoiTagForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            doi: field_value(fields, "doi"),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        match &self.doi {
            None => errors.add("doi", "Please enter a DOI."),
            Some(doi) if !DOI_PATTERN.is_match(doi) => {
                errors.add("doi", "Expecting a DOI of the form 10.NNNN/suffix.");
            }
            Some(_) => {}
        }
        errors
    }

    pub fn payload(&self) -> Value {
        json!({ "doi": self.doi })
    }
}

#[derive(Clone, Debug, Default)]
pub struct GeoLocationTagForm {
    pub place: Option<String>,
    pub shape: String,
    pub north: Option<String>,
    pub east: Option<String>,
    pub south: Option<String>,
    pub west: Option<String>,
}

impl GeoLocationTagForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            place: field_value(fields, "place"),
            shape: field_value(fields, "shape").unwrap_or_else(|| SHAPE_POINT.to_string()),
            north: field_value(fields, "north"),
            east: field_value(fields, "east"),
            south: field_value(fields, "south"),
            west: field_value(fields, "west"),
        }
    }

    pub fn is_box(&self) -> bool {
        self.shape == SHAPE_BOX
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();

        if self.place.is_none() {
            errors.add("place", "Please enter a place name.");
        }
        if self.shape != SHAPE_POINT && self.shape != SHAPE_BOX {
            errors.add("shape", "Shape must be a point or a box.");
        }

        if self.north.is_none() {
            errors.add("north", "Please enter a latitude.");
        }
        if self.east.is_none() {
            errors.add("east", "Please enter a longitude.");
        }
        let north = parse_float(self.north.as_deref(), "north", &mut errors);
        let east = parse_float(self.east.as_deref(), "east", &mut errors);
        if let Some(north) = north {
            check_latitude(north, "north", &mut errors);
        }
        if let Some(east) = east {
            check_longitude(east, "east", &mut errors);
        }

        if self.is_box() {
            if self.south.is_none() {
                errors.add("south", "Please enter the south bound.");
            }
            if self.west.is_none() {
                errors.add("west", "Please enter the west bound.");
            }
            let south = parse_float(self.south.as_deref(), "south", &mut errors);
            let west = parse_float(self.west.as_deref(), "west", &mut errors);
            if let Some(south) = south {
                check_latitude(south, "south", &mut errors);
                if let Some(north) = north {
                    if south > north {
                        errors.add("south", "South bound must not exceed the north bound.");
                    }
                }
            }
            if let Some(west) = west {
                check_longitude(west, "west", &mut errors);
                if let Some(east) = east {
                    if west > east {
                        errors.add("west", "West bound must not exceed the east bound.");
                    }
                }
            }
        }

        errors
    }

    /// Tag data payload; box bounds are included only for box shapes.
    pub fn payload(&self) -> Value {
        let mut data = Map::new();
        data.insert("place".to_string(), json!(self.place));
        data.insert("shape".to_string(), json!(self.shape));
        data.insert("north".to_string(), number(self.north.as_deref()));
        data.insert("east".to_string(), number(self.east.as_deref()));
        if self.is_box() {
            data.insert("south".to_string(), number(self.south.as_deref()));
            data.insert("west".to_string(), number(self.west.as_deref()));
        }
        Value::Object(data)
    }
}

fn number(raw: Option<&str>) -> Value {
    raw.and_then(|value| value.parse::<f64>().ok())
        .map(|value| json!(value))
        .unwrap_or(Value::Null)
}

#[derive(Clone, Debug, Default)]
pub struct DateRangeTagForm {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRangeTagForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            start: field_value(fields, "start"),
            end: field_value(fields, "end"),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();

        let start = match &self.start {
            None => {
                errors.add("start", "Please enter a start date.");
                None
            }
            Some(raw) => {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    errors.add("start", "Expecting a date (YYYY-MM-DD).");
                }
                parsed
            }
        };
        let end = match &self.end {
            None => {
                errors.add("end", "Please enter an end date.");
                None
            }
            Some(raw) => {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    errors.add("end", "Expecting a date (YYYY-MM-DD).");
                }
                parsed
            }
        };

        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                errors.add("end", "End date must not precede the start date.");
            }
        }

        errors
    }

    pub fn payload(&self) -> Value {
        json!({ "start": self.start, "end": self.end })
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContributorTagForm {
    pub name: Option<String>,
    pub orcid: Option<String>,
    pub is_author: bool,
    pub author_role: Option<String>,
    pub contributor_role: Option<String>,
    pub contact_info: Option<String>,
    /// Institution keyword ids.
    pub affiliations: Vec<String>,
}

impl ContributorTagForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            name: field_value(fields, "name"),
            orcid: field_value(fields, "orcid"),
            is_author: field_flag(fields, "is_author"),
            author_role: field_value(fields, "author_role"),
            contributor_role: field_value(fields, "contributor_role"),
            contact_info: field_value(fields, "contact_info"),
            affiliations: field_values(fields, "affiliations"),
        }
    }

    /// Role depends on whether the contributor is a cited author.
    pub fn role(&self) -> Option<&str> {
        if self.is_author {
            self.author_role.as_deref()
        } else {
            self.contributor_role.as_deref()
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();

        if self.name.is_none() {
            errors.add("name", "Please enter the contributor's name.");
        }
        if let Some(orcid) = &self.orcid {
            if !ORCID_PATTERN.is_match(orcid) {
                errors.add("orcid", "Expecting an ORCID of the form NNNN-NNNN-NNNN-NNNN.");
            }
        }

        match self.role() {
            None => {
                let field = if self.is_author { "author_role" } else { "contributor_role" };
                errors.add(field, "Please select a role.");
            }
            Some(role) if self.is_author && !AUTHOR_ROLES.contains(&role) => {
                errors.add("author_role", "Not a valid author role.");
            }
            Some(role) if !self.is_author && !CONTRIBUTOR_ROLES.contains(&role) => {
                errors.add("contributor_role", "Not a valid contributor role.");
            }
            Some(_) => {}
        }

        for affiliation in &self.affiliations {
            if affiliation.parse::<i64>().is_err() {
                errors.add("affiliations", "Not a valid institution selection.");
                break;
            }
        }

        errors
    }

    pub fn payload(&self) -> Value {
        let mut data = Map::new();
        data.insert("name".to_string(), json!(self.name));
        data.insert("is_author".to_string(), json!(self.is_author));
        data.insert("role".to_string(), json!(self.role()));
        data.insert(
            "affiliations".to_string(),
            json!(
                self.affiliations
                    .iter()
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect::<Vec<_>>()
            ),
        );
        if let Some(orcid) = &self.orcid {
            data.insert("orcid".to_string(), json!(orcid));
        }
        if self.role() == Some("pointOfContact") {
            data.insert("contact_info".to_string(), json!(self.contact_info));
        }
        Value::Object(data)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SdgTagForm {
    pub goal: Option<String>,
    pub target: Option<String>,
    pub indicator: Option<String>,
}

impl SdgTagForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            goal: field_value(fields, "goal"),
            target: field_value(fields, "target"),
            indicator: field_value(fields, "indicator"),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if self.goal.is_none() {
            errors.add("goal", "Please select a goal.");
        }
        errors
    }

    /// The most specific SDG keyword supplied: indicator, else target, else
    /// the goal itself.
    pub fn keyword(&self) -> Option<&str> {
        self.indicator
            .as_deref()
            .or(self.target.as_deref())
            .or(self.goal.as_deref())
    }
}

#[derive(Clone, Debug, Default)]
pub struct AbstractTagForm {
    pub abstract_text: Option<String>,
}

impl AbstractTagForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            abstract_text: field_value(fields, "abstract"),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        match &self.abstract_text {
            None => errors.add("abstract", "Please enter an abstract."),
            Some(text) if text.chars().count() < MIN_NARRATIVE_LEN => {
                errors.add(
                    "abstract",
                    format!("The abstract must be at least {MIN_NARRATIVE_LEN} characters."),
                );
            }
            Some(_) => {}
        }
        errors
    }

    pub fn payload(&self) -> Value {
        json!({ "abstract": self.abstract_text })
    }
}

#[derive(Clone, Debug, Default)]
pub struct LineageTagForm {
    pub lineage: Option<String>,
}

impl LineageTagForm {
    pub fn from_fields(fields: &FieldMap) -> Self {
        Self {
            lineage: field_value(fields, "lineage"),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        match &self.lineage {
            None => errors.add("lineage", "Please describe the methods (lineage)."),
            Some(text) if text.chars().count() < MIN_NARRATIVE_LEN => {
                errors.add(
                    "lineage",
                    format!("The lineage statement must be at least {MIN_NARRATIVE_LEN} characters."),
                );
            }
            Some(_) => {}
        }
        errors
    }

    pub fn payload(&self) -> Value {
        json!({ "lineage": self.lineage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::parse_urlencoded;

    #[test]
    fn doi_form_rejects_malformed_dois() {
        let form = DoiTagForm::from_fields(&parse_urlencoded("doi=not-a-doi"));
        assert!(form.validate().get("doi").is_some());

        let form = DoiTagForm::from_fields(&parse_urlencoded("doi=10.15493/SARVA.1234"));
        assert!(form.validate().is_empty());
    }

    #[test]
    fn point_location_needs_no_box_bounds() {
        let form = GeoLocationTagForm::from_fields(&parse_urlencoded(
            "place=Agulhas+Bank&shape=point&north=-35.5&east=21.0",
        ));
        assert!(form.validate().is_empty());

        let payload = form.payload();
        assert_eq!(payload["shape"], "point");
        assert!(payload.get("west").is_none());
    }

    #[test]
    fn box_location_requires_coherent_bounds() {
        let form = GeoLocationTagForm::from_fields(&parse_urlencoded(
            "place=Benguela&shape=box&north=-20&east=10&south=-15&west=25",
        ));
        let errors = form.validate();
        assert!(errors.get("south").is_some());
        assert!(errors.get("west").is_some());
    }

    #[test]
    fn longitude_over_180_is_rejected() {
        let form = GeoLocationTagForm::from_fields(&parse_urlencoded(
            "place=Nowhere&shape=point&north=0&east=181",
        ));
        assert_eq!(
            form.validate().get("east"),
            Some("Longitude must be between -180 and 180.")
        );
    }

    #[test]
    fn box_payload_carries_all_four_bounds() {
        let form = GeoLocationTagForm::from_fields(&parse_urlencoded(
            "place=Benguela&shape=box&north=-20&east=18&south=-30&west=10",
        ));
        assert!(form.validate().is_empty());
        let payload = form.payload();
        assert_eq!(payload["south"], -30.0);
        assert_eq!(payload["west"], 10.0);
    }

    #[test]
    fn date_range_end_must_not_precede_start() {
        let form = DateRangeTagForm::from_fields(&parse_urlencoded(
            "start=2021-06-30&end=2020-01-01",
        ));
        assert_eq!(
            form.validate().get("end"),
            Some("End date must not precede the start date.")
        );

        let form =
            DateRangeTagForm::from_fields(&parse_urlencoded("start=2020-01-01&end=2020-01-01"));
        assert!(form.validate().is_empty());
    }

    #[test]
    fn contributor_role_tracks_author_flag() {
        let fields = parse_urlencoded(
            "name=N.+Dlamini&is_author=on&author_role=originator&contributor_role=custodian",
        );
        let form = ContributorTagForm::from_fields(&fields);
        assert!(form.validate().is_empty());
        assert_eq!(form.payload()["role"], "originator");

        let fields = parse_urlencoded("name=N.+Dlamini&contributor_role=custodian");
        let form = ContributorTagForm::from_fields(&fields);
        assert_eq!(form.payload()["role"], "custodian");
    }

    #[test]
    fn contributor_orcid_is_validated_when_present() {
        let fields =
            parse_urlencoded("name=X&contributor_role=owner&orcid=0000-0002-1694-233X");
        assert!(ContributorTagForm::from_fields(&fields).validate().is_empty());

        let fields = parse_urlencoded("name=X&contributor_role=owner&orcid=bogus");
        assert!(ContributorTagForm::from_fields(&fields)
            .validate()
            .get("orcid")
            .is_some());
    }

    #[test]
    fn point_of_contact_payload_includes_contact_info() {
        let fields = parse_urlencoded(
            "name=X&contributor_role=pointOfContact&contact_info=data%40example.org&affiliations=3&affiliations=7",
        );
        let form = ContributorTagForm::from_fields(&fields);
        let payload = form.payload();
        assert_eq!(payload["contact_info"], "data@example.org");
        assert_eq!(payload["affiliations"], serde_json::json!([3, 7]));
    }

    #[test]
    fn sdg_keyword_prefers_the_most_specific_value() {
        let fields = parse_urlencoded("goal=SDG+14&target=14.1&indicator=14.1.1");
        let form = SdgTagForm::from_fields(&fields);
        assert_eq!(form.keyword(), Some("14.1.1"));

        let fields = parse_urlencoded("goal=SDG+14&target=14.1");
        assert_eq!(SdgTagForm::from_fields(&fields).keyword(), Some("14.1"));

        let fields = parse_urlencoded("goal=SDG+14");
        assert_eq!(SdgTagForm::from_fields(&fields).keyword(), Some("SDG 14"));
    }

    #[test]
    fn short_abstract_is_rejected() {
        let form = AbstractTagForm::from_fields(&parse_urlencoded("abstract=too+short"));
        assert!(form.validate().get("abstract").is_some());

        let long = "a".repeat(120);
        let form = AbstractTagForm::from_fields(&parse_urlencoded(&format!("abstract={long}")));
        assert!(form.validate().is_empty());
    }
}
