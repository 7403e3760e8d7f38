use super::{
    FieldMap, FormErrors, check_latitude, check_longitude, field_flag, field_value, parse_date,
    parse_float,
};

pub const SORT_RELEVANCE: &str = "rank desc";
pub const SORT_TIMESTAMP: &str = "timestamp desc";

/// Catalog search parameters: free text, bounding box, temporal interval,
/// facet filters and sort order.
#[derive(Clone, Debug, Default)]
pub struct CatalogSearchForm {
    pub q: Option<String>,
    pub north: Option<String>,
    pub east: Option<String>,
    pub south: Option<String>,
    pub west: Option<String>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub exclusive_region: bool,
    pub exclusive_interval: bool,
    pub sort: String,
    /// (facet name, selected value) pairs, in configured facet order.
    pub facets: Vec<(String, String)>,
    pub page: u64,
}

impl CatalogSearchForm {
    /// Form field name for a configured facet.
    pub fn facet_fieldname(facet: &str) -> String {
        let slug: String = facet
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        format!("facet_{slug}")
    }

    pub fn from_fields(fields: &FieldMap, facet_names: &[String]) -> Self {
        let facets = facet_names
            .iter()
            .filter_map(|facet| {
                field_value(fields, &Self::facet_fieldname(facet))
                    .map(|value| (facet.clone(), value))
            })
            .collect();

        Self {
            q: field_value(fields, "q"),
            north: field_value(fields, "n"),
            east: field_value(fields, "e"),
            south: field_value(fields, "s"),
            west: field_value(fields, "w"),
            after: field_value(fields, "after"),
            before: field_value(fields, "before"),
            exclusive_region: field_flag(fields, "exclusive_region"),
            exclusive_interval: field_flag(fields, "exclusive_interval"),
            sort: field_value(fields, "sort").unwrap_or_else(|| SORT_RELEVANCE.to_string()),
            facets,
            page: field_value(fields, "page")
                .and_then(|p| p.parse().ok())
                .filter(|p| *p >= 1)
                .unwrap_or(1),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();

        let north = parse_float(self.north.as_deref(), "n", &mut errors);
        let south = parse_float(self.south.as_deref(), "s", &mut errors);
        let east = parse_float(self.east.as_deref(), "e", &mut errors);
        let west = parse_float(self.west.as_deref(), "w", &mut errors);

        if let Some(north) = north {
            check_latitude(north, "n", &mut errors);
        }
        if let Some(south) = south {
            check_latitude(south, "s", &mut errors);
        }
        if let Some(east) = east {
            check_longitude(east, "e", &mut errors);
        }
        if let Some(west) = west {
            check_longitude(west, "w", &mut errors);
        }
        if let (Some(north), Some(south)) = (north, south) {
            if south > north {
                errors.add("s", "South bound must not exceed the north bound.");
            }
        }
        if let (Some(east), Some(west)) = (east, west) {
            if west > east {
                errors.add("w", "West bound must not exceed the east bound.");
            }
        }

        let after = self.after.as_deref().map(|value| (value, parse_date(value)));
        let before = self.before.as_deref().map(|value| (value, parse_date(value)));
        if let Some((_, None)) = after {
            errors.add("after", "Expecting a date (YYYY-MM-DD).");
        }
        if let Some((_, None)) = before {
            errors.add("before", "Expecting a date (YYYY-MM-DD).");
        }
        if let (Some((_, Some(after))), Some((_, Some(before)))) = (after, before) {
            if before < after {
                errors.add("before", "End date must not precede the start date.");
            }
        }

        errors
    }

    /// Query parameters for the catalog search API call.
    pub fn api_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(q) = &self.q {
            params.push(("text_query", q.clone()));
        }
        if let Some(north) = &self.north {
            params.push(("north_bound", north.clone()));
        }
        if let Some(east) = &self.east {
            params.push(("east_bound", east.clone()));
        }
        if let Some(south) = &self.south {
            params.push(("south_bound", south.clone()));
        }
        if let Some(west) = &self.west {
            params.push(("west_bound", west.clone()));
        }
        if let Some(after) = &self.after {
            params.push(("start_date", after.clone()));
        }
        if let Some(before) = &self.before {
            params.push(("end_date", before.clone()));
        }
        if self.exclusive_region {
            params.push(("exclusive_region", "true".to_string()));
        }
        if self.exclusive_interval {
            params.push(("exclusive_interval", "true".to_string()));
        }
        params.push(("sort", self.sort.clone()));
        params.push(("include_nonsearchable", "false".to_string()));
        params.push(("page", self.page.to_string()));
        params
    }

    /// Query string carrying the search state through redirects and
    /// pagination links (page excluded).
    pub fn query_string(&self) -> String {
        let mut pairs = url::form_urlencoded::Serializer::new(String::new());
        if let Some(q) = &self.q {
            pairs.append_pair("q", q);
        }
        for (name, value) in [
            ("n", &self.north),
            ("e", &self.east),
            ("s", &self.south),
            ("w", &self.west),
            ("after", &self.after),
            ("before", &self.before),
        ] {
            if let Some(value) = value {
                pairs.append_pair(name, value);
            }
        }
        if self.exclusive_region {
            pairs.append_pair("exclusive_region", "true");
        }
        if self.exclusive_interval {
            pairs.append_pair("exclusive_interval", "true");
        }
        if self.sort != SORT_RELEVANCE {
            pairs.append_pair("sort", &self.sort);
        }
        for (facet, value) in &self.facets {
            pairs.append_pair(&Self::facet_fieldname(facet), value);
        }
        pairs.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::parse_urlencoded;

    fn form(query: &str) -> CatalogSearchForm {
        CatalogSearchForm::from_fields(&parse_urlencoded(query), &["Collection".to_string()])
    }

    #[test]
    fn valid_box_and_interval_pass() {
        let form = form("q=moorings&n=-20&s=-35&e=35&w=10&after=2020-01-01&before=2021-06-30");
        assert!(form.validate().is_empty());
    }

    #[test]
    fn out_of_range_longitude_is_rejected() {
        let form = form("e=212.9");
        let errors = form.validate();
        assert_eq!(errors.get("e"), Some("Longitude must be between -180 and 180."));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let errors = form("n=-35&s=-20").validate();
        assert!(errors.get("s").is_some());

        let errors = form("e=10&w=20").validate();
        assert!(errors.get("w").is_some());
    }

    #[test]
    fn end_date_before_start_date_is_rejected() {
        let errors = form("after=2021-06-30&before=2020-01-01").validate();
        assert_eq!(errors.get("before"), Some("End date must not precede the start date."));
    }

    #[test]
    fn unparseable_number_is_reported_per_field() {
        let errors = form("n=north").validate();
        assert_eq!(errors.get("n"), Some("Expecting a number."));
    }

    #[test]
    fn facet_fields_round_trip_through_the_query_string() {
        let form = form("q=x&facet_collection=Agulhas");
        assert_eq!(form.facets, vec![("Collection".to_string(), "Agulhas".to_string())]);
        let qs = form.query_string();
        assert!(qs.contains("q=x"));
        assert!(qs.contains("facet_collection=Agulhas"));
    }

    #[test]
    fn api_params_include_only_supplied_bounds() {
        let form = form("q=kelp&n=-20");
        let params = form.api_params();
        assert!(params.contains(&("text_query", "kelp".to_string())));
        assert!(params.contains(&("north_bound", "-20".to_string())));
        assert!(!params.iter().any(|(name, _)| *name == "south_bound"));
    }
}
