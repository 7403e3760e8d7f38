use serde::Deserialize;
use serde_json::Value;

/// Paged result shape returned by the API's list endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page")]
    pub pages: u64,
}

fn default_page() -> u64 {
    1
}

impl<T> Page<T> {
    /// Wrap a flat list as a single-page result, for embedded lists that the
    /// API returns unpaged.
    pub fn from_items(items: Vec<T>) -> Self {
        let total = items.len() as u64;
        Self {
            items,
            total,
            page: 1,
            pages: 1,
        }
    }
}

/// Metadata tag ids used on packages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageTag {
    Doi,
    Geolocation,
    DateRange,
    Contributor,
    Sdg,
    Abstract,
    Lineage,
}

impl PackageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageTag::Doi => "DOI",
            PackageTag::Geolocation => "Geolocation",
            PackageTag::DateRange => "DateRange",
            PackageTag::Contributor => "Contributor",
            PackageTag::Sdg => "SDG",
            PackageTag::Abstract => "Abstract",
            PackageTag::Lineage => "Lineage",
        }
    }
}

/// A typed metadata annotation attached to a package, collection or record.
#[derive(Clone, Debug, Deserialize)]
pub struct TagInstance {
    pub id: String,
    pub tag_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A data submission in progress, fetched fresh per request.
#[derive(Clone, Debug, Deserialize)]
pub struct Package {
    pub id: String,
    pub title: String,
    pub provider_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub tags: Vec<TagInstance>,
}

impl Package {
    /// First tag instance with the given tag id (singleton-cardinality tags).
    pub fn tag(&self, tag: PackageTag) -> Option<&TagInstance> {
        self.tags.iter().find(|t| t.tag_id == tag.as_str())
    }

    /// All tag instances with the given tag id (multi-cardinality tags).
    pub fn tags(&self, tag: PackageTag) -> Vec<&TagInstance> {
        self.tags.iter().filter(|t| t.tag_id == tag.as_str()).collect()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Provider {
    pub id: String,
    pub key: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Keyword {
    pub id: i64,
    pub key: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl Keyword {
    pub fn is_proposed(&self) -> bool {
        self.status.as_deref() == Some("proposed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn package_tag_lookup_distinguishes_singleton_and_multi() {
        let package: Package = serde_json::from_value(json!({
            "id": "p1",
            "title": "Agulhas moorings",
            "provider_id": "prov-1",
            "tags": [
                {"id": "t1", "tag_id": "DOI", "data": {"doi": "10.1234/abc"}},
                {"id": "t2", "tag_id": "Contributor", "data": {"name": "N. Dlamini"}},
                {"id": "t3", "tag_id": "Contributor", "data": {"name": "S. Pillay"}},
            ],
        }))
        .unwrap();

        assert_eq!(package.tag(PackageTag::Doi).map(|t| t.id.as_str()), Some("t1"));
        assert_eq!(package.tags(PackageTag::Contributor).len(), 2);
        assert!(package.tag(PackageTag::Abstract).is_none());
    }

    #[test]
    fn from_items_wraps_a_flat_list() {
        let page = Page::from_items(vec![1, 2, 3]);
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 1);
    }
}
