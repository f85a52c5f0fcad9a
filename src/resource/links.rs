//! Link records and media-type matching
//!
//! Traversal decisions hinge on three link fields: `rel` selects candidates,
//! `type` ranks them, and `href` is what gets followed. Matching is
//! expressed as a priority list of predicates rather than a rank function so
//! new media types can be interposed without disturbing existing order.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A link between STAC documents.
///
/// Only string-valued fields are retained; a link with a missing or
/// non-string `type` is treated as having no media type at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    fn from_map(map: &Map<String, Value>) -> Self {
        let field = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_owned);
        Self {
            rel: field("rel").unwrap_or_default(),
            href: field("href").unwrap_or_default(),
            media_type: field("type"),
            title: field("title"),
        }
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Link::from_map(&map))
    }
}

/// A predicate over a link's media type.
pub type LinkMatcher = fn(&Link) -> bool;

/// Matches `application/json`.
pub fn application_json(link: &Link) -> bool {
    matches!(&link.media_type, Some(t) if t.eq_ignore_ascii_case("application/json"))
}

/// Matches `application/geo+json`.
pub fn geo_json(link: &Link) -> bool {
    matches!(&link.media_type, Some(t) if t.eq_ignore_ascii_case("application/geo+json"))
}

/// Matches any media type with a `json` suffix.
pub fn any_json(link: &Link) -> bool {
    matches!(&link.media_type, Some(t) if t.to_ascii_lowercase().ends_with("json"))
}

/// Matches links that declare no media type.
pub fn no_media_type(link: &Link) -> bool {
    link.media_type.is_none()
}

/// An ordered list of links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Links(Vec<Link>);

impl Links {
    pub fn new(links: Vec<Link>) -> Self {
        Self(links)
    }

    /// Builds links from a raw JSON value, skipping non-object entries.
    pub fn from_value(value: &Value) -> Self {
        let Value::Array(values) = value else {
            return Self::default();
        };
        Self(
            values
                .iter()
                .filter_map(Value::as_object)
                .map(Link::from_map)
                .collect(),
        )
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Link> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the best link with the given rel.
    ///
    /// Matchers are a priority list: a link matching an earlier matcher beats
    /// any link matching only later ones, and document order breaks ties.
    /// With no matchers, the first link with the rel wins.
    pub fn rel(&self, rel: &str, matchers: &[LinkMatcher]) -> Option<&Link> {
        if matchers.is_empty() {
            return self.0.iter().find(|link| link.rel == rel);
        }

        let mut best: Option<(usize, &Link)> = None;
        for link in self.0.iter().filter(|link| link.rel == rel) {
            let Some(priority) = matchers.iter().position(|matcher| matcher(link)) else {
                continue;
            };
            // Document order: a later link only wins with a strictly better
            // priority.
            if best.map_or(true, |(current, _)| priority < current) {
                best = Some((priority, link));
            }
        }
        best.map(|(_, link)| link)
    }
}

impl<'a> IntoIterator for &'a Links {
    type Item = &'a Link;
    type IntoIter = std::slice::Iter<'a, Link>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for Links {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<Value>::deserialize(deserializer)?;
        Ok(Self(
            values
                .iter()
                .filter_map(Value::as_object)
                .map(Link::from_map)
                .collect(),
        ))
    }
}
