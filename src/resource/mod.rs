//! Untyped views over STAC documents
//!
//! The crawler never deserializes resources into typed structs: extension
//! proliferation means no closed model covers every document in the wild.
//! Instead a [`Resource`] wraps the raw JSON map and derives what the
//! traversal needs -- type, version, conformance classes, links, assets --
//! through accessors that tolerate missing or mistyped fields.

pub mod links;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use links::{Link, Links};

const TYPE_KEY: &str = "type";
const VERSION_KEY: &str = "stac_version";
const EXTENSIONS_KEY: &str = "stac_extensions";
const CONFORMS_TO_KEY: &str = "conformsTo";

/// The document-level STAC resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Catalog,
    Collection,
    Item,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Catalog => write!(f, "catalog"),
            ResourceType::Collection => write!(f, "collection"),
            ResourceType::Item => write!(f, "item"),
        }
    }
}

/// A STAC catalog, collection, or item as raw JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Map<String, Value>);

impl Resource {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// The underlying JSON map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns the resource type.
    ///
    /// Documents from STAC 1.0 onward declare a `type` field (`Feature`,
    /// `Catalog`, or `Collection`). Earlier documents don't, so absence falls
    /// back to presence heuristics: an `extent` means a collection, otherwise
    /// an `id` means a catalog.
    pub fn resource_type(&self) -> Option<ResourceType> {
        match self.0.get(TYPE_KEY) {
            None => {
                if self.0.contains_key("extent") {
                    Some(ResourceType::Collection)
                } else if self.0.contains_key("id") {
                    Some(ResourceType::Catalog)
                } else {
                    None
                }
            }
            Some(Value::String(value)) => match value.as_str() {
                "Feature" => Some(ResourceType::Item),
                "Catalog" => Some(ResourceType::Catalog),
                "Collection" => Some(ResourceType::Collection),
                _ => None,
            },
            Some(_) => None,
        }
    }

    /// The STAC version, if declared.
    pub fn version(&self) -> Option<&str> {
        self.0.get(VERSION_KEY).and_then(Value::as_str)
    }

    /// Extension schema URIs listed by the document.
    pub fn extensions(&self) -> Vec<String> {
        string_list(self.0.get(EXTENSIONS_KEY))
    }

    /// Conformance class URIs. Only meaningful on API root catalogs.
    pub fn conforms_to(&self) -> Vec<String> {
        string_list(self.0.get(CONFORMS_TO_KEY))
    }

    /// The document links.
    pub fn links(&self) -> Links {
        self.0.get("links").map(Links::from_value).unwrap_or_default()
    }

    /// The document assets, keyed by asset name.
    pub fn assets(&self) -> HashMap<String, Asset> {
        let Some(Value::Object(entries)) = self.0.get("assets") else {
            return HashMap::new();
        };
        entries
            .iter()
            .filter_map(|(key, value)| match value {
                Value::Object(map) => Some((key.clone(), Asset(map.clone()))),
                _ => None,
            })
            .collect()
    }
}

impl From<Map<String, Value>> for Resource {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Metadata about data linked from an item or collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(Map<String, Value>);

impl Asset {
    /// The asset's href.
    pub fn href(&self) -> Option<&str> {
        self.0.get("href").and_then(Value::as_str)
    }

    /// The asset's media type.
    pub fn media_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// The asset's title.
    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(Value::as_str)
    }

    /// The asset's description.
    pub fn description(&self) -> Option<&str> {
        self.0.get("description").and_then(Value::as_str)
    }

    /// The asset's roles.
    pub fn roles(&self) -> Vec<String> {
        string_list(self.0.get("roles"))
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(values)) = value else {
        return Vec::new();
    };
    values
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect()
}

/// A page of the STAC API `collections` endpoint.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CollectionsPage {
    #[serde(default)]
    pub collections: Vec<Resource>,
    #[serde(default)]
    pub links: Links,
}

/// A page of the STAC API `children` endpoint.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChildrenPage {
    #[serde(default)]
    pub children: Vec<Resource>,
    #[serde(default)]
    pub links: Links,
}

/// A page of items from a STAC API `items` endpoint.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FeaturesPage {
    #[serde(default)]
    pub features: Vec<Resource>,
    #[serde(default)]
    pub links: Links,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(value: Value) -> Resource {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_type_from_type_field() {
        assert_eq!(
            resource(json!({"type": "Feature"})).resource_type(),
            Some(ResourceType::Item)
        );
        assert_eq!(
            resource(json!({"type": "Catalog"})).resource_type(),
            Some(ResourceType::Catalog)
        );
        assert_eq!(
            resource(json!({"type": "Collection"})).resource_type(),
            Some(ResourceType::Collection)
        );
    }

    #[test]
    fn test_type_unrecognized() {
        assert_eq!(resource(json!({"type": "Widget"})).resource_type(), None);
        assert_eq!(resource(json!({"type": 42})).resource_type(), None);
    }

    #[test]
    fn test_type_legacy_extent_means_collection() {
        let legacy = resource(json!({
            "id": "sentinel-2",
            "stac_version": "0.8.1",
            "extent": {"spatial": {"bbox": [[-180.0, -90.0, 180.0, 90.0]]}}
        }));
        assert_eq!(legacy.resource_type(), Some(ResourceType::Collection));
    }

    #[test]
    fn test_type_legacy_id_means_catalog() {
        let legacy = resource(json!({"id": "root", "stac_version": "0.8.1"}));
        assert_eq!(legacy.resource_type(), Some(ResourceType::Catalog));
    }

    #[test]
    fn test_type_empty_document() {
        assert_eq!(resource(json!({})).resource_type(), None);
    }

    #[test]
    fn test_version() {
        assert_eq!(
            resource(json!({"stac_version": "1.0.0"})).version(),
            Some("1.0.0")
        );
        assert_eq!(resource(json!({"stac_version": 1})).version(), None);
        assert_eq!(resource(json!({})).version(), None);
    }

    #[test]
    fn test_conforms_to_skips_non_strings() {
        let doc = resource(json!({
            "conformsTo": ["https://api.stacspec.org/v1.0.0/core", 7, null]
        }));
        assert_eq!(
            doc.conforms_to(),
            vec!["https://api.stacspec.org/v1.0.0/core".to_string()]
        );
    }

    #[test]
    fn test_extensions() {
        let doc = resource(json!({
            "stac_extensions": ["https://stac-extensions.github.io/eo/v1.0.0/schema.json"]
        }));
        assert_eq!(doc.extensions().len(), 1);
        assert!(resource(json!({})).extensions().is_empty());
    }

    #[test]
    fn test_assets() {
        let doc = resource(json!({
            "assets": {
                "thumbnail": {
                    "href": "./thumb.png",
                    "type": "image/png",
                    "title": "Thumbnail",
                    "roles": ["thumbnail", 3]
                },
                "bogus": "not an object"
            }
        }));
        let assets = doc.assets();
        assert_eq!(assets.len(), 1);
        let thumb = &assets["thumbnail"];
        assert_eq!(thumb.href(), Some("./thumb.png"));
        assert_eq!(thumb.media_type(), Some("image/png"));
        assert_eq!(thumb.title(), Some("Thumbnail"));
        assert_eq!(thumb.description(), None);
        assert_eq!(thumb.roles(), vec!["thumbnail".to_string()]);
    }

    #[test]
    fn test_features_page_defaults() {
        let page: FeaturesPage = serde_json::from_value(json!({})).unwrap();
        assert!(page.features.is_empty());
        assert!(page.links.is_empty());
    }
}
