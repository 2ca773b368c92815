use std::collections::BTreeMap;

use serde::ser::SerializeMap as _;
use serde::{Serialize, Serializer};
use serde_json::Value;

pub const SELF_RELATION: &str = "self";
pub const ITEMS_RELATION: &str = "_items";

/// Entity tagged with its resource type.
///
/// Handlers return a `ResourceObject` (or a `Vec` of them) as pipeline data
/// to have it composed into a HAL document. Serializes as the bare entity.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceObject {
    resource_type: String,
    entity: Value,
}

impl ResourceObject {
    pub fn new<T: Serialize>(resource_type: impl Into<String>, entity: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::from_value(resource_type, serde_json::to_value(entity)?))
    }

    pub fn from_value(resource_type: impl Into<String>, entity: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            entity,
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn entity(&self) -> &Value {
        &self.entity
    }

    /// Property value, `None` when absent or `null`.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.entity.get(name).filter(|v| !v.is_null())
    }
}

impl Serialize for ResourceObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entity.serialize(serializer)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComposedLink {
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ComposedLink {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            name: None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Embedded {
    One(ComposedResource),
    List(Vec<ComposedResource>),
}

impl Embedded {
    pub fn as_one(&self) -> Option<&ComposedResource> {
        match self {
            Self::One(v) => Some(v),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ComposedResource]> {
        match self {
            Self::One(_) => None,
            Self::List(v) => Some(v),
        }
    }
}

/// Entity with its links and embedded resources.
///
/// Serializes as `{"_links": {..}, ..entity, "_embedded": {..}}`; the
/// `_embedded` object is omitted when nothing is embedded.
#[derive(Clone, Debug)]
pub struct ComposedResource {
    entity: Value,
    links: BTreeMap<String, ComposedLink>,
    embedded: BTreeMap<String, Embedded>,
}

impl ComposedResource {
    pub fn new(entity: Value) -> Self {
        Self {
            entity,
            links: BTreeMap::new(),
            embedded: BTreeMap::new(),
        }
    }

    pub fn entity(&self) -> &Value {
        &self.entity
    }

    pub fn add_link(&mut self, rel: impl Into<String>, link: ComposedLink) -> &mut Self {
        self.links.insert(rel.into(), link);
        self
    }

    pub fn add_self_link(&mut self, link: ComposedLink) -> &mut Self {
        self.add_link(SELF_RELATION, link)
    }

    pub fn link(&self, rel: &str) -> Option<&ComposedLink> {
        self.links.get(rel)
    }

    pub fn links(&self) -> &BTreeMap<String, ComposedLink> {
        &self.links
    }

    pub fn embed(&mut self, rel: impl Into<String>, resource: Embedded) -> &mut Self {
        self.embedded.insert(rel.into(), resource);
        self
    }

    pub fn embedded(&self, rel: &str) -> Option<&Embedded> {
        self.embedded.get(rel)
    }

    pub fn has_embedded(&self, rel: &str) -> bool {
        self.embedded.contains_key(rel)
    }

    pub fn embedded_rels(&self) -> impl Iterator<Item = &str> {
        self.embedded.keys().map(String::as_str)
    }
}

impl Serialize for ComposedResource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("_links", &self.links)?;
        if let Value::Object(entity) = &self.entity {
            for (key, value) in entity {
                map.serialize_entry(key, value)?;
            }
        }
        if !self.embedded.is_empty() {
            map.serialize_entry("_embedded", &self.embedded)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_composed_resource() {
        let mut parent = ComposedResource::new(json!({"id": 7}));
        parent.add_self_link(ComposedLink::new("/parents/7"));
        let mut item = ComposedResource::new(json!({"id": 42, "parentId": 7}));
        item.add_self_link(ComposedLink::new("/items/42"))
            .add_link("parent", ComposedLink::new("/parents/7"))
            .embed("parent", Embedded::One(parent));
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({
                "_links": {
                    "self": {"href": "/items/42"},
                    "parent": {"href": "/parents/7"},
                },
                "id": 42,
                "parentId": 7,
                "_embedded": {
                    "parent": {
                        "_links": {"self": {"href": "/parents/7"}},
                        "id": 7,
                    },
                },
            }),
        );
    }

    #[test]
    fn test_resource_object() {
        let resource = ResourceObject::from_value("Item", json!({"id": 1, "parentId": null}));
        assert_eq!(resource.property("id"), Some(&json!(1)));
        assert_eq!(resource.property("parentId"), None);
        assert_eq!(serde_json::to_value(&resource).unwrap(), json!({"id": 1, "parentId": null}));
    }
}
