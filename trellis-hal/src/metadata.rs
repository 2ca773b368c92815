use std::any::{TypeId, type_name};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use trellis::{
    Dependencies, Injectable, InjectionToken, Provider, Resolved, StdError, SymbolToken,
    TokenOptions,
};

use crate::HalError;

/// Metadata of every resource type known to the composer.
pub static RESOURCES: LazyLock<InjectionToken<Arc<ResourceMetadata>>> =
    LazyLock::new(|| SymbolToken::opinionated("trellis-hal", "ResourceMetadata", TokenOptions::multi()));

/// Controller method returning a resource or a list of resources.
#[derive(Clone, Debug)]
pub struct ResourceAccessor {
    controller: TypeId,
    controller_name: &'static str,
    method: &'static str,
    params: BTreeMap<String, String>,
}

impl ResourceAccessor {
    /// Accessor for action `method` of controller `C`.
    pub fn new<C: 'static>(method: &'static str) -> Self {
        Self {
            controller: TypeId::of::<C>(),
            controller_name: type_name::<C>(),
            method,
            params: BTreeMap::new(),
        }
    }

    /// Declares that path parameter `param` carries the identifier of
    /// `resource_type`.
    ///
    /// Undeclared parameters carry the identifier of the resource the
    /// accessor returns.
    pub fn param(mut self, param: impl Into<String>, resource_type: impl Into<String>) -> Self {
        self.params.insert(param.into(), resource_type.into());
        self
    }

    pub fn controller(&self) -> TypeId {
        self.controller
    }

    pub fn controller_name(&self) -> &'static str {
        self.controller_name
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn param_resource(&self, param: &str) -> Option<&str> {
        self.params.get(param).map(String::as_str)
    }
}

/// Link from one resource type to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    resource_type: String,
    list: bool,
    id_property: Option<String>,
}

impl Relation {
    /// Relation to a single resource.
    pub fn one(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            list: false,
            id_property: None,
        }
    }

    /// Relation to a list of resources.
    pub fn list(resource_type: impl Into<String>) -> Self {
        Self {
            list: true,
            ..Self::one(resource_type)
        }
    }

    /// Property of the owning resource holding the related identifier.
    pub fn id_property(mut self, property: impl Into<String>) -> Self {
        self.id_property = Some(property.into());
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn get_id_property(&self) -> Option<&str> {
        self.id_property.as_deref()
    }
}

/// Description of a resource type.
///
/// ```rust
/// use trellis_hal::{Relation, ResourceMetadata};
///
/// let meta = ResourceMetadata::new("Item")
///     .id_property("id")
///     .relation("parent", Relation::one("Parent").id_property("parentId"));
/// assert_eq!(meta.get_id_property(), Some("id"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ResourceMetadata {
    resource_type: String,
    id_property: Option<String>,
    get_accessor: Option<ResourceAccessor>,
    list_accessor: Option<ResourceAccessor>,
    relations: BTreeMap<String, Relation>,
    parent: Option<String>,
}

impl ResourceMetadata {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    pub fn id_property(mut self, property: impl Into<String>) -> Self {
        self.id_property = Some(property.into());
        self
    }

    pub fn get_accessor(mut self, accessor: ResourceAccessor) -> Self {
        self.get_accessor = Some(accessor);
        self
    }

    pub fn list_accessor(mut self, accessor: ResourceAccessor) -> Self {
        self.list_accessor = Some(accessor);
        self
    }

    pub fn relation(mut self, rel: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(rel.into(), relation);
        self
    }

    /// Inherits unset fields and relations from `resource_type`.
    pub fn parent(mut self, resource_type: impl Into<String>) -> Self {
        self.parent = Some(resource_type.into());
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn get_id_property(&self) -> Option<&str> {
        self.id_property.as_deref()
    }

    pub fn accessor(&self, list: bool) -> Option<&ResourceAccessor> {
        if list {
            self.list_accessor.as_ref()
        } else {
            self.get_accessor.as_ref()
        }
    }

    pub fn relations(&self) -> &BTreeMap<String, Relation> {
        &self.relations
    }

    pub fn get_parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Value provider registering the metadata in [`RESOURCES`].
    pub fn provider(self) -> Provider<Arc<ResourceMetadata>> {
        Provider::value(&RESOURCES, Arc::new(self))
    }
}

/// Lookup of [`ResourceMetadata`] by resource type.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, Arc<ResourceMetadata>>,
}

impl ResourceRegistry {
    /// Later metadata of the same type replaces earlier one.
    pub fn new(resources: Vec<Arc<ResourceMetadata>>) -> Self {
        Self {
            resources: resources
                .into_iter()
                .map(|v| (v.resource_type.clone(), v))
                .collect(),
        }
    }

    pub fn get(&self, resource_type: &str) -> Option<&Arc<ResourceMetadata>> {
        self.resources.get(resource_type)
    }

    /// Metadata of `resource_type` merged with its ancestors.
    ///
    /// Fields unset on a type are taken from the nearest ancestor setting
    /// them; relations of all ancestors are merged, nearer types overriding.
    /// A type that was never registered has empty metadata, while an
    /// unregistered parent is an error.
    pub fn resolve(&self, resource_type: &str) -> Result<ResourceMetadata, HalError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(resource_type);
        while let Some(name) = current {
            if !visited.insert(name) {
                return Err(HalError::InheritanceCycle {
                    resource: resource_type.to_string(),
                });
            }
            let Some(meta) = self.get(name) else {
                if chain.is_empty() {
                    return Ok(ResourceMetadata::new(resource_type));
                }
                return Err(HalError::UnknownResource(name.to_string()));
            };
            chain.push(meta);
            current = meta.get_parent();
        }
        let mut result = ResourceMetadata::new(resource_type);
        result.parent = chain.get(1).map(|v| v.resource_type.clone());
        for meta in chain.iter().rev() {
            if meta.id_property.is_some() {
                result.id_property.clone_from(&meta.id_property);
            }
            if meta.get_accessor.is_some() {
                result.get_accessor.clone_from(&meta.get_accessor);
            }
            if meta.list_accessor.is_some() {
                result.list_accessor.clone_from(&meta.list_accessor);
            }
            result
                .relations
                .extend(meta.relations.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(result)
    }
}

impl Injectable for ResourceRegistry {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self::new(deps.get_all(&RESOURCES)?)))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new().optional(&RESOURCES)
    }

    fn provider() -> Provider<Self::Handle> {
        Provider::class::<Self>().singleton()
    }
}
