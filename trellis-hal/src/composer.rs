use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Value, json};
use trellis::{
    Dependencies, INJECTOR, Injectable, InjectionToken, Injector, Resolved, StdError, SymbolToken,
};
use trellis_http::{
    HTTP_REQUEST, HttpMethod, HttpRequest, Route, RouteInitializer, RouteTable, fill_path,
    path_params,
};

use crate::{
    CompositionContext, ComposedLink, ComposedResource, Embedded, HalError, ITEMS_RELATION,
    Relation, ResourceAccessor, ResourceMetadata, ResourceObject, ResourceRegistry, SELF_RELATION,
};

pub static RESOURCE_COMPOSER: LazyLock<InjectionToken<Arc<dyn ResourceComposer>>> =
    LazyLock::new(|| SymbolToken::local("trellis-hal", "ResourceComposer"));

/// Builds HAL documents from resources.
#[async_trait]
pub trait ResourceComposer: Send + Sync {
    async fn compose(
        &self,
        resource: &ResourceObject,
        context: &CompositionContext,
    ) -> Result<ComposedResource, HalError>;

    /// Collection document with `count`, `total` and the composed items
    /// embedded as `_items`.
    async fn compose_list(
        &self,
        resources: &[ResourceObject],
        context: &CompositionContext,
    ) -> Result<ComposedResource, HalError> {
        let items = try_join_all(resources.iter().map(|v| self.compose(v, context))).await?;
        let mut result = ComposedResource::new(json!({
            "count": resources.len(),
            "total": resources.len(),
        }));
        result
            .embed(ITEMS_RELATION, Embedded::List(items))
            .add_self_link(ComposedLink::new(context.path()));
        Ok(result)
    }
}

/// Route and parameters answering a relation of one resource.
struct Target {
    route: Arc<Route>,
    params: BTreeMap<String, String>,
    href: String,
}

/// Links relations through the GET routes of their accessors and embeds
/// them by invoking those routes within the current request.
pub struct DefaultResourceComposer {
    injector: Injector,
    initializer: Arc<RouteInitializer>,
    routes: Arc<RouteTable>,
    registry: Arc<ResourceRegistry>,
    request: Arc<HttpRequest>,
}

impl Injectable for DefaultResourceComposer {
    type Handle = Arc<Self>;

    async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self {
            injector: deps.get(&INJECTOR)?,
            initializer: deps.get(&RouteInitializer::token())?,
            routes: deps.get(&RouteTable::token())?,
            registry: deps.get(&ResourceRegistry::token())?,
            request: deps.get(&HTTP_REQUEST)?,
        }))
    }

    fn dependencies() -> Dependencies {
        Dependencies::new()
            .token(&INJECTOR)
            .token(&RouteInitializer::token())
            .token(&RouteTable::token())
            .token(&ResourceRegistry::token())
            .token(&HTTP_REQUEST)
    }
}

#[async_trait]
impl ResourceComposer for DefaultResourceComposer {
    async fn compose(
        &self,
        resource: &ResourceObject,
        context: &CompositionContext,
    ) -> Result<ComposedResource, HalError> {
        let meta = self.registry.resolve(resource.resource_type())?;
        let mut result = ComposedResource::new(resource.entity().clone());
        let mut targets = BTreeMap::new();
        for (rel, relation) in meta.relations() {
            match self.target(rel, relation, &meta, resource)? {
                Some(target) => {
                    result.add_link(rel.as_str(), ComposedLink::new(target.href.clone()));
                    targets.insert(rel.as_str(), target);
                }
                None => tracing::debug!(
                    rel = %rel,
                    resource_type = resource.resource_type(),
                    "Relation identifier is not set"
                ),
            }
        }
        let mut embeds = Vec::new();
        for rel in context.embedded_roots() {
            if rel == SELF_RELATION {
                return Err(HalError::EmbedSelf);
            }
            if !meta.relations().contains_key(rel) {
                return Err(HalError::UnknownRelation {
                    rel: rel.to_string(),
                    resource: meta.resource_type().to_string(),
                });
            }
            if let Some(target) = targets.get(rel) {
                embeds.push((rel, target));
            }
        }
        let embedded = try_join_all(
            embeds
                .iter()
                .map(|(rel, target)| self.embed(rel, target, context)),
        )
        .await?;
        for ((rel, _), value) in embeds.iter().zip(embedded) {
            result.embed(*rel, value);
        }
        let href = match meta.accessor(false) {
            Some(_) => {
                let relation = match meta.get_id_property() {
                    Some(property) => Relation::one(meta.resource_type()).id_property(property),
                    None => Relation::one(meta.resource_type()),
                };
                self.target(SELF_RELATION, &relation, &meta, resource)?
                    .map(|v| v.href)
            }
            None => None,
        };
        result.add_self_link(ComposedLink::new(
            href.unwrap_or_else(|| context.path().to_string()),
        ));
        Ok(result)
    }
}

impl DefaultResourceComposer {
    /// Resolves the accessor route of `relation`; `None` when an identifier
    /// of `resource` needed by the route is not set.
    fn target(
        &self,
        rel: &str,
        relation: &Relation,
        meta: &ResourceMetadata,
        resource: &ResourceObject,
    ) -> Result<Option<Target>, HalError> {
        let target_meta = self.registry.resolve(relation.resource_type())?;
        let accessor = target_meta.accessor(relation.is_list()).ok_or_else(|| {
            HalError::MissingAccessor {
                rel: rel.to_string(),
                resource: relation.resource_type().to_string(),
                kind: if relation.is_list() { "list" } else { "resource" },
            }
        })?;
        let route = self
            .routes
            .find(accessor.controller(), accessor.method(), &HttpMethod::GET)
            .ok_or(HalError::MissingRoute {
                controller: accessor.controller_name(),
                method: accessor.method(),
            })?;
        let mut params = BTreeMap::new();
        for param in path_params(route.path()) {
            let Some(value) = param_value(param, relation, accessor, meta, resource)? else {
                return Ok(None);
            };
            params.insert(param.to_string(), value);
        }
        let href = fill_path::<_, HalError>(route.path(), |name| {
            Ok(params.get(name).cloned().unwrap_or_default())
        })?;
        Ok(Some(Target {
            route: route.clone(),
            params,
            href,
        }))
    }

    async fn embed(
        &self,
        rel: &str,
        target: &Target,
        context: &CompositionContext,
    ) -> Result<Embedded, HalError> {
        tracing::debug!(rel, href = %target.href, stack = ?context.rel_stack(), "Embedding relation");
        let mut request = HttpRequest::new(HttpMethod::GET, target.href.clone());
        request.params = target.params.clone();
        request.headers = self.request.headers.clone();
        let invocation = self
            .initializer
            .init_sub_invocation(target.route.clone(), request);
        let result = invocation
            .invoke(&self.injector)
            .await
            .map_err(|source| HalError::Embed {
                rel: rel.to_string(),
                source,
            })?;
        if let Some(err) = result.errors.first() {
            return Err(HalError::Embed {
                rel: rel.to_string(),
                source: Box::new(err.clone()),
            });
        }
        let context = context.child_for(rel, &target.href);
        if let Some(resource) = result.data_as::<ResourceObject>() {
            Ok(Embedded::One(self.compose(resource, &context).await?))
        } else if let Some(resources) = result.data_as::<Vec<ResourceObject>>() {
            let items = try_join_all(resources.iter().map(|v| self.compose(v, &context))).await?;
            Ok(Embedded::List(items))
        } else {
            Err(HalError::NotAResource {
                rel: rel.to_string(),
            })
        }
    }
}

/// Value of path parameter `param` of the accessor route of `relation`.
///
/// The parameter carries the identifier of the resource type the accessor
/// declares for it (the relation target by default). That identifier is
/// read from the relation's id property, the resource's own id property or
/// the id property of another relation to the same type, in this order.
fn param_value(
    param: &str,
    relation: &Relation,
    accessor: &ResourceAccessor,
    meta: &ResourceMetadata,
    resource: &ResourceObject,
) -> Result<Option<String>, HalError> {
    let owner = accessor
        .param_resource(param)
        .unwrap_or(relation.resource_type());
    let property = if owner == relation.resource_type() && relation.get_id_property().is_some() {
        relation.get_id_property()
    } else if owner == meta.resource_type() {
        meta.get_id_property()
    } else {
        meta.relations()
            .values()
            .filter(|v| !v.is_list() && v.resource_type() == owner)
            .find_map(Relation::get_id_property)
    };
    let property = property
        .or(meta.get_id_property())
        .ok_or_else(|| HalError::MissingIdentifier {
            resource: meta.resource_type().to_string(),
            param: param.to_string(),
        })?;
    Ok(resource.property(property).map(|v| match v {
        Value::String(v) => v.clone(),
        v => v.to_string(),
    }))
}
