use std::sync::Arc;

use serde_json::{Value, json};
use trellis::{Injectable, Injector, Provider, Registerable, Resolved, StdError};
use trellis_hal::{
    CompositionContext, ComposedResource, HalError, RESOURCE_COMPOSER, Relation, ResourceAccessor,
    ResourceComposer, ResourceMetadata, ResourceObject, hal_module,
};
use trellis_http::{
    Action, Controller, HTTP_REQUEST, HTTP_REQUEST_SCOPE, HttpError, HttpMethod,
    HttpPipelineResult, HttpRequest, HttpResponse, RequestParamExt as _, RouteExecutor,
    RouteMatch, RouteTable, SentResponse, SharedError, StatusCode, http_pipeline_module,
};

struct ItemController;

impl Injectable for ItemController {
    type Handle = Arc<Self>;

    async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

struct ParentController;

impl Injectable for ParentController {
    type Handle = Arc<Self>;

    async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

struct NodeController;

impl Injectable for NodeController {
    type Handle = Arc<Self>;

    async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

fn item(id: u64) -> ResourceObject {
    ResourceObject::from_value("Item", json!({"id": id, "parentId": 7}))
}

fn parent(id: u64) -> ResourceObject {
    ResourceObject::from_value("Parent", json!({"id": id, "name": format!("parent {id}")}))
}

/// Nodes 1 -> 2 -> 3; node 3 has no parent.
fn node(id: u64) -> ResourceObject {
    let parent_id = if id < 3 { json!(id + 1) } else { Value::Null };
    ResourceObject::from_value("Node", json!({"id": id, "parentId": parent_id}))
}

fn controllers() -> Vec<Registerable> {
    let get_item = Action::<ItemController>::new("get_item", |_, args| async move {
        let id: u64 = args.param("id")?;
        Ok(HttpPipelineResult::from_data(item(id)))
    })
    .path_param::<u64>("id");
    let get_parent = Action::<ParentController>::new("get_parent", |_, args| async move {
        let id: u64 = args.param("id")?;
        if id == 404 {
            return Err(HttpError::not_found("Parent not found").into());
        }
        if id == 410 {
            let err = HttpError::new(StatusCode::GONE, "GoneError", "Parent removed");
            return Ok(HttpPipelineResult {
                errors: vec![Arc::new(err) as SharedError],
                ..Default::default()
            });
        }
        Ok(HttpPipelineResult::from_data(parent(id)))
    })
    .path_param::<u64>("id");
    let list_items = Action::<ParentController>::new("list_items", |_, args| async move {
        let _: u64 = args.param("id")?;
        Ok(HttpPipelineResult::from_data(vec![item(42), item(43)]))
    })
    .path_param::<u64>("id");
    let get_node = Action::<NodeController>::new("get_node", |_, args| async move {
        let id: u64 = args.param("id")?;
        Ok(HttpPipelineResult::from_data(node(id)))
    })
    .path_param::<u64>("id");
    vec![
        Controller::<ItemController>::new("/items")
            .get(":id", get_item)
            .module()
            .into(),
        Controller::<ParentController>::new("/parents")
            .get(":id", get_parent)
            .get(":id/items", list_items)
            .module()
            .into(),
        Controller::<NodeController>::new("/nodes")
            .get(":id", get_node)
            .module()
            .into(),
    ]
}

fn resources() -> Vec<Registerable> {
    vec![
        ResourceMetadata::new("Item")
            .id_property("id")
            .get_accessor(ResourceAccessor::new::<ItemController>("get_item"))
            .list_accessor(ResourceAccessor::new::<ParentController>("list_items").param("id", "Parent"))
            .relation("parent", Relation::one("Parent").id_property("parentId"))
            .relation("siblings", Relation::list("Item"))
            .provider()
            .into(),
        ResourceMetadata::new("Parent")
            .id_property("id")
            .get_accessor(ResourceAccessor::new::<ParentController>("get_parent"))
            .relation("items", Relation::list("Item"))
            .provider()
            .into(),
        ResourceMetadata::new("Node")
            .id_property("id")
            .get_accessor(ResourceAccessor::new::<NodeController>("get_node"))
            .relation("parent", Relation::one("Node").id_property("parentId"))
            .provider()
            .into(),
        ResourceMetadata::new("Index").provider().into(),
        ResourceMetadata::new("Orphan")
            .id_property("id")
            .relation("parent", Relation::one("Index"))
            .provider()
            .into(),
    ]
}

fn setup() -> Injector {
    let injector = Injector::root();
    injector
        .register(vec![http_pipeline_module().into(), hal_module().into()])
        .unwrap();
    injector.register(controllers()).unwrap();
    injector.register(resources()).unwrap();
    injector
}

async fn composer(injector: &Injector, path: &str) -> (Injector, Arc<dyn ResourceComposer>) {
    let request = HttpRequest::new(HttpMethod::GET, path);
    let request_injector = injector
        .create_child(
            HTTP_REQUEST_SCOPE,
            vec![Provider::value(&HTTP_REQUEST, Arc::new(request)).into()],
        )
        .unwrap();
    let composer = request_injector.inject(&RESOURCE_COMPOSER).await.unwrap();
    (request_injector, composer)
}

fn context(path: &str, embedded: &[&str]) -> CompositionContext {
    CompositionContext::new("self", path, embedded.iter().map(|v| v.to_string()).collect())
}

fn href<'a>(resource: &'a ComposedResource, rel: &str) -> &'a str {
    &resource.link(rel).unwrap().href
}

#[tokio::test]
async fn test_links() {
    let injector = setup();
    let (_request, composer) = composer(&injector, "/items/42").await;
    let result = composer.compose(&item(42), &context("/items/42", &[])).await.unwrap();
    assert_eq!(result.links().len(), 3);
    assert_eq!(href(&result, "self"), "/items/42");
    assert_eq!(href(&result, "parent"), "/parents/7");
    assert_eq!(href(&result, "siblings"), "/parents/7/items");
    assert_eq!(result.embedded_rels().count(), 0);

    let result = composer.compose(&parent(7), &context("/parents/7", &[])).await.unwrap();
    assert_eq!(href(&result, "self"), "/parents/7");
    assert_eq!(href(&result, "items"), "/parents/7/items");
}

#[tokio::test]
async fn test_self_link_without_accessor() {
    let injector = setup();
    let (_request, composer) = composer(&injector, "/").await;
    let index = ResourceObject::from_value("Index", json!({"name": "index"}));
    let result = composer.compose(&index, &context("/", &[])).await.unwrap();
    assert_eq!(result.links().len(), 1);
    assert_eq!(href(&result, "self"), "/");

    let plain = ResourceObject::from_value("Unregistered", json!({"value": 1}));
    let result = composer.compose(&plain, &context("/", &[])).await.unwrap();
    assert_eq!(result.links().len(), 1);
    assert_eq!(href(&result, "self"), "/");
    assert_eq!(result.entity(), &json!({"value": 1}));
}

#[tokio::test]
async fn test_relation_without_accessor() {
    let injector = setup();
    let (_request, composer) = composer(&injector, "/orphans/1").await;
    let orphan = ResourceObject::from_value("Orphan", json!({"id": 1}));
    let err = composer
        .compose(&orphan, &context("/orphans/1", &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, HalError::MissingAccessor { ref rel, .. } if rel == "parent"));
}

#[tokio::test]
async fn test_embed_relation() {
    let injector = setup();
    let (_request, composer) = composer(&injector, "/items/42").await;
    let result = composer
        .compose(&item(42), &context("/items/42", &["parent", "parent"]))
        .await
        .unwrap();
    let embedded = result.embedded("parent").unwrap().as_one().unwrap();
    assert_eq!(embedded.entity(), &json!({"id": 7, "name": "parent 7"}));
    assert_eq!(href(embedded, "self"), "/parents/7");
    assert_eq!(href(embedded, "items"), "/parents/7/items");
    assert_eq!(embedded.embedded_rels().count(), 0);
}

#[tokio::test]
async fn test_embed_list_relation() {
    let injector = setup();
    let (_request, composer) = composer(&injector, "/parents/7").await;
    let result = composer
        .compose(&parent(7), &context("/parents/7", &["items"]))
        .await
        .unwrap();
    let items = result.embedded("items").unwrap().as_list().unwrap();
    let ids: Vec<_> = items.iter().map(|v| v.entity()["id"].clone()).collect();
    assert_eq!(ids, vec![json!(42), json!(43)]);
    assert_eq!(href(&items[1], "self"), "/items/43");
}

#[tokio::test]
async fn test_embed_nested_relation() {
    let injector = setup();
    let (_request, composer) = composer(&injector, "/nodes/1").await;
    let result = composer
        .compose(&node(1), &context("/nodes/1", &["parent.parent"]))
        .await
        .unwrap();
    let first = result.embedded("parent").unwrap().as_one().unwrap();
    assert_eq!(first.entity()["id"], json!(2));
    let second = first.embedded("parent").unwrap().as_one().unwrap();
    assert_eq!(second.entity()["id"], json!(3));
    assert_eq!(href(second, "self"), "/nodes/3");
    assert!(second.link("parent").is_none());
    assert_eq!(second.embedded_rels().count(), 0);
}

#[tokio::test]
async fn test_embed_errors() {
    let injector = setup();
    let (_request, composer) = composer(&injector, "/items/42").await;
    let err = composer
        .compose(&item(42), &context("/items/42", &["self"]))
        .await
        .unwrap_err();
    assert!(matches!(err, HalError::EmbedSelf));
    let err = composer
        .compose(&item(42), &context("/items/42", &["owner.parent"]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Relation 'owner' does not exist on resource Item");
    let missing = ResourceObject::from_value("Item", json!({"id": 1, "parentId": 404}));
    let err = composer
        .compose(&missing, &context("/items/1", &["parent"]))
        .await
        .unwrap_err();
    assert!(matches!(err, HalError::Embed { ref rel, .. } if rel == "parent"));
    assert_eq!(HttpError::status_of(&err), StatusCode::NOT_FOUND);
    let removed = ResourceObject::from_value("Item", json!({"id": 1, "parentId": 410}));
    let err = composer
        .compose(&removed, &context("/items/1", &["parent"]))
        .await
        .unwrap_err();
    assert!(matches!(err, HalError::Embed { ref rel, .. } if rel == "parent"));
    assert_eq!(HttpError::status_of(&err), StatusCode::GONE);
    assert_eq!(HttpError::message_of(&err), "Parent removed");
}

#[tokio::test]
async fn test_compose_list() {
    let injector = setup();
    let (_request, composer) = composer(&injector, "/parents/7/items").await;
    let result = composer
        .compose_list(&[item(42), item(43)], &context("/parents/7/items", &[]))
        .await
        .unwrap();
    assert_eq!(result.entity(), &json!({"count": 2, "total": 2}));
    assert_eq!(href(&result, "self"), "/parents/7/items");
    assert_eq!(result.embedded("_items").unwrap().as_list().unwrap().len(), 2);
}

async fn send(injector: &Injector, mut request: HttpRequest) -> SentResponse {
    let table = injector.inject(&RouteTable::token()).await.unwrap();
    let RouteMatch::Found { route, params } = table.match_request(&request.method, &request.path)
    else {
        panic!("no route for {} {}", request.method, request.path);
    };
    request.params = params;
    let executor = injector.inject(&RouteExecutor::token()).await.unwrap();
    let response = HttpResponse::new();
    executor.exec_route(&route, request, &response).await;
    response.sent().unwrap()
}

#[tokio::test]
async fn test_result_transformer() {
    let injector = setup();
    let request = HttpRequest::new(HttpMethod::GET, "/items/42").with_query("_embedded", "parent");
    let response = send(&injector, request).await;
    assert_eq!(response.status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(
        body,
        json!({
            "_links": {
                "self": {"href": "/items/42"},
                "parent": {"href": "/parents/7"},
                "siblings": {"href": "/parents/7/items"},
            },
            "id": 42,
            "parentId": 7,
            "_embedded": {
                "parent": {
                    "_links": {
                        "self": {"href": "/parents/7"},
                        "items": {"href": "/parents/7/items"},
                    },
                    "id": 7,
                    "name": "parent 7",
                },
            },
        }),
    );

    let request = HttpRequest::new(HttpMethod::GET, "/parents/7/items");
    let response = send(&injector, request).await;
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["count"], json!(2));
    assert_eq!(body["_links"]["self"]["href"], json!("/parents/7/items"));
    assert_eq!(body["_embedded"]["_items"][0]["id"], json!(42));

    let request = HttpRequest::new(HttpMethod::GET, "/items/42").with_query("_embedded", "self");
    let response = send(&injector, request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"]["message"], json!("Cannot embed 'self' relation"));
}
