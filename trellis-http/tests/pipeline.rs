use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use trellis::{
    Dependencies, Injectable, InjectionToken, Injector, Provider, Registerable, Resolved, StdError,
    async_trait,
};
use trellis_http::{
    Action, AuthorizationCondition, AuthorizationService, AuthorizedUser, Controller, CorsConfig,
    ERROR_HANDLER, HttpError, HttpMethod, HttpPipelineErrorResultHandler, HttpPipelinePreparer,
    HttpPipelineRenderer, HttpPipelineRendererResult, HttpPipelineResult,
    HttpPipelineResultTransformer, HttpRequest, HttpRequestInfo, HttpResponse, HeaderValue,
    MimeType, PREPARERS, RENDERERS, RequestParamExt as _, RouteExecutor, RouteInitializer,
    RouteMatch, RouteTable, SentResponse, StatusCode, TRANSFORMERS, authorization_condition,
    authorization_service, header, http_pipeline_module,
};

struct ItemController;

impl Injectable for ItemController {
    type Handle = Arc<Self>;

    async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct NewItem {
    name: String,
}

fn get_item(calls: Arc<AtomicUsize>) -> Action<ItemController> {
    Action::<ItemController>::new("get_item", move |_, args| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let id: u64 = args.param("id")?;
            if id == 404 {
                return Err(HttpError::not_found(format!("Item {id} not found")).into());
            }
            Ok(HttpPipelineResult::from_data(json!({"id": id})))
        }
    })
    .path_param::<u64>("id")
}

fn create_item() -> Action<ItemController> {
    Action::<ItemController>::new("create_item", |_, args| async move {
        let item: NewItem = args.param("item")?;
        let verbose: Option<bool> = args.param("verbose")?;
        Ok(HttpPipelineResult::from_data(json!({
            "name": item.name,
            "verbose": verbose.unwrap_or(false),
        }))
        .with_status(StatusCode::CREATED))
    })
    .body_param::<NewItem>("item")
    .optional_query_param::<bool>("verbose")
}

fn yeah() -> Action<ItemController> {
    Action::<ItemController>::new("yeah", |_, _| async move {
        Ok(HttpPipelineResult::from_data(json!({"foo": "yeah!"})))
    })
}

fn item_module(calls: Arc<AtomicUsize>) -> Registerable {
    Controller::<ItemController>::new("/items")
        .get("yeah", yeah())
        .get(":id", get_item(calls))
        .post("", create_item())
        .module()
        .into()
}

fn setup(before: Vec<Registerable>, after: Vec<Registerable>) -> Injector {
    let injector = Injector::root();
    injector.register(before).unwrap();
    injector.register(vec![http_pipeline_module().into()]).unwrap();
    injector.register(after).unwrap();
    injector
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

fn json_body(response: &SentResponse) -> Value {
    serde_json::from_slice(&response.body).unwrap()
}

#[derive(Default)]
struct RecordingRenderer {
    types: Vec<MimeType>,
    rendered: Mutex<Vec<Value>>,
}

#[async_trait]
impl HttpPipelineRenderer for RecordingRenderer {
    fn default_content_type(&self) -> &MimeType {
        &self.types[0]
    }

    fn renderable_types(&self) -> &[MimeType] {
        &self.types
    }

    async fn render(
        &self,
        _: &[MimeType],
        result: &HttpPipelineResult,
    ) -> Result<HttpPipelineRendererResult, StdError> {
        let data = result.data_json()?;
        self.rendered.lock().unwrap().push(data.clone());
        Ok(HttpPipelineRendererResult {
            content_type: MimeType::application_json(),
            body: serde_json::to_vec(&data)?.into(),
            status_code: result.status_code,
            headers: result.headers.clone(),
        })
    }
}

#[tokio::test]
async fn test_json_renderer_receives_handler_data() {
    let renderer = Arc::new(RecordingRenderer {
        types: vec![MimeType::application_json()],
        ..Default::default()
    });
    let injector = setup(
        vec![Provider::value(&RENDERERS, renderer.clone() as Arc<dyn HttpPipelineRenderer>).into()],
        vec![item_module(Default::default())],
    );
    let request = HttpRequest::new(HttpMethod::GET, "/items/yeah")
        .with_header(header::ACCEPT, HeaderValue::from_static("application/json"));
    let response = send(&injector, request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(*renderer.rendered.lock().unwrap(), vec![json!({"foo": "yeah!"})]);
    assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
}

#[tokio::test]
async fn test_plain_text_is_negotiated() {
    let injector = setup(Vec::new(), vec![item_module(Default::default())]);
    let request = HttpRequest::new(HttpMethod::GET, "/items/7")
        .with_header(header::ACCEPT, HeaderValue::from_static("text/plain, application/json;q=0.5"));
    let response = send(&injector, request).await;
    assert_eq!(response.headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(response.body, r#"{"id":7}"#);
}

#[derive(Default)]
struct RecordingTransformer {
    errors: Mutex<Vec<String>>,
}

#[async_trait]
impl HttpPipelineResultTransformer for RecordingTransformer {
    async fn transform(&self, result: HttpPipelineResult) -> Result<HttpPipelineResult, StdError> {
        let mut errors = self.errors.lock().unwrap();
        errors.extend(result.errors.iter().map(|v| HttpError::type_of(&**v).to_string()));
        Ok(result)
    }
}

#[tokio::test]
async fn test_missing_path_param() {
    let calls = Arc::new(AtomicUsize::new(0));
    let recorder = Arc::new(RecordingTransformer::default());
    let injector = setup(
        Vec::new(),
        vec![
            item_module(calls.clone()),
            Provider::value(&TRANSFORMERS, recorder.clone() as Arc<dyn HttpPipelineResultTransformer>)
                .into(),
        ],
    );
    let table = injector.inject(&RouteTable::token()).await.unwrap();
    let route = table
        .find(TypeId::of::<ItemController>(), "get_item", &HttpMethod::GET)
        .unwrap()
        .clone();
    let executor = injector.inject(&RouteExecutor::token()).await.unwrap();
    let response = HttpResponse::new();
    executor
        .exec_route(&route, HttpRequest::new(HttpMethod::GET, "/items/1"), &response)
        .await;
    let response = response.sent().unwrap();
    assert_eq!(*recorder.errors.lock().unwrap(), vec!["MissingParamError"]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(&response),
        json!({"error": {"type": "MissingParamError", "message": "Missing required parameter 'id'"}})
    );
}

#[tokio::test]
async fn test_invalid_path_param() {
    let calls = Arc::new(AtomicUsize::new(0));
    let injector = setup(Vec::new(), vec![item_module(calls.clone())]);
    let response = send(&injector, HttpRequest::new(HttpMethod::GET, "/items/abc")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&response)["error"]["type"], "InvalidParamError");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_handler_error_status() {
    let injector = setup(Vec::new(), vec![item_module(Default::default())]);
    let response = send(&injector, HttpRequest::new(HttpMethod::GET, "/items/404")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(&response),
        json!({"error": {"type": "NotFoundError", "message": "Item 404 not found"}})
    );
}

#[tokio::test]
async fn test_body_and_query_params() {
    let injector = setup(Vec::new(), vec![item_module(Default::default())]);
    let request = HttpRequest::new(HttpMethod::POST, "/items")
        .with_query("verbose", "true")
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_body(r#"{"name": "milk"}"#);
    let response = send(&injector, request).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(json_body(&response), json!({"name": "milk", "verbose": true}));

    let request = HttpRequest::new(HttpMethod::POST, "/items")
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_body(r#"{"name": "eggs"}"#);
    let response = send(&injector, request).await;
    assert_eq!(json_body(&response), json!({"name": "eggs", "verbose": false}));

    let response = send(&injector, HttpRequest::new(HttpMethod::POST, "/items")).await;
    assert_eq!(json_body(&response)["error"]["type"], "MissingParamError");

    let request = HttpRequest::new(HttpMethod::POST, "/items")
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"))
        .with_body("<item/>");
    let response = send(&injector, request).await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

struct PassThrough;

#[async_trait]
impl HttpPipelineResultTransformer for PassThrough {
    async fn transform(&self, result: HttpPipelineResult) -> Result<HttpPipelineResult, StdError> {
        Ok(result.with_header(header::HeaderName::from_static("x-pass-through"), HeaderValue::from_static("1")))
    }
}

struct Throwing(&'static str);

#[async_trait]
impl HttpPipelineResultTransformer for Throwing {
    async fn transform(&self, _: HttpPipelineResult) -> Result<HttpPipelineResult, StdError> {
        Err(self.0.into())
    }
}

#[derive(Default)]
struct Identifying {
    seen: Mutex<Vec<bool>>,
}

#[async_trait]
impl HttpPipelineResultTransformer for Identifying {
    async fn transform(&self, result: HttpPipelineResult) -> Result<HttpPipelineResult, StdError> {
        self.seen
            .lock()
            .unwrap()
            .push(result.headers.contains_key("x-pass-through"));
        Ok(result)
    }
}

#[derive(Default)]
struct RecordingErrorHandler {
    errors: Mutex<Vec<String>>,
}

#[async_trait]
impl HttpPipelineErrorResultHandler for RecordingErrorHandler {
    async fn handle_error(&self, result: HttpPipelineResult) -> Result<HttpPipelineResult, StdError> {
        let mut errors = self.errors.lock().unwrap();
        errors.extend(result.errors.iter().map(|v| v.to_string()));
        let mut handled = HttpPipelineResult::from_data(json!({"errors": errors.len()}))
            .with_status(StatusCode::INTERNAL_SERVER_ERROR);
        handled.headers = result.headers;
        Ok(handled)
    }
}

#[tokio::test]
async fn test_transformers_accumulate_errors() {
    let identifying = Arc::new(Identifying::default());
    let handler = Arc::new(RecordingErrorHandler::default());
    let transformers: Vec<Arc<dyn HttpPipelineResultTransformer>> = vec![
        Arc::new(PassThrough),
        Arc::new(Throwing("first")),
        identifying.clone(),
        Arc::new(Throwing("second")),
    ];
    let mut after: Vec<Registerable> = transformers
        .into_iter()
        .map(|v| Provider::value(&TRANSFORMERS, v).into())
        .collect();
    after.push(item_module(Default::default()));
    after.push(
        Provider::value(&ERROR_HANDLER, handler.clone() as Arc<dyn HttpPipelineErrorResultHandler>)
            .into(),
    );
    let injector = setup(Vec::new(), after);
    let response = send(&injector, HttpRequest::new(HttpMethod::GET, "/items/yeah")).await;
    assert_eq!(*handler.errors.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(*identifying.seen.lock().unwrap(), vec![true]);
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers["x-pass-through"], "1");
    assert_eq!(json_body(&response), json!({"errors": 2}));
}

struct FailingRenderer {
    types: Vec<MimeType>,
}

#[async_trait]
impl HttpPipelineRenderer for FailingRenderer {
    fn default_content_type(&self) -> &MimeType {
        &self.types[0]
    }

    fn renderable_types(&self) -> &[MimeType] {
        &self.types
    }

    async fn render(
        &self,
        _: &[MimeType],
        _: &HttpPipelineResult,
    ) -> Result<HttpPipelineRendererResult, StdError> {
        Err("renderer exploded".into())
    }
}

#[tokio::test]
async fn test_render_failure_falls_back_to_text() {
    let renderer: Arc<dyn HttpPipelineRenderer> = Arc::new(FailingRenderer {
        types: vec![MimeType::application_json()],
    });
    let injector = setup(
        vec![Provider::value(&RENDERERS, renderer).into()],
        vec![item_module(Default::default())],
    );
    let response = send(&injector, HttpRequest::new(HttpMethod::GET, "/items/yeah")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(response.body, "renderer exploded");
}

static GREETING: LazyLock<InjectionToken<String>> = LazyLock::new(|| InjectionToken::new("Greeting"));

struct GreetingPreparer;

#[async_trait]
impl HttpPipelinePreparer for GreetingPreparer {
    fn name(&self) -> &'static str {
        "GreetingPreparer"
    }

    async fn prepare(&self, _: &Injector) -> Result<Vec<Registerable>, StdError> {
        Ok(vec![Provider::value(&GREETING, "hello".to_string()).into()])
    }
}

struct ShoutPreparer;

#[async_trait]
impl HttpPipelinePreparer for ShoutPreparer {
    fn name(&self) -> &'static str {
        "ShoutPreparer"
    }

    fn depends_on(&self) -> Vec<&'static str> {
        vec!["GreetingPreparer"]
    }

    async fn prepare(&self, injector: &Injector) -> Result<Vec<Registerable>, StdError> {
        let greeting = injector.inject(&GREETING).await?;
        Ok(vec![Provider::value(&GREETING, greeting.to_uppercase()).into()])
    }
}

struct GreetingController;

impl Injectable for GreetingController {
    type Handle = Arc<Self>;

    async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

#[tokio::test]
async fn test_preparers_contribute_providers() {
    let greet = Action::<GreetingController>::new("greet", |_, args| async move {
        let greeting: String = args.param("greeting")?;
        Ok(HttpPipelineResult::from_data(greeting))
    })
    .param("greeting", &GREETING);
    let preparers: Vec<Arc<dyn HttpPipelinePreparer>> =
        vec![Arc::new(ShoutPreparer), Arc::new(GreetingPreparer)];
    let mut after: Vec<Registerable> = preparers
        .into_iter()
        .map(|v| Provider::value(&PREPARERS, v).into())
        .collect();
    after.push(Controller::<GreetingController>::new("/greet").get("", greet).module().into());
    let injector = setup(Vec::new(), after);
    let response = send(&injector, HttpRequest::new(HttpMethod::GET, "/greet")).await;
    assert_eq!(json_body(&response), json!("HELLO"));
}

struct AdminController;

impl Injectable for AdminController {
    type Handle = Arc<Self>;

    async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

struct TokenService;

#[async_trait]
impl AuthorizationService for TokenService {
    async fn get_authorized_user(&self, authorization: &str) -> Result<Option<AuthorizedUser>, StdError> {
        Ok(match authorization {
            "Bearer admin-token" => Some(AuthorizedUser::new("admin")),
            "Bearer user-token" => Some(AuthorizedUser::new("user")),
            _ => None,
        })
    }
}

fn admin_module() -> Registerable {
    let whoami = Action::<AdminController>::new("whoami", |_, args| async move {
        let user: Option<AuthorizedUser> = args.param("user")?;
        Ok(HttpPipelineResult::from_data(user.map(|v| v.uid)))
    })
    .param("user", &trellis_http::AUTHORIZED_USER);
    Controller::<AdminController>::new("/admin")
        .authorize(vec![authorization_condition(|user| {
            if user.uid == "admin" {
                AuthorizationCondition::Allowed
            } else {
                AuthorizationCondition::denied("Admin only")
            }
        })])
        .get("whoami", whoami)
        .module()
        .into()
}

fn with_authorization(value: &'static str) -> HttpRequest {
    HttpRequest::new(HttpMethod::GET, "/admin/whoami")
        .with_header(header::AUTHORIZATION, HeaderValue::from_static(value))
}

#[tokio::test]
async fn test_authorization() {
    let service: Arc<dyn AuthorizationService> = Arc::new(TokenService);
    let injector = setup(
        Vec::new(),
        vec![
            Provider::value(&authorization_service("Bearer"), service).into(),
            admin_module(),
        ],
    );
    let response = send(&injector, HttpRequest::new(HttpMethod::GET, "/admin/whoami")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&response)["error"]["type"], "UnauthorizedError");

    let response = send(&injector, with_authorization("Bearer unknown")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = send(&injector, with_authorization("Bearer user-token")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(json_body(&response)["error"]["message"], "Admin only");

    let response = send(&injector, with_authorization("Bearer admin-token")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(json_body(&response), json!("admin"));

    let response = send(&injector, with_authorization("Basic YWRtaW4=")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(&response)["error"]["message"],
        "Unsupported authorization scheme 'Basic'"
    );
}

struct CorsController;

impl Injectable for CorsController {
    type Handle = Arc<Self>;

    async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

#[tokio::test]
async fn test_cors_headers_and_preflight() {
    let ping = Action::<CorsController>::new("ping", |_, _| async move {
        Ok(HttpPipelineResult::from_data("pong"))
    });
    let cors = CorsConfig {
        allow_origin: vec!["https://example.com".to_string()],
        ..Default::default()
    };
    let injector = setup(
        Vec::new(),
        vec![Controller::<CorsController>::new("/ping").cors(cors).get("", ping).module().into()],
    );
    let request = HttpRequest::new(HttpMethod::GET, "/ping")
        .with_header(header::ORIGIN, HeaderValue::from_static("https://example.com"));
    let response = send(&injector, request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.com");

    let request = HttpRequest::new(HttpMethod::OPTIONS, "/ping")
        .with_header(header::ORIGIN, HeaderValue::from_static("https://example.com"));
    let response = send(&injector, request).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");

    let request = HttpRequest::new(HttpMethod::GET, "/ping")
        .with_header(header::ORIGIN, HeaderValue::from_static("https://other.com"));
    let response = send(&injector, request).await;
    assert!(!response.headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_sub_invocation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let injector = setup(Vec::new(), vec![item_module(calls.clone())]);
    let table = injector.inject(&RouteTable::token()).await.unwrap();
    let initializer = injector.inject(&RouteInitializer::token()).await.unwrap();
    let outer = table
        .find(TypeId::of::<ItemController>(), "yeah", &HttpMethod::GET)
        .unwrap()
        .clone();
    let request = Arc::new(HttpRequest::new(HttpMethod::GET, "/items/yeah"));
    let scope = initializer
        .init_route_request(&injector, &outer, request, HttpRequestInfo::new())
        .await
        .unwrap();
    let inner = table
        .find(TypeId::of::<ItemController>(), "get_item", &HttpMethod::GET)
        .unwrap()
        .clone();
    let sub = initializer
        .init_sub_invocation(inner, HttpRequest::new(HttpMethod::GET, "/items/5").with_param("id", "5"));
    let result = sub.invoke(&scope).await.unwrap();
    assert_eq!(result.data_json().unwrap(), json!({"id": 5}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    scope.dispose("done").await.unwrap();
}

#[tokio::test]
async fn test_request_injector_is_disposed() {
    static DISPOSED: AtomicUsize = AtomicUsize::new(0);

    struct Tracked;

    #[async_trait]
    impl trellis::Disposable for Tracked {
        async fn dispose(&self, _: &str) -> Result<(), StdError> {
            DISPOSED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    static TRACKED: LazyLock<InjectionToken<Arc<Tracked>>> =
        LazyLock::new(|| InjectionToken::new("Tracked"));

    struct TrackedController;

    impl Injectable for TrackedController {
        type Handle = Arc<Self>;

        async fn build(deps: Resolved) -> Result<Self::Handle, StdError> {
            deps.get(&TRACKED)?;
            Ok(Arc::new(Self))
        }

        fn dependencies() -> Dependencies {
            Dependencies::new().token(&TRACKED)
        }
    }

    let noop = Action::<TrackedController>::new("noop", |_, _| async move {
        Ok(HttpPipelineResult::new())
    });
    let injector = setup(
        Vec::new(),
        vec![
            Provider::factory(&TRACKED, |_| Ok(Arc::new(Tracked)))
                .disposable()
                .into(),
            Controller::<TrackedController>::new("/tracked").get("", noop).module().into(),
        ],
    );
    send(&injector, HttpRequest::new(HttpMethod::GET, "/tracked")).await;
    assert_eq!(DISPOSED.load(Ordering::SeqCst), 1);
}
