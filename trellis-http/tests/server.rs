use std::sync::Arc;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use trellis::{Container, Injectable, Injector, Provider, Resolved, StdError};
use trellis_base::{CancellationToken, Config, config_provider, config_value_provider};
use trellis_http::{
    Action, Controller, HttpPipelineResult, HttpServer, HttpServerConfig, RequestParamExt as _,
    SHUTDOWN, http_pipeline_module, http_server_module,
};

struct EchoController;

impl Injectable for EchoController {
    type Handle = Arc<Self>;

    async fn build(_: Resolved) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

fn echo_module() -> Controller<EchoController> {
    let echo = Action::<EchoController>::new("echo", |_, args| async move {
        let name: String = args.param("name")?;
        let suffix: Option<String> = args.param("suffix")?;
        Ok(HttpPipelineResult::from_data(json!({
            "echo": format!("{name}{}", suffix.unwrap_or_default()),
        })))
    })
    .path_param::<String>("name")
    .optional_query_param::<String>("suffix");
    let create = Action::<EchoController>::new("create", |_, args| async move {
        let body: Value = args.param("body")?;
        Ok(HttpPipelineResult::from_data(body))
    })
    .body_param::<Value>("body");
    Controller::<EchoController>::new("/echo")
        .get(":name", echo)
        .post("", create)
}

#[tokio::test]
async fn test_server() {
    let injector = Injector::root();
    injector
        .register(vec![
            http_pipeline_module().into(),
            HttpServer::provider().into(),
            echo_module().module().into(),
        ])
        .unwrap();
    let server = injector.inject(&HttpServer::token()).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { server.serve_listener(listener, shutdown).await }
    });
    let client = reqwest::Client::new();

    let request_id = "6f1c2c1e-4a51-4a8e-9d2c-0b7e5d2f8a11";
    let response = client
        .get(format!("http://{addr}/echo/hello%20world?suffix=!"))
        .header("x-request-id", request_id)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], request_id);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"echo": "hello world!"}));

    let response = client
        .post(format!("http://{addr}/echo"))
        .json(&json!({"a": [1, 2]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"a": [1, 2]}));

    let response = client
        .delete(format!("http://{addr}/echo/hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["allow"], "GET");

    let response = client
        .get(format!("http://{addr}/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "NotFoundError");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_body_size_limit() {
    let config = r#"{"http_server": {"addr": "127.0.0.1:0", "max_body_size": 16}}"#;
    let injector = Injector::root();
    injector
        .register(vec![
            config_value_provider(Config::parse(config).unwrap()).into(),
            config_provider::<HttpServerConfig>().into(),
            http_pipeline_module().into(),
            HttpServer::provider().into(),
            echo_module().module().into(),
        ])
        .unwrap();
    let server = injector.inject(&HttpServer::token()).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { server.serve_listener(listener, shutdown).await }
    });
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/echo"))
        .json(&json!({"a": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let response = client
        .post(format!("http://{addr}/echo"))
        .json(&json!({"text": "x".repeat(64)}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "PayloadTooLargeError");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_entry_point_stops_on_shutdown() {
    let config = Config::parse(r#"{"http_server": {"addr": "127.0.0.1:0"}}"#).unwrap();
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let container = Container::builder()
        .add(config_value_provider(config))
        .add(Provider::value(&SHUTDOWN, shutdown))
        .add_module(http_server_module())
        .add_module(echo_module().module())
        .start()
        .await
        .unwrap();
    container.run().await.unwrap();
    container.dispose("test complete").await.unwrap();
}
