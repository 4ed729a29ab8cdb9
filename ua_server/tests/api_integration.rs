
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use test_utils::ServerFixture;
use tower::ServiceExt;
use ua_server::address_space::{AttributeId, NodeId, Variant};
use ua_server::api::rest::{create_api_routes, CallRequest, SharedAppState, WriteRequest};

fn create_test_app(fx: &ServerFixture) -> Router {
    create_api_routes().with_state(SharedAppState::new(fx.server.clone()))
}

/// Percent-encodes the characters of a NodeId that clash with query syntax.
fn query_id(node_id: &NodeId) -> String {
    node_id.to_string().replace('=', "%3D").replace(';', "%3B")
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_endpoint() {
    let fx = ServerFixture::new();
    let app = create_test_app(&fx);

    let request = Request::builder()
        .uri("/api/health")
        .method(Method::GET)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"UA Server Running");
}

#[tokio::test]
async fn test_stats_endpoint() {
    let fx = ServerFixture::new();
    let (status, body) = send(create_test_app(&fx), Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node_count"], json!(fx.server.store.node_count()));
    assert_eq!(body["subscription_count"], json!(0));
    // The fixture's session plus the one the API opens.
    assert_eq!(body["session_count"], json!(2));
    assert_eq!(
        body["namespaces"],
        json!(["http://opcfoundation.org/UA/", "http://examples.freeopcua.github.io"])
    );
}

#[tokio::test]
async fn test_browse_objects_folder() {
    let fx = ServerFixture::new();
    let (status, body) = send(create_test_app(&fx), Method::GET, "/api/browse", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node_id"], json!("i=85"));
    let names: Vec<&str> = body["references"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["browse_name"]["name"].as_str())
        .collect();
    assert!(names.contains(&"Server"));
    assert!(names.contains(&"MachineOne"));
    assert!(names.contains(&"Compressor"));
    assert!(names.contains(&"myEmptyFolder"));
}

#[tokio::test]
async fn test_browse_inverse_and_errors() {
    let fx = ServerFixture::new();
    let uri = format!("/api/browse?node_id={}&direction=inverse", query_id(&fx.demo.temperature));
    let (status, body) = send(create_test_app(&fx), Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let parents: Vec<&str> = body["references"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["node_id"].as_str())
        .collect();
    assert_eq!(parents, vec![fx.demo.machine.to_string().as_str()]);

    let (status, body) = send(create_test_app(&fx), Method::GET, "/api/browse?node_id=x%3Dy", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!("BadNodeIdInvalid"));

    let (status, body) = send(
        create_test_app(&fx),
        Method::GET,
        "/api/browse?node_id=ns%3D7%3Bs%3DMissing",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], json!("BadNodeIdUnknown"));
}

#[tokio::test]
async fn test_read_value_and_attributes() {
    let fx = ServerFixture::new();
    let uri = format!("/api/read?node_id={}", query_id(&fx.demo.temperature));
    let (status, body) = send(create_test_app(&fx), Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], serde_json::to_value(Variant::Double(6.7)).unwrap());
    assert!(body["server_timestamp"].is_string());

    let uri = format!(
        "/api/read?node_id={}&attribute=DisplayName",
        query_id(&fx.demo.machine)
    );
    let (status, body) = send(create_test_app(&fx), Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], serde_json::to_value(Variant::from("MachineOne")).unwrap());

    let uri = format!("/api/read?node_id={}", query_id(&fx.demo.machine));
    let (status, body) = send(create_test_app(&fx), Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!("BadAttributeIdInvalid"));
}

#[tokio::test]
async fn test_write_endpoint() {
    let fx = ServerFixture::new();
    let write = |node_id: &NodeId, value: Variant| {
        serde_json::to_value(WriteRequest {
            node_id: node_id.clone(),
            value,
        })
        .unwrap()
    };

    let body = write(&fx.demo.temperature, Variant::Double(25.0));
    let (status, _) = send(create_test_app(&fx), Method::PUT, "/api/write", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let stored = fx
        .server
        .store
        .get_attribute(&fx.demo.temperature, AttributeId::Value)
        .unwrap();
    assert_eq!(stored.value, Variant::Double(25.0));

    let body = write(&fx.demo.uint, Variant::UInt16(8));
    let (status, body) = send(create_test_app(&fx), Method::PUT, "/api/write", Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], json!("BadNotWritable"));

    let body = write(&fx.demo.temperature, Variant::from("warm"));
    let (status, body) = send(create_test_app(&fx), Method::PUT, "/api/write", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!("BadTypeMismatch"));

    let body = write(&NodeId::numeric(fx.demo.namespace, 999_999), Variant::Double(1.0));
    let (status, _) = send(create_test_app(&fx), Method::PUT, "/api/write", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_call_endpoint() {
    let fx = ServerFixture::new();
    let call = |arguments: Vec<Variant>| {
        serde_json::to_value(CallRequest {
            object_id: fx.demo.machine.clone(),
            method_id: fx.demo.multiply.clone(),
            arguments,
        })
        .unwrap()
    };

    let body = call(vec![Variant::Int64(3), Variant::Int64(4)]);
    let (status, body) = send(create_test_app(&fx), Method::POST, "/api/call", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["output_arguments"],
        serde_json::to_value(vec![Variant::Int64(12)]).unwrap()
    );

    let body = call(vec![Variant::from("a"), Variant::Int64(4)]);
    let (status, body) = send(create_test_app(&fx), Method::POST, "/api/call", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!("BadInvalidArgument"));

    let body = serde_json::to_value(CallRequest {
        object_id: fx.demo.folder.clone(),
        method_id: fx.demo.multiply.clone(),
        arguments: Vec::new(),
    })
    .unwrap();
    let (status, _) = send(create_test_app(&fx), Method::POST, "/api/call", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_events_endpoint() {
    let fx = ServerFixture::new();
    let body = json!({ "message": "maintenance due", "severity": 2000 });
    let (status, body) = send(create_test_app(&fx), Method::POST, "/api/events", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["severity"], json!(1000));
    assert_eq!(body["delivered"], json!(0));

    let (status, body) = send(
        create_test_app(&fx),
        Method::POST,
        "/api/events",
        Some(json!({ "message": "default severity" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["severity"], json!(500));
}

#[tokio::test]
async fn test_unknown_route() {
    let fx = ServerFixture::new();
    let (status, _) = send(create_test_app(&fx), Method::GET, "/api/nodes", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
