//! Client tests for EmberDB Rust SDK.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use emberdb::rest::METHOD_OVERRIDE_HEADER;
use emberdb::{
  field, AuthProvider, ClientOptions, DocumentReference, EmberDb, Error, ListenOptions, Projection,
  QueryBuilder, SortDir, UpdateSpec,
};
use serde_json::{json, Value};

fn client() -> EmberDb {
  EmberDb::new(ClientOptions::new("https://db.example.com", "main").with_auth("token123")).unwrap()
}

fn query_params(request: &reqwest::Request) -> HashMap<String, String> {
  request.url().query_pairs().into_owned().collect()
}

#[test]
fn test_client_options_default() {
  let opts = ClientOptions::new("https://db.example.com", "main");
  assert_eq!(opts.base_url, "https://db.example.com");
  assert_eq!(opts.database_id, "main");
  assert!(opts.auth_token.is_none());
  assert!(opts.project_name.is_none());
  assert!(opts.auto_reconnect);
  assert_eq!(opts.backoff_unit, Duration::from_secs(1));
  assert_eq!(opts.timeout, Duration::from_secs(30));
  assert!(opts.auth_provider().token().is_none());
}

#[test]
fn test_client_options_builder_chain() {
  let opts = ClientOptions::new("http://localhost:8080", "main")
    .with_auth("token123")
    .with_project_name("demo")
    .with_auto_reconnect(false)
    .with_backoff_unit(Duration::from_millis(10))
    .with_timeout(Duration::from_secs(5));

  assert_eq!(opts.auth_token, Some("token123".to_string()));
  assert_eq!(opts.project_name, Some("demo".to_string()));
  assert!(!opts.auto_reconnect);
  assert_eq!(opts.backoff_unit, Duration::from_millis(10));
  assert_eq!(opts.timeout, Duration::from_secs(5));
  assert_eq!(opts.auth_provider().token(), Some("token123".to_string()));
}

#[derive(Debug)]
struct Rotating;

impl AuthProvider for Rotating {
  fn token(&self) -> Option<String> {
    Some("rotated".to_string())
  }
}

#[test]
fn test_auth_provider_overrides_token() {
  let opts = ClientOptions::new("http://localhost", "main")
    .with_auth("fixed")
    .with_auth_provider(Arc::new(Rotating));
  assert_eq!(opts.auth_provider().token(), Some("rotated".to_string()));
}

#[test]
fn test_realtime_url_derivation() {
  let opts = ClientOptions::new("https://db.example.com", "main");
  assert_eq!(opts.resolved_realtime_url().unwrap().as_str(), "wss://db.example.com/");

  let opts = ClientOptions::new("http://localhost:8080/api", "main");
  assert_eq!(opts.resolved_realtime_url().unwrap().as_str(), "ws://localhost:8080/api");

  let opts = ClientOptions::new("https://db.example.com", "main").with_realtime_url("wss://rt.example.com");
  assert_eq!(opts.resolved_realtime_url().unwrap().as_str(), "wss://rt.example.com/");

  let opts = ClientOptions::new("ftp://db.example.com", "main");
  assert!(matches!(opts.resolved_realtime_url(), Err(Error::Config(_))));
}

#[test]
fn test_client_rejects_bad_options() {
  assert!(matches!(
    EmberDb::new(ClientOptions::new("https://db.example.com", "")),
    Err(Error::Config(_))
  ));
  assert!(matches!(
    EmberDb::new(ClientOptions::new("not a url", "main")),
    Err(Error::Url(_))
  ));
}

#[test]
fn test_error_display() {
  let err = Error::ConnectionFailed("refused".to_string());
  assert_eq!(format!("{}", err), "Connection failed: refused");

  let err = Error::MissingField {
    operator: "$eq".to_string(),
  };
  assert_eq!(format!("{}", err), "Missing field for $eq");

  let err = Error::Transport {
    status: 500,
    message: "boom".to_string(),
  };
  assert_eq!(format!("{}", err), "Transport error (500): boom");

  let err = Error::ServerReported {
    message: "denied".to_string(),
    details: json!({"message": "denied"}),
  };
  assert_eq!(format!("{}", err), "Server error: denied");

  let err = Error::DivisionByZero {
    field: "n".to_string(),
    operator: "divide".to_string(),
  };
  assert!(err.is_validation());
  assert!(!Error::Config("x".to_string()).is_validation());
}

#[test]
fn test_error_from_json() {
  let json_err = serde_json::from_str::<Value>("invalid json").unwrap_err();
  let err: Error = json_err.into();
  assert!(matches!(err, Error::Serialization(_)));
}

#[test]
fn test_references_bound_to_database() {
  let db = client();
  let users = db.collection("users").unwrap();
  assert_eq!(users.database_id(), "main");
  let alice = db.document("users/alice").unwrap();
  assert_eq!(alice.parent(), users);
  assert!(db.document("users").is_err());
}

#[test]
fn test_resource_url() {
  let db = client();
  let alice = db.document("users/alice smith").unwrap();
  let url = db.rest().resource_url(&alice.into()).unwrap();
  assert_eq!(url.as_str(), "https://db.example.com/databases/main/users/alice%20smith");
}

#[test]
fn test_build_update_uses_method_override() {
  let db = client();
  let alice = db.document("users/alice").unwrap();
  let update = UpdateSpec::new().set("name", "Alice").increment("visits", 1);

  let request = db.rest().build_update(&alice, &update).unwrap().unwrap();
  assert_eq!(request.method(), reqwest::Method::POST);
  assert_eq!(request.headers()[METHOD_OVERRIDE_HEADER], "PATCH");
  assert_eq!(request.headers()["authorization"], "Bearer token123");

  let body: Value = serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
  assert_eq!(
    body,
    json!({"$set": {"name": "Alice"}, "$inc": {"visits": 1}})
  );
}

#[test]
fn test_empty_update_builds_nothing() {
  let db = client();
  let alice = db.document("users/alice").unwrap();
  assert!(db.rest().build_update(&alice, &UpdateSpec::new()).unwrap().is_none());
}

#[test]
fn test_invalid_update_fails_before_request() {
  let db = client();
  let alice = db.document("users/alice").unwrap();
  let err = db
    .rest()
    .build_update(&alice, &UpdateSpec::new().divide("score", 0))
    .unwrap_err();
  assert!(matches!(err, Error::DivisionByZero { .. }));
}

#[test]
fn test_build_query_parameters() {
  let db = client();
  let users = db.collection("users").unwrap();
  let query = QueryBuilder::new()
    .find(field("age").gte(18))
    .sort("name", SortDir::Desc)
    .project(Projection::Include(vec!["name".to_string()]))
    .limit(5);

  let request = db.rest().build_query(&users, &query).unwrap();
  assert_eq!(request.method(), reqwest::Method::GET);
  assert_eq!(request.url().path(), "/databases/main/users");

  let params = query_params(&request);
  let parsed = |key: &str| serde_json::from_str::<Value>(&params[key]).unwrap();
  assert_eq!(parsed("query"), json!({"age": {"$gte": 18}}));
  assert_eq!(parsed("sort"), json!({"name": -1}));
  assert_eq!(parsed("projection"), json!({"name": 1}));
  assert_eq!(params["limit"], "5");
  assert!(!params.contains_key("projectName"));
}

#[test]
fn test_unauthenticated_requests_carry_project_name() {
  let db = EmberDb::new(ClientOptions::new("https://db.example.com", "main").with_project_name("demo"))
    .unwrap();
  let users = db.collection("users").unwrap();
  let request = db.rest().build_query(&users, &QueryBuilder::new()).unwrap();

  assert!(request.headers().get("authorization").is_none());
  assert_eq!(query_params(&request)["projectName"], "demo");
}

#[test]
fn test_listen_rejects_foreign_database() {
  let db = client();
  let other = DocumentReference::new("users/alice", "other").unwrap();
  let err = db.listen_document(&other, ListenOptions::new()).unwrap_err();
  assert!(matches!(err, Error::InvalidReference { .. }));
}

#[test]
fn test_listen_rejects_invalid_query() {
  let db = client();
  let users = db.collection("users").unwrap();
  let options = ListenOptions::new().with_query(QueryBuilder::new().find(field("n").modulo(0, 1)));
  assert!(matches!(
    db.listen_collection(&users, options),
    Err(Error::DivisionByZero { .. })
  ));
}
