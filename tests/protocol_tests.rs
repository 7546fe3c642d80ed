//! Wire protocol tests for EmberDB Rust SDK.

use emberdb::protocol::*;
use emberdb::{field, ChangeEvent, Error, Projection, QueryBuilder, Reference, SortDir};
use serde_json::json;
use url::Url;

fn collection_scope() -> Reference {
  Reference::parse("users", "main").unwrap()
}

fn document_scope() -> Reference {
  Reference::parse("users/alice", "main").unwrap()
}

fn event(text: &str, scope: &Reference) -> ChangeEvent {
  match decode_frame(text, scope).unwrap() {
    Decoded::Event(event) => event,
    other => panic!("expected event, got {:?}", other),
  }
}

#[test]
fn test_initial_collection() {
  let text = r#"{
    "operationType": "initial",
    "documents": [
      {"_id": "alice", "name": "Alice"},
      {"_id": "bob", "name": "Bob"}
    ]
  }"#;
  match event(text, &collection_scope()) {
    ChangeEvent::InitialCollection(collection) => {
      assert_eq!(collection.len(), 2);
      let ids: Vec<&str> = collection.iter().map(|d| d.id()).collect();
      assert_eq!(ids, vec!["alice", "bob"]);
      assert_eq!(collection.documents()[0].get("name"), Some(&json!("Alice")));
      assert!(collection.documents()[0].get("_id").is_none());
      assert_eq!(collection.documents()[1].reference().path(), "users/bob");
    }
    other => panic!("unexpected event {:?}", other),
  }
}

#[test]
fn test_initial_collection_without_documents_is_empty() {
  match event(r#"{"operationType": "initial"}"#, &collection_scope()) {
    ChangeEvent::InitialCollection(collection) => assert!(collection.is_empty()),
    other => panic!("unexpected event {:?}", other),
  }
}

#[test]
fn test_initial_document() {
  let text = r#"{"operationType": "initial", "document": {"_id": "alice", "age": 31}}"#;
  match event(text, &document_scope()) {
    ChangeEvent::InitialDocument(Some(doc)) => {
      assert_eq!(doc.id(), "alice");
      assert_eq!(doc.data(), json!({"age": 31}).as_object().unwrap());
    }
    other => panic!("unexpected event {:?}", other),
  }
}

#[test]
fn test_initial_document_missing() {
  let text = r#"{"operationType": "initial", "document": null}"#;
  assert_eq!(event(text, &document_scope()), ChangeEvent::InitialDocument(None));
}

#[test]
fn test_update_with_object_fields() {
  let text = r#"{
    "operationType": "update",
    "document": {"_id": "alice", "name": "Alicia", "age": 32},
    "change": {"updatedFields": {"name": "Alicia", "age": 32}, "removedFields": ["nick"]}
  }"#;
  match event(text, &collection_scope()) {
    ChangeEvent::Update {
      document,
      changed_fields,
      removed_fields,
    } => {
      assert_eq!(document.reference().path(), "users/alice");
      assert_eq!(changed_fields, vec!["name", "age"]);
      assert_eq!(removed_fields, vec!["nick"]);
    }
    other => panic!("unexpected event {:?}", other),
  }
}

#[test]
fn test_update_with_array_fields() {
  let text = r#"{
    "operationType": "update",
    "document": {"age": 32},
    "change": {"updatedFields": ["age"]}
  }"#;
  match event(text, &document_scope()) {
    ChangeEvent::Update {
      document,
      changed_fields,
      removed_fields,
    } => {
      assert_eq!(document.id(), "alice");
      assert_eq!(changed_fields, vec!["age"]);
      assert!(removed_fields.is_empty());
    }
    other => panic!("unexpected event {:?}", other),
  }
}

#[test]
fn test_update_without_document_is_malformed() {
  let err = decode_frame(r#"{"operationType": "update"}"#, &collection_scope()).unwrap_err();
  assert!(matches!(err, Error::Serialization(_)));
}

#[test]
fn test_delete_on_collection() {
  let text = r#"{"operationType": "delete", "name": "bob"}"#;
  assert_eq!(
    event(text, &collection_scope()),
    ChangeEvent::Delete {
      document_id: "bob".to_string()
    }
  );
}

#[test]
fn test_delete_ignored_on_document_listener() {
  let text = r#"{"operationType": "delete", "name": "alice"}"#;
  let decoded = decode_frame(text, &document_scope()).unwrap();
  assert!(matches!(decoded, Decoded::Ignored(_)));
}

#[test]
fn test_error_frame() {
  let text = r#"{"error": {"message": "permission denied", "code": 7}}"#;
  match decode_frame(text, &collection_scope()).unwrap() {
    Decoded::ServerError(Error::ServerReported { message, details }) => {
      assert_eq!(message, "permission denied");
      assert_eq!(details["code"], json!(7));
    }
    other => panic!("expected server error, got {:?}", other),
  }
}

#[test]
fn test_malformed_frames() {
  assert!(matches!(
    decode_frame("not json", &collection_scope()),
    Err(Error::Serialization(_))
  ));
  assert!(matches!(
    decode_frame(r#"{"operationType": "rename"}"#, &collection_scope()),
    Err(Error::Serialization(_))
  ));
  assert!(matches!(
    decode_frame(r#"{"operationType": "initial", "documents": [{"name": "x"}]}"#, &collection_scope()),
    Err(Error::Serialization(_))
  ));
}

#[test]
fn test_configuration_frame() {
  assert!(ConfigurationFrame::from_query(&QueryBuilder::new()).unwrap().is_none());
  assert!(ConfigurationFrame::from_query(&QueryBuilder::new().limit(3))
    .unwrap()
    .is_none());

  let limited = QueryBuilder::new().find(field("age").gt(21)).limit(3);
  assert_eq!(limited.limit_value(), Some(3));
  let frame = ConfigurationFrame::from_query(&limited).unwrap().unwrap();
  let encoded: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
  assert_eq!(encoded, json!({"query": {"age": {"$gt": 21}}}));

  let query = QueryBuilder::new()
    .find(field("age").gt(21))
    .sort("age", SortDir::Asc)
    .project(Projection::Exclude(vec!["secret".to_string()]));
  let frame = ConfigurationFrame::from_query(&query).unwrap().unwrap();
  let encoded: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
  assert_eq!(
    encoded,
    json!({
      "query": {"age": {"$gt": 21}},
      "projection": {"secret": 0},
      "sort": {"age": 1}
    })
  );
}

#[test]
fn test_listen_url() {
  let base = Url::parse("wss://db.example.com").unwrap();
  let scope = Reference::parse("users/alice/posts", "main").unwrap();

  let url = listen_url(&base, &scope, true, None, false).unwrap();
  assert_eq!(
    url.as_str(),
    "wss://db.example.com/databases:listen/main/users/alice/posts?initialFullResult=true"
  );

  let url = listen_url(&base, &scope, false, Some("demo"), true).unwrap();
  assert_eq!(
    url.as_str(),
    "wss://db.example.com/databases:listen/main/users/alice/posts?initialFullResult=false&projectName=demo&willQuery=true"
  );
}
