//! Reference model tests for EmberDB Rust SDK.

use emberdb::{CollectionReference, DocumentReference, Error, Reference};

#[test]
fn test_parse_picks_kind_by_parity() {
  assert!(!Reference::parse("users", "main").unwrap().is_document());
  assert!(Reference::parse("users/alice", "main").unwrap().is_document());
  assert!(!Reference::parse("users/alice/posts", "main").unwrap().is_document());
}

#[test]
fn test_child_then_parent_round_trips() {
  let paths = ["users", "users/alice", "users/alice/posts", "users/alice/posts/p1"];
  for path in paths {
    let reference = Reference::parse(path, "main").unwrap();
    let child = reference.child("x").unwrap();
    assert_ne!(child.is_document(), reference.is_document());
    assert_eq!(child.parent(), Some(reference.clone()));
    assert_eq!(child.path(), format!("{}/x", path));
    assert_eq!(child.database_id(), "main");
  }
}

#[test]
fn test_root_collection_has_no_parent() {
  let users = CollectionReference::new("users", "main").unwrap();
  assert!(users.parent().is_none());

  let posts = CollectionReference::new("users/alice/posts", "main").unwrap();
  assert_eq!(posts.parent().unwrap().path(), "users/alice");
}

#[test]
fn test_invalid_child_ids() {
  let users = CollectionReference::new("users", "main").unwrap();
  assert!(matches!(users.document(""), Err(Error::InvalidReference { .. })));
  assert!(matches!(users.document("a/b"), Err(Error::InvalidReference { .. })));

  let alice = users.document("alice").unwrap();
  assert!(alice.collection("").is_err());
  assert_eq!(alice.collection("posts").unwrap().path(), "users/alice/posts");
}

#[test]
fn test_invalid_paths() {
  for path in ["", "/", "users/", "/users", "users//alice"] {
    let err = Reference::parse(path, "main").unwrap_err();
    assert!(matches!(err, Error::InvalidReference { .. }), "{:?}", path);
  }
  assert!(DocumentReference::new("users", "main").is_err());
  assert!(CollectionReference::new("users/alice", "main").is_err());
}

#[test]
fn test_from_segments() {
  let doc = DocumentReference::from_segments(vec!["users".into(), "alice".into()], "main").unwrap();
  assert_eq!(doc.id(), "alice");
  assert_eq!(doc.to_string(), "users/alice");
  assert!(DocumentReference::from_segments(Vec::new(), "main").is_err());

  let nested = vec!["users".into(), "a/b".into()];
  let err = DocumentReference::from_segments(nested, "main").unwrap_err();
  assert!(matches!(err, Error::InvalidReference { .. }));
  let err = CollectionReference::from_segments(vec!["users/alice".into()], "main").unwrap_err();
  assert!(matches!(err, Error::InvalidReference { .. }));
  let nested = vec!["users".into(), "a/b".into(), "posts".into()];
  let err = CollectionReference::from_segments(nested, "main").unwrap_err();
  assert!(matches!(err, Error::InvalidReference { .. }));
}

#[test]
fn test_generated_ids_are_unique() {
  let users = CollectionReference::new("users", "main").unwrap();
  assert_ne!(users.new_document(), users.new_document());
}
