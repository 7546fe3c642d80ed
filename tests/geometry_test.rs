//! EmberDB Rust SDK - Geometry Validation Tests

use emberdb::geometry::{geometry_collection, line_string, multi_polygon, point, polygon};
use emberdb::{validate_geometry, Error, GeometryType};
use serde_json::json;

fn closed() -> Vec<[f64; 2]> {
  vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 0.0]]
}

fn open() -> Vec<[f64; 2]> {
  vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]]
}

#[test]
fn test_every_type_validates() {
  let cases = vec![
    (point(1.0, 2.0), GeometryType::Point),
    (
      json!({"type": "MultiPoint", "coordinates": [[0, 0], [1, 1]]}),
      GeometryType::MultiPoint,
    ),
    (line_string(&[[0.0, 0.0], [1.0, 1.0]]), GeometryType::LineString),
    (
      json!({"type": "MultiLineString", "coordinates": [[[0, 0], [1, 1]]]}),
      GeometryType::MultiLineString,
    ),
    (polygon(&[closed()]), GeometryType::Polygon),
    (multi_polygon(&[vec![closed()]]), GeometryType::MultiPolygon),
    (
      geometry_collection(vec![point(0.0, 0.0)]),
      GeometryType::GeometryCollection,
    ),
  ];
  for (value, expected) in cases {
    assert_eq!(validate_geometry(&value).unwrap(), expected, "{}", value);
  }
}

#[test]
fn test_unclosed_ring() {
  let err = validate_geometry(&polygon(&[open()])).unwrap_err();
  match err {
    Error::UnclosedRing { path, .. } => assert_eq!(path, "$.coordinates[0]"),
    other => panic!("unexpected error: {:?}", other),
  }
}

#[test]
fn test_ring_too_short() {
  let ring = vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]];
  let err = validate_geometry(&polygon(&[ring])).unwrap_err();
  assert!(matches!(err, Error::UnclosedRing { .. }));
}

#[test]
fn test_multi_polygon_checks_every_ring() {
  let err = validate_geometry(&multi_polygon(&[vec![closed()], vec![closed(), open()]])).unwrap_err();
  match err {
    Error::UnclosedRing { path, .. } => assert_eq!(path, "$.coordinates[1][1]"),
    other => panic!("unexpected error: {:?}", other),
  }
}

#[test]
fn test_collection_with_unclosed_polygon() {
  let value = geometry_collection(vec![point(0.0, 0.0), polygon(&[open()])]);
  let err = validate_geometry(&value).unwrap_err();
  match err {
    Error::UnclosedRing { path, .. } => assert_eq!(path, "$.geometries[1].coordinates[0]"),
    other => panic!("unexpected error: {:?}", other),
  }
}

#[test]
fn test_structural_failures() {
  let cases = vec![
    json!({"type": "Point", "coordinates": [1]}),
    json!({"type": "Point", "coordinates": ["a", "b"]}),
    json!({"type": "Point"}),
    json!({"type": "Point", "coordinates": [1, 2], "radius": 3}),
    json!({"type": "LineString", "coordinates": [[0, 0]]}),
    json!({"type": "Polygon", "coordinates": []}),
    json!({"type": "Point", "coordinates": [1, 2], "bbox": [0, 0]}),
    json!({"type": "GeometryCollection", "geometries": [{"type": "Point"}]}),
    json!({"coordinates": [1, 2]}),
    json!("Point"),
  ];
  for value in cases {
    let err = validate_geometry(&value).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { .. }), "{} gave {:?}", value, err);
  }
}

#[test]
fn test_bbox_allowed() {
  let value = json!({"type": "Point", "coordinates": [1, 2], "bbox": [1, 2, 1, 2]});
  assert_eq!(validate_geometry(&value).unwrap(), GeometryType::Point);
}
