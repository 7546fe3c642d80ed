//! Geometry payload validation.
//!
//! Each geometry type is described by a [`Schema`] literal; the collection
//! type refers back to the whole catalog. Ring closure is checked after the
//! structural pass because the schema engine cannot compare positions.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::schema::Schema;

/// GeoJSON geometry discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
  Point,
  MultiPoint,
  LineString,
  MultiLineString,
  Polygon,
  MultiPolygon,
  GeometryCollection,
}

impl GeometryType {
  pub const ALL: [GeometryType; 7] = [
    GeometryType::Point,
    GeometryType::MultiPoint,
    GeometryType::LineString,
    GeometryType::MultiLineString,
    GeometryType::Polygon,
    GeometryType::MultiPolygon,
    GeometryType::GeometryCollection,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      GeometryType::Point => "Point",
      GeometryType::MultiPoint => "MultiPoint",
      GeometryType::LineString => "LineString",
      GeometryType::MultiLineString => "MultiLineString",
      GeometryType::Polygon => "Polygon",
      GeometryType::MultiPolygon => "MultiPolygon",
      GeometryType::GeometryCollection => "GeometryCollection",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|t| t.as_str() == name)
  }
}

impl fmt::Display for GeometryType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

struct Catalog {
  entries: Vec<(GeometryType, Schema)>,
  any: Schema,
}

static CATALOG: OnceLock<Catalog> = OnceLock::new();

fn catalog() -> &'static Catalog {
  CATALOG.get_or_init(Catalog::build)
}

fn any_geometry() -> &'static Schema {
  &catalog().any
}

fn discriminator(t: GeometryType) -> Schema {
  // An escaped literal always compiles.
  Schema::String {
    pattern: Regex::new(&format!("^{}$", regex::escape(t.as_str()))).ok(),
  }
}

fn geometry(t: GeometryType, payload: &'static str, payload_schema: Schema) -> Schema {
  Schema::object(
    [
      ("type", discriminator(t)),
      (payload, payload_schema),
      ("bbox", Schema::array(Schema::Number, 4)),
    ],
    ["type", payload],
    false,
  )
}

impl Catalog {
  fn build() -> Self {
    let position = || Schema::array(Schema::Number, 2);
    let line = || Schema::array(position(), 2);
    // Ring length is enforced by the closure check, not here.
    let polygon = || Schema::array(Schema::array(position(), 0), 1);

    let entries = vec![
      (
        GeometryType::Point,
        geometry(GeometryType::Point, "coordinates", position()),
      ),
      (
        GeometryType::MultiPoint,
        geometry(GeometryType::MultiPoint, "coordinates", Schema::array(position(), 1)),
      ),
      (
        GeometryType::LineString,
        geometry(GeometryType::LineString, "coordinates", line()),
      ),
      (
        GeometryType::MultiLineString,
        geometry(GeometryType::MultiLineString, "coordinates", Schema::array(line(), 1)),
      ),
      (
        GeometryType::Polygon,
        geometry(GeometryType::Polygon, "coordinates", polygon()),
      ),
      (
        GeometryType::MultiPolygon,
        geometry(GeometryType::MultiPolygon, "coordinates", Schema::array(polygon(), 1)),
      ),
      (
        GeometryType::GeometryCollection,
        geometry(
          GeometryType::GeometryCollection,
          "geometries",
          Schema::array(Schema::Ref(any_geometry), 0),
        ),
      ),
    ];
    let any = Schema::OneOf(entries.iter().map(|(_, s)| s.clone()).collect());
    Catalog { entries, any }
  }

  fn schema_for(&self, t: GeometryType) -> Option<&Schema> {
    self.entries.iter().find(|(ty, _)| *ty == t).map(|(_, s)| s)
  }
}

/// Validate a geometry value and return its type.
pub fn validate_geometry(value: &Value) -> Result<GeometryType> {
  let t = geometry_type_of(value, "$")?;
  let schema = catalog()
    .schema_for(t)
    .ok_or_else(|| Error::schema_mismatch("$.type", format!("no schema for {}", t)))?;
  schema.validate(value, "$")?;
  check_rings(t, value, "$")?;
  Ok(t)
}

fn geometry_type_of(value: &Value, path: &str) -> Result<GeometryType> {
  let name = value.get("type").and_then(Value::as_str).ok_or_else(|| {
    Error::schema_mismatch(format!("{}.type", path), "missing geometry type")
  })?;
  GeometryType::from_name(name).ok_or_else(|| {
    Error::schema_mismatch(
      format!("{}.type", path),
      format!("unknown geometry type '{}'", name),
    )
  })
}

fn check_rings(t: GeometryType, value: &Value, path: &str) -> Result<()> {
  match t {
    GeometryType::Polygon => {
      let rings = array_at(value, "coordinates");
      for (i, ring) in rings.iter().enumerate() {
        check_ring(ring, &format!("{}.coordinates[{}]", path, i))?;
      }
    }
    GeometryType::MultiPolygon => {
      for (p, polygon) in array_at(value, "coordinates").iter().enumerate() {
        let rings = polygon.as_array().map(Vec::as_slice).unwrap_or_default();
        for (i, ring) in rings.iter().enumerate() {
          check_ring(ring, &format!("{}.coordinates[{}][{}]", path, p, i))?;
        }
      }
    }
    GeometryType::GeometryCollection => {
      for (i, member) in array_at(value, "geometries").iter().enumerate() {
        let member_path = format!("{}.geometries[{}]", path, i);
        let member_type = geometry_type_of(member, &member_path)?;
        check_rings(member_type, member, &member_path)?;
      }
    }
    _ => {}
  }
  Ok(())
}

fn array_at<'a>(value: &'a Value, key: &str) -> &'a [Value] {
  value
    .get(key)
    .and_then(Value::as_array)
    .map(Vec::as_slice)
    .unwrap_or_default()
}

fn check_ring(ring: &Value, path: &str) -> Result<()> {
  let positions = ring.as_array().map(Vec::as_slice).unwrap_or_default();
  if positions.len() < 4 {
    return Err(Error::UnclosedRing {
      path: path.to_string(),
      reason: format!("ring needs at least 4 positions, found {}", positions.len()),
    });
  }
  let first = coordinates(&positions[0]);
  let last = coordinates(&positions[positions.len() - 1]);
  if first != last {
    return Err(Error::UnclosedRing {
      path: path.to_string(),
      reason: "first and last positions differ".to_string(),
    });
  }
  Ok(())
}

fn coordinates(position: &Value) -> Vec<f64> {
  position
    .as_array()
    .map(|items| items.iter().filter_map(Value::as_f64).collect())
    .unwrap_or_default()
}

pub fn point(x: f64, y: f64) -> Value {
  json!({"type": "Point", "coordinates": [x, y]})
}

pub fn line_string(positions: &[[f64; 2]]) -> Value {
  json!({"type": "LineString", "coordinates": positions})
}

/// A polygon from its rings; the first ring is the exterior.
pub fn polygon(rings: &[Vec<[f64; 2]>]) -> Value {
  json!({"type": "Polygon", "coordinates": rings})
}

pub fn multi_polygon(polygons: &[Vec<Vec<[f64; 2]>>]) -> Value {
  json!({"type": "MultiPolygon", "coordinates": polygons})
}

pub fn geometry_collection(geometries: Vec<Value>) -> Value {
  json!({"type": "GeometryCollection", "geometries": geometries})
}

#[cfg(test)]
mod tests {
  use super::*;

  fn square() -> Vec<[f64; 2]> {
    vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]
  }

  #[test]
  fn test_point() {
    assert_eq!(validate_geometry(&point(1.0, 2.0)).unwrap(), GeometryType::Point);
  }

  #[test]
  fn test_closed_ring_validates() {
    assert_eq!(
      validate_geometry(&polygon(&[square()])).unwrap(),
      GeometryType::Polygon
    );
  }

  #[test]
  fn test_integer_and_float_positions_compare_equal() {
    let value = json!({"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0.0, 0.0]]]});
    assert!(validate_geometry(&value).is_ok());
  }

  #[test]
  fn test_unknown_type() {
    let err = validate_geometry(&json!({"type": "Circle", "coordinates": [0, 0]})).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { .. }));
  }

  #[test]
  fn test_collection_recurses() {
    let value = geometry_collection(vec![
      point(0.0, 0.0),
      geometry_collection(vec![line_string(&[[0.0, 0.0], [1.0, 1.0]])]),
    ]);
    assert_eq!(
      validate_geometry(&value).unwrap(),
      GeometryType::GeometryCollection
    );
  }
}
