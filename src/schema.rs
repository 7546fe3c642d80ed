//! Minimal recursive schema validator for JSON values.
//!
//! Only the handful of node kinds needed to describe geometry payloads are
//! supported. A failing `OneOf` reports a single mismatch for the whole
//! node, not one per alternative.

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

/// A schema node.
#[derive(Debug, Clone)]
pub enum Schema {
  Object {
    properties: Vec<(String, Schema)>,
    required: Vec<String>,
    additional_properties: bool,
  },
  Array {
    items: Box<Schema>,
    min_items: usize,
  },
  OneOf(Vec<Schema>),
  Number,
  String {
    pattern: Option<Regex>,
  },
  /// Late-bound reference, used to make a schema refer to itself.
  Ref(fn() -> &'static Schema),
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

impl Schema {
  pub fn object<I, R>(properties: I, required: R, additional_properties: bool) -> Self
  where
    I: IntoIterator<Item = (&'static str, Schema)>,
    R: IntoIterator<Item = &'static str>,
  {
    Schema::Object {
      properties: properties
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect(),
      required: required.into_iter().map(str::to_string).collect(),
      additional_properties,
    }
  }

  pub fn array(items: Schema, min_items: usize) -> Self {
    Schema::Array {
      items: Box::new(items),
      min_items,
    }
  }

  pub fn string() -> Self {
    Schema::String { pattern: None }
  }

  /// A string schema whose values must match `pattern`.
  pub fn string_matching(pattern: &str) -> Result<Self> {
    let pattern = Regex::new(pattern)
      .map_err(|e| Error::Config(format!("invalid schema pattern: {}", e)))?;
    Ok(Schema::String {
      pattern: Some(pattern),
    })
  }

  /// Validate `value`, reporting failures relative to `path`.
  pub fn validate(&self, value: &Value, path: &str) -> Result<()> {
    match self {
      Schema::Object {
        properties,
        required,
        additional_properties,
      } => {
        let object = value.as_object().ok_or_else(|| {
          Error::schema_mismatch(path, format!("expected object, found {}", kind_of(value)))
        })?;

        for name in required {
          if !object.contains_key(name) {
            return Err(Error::schema_mismatch(
              path,
              format!("missing required property '{}'", name),
            ));
          }
        }

        if !additional_properties {
          if let Some(extra) = object
            .keys()
            .find(|key| !properties.iter().any(|(name, _)| name == *key))
          {
            return Err(Error::schema_mismatch(
              path,
              format!("unexpected property '{}'", extra),
            ));
          }
        }

        for (name, schema) in properties {
          if let Some(child) = object.get(name) {
            schema.validate(child, &format!("{}.{}", path, name))?;
          }
        }
        Ok(())
      }
      Schema::Array { items, min_items } => {
        let array = value.as_array().ok_or_else(|| {
          Error::schema_mismatch(path, format!("expected array, found {}", kind_of(value)))
        })?;
        if array.len() < *min_items {
          return Err(Error::schema_mismatch(
            path,
            format!("expected at least {} items, found {}", min_items, array.len()),
          ));
        }
        for (i, item) in array.iter().enumerate() {
          items.validate(item, &format!("{}[{}]", path, i))?;
        }
        Ok(())
      }
      Schema::OneOf(alternatives) => {
        if alternatives.iter().any(|alt| alt.validate(value, path).is_ok()) {
          Ok(())
        } else {
          Err(Error::schema_mismatch(path, "value matches none of the alternatives"))
        }
      }
      Schema::Number => {
        if value.is_number() {
          Ok(())
        } else {
          Err(Error::schema_mismatch(
            path,
            format!("expected number, found {}", kind_of(value)),
          ))
        }
      }
      Schema::String { pattern } => {
        let s = value.as_str().ok_or_else(|| {
          Error::schema_mismatch(path, format!("expected string, found {}", kind_of(value)))
        })?;
        match pattern {
          Some(re) if !re.is_match(s) => Err(Error::schema_mismatch(
            path,
            format!("'{}' does not match {}", s, re.as_str()),
          )),
          _ => Ok(()),
        }
      }
      Schema::Ref(resolve) => resolve().validate(value, path),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn person() -> Schema {
    Schema::object(
      [
        ("name", Schema::string()),
        ("tags", Schema::array(Schema::string(), 1)),
      ],
      ["name"],
      false,
    )
  }

  #[test]
  fn test_object_required_and_additional() {
    let schema = person();
    assert!(schema.validate(&json!({"name": "a"}), "$").is_ok());
    assert!(schema.validate(&json!({}), "$").is_err());

    let err = schema.validate(&json!({"name": "a", "age": 3}), "$").unwrap_err();
    assert!(err.to_string().contains("unexpected property 'age'"));
  }

  #[test]
  fn test_nested_path_reported() {
    let err = person()
      .validate(&json!({"name": "a", "tags": ["x", 1]}), "$")
      .unwrap_err();
    match err {
      Error::SchemaMismatch { path, .. } => assert_eq!(path, "$.tags[1]"),
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn test_min_items() {
    let err = person().validate(&json!({"name": "a", "tags": []}), "$").unwrap_err();
    assert!(err.to_string().contains("at least 1"));
  }

  #[test]
  fn test_one_of() {
    let schema = Schema::OneOf(vec![Schema::Number, Schema::string()]);
    assert!(schema.validate(&json!(1), "$").is_ok());
    assert!(schema.validate(&json!("x"), "$").is_ok());
    assert!(schema.validate(&json!(null), "$").is_err());
  }

  #[test]
  fn test_string_pattern() {
    let schema = Schema::string_matching("^Point$").unwrap();
    assert!(schema.validate(&json!("Point"), "$").is_ok());
    assert!(schema.validate(&json!("Points"), "$").is_err());
    assert!(Schema::string_matching("(").is_err());
  }
}
