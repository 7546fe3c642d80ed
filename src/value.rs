//! Operand values for query and update expressions.

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

/// A query/update operand.
///
/// `Field` refers to the value of another field of the same document and
/// turns the enclosing query node into a cross-field `$expr` comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
  Null,
  Bool(bool),
  Number(Number),
  String(String),
  Array(Vec<Operand>),
  Map(Vec<(String, Operand)>),
  Field(String),
}

impl Operand {
  /// Reference another field's value.
  pub fn field(path: impl Into<String>) -> Self {
    Operand::Field(path.into())
  }

  pub fn is_field(&self) -> bool {
    matches!(self, Operand::Field(_))
  }

  pub fn is_number(&self) -> bool {
    matches!(self, Operand::Number(_))
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Operand::Number(n) => n.as_f64(),
      _ => None,
    }
  }

  /// Name of the value class, used in error messages.
  pub fn kind(&self) -> &'static str {
    match self {
      Operand::Null => "null",
      Operand::Bool(_) => "bool",
      Operand::Number(_) => "number",
      Operand::String(_) => "string",
      Operand::Array(_) => "array",
      Operand::Map(_) => "map",
      Operand::Field(_) => "field expression",
    }
  }

  /// Wire form for the plain `{field: {op: value}}` shape.
  ///
  /// Field expressions are only valid as the top-level operand of a node;
  /// one nested inside a literal array or map is rejected.
  pub fn to_literal(&self, field: &str, operator: &str) -> Result<Value> {
    Ok(match self {
      Operand::Null => Value::Null,
      Operand::Bool(b) => Value::Bool(*b),
      Operand::Number(n) => Value::Number(n.clone()),
      Operand::String(s) => Value::String(s.clone()),
      Operand::Array(items) => Value::Array(
        items
          .iter()
          .map(|item| item.to_literal(field, operator))
          .collect::<Result<Vec<_>>>()?,
      ),
      Operand::Map(entries) => {
        let mut map = Map::new();
        for (key, value) in entries {
          map.insert(key.clone(), value.to_literal(field, operator)?);
        }
        Value::Object(map)
      }
      Operand::Field(_) => {
        return Err(Error::InvalidOperandType {
          field: field.to_string(),
          operator: operator.to_string(),
          expected: "literal value",
          found: "field expression",
        })
      }
    })
  }

  /// Wire form inside an `$expr` aggregation expression.
  pub fn to_expr(&self) -> Value {
    match self {
      Operand::Field(path) => Value::String(format!("${}", path)),
      Operand::String(s) if s.starts_with('$') => {
        serde_json::json!({ "$literal": s })
      }
      Operand::Null => Value::Null,
      Operand::Bool(b) => Value::Bool(*b),
      Operand::Number(n) => Value::Number(n.clone()),
      Operand::String(s) => Value::String(s.clone()),
      Operand::Array(items) => Value::Array(items.iter().map(Operand::to_expr).collect()),
      Operand::Map(entries) => Value::Object(
        entries
          .iter()
          .map(|(k, v)| (k.clone(), v.to_expr()))
          .collect(),
      ),
    }
  }
}

impl From<bool> for Operand {
  fn from(v: bool) -> Self {
    Operand::Bool(v)
  }
}

macro_rules! operand_from_int {
  ($($t:ty),*) => {
    $(impl From<$t> for Operand {
      fn from(v: $t) -> Self {
        Operand::Number(Number::from(v))
      }
    })*
  };
}

operand_from_int!(i32, i64, u32, u64, usize);

impl From<f64> for Operand {
  fn from(v: f64) -> Self {
    Number::from_f64(v).map(Operand::Number).unwrap_or(Operand::Null)
  }
}

impl From<&str> for Operand {
  fn from(v: &str) -> Self {
    Operand::String(v.to_string())
  }
}

impl From<String> for Operand {
  fn from(v: String) -> Self {
    Operand::String(v)
  }
}

impl<T: Into<Operand>> From<Vec<T>> for Operand {
  fn from(v: Vec<T>) -> Self {
    Operand::Array(v.into_iter().map(Into::into).collect())
  }
}

impl From<Value> for Operand {
  fn from(v: Value) -> Self {
    match v {
      Value::Null => Operand::Null,
      Value::Bool(b) => Operand::Bool(b),
      Value::Number(n) => Operand::Number(n),
      Value::String(s) => Operand::String(s),
      Value::Array(items) => Operand::Array(items.into_iter().map(Operand::from).collect()),
      Value::Object(map) => {
        Operand::Map(map.into_iter().map(|(k, v)| (k, Operand::from(v))).collect())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_from_json_keeps_order() {
    let op = Operand::from(json!({"b": 1, "a": [true, null]}));
    assert_eq!(op.to_literal("f", "$eq").unwrap(), json!({"b": 1, "a": [true, null]}));
  }

  #[test]
  fn test_nested_field_rejected_in_literal() {
    let op = Operand::Array(vec![Operand::from(1), Operand::field("other")]);
    let err = op.to_literal("f", "$in").unwrap_err();
    assert!(matches!(err, Error::InvalidOperandType { .. }));
  }

  #[test]
  fn test_expr_form() {
    assert_eq!(Operand::field("a.b").to_expr(), json!("$a.b"));
    assert_eq!(Operand::from("$money").to_expr(), json!({"$literal": "$money"}));
    assert_eq!(Operand::from(2.5).to_expr(), json!(2.5));
  }

  #[test]
  fn test_non_finite_float_is_null() {
    assert_eq!(Operand::from(f64::NAN), Operand::Null);
  }
}
