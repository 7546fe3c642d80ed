//! Update specifications and their wire compilation.
//!
//! An update maps each field path to exactly one operation. Compiling groups
//! the fields by operator token, e.g. `{"$set": {...}, "$inc": {...}}`.
//! `$unset` is the exception: it is a plain list of field names.

use serde_json::{json, Map, Number, Value};

use crate::error::{Error, Result};
use crate::query::SortDir;
use crate::value::Operand;

/// One value or several values applied with `$each`.
#[derive(Debug, Clone, PartialEq)]
pub enum Items {
  One(Operand),
  Each(Vec<Operand>),
}

/// Ordering applied by `$push` after inserting.
#[derive(Debug, Clone, PartialEq)]
pub enum PushSort {
  /// Sort scalar elements.
  Direction(SortDir),
  /// Sort embedded documents by the given fields.
  Fields(Vec<(String, SortDir)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
  Set {
    value: Operand,
    on_insert_only: bool,
  },
  Increment(Operand),
  Decrement(Operand),
  Min(Operand),
  Max(Operand),
  Multiply(Operand),
  Divide(Operand),
  Rename(String),
  Unset,
  AddToSet(Items),
  PopFirst,
  PopLast,
  Push {
    items: Items,
    position: Option<i64>,
    keep_count: Option<i64>,
    sort: Option<PushSort>,
  },
}

impl UpdateOp {
  pub fn token(&self) -> &'static str {
    match self {
      UpdateOp::Set {
        on_insert_only: false,
        ..
      } => "$set",
      UpdateOp::Set {
        on_insert_only: true,
        ..
      } => "$setOnInsert",
      UpdateOp::Increment(_) | UpdateOp::Decrement(_) => "$inc",
      UpdateOp::Min(_) => "$min",
      UpdateOp::Max(_) => "$max",
      UpdateOp::Multiply(_) | UpdateOp::Divide(_) => "$mul",
      UpdateOp::Rename(_) => "$rename",
      UpdateOp::Unset => "$unset",
      UpdateOp::AddToSet(_) => "$addToSet",
      UpdateOp::PopFirst | UpdateOp::PopLast => "$pop",
      UpdateOp::Push { .. } => "$push",
    }
  }

  fn compile(&self, field: &str) -> Result<Value> {
    let token = self.token();
    match self {
      UpdateOp::Set { value, .. } | UpdateOp::Min(value) | UpdateOp::Max(value) => {
        value.to_literal(field, token)
      }
      UpdateOp::Increment(delta) | UpdateOp::Multiply(delta) => {
        Ok(Value::Number(number(delta, field, token)?))
      }
      UpdateOp::Decrement(delta) => negate(&number(delta, field, token)?)
        .map(Value::Number)
        .ok_or_else(|| invalid(field, token, "finite number", "number")),
      UpdateOp::Divide(divisor) => {
        let n = number(divisor, field, token)?;
        let d = n.as_f64().unwrap_or_default();
        if d == 0.0 {
          return Err(Error::DivisionByZero {
            field: field.to_string(),
            operator: "divide".to_string(),
          });
        }
        Number::from_f64(1.0 / d)
          .map(Value::Number)
          .ok_or_else(|| invalid(field, token, "finite divisor", "number"))
      }
      UpdateOp::Rename(new_path) => {
        if new_path.is_empty() {
          return Err(invalid(field, token, "field path", "empty string"));
        }
        Ok(json!(new_path))
      }
      UpdateOp::Unset => Ok(json!(field)),
      UpdateOp::AddToSet(items) => match items {
        Items::One(value) => value.to_literal(field, token),
        Items::Each(values) => Ok(json!({ "$each": literals(values, field, token)? })),
      },
      UpdateOp::PopFirst => Ok(json!(-1)),
      UpdateOp::PopLast => Ok(json!(1)),
      UpdateOp::Push {
        items,
        position,
        keep_count,
        sort,
      } => {
        let plain = position.is_none() && keep_count.is_none() && sort.is_none();
        let each = match items {
          Items::One(value) if plain => return value.to_literal(field, token),
          Items::One(value) => vec![value.to_literal(field, token)?],
          Items::Each(values) => literals(values, field, token)?,
        };
        let mut body = Map::new();
        body.insert("$each".to_string(), Value::Array(each));
        if let Some(position) = position {
          body.insert("$position".to_string(), json!(position));
        }
        if let Some(keep) = keep_count {
          body.insert("$slice".to_string(), json!(keep));
        }
        if let Some(sort) = sort {
          body.insert("$sort".to_string(), push_sort(sort));
        }
        Ok(Value::Object(body))
      }
    }
  }
}

fn invalid(field: &str, operator: &str, expected: &'static str, found: &'static str) -> Error {
  Error::InvalidOperandType {
    field: field.to_string(),
    operator: operator.to_string(),
    expected,
    found,
  }
}

fn number(operand: &Operand, field: &str, operator: &str) -> Result<Number> {
  match operand {
    Operand::Number(n) => Ok(n.clone()),
    other => Err(invalid(field, operator, "number", other.kind())),
  }
}

fn negate(n: &Number) -> Option<Number> {
  if let Some(i) = n.as_i64() {
    if let Some(neg) = i.checked_neg() {
      return Some(Number::from(neg));
    }
  }
  n.as_f64().and_then(|f| Number::from_f64(-f))
}

fn literals(values: &[Operand], field: &str, operator: &str) -> Result<Vec<Value>> {
  values
    .iter()
    .map(|v| v.to_literal(field, operator))
    .collect()
}

fn sort_flag(dir: SortDir) -> Value {
  match dir {
    SortDir::Asc => json!(1),
    SortDir::Desc => json!(-1),
  }
}

fn push_sort(sort: &PushSort) -> Value {
  match sort {
    PushSort::Direction(dir) => sort_flag(*dir),
    PushSort::Fields(fields) => Value::Object(
      fields
        .iter()
        .map(|(f, dir)| (f.clone(), sort_flag(*dir)))
        .collect(),
    ),
  }
}

/// Field path to operation map. Setting a field twice keeps the last
/// operation in the first position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
  ops: Vec<(String, UpdateOp)>,
}

impl UpdateSpec {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }

  pub fn len(&self) -> usize {
    self.ops.len()
  }

  pub fn get(&self, field: &str) -> Option<&UpdateOp> {
    self.ops.iter().find(|(f, _)| f == field).map(|(_, op)| op)
  }

  /// Assign `op` to `field`, replacing any earlier operation on it.
  pub fn op(mut self, field: impl Into<String>, op: UpdateOp) -> Self {
    let field = field.into();
    match self.ops.iter_mut().find(|(f, _)| *f == field) {
      Some(slot) => slot.1 = op,
      None => self.ops.push((field, op)),
    }
    self
  }

  pub fn set(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
    self.op(
      field,
      UpdateOp::Set {
        value: value.into(),
        on_insert_only: false,
      },
    )
  }

  pub fn set_on_insert(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
    self.op(
      field,
      UpdateOp::Set {
        value: value.into(),
        on_insert_only: true,
      },
    )
  }

  pub fn increment(self, field: impl Into<String>, delta: impl Into<Operand>) -> Self {
    self.op(field, UpdateOp::Increment(delta.into()))
  }

  pub fn decrement(self, field: impl Into<String>, delta: impl Into<Operand>) -> Self {
    self.op(field, UpdateOp::Decrement(delta.into()))
  }

  pub fn min(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
    self.op(field, UpdateOp::Min(value.into()))
  }

  pub fn max(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
    self.op(field, UpdateOp::Max(value.into()))
  }

  pub fn multiply(self, field: impl Into<String>, factor: impl Into<Operand>) -> Self {
    self.op(field, UpdateOp::Multiply(factor.into()))
  }

  pub fn divide(self, field: impl Into<String>, divisor: impl Into<Operand>) -> Self {
    self.op(field, UpdateOp::Divide(divisor.into()))
  }

  pub fn rename(self, field: impl Into<String>, new_path: impl Into<String>) -> Self {
    self.op(field, UpdateOp::Rename(new_path.into()))
  }

  pub fn unset(self, field: impl Into<String>) -> Self {
    self.op(field, UpdateOp::Unset)
  }

  pub fn add_to_set(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
    self.op(field, UpdateOp::AddToSet(Items::One(value.into())))
  }

  pub fn add_each_to_set<T: Into<Operand>>(self, field: impl Into<String>, values: Vec<T>) -> Self {
    self.op(
      field,
      UpdateOp::AddToSet(Items::Each(values.into_iter().map(Into::into).collect())),
    )
  }

  pub fn pop_first(self, field: impl Into<String>) -> Self {
    self.op(field, UpdateOp::PopFirst)
  }

  pub fn pop_last(self, field: impl Into<String>) -> Self {
    self.op(field, UpdateOp::PopLast)
  }

  pub fn push(self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
    self.op(
      field,
      UpdateOp::Push {
        items: Items::One(value.into()),
        position: None,
        keep_count: None,
        sort: None,
      },
    )
  }

  /// Compile to the grouped wire form. An empty spec compiles to `{}`.
  pub fn compile(&self) -> Result<Value> {
    let mut groups = Map::new();
    for (field, op) in &self.ops {
      let compiled = op.compile(field)?;
      let token = op.token();
      if let UpdateOp::Unset = op {
        let slot = groups
          .entry(token.to_string())
          .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(names) = slot {
          names.push(compiled);
        }
      } else {
        let slot = groups
          .entry(token.to_string())
          .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(fields) = slot {
          fields.insert(field.clone(), compiled);
        }
      }
    }
    Ok(Value::Object(groups))
  }
}
