//! Query builder and expression compiler for EmberDB
//!
//! Expressions form a small predicate tree that compiles to the server's
//! MongoDB-like wire format: `{field: {"$op": value}}` for literal operands
//! and `{"$expr": {"$op": ["$field", ...]}}` when an operand refers to
//! another field.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::error::{Error, Result};
use crate::geometry::{validate_geometry, GeometryType};
use crate::value::Operand;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
  Asc,
  Desc,
}

impl SortDir {
  fn to_wire(self) -> i32 {
    match self {
      SortDir::Asc => 1,
      SortDir::Desc => -1,
    }
  }
}

impl fmt::Display for SortDir {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SortDir::Asc => write!(f, "asc"),
      SortDir::Desc => write!(f, "desc"),
    }
  }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
  pub field: String,
  pub direction: SortDir,
}

/// Field projection. Inclusion and exclusion cannot be mixed.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
  Include(Vec<String>),
  Exclude(Vec<String>),
}

impl Projection {
  pub fn to_wire(&self) -> Value {
    let (fields, flag) = match self {
      Projection::Include(fields) => (fields, 1),
      Projection::Exclude(fields) => (fields, 0),
    };
    Value::Object(fields.iter().map(|f| (f.clone(), json!(flag))).collect())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
  Eq,
  Ne,
  Gt,
  Gte,
  Lt,
  Lte,
}

impl CompareOp {
  pub fn token(self) -> &'static str {
    match self {
      CompareOp::Eq => "$eq",
      CompareOp::Ne => "$ne",
      CompareOp::Gt => "$gt",
      CompareOp::Gte => "$gte",
      CompareOp::Lt => "$lt",
      CompareOp::Lte => "$lte",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
  In,
  Nin,
}

impl SetOp {
  pub fn token(self) -> &'static str {
    match self {
      SetOp::In => "$in",
      SetOp::Nin => "$nin",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoOp {
  Intersects,
  Within,
  Near,
}

impl GeoOp {
  /// `Near` maps to the unprefixed `nearSphere`; the server expects it that way.
  pub fn token(self) -> &'static str {
    match self {
      GeoOp::Intersects => "$geoIntersects",
      GeoOp::Within => "$geoWithin",
      GeoOp::Near => "nearSphere",
    }
  }

  fn accepts(self, t: GeometryType) -> bool {
    match self {
      GeoOp::Intersects => true,
      GeoOp::Within => matches!(t, GeometryType::Polygon | GeometryType::MultiPolygon),
      GeoOp::Near => t == GeometryType::Point,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
  Nor,
}

impl LogicalOp {
  pub fn token(self) -> &'static str {
    match self {
      LogicalOp::And => "$and",
      LogicalOp::Or => "$or",
      LogicalOp::Nor => "$nor",
    }
  }
}

/// A query predicate node.
///
/// `field` may only be `None` on nodes placed directly inside
/// [`Expression::ElementMatches`]; logical nodes have no field at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
  Compare {
    op: CompareOp,
    field: Option<String>,
    value: Operand,
  },
  SetMembership {
    op: SetOp,
    field: Option<String>,
    value: Operand,
  },
  Exists {
    field: Option<String>,
    present: bool,
  },
  TypeIs {
    field: Option<String>,
    type_name: String,
  },
  Modulo {
    field: Option<String>,
    divisor: Operand,
    remainder: Operand,
  },
  MatchesPattern {
    field: Option<String>,
    pattern: String,
    options: Option<String>,
  },
  Geo {
    op: GeoOp,
    field: Option<String>,
    geometry: Operand,
    min_distance: Option<Operand>,
    max_distance: Option<Operand>,
  },
  ContainsAll {
    field: Option<String>,
    values: Operand,
  },
  ElementMatches {
    field: Option<String>,
    subqueries: Vec<Expression>,
  },
  ArraySizeIs {
    field: Option<String>,
    size: Operand,
  },
  Logical {
    op: LogicalOp,
    children: Vec<Expression>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
  Top,
  ElementMatch,
}

const ELEMENT: &str = "<element>";

fn require_field<'a>(field: &'a Option<String>, ctx: Context, operator: &str) -> Result<Option<&'a str>> {
  match (field.as_deref(), ctx) {
    (None, Context::Top) => Err(Error::MissingField {
      operator: operator.to_string(),
    }),
    (f, _) => Ok(f),
  }
}

fn wrap(field: Option<&str>, inner: Value) -> Value {
  match field {
    Some(f) => {
      let mut map = Map::new();
      map.insert(f.to_string(), inner);
      Value::Object(map)
    }
    None => inner,
  }
}

/// Cross-field form; it always needs the node's own field.
fn lift(field: Option<&str>, operator: &str, build: impl FnOnce(Value) -> Value) -> Result<Value> {
  let f = field.ok_or_else(|| Error::MissingField {
    operator: operator.to_string(),
  })?;
  Ok(json!({ "$expr": build(Value::String(format!("${}", f))) }))
}

fn numeric(operand: &Operand, field: Option<&str>, operator: &str) -> Result<()> {
  if operand.is_number() || operand.is_field() {
    Ok(())
  } else {
    Err(Error::InvalidOperandType {
      field: field.unwrap_or(ELEMENT).to_string(),
      operator: operator.to_string(),
      expected: "number",
      found: operand.kind(),
    })
  }
}

fn array_literal(operand: &Operand, field: Option<&str>, operator: &str) -> Result<Value> {
  match operand {
    Operand::Array(_) => operand.to_literal(field.unwrap_or(ELEMENT), operator),
    other => Err(Error::ArrayExpected {
      field: field.unwrap_or(ELEMENT).to_string(),
      operator: operator.to_string(),
      found: other.kind(),
    }),
  }
}

/// Merge a compiled fragment into an `$elemMatch` body.
///
/// Operator maps under the same field are combined when their operators are
/// disjoint. Any other key collision is appended to a `$and` list in the
/// body so no condition is lost.
fn merge_into(target: &mut Map<String, Value>, fragment: Value) {
  let Value::Object(fragment) = fragment else {
    return;
  };
  for (key, value) in fragment {
    let value = match target.get_mut(&key) {
      None => {
        target.insert(key, value);
        continue;
      }
      Some(Value::Object(existing)) if !key.starts_with('$') => match value {
        Value::Object(incoming) if incoming.keys().all(|k| !existing.contains_key(k)) => {
          existing.extend(incoming);
          continue;
        }
        other => other,
      },
      Some(_) => value,
    };
    let slot = target
      .entry("$and")
      .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(conjuncts) = slot {
      conjuncts.push(json!({ key: value }));
    }
  }
}

impl Expression {
  fn compile(&self, ctx: Context) -> Result<Value> {
    match self {
      Expression::Compare { op, field, value } => {
        let token = op.token();
        let field = require_field(field, ctx, token)?;
        if value.is_field() {
          return lift(field, token, |this| json!({ token: [this, value.to_expr()] }));
        }
        let literal = value.to_literal(field.unwrap_or(ELEMENT), token)?;
        Ok(wrap(field, json!({ token: literal })))
      }
      Expression::SetMembership { op, field, value } => {
        let token = op.token();
        let field = require_field(field, ctx, token)?;
        if value.is_field() {
          let other = value.to_expr();
          return lift(field, token, |this| match op {
            SetOp::In => json!({ "$in": [this, other] }),
            SetOp::Nin => json!({ "$not": [{ "$in": [this, other] }] }),
          });
        }
        let values = array_literal(value, field, token)?;
        Ok(wrap(field, json!({ token: values })))
      }
      Expression::Exists { field, present } => {
        let field = require_field(field, ctx, "$exists")?;
        Ok(wrap(field, json!({ "$exists": present })))
      }
      Expression::TypeIs { field, type_name } => {
        let field = require_field(field, ctx, "$type")?;
        if type_name.is_empty() {
          return Err(Error::InvalidOperandType {
            field: field.unwrap_or(ELEMENT).to_string(),
            operator: "$type".to_string(),
            expected: "type name",
            found: "empty string",
          });
        }
        Ok(wrap(field, json!({ "$type": type_name })))
      }
      Expression::Modulo {
        field,
        divisor,
        remainder,
      } => {
        let field = require_field(field, ctx, "$mod")?;
        numeric(divisor, field, "$mod")?;
        numeric(remainder, field, "$mod")?;
        if divisor.as_f64() == Some(0.0) {
          return Err(Error::DivisionByZero {
            field: field.unwrap_or(ELEMENT).to_string(),
            operator: "$mod".to_string(),
          });
        }
        if divisor.is_field() || remainder.is_field() {
          let (d, r) = (divisor.to_expr(), remainder.to_expr());
          return lift(field, "$mod", |this| {
            json!({ "$eq": [{ "$mod": [this, d] }, r] })
          });
        }
        Ok(wrap(
          field,
          json!({ "$mod": [divisor.to_expr(), remainder.to_expr()] }),
        ))
      }
      Expression::MatchesPattern {
        field,
        pattern,
        options,
      } => {
        let field = require_field(field, ctx, "$regex")?;
        let mut body = Map::new();
        body.insert("$regex".to_string(), json!(pattern));
        if let Some(options) = options {
          body.insert("$options".to_string(), json!(options));
        }
        Ok(wrap(field, Value::Object(body)))
      }
      Expression::Geo {
        op,
        field,
        geometry,
        min_distance,
        max_distance,
      } => Self::compile_geo(*op, field, geometry, min_distance, max_distance, ctx),
      Expression::ContainsAll { field, values } => {
        let field = require_field(field, ctx, "$all")?;
        if values.is_field() {
          let other = values.to_expr();
          return lift(field, "$all", |this| json!({ "$setIsSubset": [other, this] }));
        }
        let values = array_literal(values, field, "$all")?;
        Ok(wrap(field, json!({ "$all": values })))
      }
      Expression::ElementMatches { field, subqueries } => {
        let field = require_field(field, ctx, "$elemMatch")?;
        let mut body = Map::new();
        for sub in subqueries {
          merge_into(&mut body, sub.compile(Context::ElementMatch)?);
        }
        Ok(wrap(field, json!({ "$elemMatch": body })))
      }
      Expression::ArraySizeIs { field, size } => {
        let field = require_field(field, ctx, "$size")?;
        if size.is_field() {
          let other = size.to_expr();
          return lift(field, "$size", |this| {
            json!({ "$eq": [{ "$size": this }, other] })
          });
        }
        match size {
          Operand::Number(n) if n.is_u64() => Ok(wrap(field, json!({ "$size": n }))),
          other => Err(Error::InvalidOperandType {
            field: field.unwrap_or(ELEMENT).to_string(),
            operator: "$size".to_string(),
            expected: "non-negative integer",
            found: other.kind(),
          }),
        }
      }
      Expression::Logical { op, children } => {
        let compiled = children
          .iter()
          .map(|child| child.compile(ctx))
          .collect::<Result<Vec<_>>>()?;
        Ok(json!({ op.token(): compiled }))
      }
    }
  }

  fn compile_geo(
    op: GeoOp,
    field: &Option<String>,
    geometry: &Operand,
    min_distance: &Option<Operand>,
    max_distance: &Option<Operand>,
    ctx: Context,
  ) -> Result<Value> {
    let token = op.token();
    let field = require_field(field, ctx, token)?;
    let bounds: Vec<(&str, &Operand)> = [("$minDistance", min_distance), ("$maxDistance", max_distance)]
      .into_iter()
      .filter_map(|(name, bound)| bound.as_ref().map(|b| (name, b)))
      .collect();

    for (_, bound) in &bounds {
      if op != GeoOp::Near {
        return Err(Error::InvalidOperandType {
          field: field.unwrap_or(ELEMENT).to_string(),
          operator: token.to_string(),
          expected: "no distance bound",
          found: bound.kind(),
        });
      }
      numeric(bound, field, token)?;
    }

    if geometry.is_field() || bounds.iter().any(|(_, b)| b.is_field()) {
      if !geometry.is_field() {
        check_geometry(op, geometry, field)?;
      }
      let mut args = vec![geometry.to_expr()];
      args.extend(bounds.iter().map(|(_, b)| b.to_expr()));
      return lift(field, token, |this| {
        let mut all = vec![this];
        all.extend(args);
        json!({ token: all })
      });
    }

    let shape = check_geometry(op, geometry, field)?;
    let mut body = Map::new();
    body.insert("$geometry".to_string(), shape);
    for (name, bound) in bounds {
      body.insert(name.to_string(), bound.to_expr());
    }
    Ok(wrap(field, json!({ token: body })))
  }
}

fn check_geometry(op: GeoOp, geometry: &Operand, field: Option<&str>) -> Result<Value> {
  let token = op.token();
  if !matches!(geometry, Operand::Map(_)) {
    return Err(Error::InvalidOperandType {
      field: field.unwrap_or(ELEMENT).to_string(),
      operator: token.to_string(),
      expected: "geometry object",
      found: geometry.kind(),
    });
  }
  let shape = geometry.to_literal(field.unwrap_or(ELEMENT), token)?;
  let t = validate_geometry(&shape)?;
  if !op.accepts(t) {
    return Err(Error::UnsupportedGeometry {
      operator: token.to_string(),
      geometry_type: t.to_string(),
    });
  }
  Ok(shape)
}

/// Compile a list of expressions combined with an implicit AND.
pub fn compile(expressions: &[Expression]) -> Result<Value> {
  match expressions {
    [] => Ok(Value::Object(Map::new())),
    [single] => single.compile(Context::Top),
    many => Expression::Logical {
      op: LogicalOp::And,
      children: many.to_vec(),
    }
    .compile(Context::Top),
  }
}

/// Field expression builder for fluent filter construction
#[derive(Debug, Clone)]
pub struct Field {
  name: Option<String>,
}

impl Field {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: Some(name.into()),
    }
  }

  fn compare(self, op: CompareOp, value: impl Into<Operand>) -> Expression {
    Expression::Compare {
      op,
      field: self.name,
      value: value.into(),
    }
  }

  pub fn eq(self, value: impl Into<Operand>) -> Expression {
    self.compare(CompareOp::Eq, value)
  }

  pub fn ne(self, value: impl Into<Operand>) -> Expression {
    self.compare(CompareOp::Ne, value)
  }

  pub fn gt(self, value: impl Into<Operand>) -> Expression {
    self.compare(CompareOp::Gt, value)
  }

  pub fn gte(self, value: impl Into<Operand>) -> Expression {
    self.compare(CompareOp::Gte, value)
  }

  pub fn lt(self, value: impl Into<Operand>) -> Expression {
    self.compare(CompareOp::Lt, value)
  }

  pub fn lte(self, value: impl Into<Operand>) -> Expression {
    self.compare(CompareOp::Lte, value)
  }

  pub fn is_in(self, values: impl Into<Operand>) -> Expression {
    Expression::SetMembership {
      op: SetOp::In,
      field: self.name,
      value: values.into(),
    }
  }

  pub fn not_in(self, values: impl Into<Operand>) -> Expression {
    Expression::SetMembership {
      op: SetOp::Nin,
      field: self.name,
      value: values.into(),
    }
  }

  pub fn exists(self, present: bool) -> Expression {
    Expression::Exists {
      field: self.name,
      present,
    }
  }

  pub fn has_type(self, type_name: impl Into<String>) -> Expression {
    Expression::TypeIs {
      field: self.name,
      type_name: type_name.into(),
    }
  }

  pub fn modulo(self, divisor: impl Into<Operand>, remainder: impl Into<Operand>) -> Expression {
    Expression::Modulo {
      field: self.name,
      divisor: divisor.into(),
      remainder: remainder.into(),
    }
  }

  pub fn matches(self, pattern: impl Into<String>) -> Expression {
    Expression::MatchesPattern {
      field: self.name,
      pattern: pattern.into(),
      options: None,
    }
  }

  pub fn matches_with(self, pattern: impl Into<String>, options: impl Into<String>) -> Expression {
    Expression::MatchesPattern {
      field: self.name,
      pattern: pattern.into(),
      options: Some(options.into()),
    }
  }

  fn geo(self, op: GeoOp, geometry: impl Into<Operand>) -> Expression {
    Expression::Geo {
      op,
      field: self.name,
      geometry: geometry.into(),
      min_distance: None,
      max_distance: None,
    }
  }

  pub fn intersects(self, geometry: impl Into<Operand>) -> Expression {
    self.geo(GeoOp::Intersects, geometry)
  }

  pub fn within(self, geometry: impl Into<Operand>) -> Expression {
    self.geo(GeoOp::Within, geometry)
  }

  /// Proximity search around a point, with optional distance bounds in meters.
  pub fn near(
    self,
    point: impl Into<Operand>,
    min_distance: Option<f64>,
    max_distance: Option<f64>,
  ) -> Expression {
    Expression::Geo {
      op: GeoOp::Near,
      field: self.name,
      geometry: point.into(),
      min_distance: min_distance.map(Operand::from),
      max_distance: max_distance.map(Operand::from),
    }
  }

  pub fn contains_all(self, values: impl Into<Operand>) -> Expression {
    Expression::ContainsAll {
      field: self.name,
      values: values.into(),
    }
  }

  pub fn elem_match(self, subqueries: Vec<Expression>) -> Expression {
    Expression::ElementMatches {
      field: self.name,
      subqueries,
    }
  }

  pub fn size(self, size: impl Into<Operand>) -> Expression {
    Expression::ArraySizeIs {
      field: self.name,
      size: size.into(),
    }
  }
}

/// Create a field expression
pub fn field(name: impl Into<String>) -> Field {
  Field::new(name)
}

/// A field-less builder for predicates on array elements inside `elem_match`.
pub fn element() -> Field {
  Field { name: None }
}

/// Combine filters with AND
pub fn and(filters: Vec<Expression>) -> Expression {
  Expression::Logical {
    op: LogicalOp::And,
    children: filters,
  }
}

/// Combine filters with OR
pub fn or(filters: Vec<Expression>) -> Expression {
  Expression::Logical {
    op: LogicalOp::Or,
    children: filters,
  }
}

/// Match documents failing every filter
pub fn nor(filters: Vec<Expression>) -> Expression {
  Expression::Logical {
    op: LogicalOp::Nor,
    children: filters,
  }
}

/// Structured query object sent over the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructuredQuery {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub query: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub projection: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sort: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub limit: Option<usize>,
}

/// Query builder shared by one-shot queries and realtime listeners.
///
/// # Example
/// ```
/// use emberdb::query::{field, QueryBuilder, SortDir};
///
/// let query = QueryBuilder::new()
///     .find(field("age").gt(21))
///     .sort("name", SortDir::Asc)
///     .limit(10)
///     .compile_structured()
///     .unwrap();
/// assert!(query.query.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
  filters: Vec<Expression>,
  sort_specs: Vec<SortSpec>,
  projection: Option<Projection>,
  limit_value: Option<usize>,
}

impl QueryBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a filter condition; multiple filters are ANDed.
  pub fn find(mut self, filter: Expression) -> Self {
    self.filters.push(filter);
    self
  }

  /// Sort by field
  pub fn sort(mut self, field: impl Into<String>, direction: SortDir) -> Self {
    self.sort_specs.push(SortSpec {
      field: field.into(),
      direction,
    });
    self
  }

  pub fn project(mut self, projection: Projection) -> Self {
    self.projection = Some(projection);
    self
  }

  /// Limit number of results. Only one-shot queries honor it; listeners
  /// stream every matching change.
  pub fn limit(mut self, n: usize) -> Self {
    self.limit_value = Some(n);
    self
  }

  pub fn limit_value(&self) -> Option<usize> {
    self.limit_value
  }

  /// True when the server has to filter, sort or project anything.
  pub fn shapes_results(&self) -> bool {
    !self.filters.is_empty() || !self.sort_specs.is_empty() || self.projection.is_some()
  }

  pub fn compile_structured(&self) -> Result<StructuredQuery> {
    let query = if self.filters.is_empty() {
      None
    } else {
      Some(compile(&self.filters)?)
    };

    let sort = if self.sort_specs.is_empty() {
      None
    } else {
      Some(Value::Object(
        self.sort_specs
          .iter()
          .map(|s| (s.field.clone(), json!(s.direction.to_wire())))
          .collect(),
      ))
    };

    Ok(StructuredQuery {
      query,
      projection: self.projection.as_ref().map(Projection::to_wire),
      sort,
      limit: self.limit_value,
    })
  }
}
