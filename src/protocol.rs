//! Wire protocol types for EmberDB realtime listeners.
//!
//! Inbound frames are JSON objects, either
//! `{"operationType": "initial" | "update" | "delete", ...}` or `{"error": ...}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};
use crate::query::QueryBuilder;
use crate::reference::{CollectionReference, DocumentReference, Reference};

/// Key holding a document's id inside its wire object.
pub const ID_FIELD: &str = "_id";

/// Listen endpoint path segment.
pub const LISTEN_PATH: &str = "databases:listen";

/// Immutable document snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  reference: DocumentReference,
  data: Map<String, Value>,
}

impl Document {
  pub(crate) fn new(reference: DocumentReference, data: Map<String, Value>) -> Self {
    Self { reference, data }
  }

  pub fn reference(&self) -> &DocumentReference {
    &self.reference
  }

  pub fn id(&self) -> &str {
    self.reference.id()
  }

  pub fn data(&self) -> &Map<String, Value> {
    &self.data
  }

  /// Look up a dotted field path such as `address.city`.
  pub fn get(&self, path: &str) -> Option<&Value> {
    let mut parts = path.split('.');
    let mut current = self.data.get(parts.next()?)?;
    for part in parts {
      current = current.get(part)?;
    }
    Some(current)
  }

  /// Deserialize the document body into a typed value.
  pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
  }
}

/// Immutable collection snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
  reference: CollectionReference,
  documents: Vec<Document>,
}

impl Collection {
  pub(crate) fn new(reference: CollectionReference, documents: Vec<Document>) -> Self {
    Self {
      reference,
      documents,
    }
  }

  pub fn reference(&self) -> &CollectionReference {
    &self.reference
  }

  pub fn documents(&self) -> &[Document] {
    &self.documents
  }

  pub fn len(&self) -> usize {
    self.documents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.documents.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Document> {
    self.documents.iter()
  }
}

impl IntoIterator for Collection {
  type Item = Document;
  type IntoIter = std::vec::IntoIter<Document>;

  fn into_iter(self) -> Self::IntoIter {
    self.documents.into_iter()
  }
}

/// Change event types for subscriptions
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
  /// Full result set of a collection listener.
  InitialCollection(Collection),
  /// Current state of a document listener; `None` if it does not exist.
  InitialDocument(Option<Document>),
  Update {
    document: Document,
    changed_fields: Vec<String>,
    removed_fields: Vec<String>,
  },
  /// Only emitted by collection listeners.
  Delete { document_id: String },
}

/// Outcome of decoding one inbound frame.
#[derive(Debug)]
pub enum Decoded {
  Event(ChangeEvent),
  /// The frame carried an `error` member.
  ServerError(Error),
  /// Well-formed but meaningless for this listener's scope.
  Ignored(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OperationType {
  Initial,
  Update,
  Delete,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeDescription {
  #[serde(default)]
  updated_fields: Option<Value>,
  #[serde(default)]
  removed_fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataFrame {
  operation_type: OperationType,
  #[serde(default)]
  document: Option<Value>,
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  documents: Option<Vec<Value>>,
  #[serde(default)]
  change: Option<ChangeDescription>,
}

/// Outbound configuration frame, sent once right after the socket opens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationFrame {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub query: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub projection: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sort: Option<Value>,
}

impl ConfigurationFrame {
  /// `None` when the listener needs no server-side shaping. The query's
  /// limit is never carried.
  pub fn from_query(query: &QueryBuilder) -> Result<Option<Self>> {
    if let Some(limit) = query.limit_value() {
      tracing::debug!(limit, "Listener ignores the query limit");
    }
    if !query.shapes_results() {
      return Ok(None);
    }
    let compiled = query.compile_structured()?;
    Ok(Some(Self {
      query: compiled.query,
      projection: compiled.projection,
      sort: compiled.sort,
    }))
  }

  pub fn encode(&self) -> Result<String> {
    Ok(serde_json::to_string(self)?)
  }
}

fn server_error(error: Value) -> Error {
  let message = match &error {
    Value::String(s) => s.clone(),
    Value::Object(map) => map
      .get("message")
      .and_then(Value::as_str)
      .map(str::to_string)
      .unwrap_or_else(|| error.to_string()),
    other => other.to_string(),
  };
  Error::ServerReported {
    message,
    details: error,
  }
}

fn field_names(updated: Option<Value>) -> Vec<String> {
  match updated {
    Some(Value::Object(map)) => map.into_iter().map(|(k, _)| k).collect(),
    Some(Value::Array(items)) => items
      .into_iter()
      .filter_map(|v| v.as_str().map(str::to_string))
      .collect(),
    _ => Vec::new(),
  }
}

fn id_of(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn split_document(value: Value) -> Result<(Option<String>, Map<String, Value>)> {
  match value {
    Value::Object(mut data) => {
      let id = data.shift_remove(ID_FIELD).as_ref().and_then(id_of);
      Ok((id, data))
    }
    other => Err(Error::Serialization(format!(
      "document must be an object, found {}",
      crate::schema::kind_of(&other)
    ))),
  }
}

fn collection_document(collection: &CollectionReference, value: Value) -> Result<Document> {
  let (id, data) = split_document(value)?;
  let id = id.ok_or_else(|| {
    Error::Serialization(format!("document in '{}' has no {}", collection, ID_FIELD))
  })?;
  Ok(Document::new(collection.document(&id)?, data))
}

fn scoped_document(scope: &Reference, value: Value) -> Result<Document> {
  match scope {
    Reference::Collection(c) => collection_document(c, value),
    Reference::Document(d) => {
      let (_, data) = split_document(value)?;
      Ok(Document::new(d.clone(), data))
    }
  }
}

/// Decode a document returned by a one-shot read.
pub(crate) fn document_from_value(reference: &DocumentReference, value: Value) -> Result<Document> {
  let (_, data) = split_document(value)?;
  Ok(Document::new(reference.clone(), data))
}

/// Decode a collection body, either a bare array or `{"documents": [...]}`.
pub(crate) fn collection_from_value(reference: &CollectionReference, value: Value) -> Result<Collection> {
  let items = match value {
    Value::Array(items) => items,
    Value::Object(mut map) => match map.shift_remove("documents") {
      Some(Value::Array(items)) => items,
      Some(Value::Null) | None => Vec::new(),
      Some(other) => {
        return Err(Error::Serialization(format!(
          "documents must be an array, found {}",
          crate::schema::kind_of(&other)
        )))
      }
    },
    other => {
      return Err(Error::Serialization(format!(
        "collection body must be an array or object, found {}",
        crate::schema::kind_of(&other)
      )))
    }
  };
  let documents = items
    .into_iter()
    .map(|d| collection_document(reference, d))
    .collect::<Result<Vec<_>>>()?;
  Ok(Collection::new(reference.clone(), documents))
}

/// Decode a text frame for a listener on `scope`.
pub fn decode_frame(text: &str, scope: &Reference) -> Result<Decoded> {
  let mut value: Value = serde_json::from_str(text)?;

  if let Some(error) = value.as_object_mut().and_then(|m| m.shift_remove("error")) {
    if !error.is_null() {
      return Ok(Decoded::ServerError(server_error(error)));
    }
  }

  let frame: DataFrame = serde_json::from_value(value)?;
  let event = match (frame.operation_type, scope) {
    (OperationType::Initial, Reference::Collection(c)) => {
      let documents = frame
        .documents
        .unwrap_or_default()
        .into_iter()
        .map(|d| collection_document(c, d))
        .collect::<Result<Vec<_>>>()?;
      ChangeEvent::InitialCollection(Collection::new(c.clone(), documents))
    }
    (OperationType::Initial, Reference::Document(_)) => {
      let document = match frame.document {
        None | Some(Value::Null) => None,
        Some(d) => Some(scoped_document(scope, d)?),
      };
      ChangeEvent::InitialDocument(document)
    }
    (OperationType::Update, _) => {
      let document = frame
        .document
        .ok_or_else(|| Error::Serialization("update frame without document".to_string()))?;
      let change = frame.change.unwrap_or_default();
      ChangeEvent::Update {
        document: scoped_document(scope, document)?,
        changed_fields: field_names(change.updated_fields),
        removed_fields: change.removed_fields,
      }
    }
    (OperationType::Delete, Reference::Collection(_)) => {
      let document_id = frame
        .name
        .or_else(|| frame.document.as_ref().and_then(|d| d.get(ID_FIELD)).and_then(id_of))
        .ok_or_else(|| Error::Serialization("delete frame without name".to_string()))?;
      ChangeEvent::Delete { document_id }
    }
    (OperationType::Delete, Reference::Document(d)) => {
      return Ok(Decoded::Ignored(format!(
        "delete frame on document listener '{}'",
        d
      )));
    }
  };
  Ok(Decoded::Event(event))
}

/// Build `{base}/databases:listen/{databaseId}/{path}?...`.
pub fn listen_url(
  base: &Url,
  reference: &Reference,
  initial_full_result: bool,
  project_name: Option<&str>,
  will_query: bool,
) -> Result<Url> {
  let mut url = base.clone();
  url
    .path_segments_mut()
    .map_err(|_| Error::Config(format!("'{}' cannot be a base URL", base)))?
    .pop_if_empty()
    .push(LISTEN_PATH)
    .push(reference.database_id())
    .extend(reference.segments());

  {
    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    pairs.append_pair("initialFullResult", if initial_full_result { "true" } else { "false" });
    if let Some(project) = project_name {
      pairs.append_pair("projectName", project);
    }
    if will_query {
      pairs.append_pair("willQuery", "true");
    }
  }
  Ok(url)
}
