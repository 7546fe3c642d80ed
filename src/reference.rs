//! Document and collection references.
//!
//! A reference is a pure value: a list of non-empty path segments plus the
//! database it lives in. Collection paths have an odd number of segments,
//! document paths an even number. Nothing here performs I/O.

use std::fmt;

use crate::error::{Error, Result};

fn split_path(path: &str) -> Result<Vec<String>> {
  if path.is_empty() {
    return Err(Error::invalid_reference(path, "path is empty"));
  }
  let segments: Vec<String> = path.split('/').map(str::to_string).collect();
  check_segments(path, &segments)?;
  Ok(segments)
}

fn check_segments(path: &str, segments: &[String]) -> Result<()> {
  if segments.is_empty() {
    return Err(Error::invalid_reference(path, "path is empty"));
  }
  if let Some(pos) = segments.iter().position(|s| s.is_empty()) {
    return Err(Error::invalid_reference(
      path,
      format!("segment {} is empty", pos),
    ));
  }
  if let Some(pos) = segments.iter().position(|s| s.contains('/')) {
    return Err(Error::invalid_reference(
      path,
      format!("segment {} contains '/'", pos),
    ));
  }
  Ok(())
}

fn check_id(parent: &str, id: &str) -> Result<()> {
  if id.is_empty() {
    return Err(Error::invalid_reference(parent, "child id is empty"));
  }
  if id.contains('/') {
    return Err(Error::invalid_reference(
      parent,
      format!("child id '{}' contains '/'", id),
    ));
  }
  Ok(())
}

/// Reference to a single document (even segment count).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentReference {
  segments: Vec<String>,
  database_id: String,
}

/// Reference to a collection (odd segment count).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionReference {
  segments: Vec<String>,
  database_id: String,
}

impl DocumentReference {
  /// Parse a slash-separated document path such as `users/alice`.
  pub fn new(path: &str, database_id: impl Into<String>) -> Result<Self> {
    Self::from_segments(split_path(path)?, database_id)
  }

  pub fn from_segments(segments: Vec<String>, database_id: impl Into<String>) -> Result<Self> {
    let joined = segments.join("/");
    check_segments(&joined, &segments)?;
    if segments.len() % 2 != 0 {
      return Err(Error::invalid_reference(
        joined,
        format!(
          "document paths need an even number of segments, got {}",
          segments.len()
        ),
      ));
    }
    Ok(Self {
      segments,
      database_id: database_id.into(),
    })
  }

  pub fn id(&self) -> &str {
    // Construction guarantees at least two segments.
    self.segments.last().map(String::as_str).unwrap_or_default()
  }

  pub fn segments(&self) -> &[String] {
    &self.segments
  }

  pub fn path(&self) -> String {
    self.segments.join("/")
  }

  pub fn database_id(&self) -> &str {
    &self.database_id
  }

  /// The collection this document lives in.
  pub fn parent(&self) -> CollectionReference {
    CollectionReference {
      segments: self.segments[..self.segments.len() - 1].to_vec(),
      database_id: self.database_id.clone(),
    }
  }

  /// A sub-collection of this document.
  pub fn collection(&self, id: &str) -> Result<CollectionReference> {
    check_id(&self.path(), id)?;
    let mut segments = self.segments.clone();
    segments.push(id.to_string());
    Ok(CollectionReference {
      segments,
      database_id: self.database_id.clone(),
    })
  }
}

impl CollectionReference {
  /// Parse a slash-separated collection path such as `users` or `users/alice/posts`.
  pub fn new(path: &str, database_id: impl Into<String>) -> Result<Self> {
    Self::from_segments(split_path(path)?, database_id)
  }

  pub fn from_segments(segments: Vec<String>, database_id: impl Into<String>) -> Result<Self> {
    let joined = segments.join("/");
    check_segments(&joined, &segments)?;
    if segments.len() % 2 != 1 {
      return Err(Error::invalid_reference(
        joined,
        format!(
          "collection paths need an odd number of segments, got {}",
          segments.len()
        ),
      ));
    }
    Ok(Self {
      segments,
      database_id: database_id.into(),
    })
  }

  pub fn id(&self) -> &str {
    self.segments.last().map(String::as_str).unwrap_or_default()
  }

  pub fn segments(&self) -> &[String] {
    &self.segments
  }

  pub fn path(&self) -> String {
    self.segments.join("/")
  }

  pub fn database_id(&self) -> &str {
    &self.database_id
  }

  /// The owning document for sub-collections, `None` for root collections.
  pub fn parent(&self) -> Option<DocumentReference> {
    if self.segments.len() < 3 {
      return None;
    }
    Some(DocumentReference {
      segments: self.segments[..self.segments.len() - 1].to_vec(),
      database_id: self.database_id.clone(),
    })
  }

  pub fn document(&self, id: &str) -> Result<DocumentReference> {
    check_id(&self.path(), id)?;
    let mut segments = self.segments.clone();
    segments.push(id.to_string());
    Ok(DocumentReference {
      segments,
      database_id: self.database_id.clone(),
    })
  }

  /// A document reference with a freshly generated id.
  pub fn new_document(&self) -> DocumentReference {
    let mut segments = self.segments.clone();
    segments.push(uuid::Uuid::new_v4().simple().to_string());
    DocumentReference {
      segments,
      database_id: self.database_id.clone(),
    }
  }
}

/// Either kind of reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
  Document(DocumentReference),
  Collection(CollectionReference),
}

impl Reference {
  /// Parse a path, choosing the kind from its segment parity.
  pub fn parse(path: &str, database_id: impl Into<String>) -> Result<Self> {
    let segments = split_path(path)?;
    if segments.len() % 2 == 0 {
      DocumentReference::from_segments(segments, database_id).map(Self::Document)
    } else {
      CollectionReference::from_segments(segments, database_id).map(Self::Collection)
    }
  }

  pub fn id(&self) -> &str {
    match self {
      Self::Document(r) => r.id(),
      Self::Collection(r) => r.id(),
    }
  }

  pub fn segments(&self) -> &[String] {
    match self {
      Self::Document(r) => r.segments(),
      Self::Collection(r) => r.segments(),
    }
  }

  pub fn path(&self) -> String {
    self.segments().join("/")
  }

  pub fn database_id(&self) -> &str {
    match self {
      Self::Document(r) => r.database_id(),
      Self::Collection(r) => r.database_id(),
    }
  }

  pub fn is_document(&self) -> bool {
    matches!(self, Self::Document(_))
  }

  pub fn parent(&self) -> Option<Reference> {
    match self {
      Self::Document(r) => Some(Self::Collection(r.parent())),
      Self::Collection(r) => r.parent().map(Self::Document),
    }
  }

  /// Append a segment, flipping the reference kind.
  pub fn child(&self, id: &str) -> Result<Reference> {
    match self {
      Self::Document(r) => r.collection(id).map(Self::Collection),
      Self::Collection(r) => r.document(id).map(Self::Document),
    }
  }
}

impl From<DocumentReference> for Reference {
  fn from(r: DocumentReference) -> Self {
    Self::Document(r)
  }
}

impl From<CollectionReference> for Reference {
  fn from(r: CollectionReference) -> Self {
    Self::Collection(r)
  }
}

impl fmt::Display for DocumentReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.path())
  }
}

impl fmt::Display for CollectionReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.path())
  }
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.path())
  }
}
