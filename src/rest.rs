//! One-shot REST transport
//!
//! Resources live under `{base}/databases/{databaseId}/{path}`. Updates are
//! sent as POST carrying a `PATCH` method-override header.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Request, StatusCode};
use serde_json::Value;
use url::Url;

use crate::client::AuthProvider;
use crate::error::{Error, Result};
use crate::protocol::{collection_from_value, document_from_value, Collection, Document};
use crate::query::QueryBuilder;
use crate::reference::{CollectionReference, DocumentReference, Reference};
use crate::update::UpdateSpec;

/// Header carrying the real HTTP method for updates.
pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

/// REST client for single reads and writes
#[derive(Debug, Clone)]
pub struct RestClient {
  http: Client,
  base_url: Url,
  auth: Arc<dyn AuthProvider>,
  project_name: Option<String>,
}

impl RestClient {
  pub fn new(
    http: Client,
    base_url: Url,
    auth: Arc<dyn AuthProvider>,
    project_name: Option<String>,
  ) -> Self {
    Self {
      http,
      base_url,
      auth,
      project_name,
    }
  }

  /// `{base}/databases/{databaseId}/{path}`
  pub fn resource_url(&self, reference: &Reference) -> Result<Url> {
    let mut url = self.base_url.clone();
    url.path_segments_mut()
      .map_err(|_| Error::Config(format!("'{}' cannot be a base URL", self.base_url)))?
      .pop_if_empty()
      .push("databases")
      .push(reference.database_id())
      .extend(reference.segments());
    Ok(url)
  }

  /// Start a request; the token is read fresh for every call.
  fn request(&self, method: Method, reference: &Reference) -> Result<reqwest::RequestBuilder> {
    let mut url = self.resource_url(reference)?;
    let token = self.auth.token();
    if token.is_none() {
      if let Some(project) = &self.project_name {
        url.query_pairs_mut().append_pair("projectName", project);
      }
    }

    let mut builder = self.http.request(method, url);
    if let Some(token) = token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| Error::Config(format!("invalid auth token: {}", e)))?;
      builder = builder.header(AUTHORIZATION, value);
    }
    Ok(builder)
  }

  /// Build the update request, or `None` when there is nothing to send.
  pub fn build_update(
    &self,
    document: &DocumentReference,
    update: &UpdateSpec,
  ) -> Result<Option<Request>> {
    let body = update.compile()?;
    if body.as_object().map_or(true, |m| m.is_empty()) {
      return Ok(None);
    }
    let request = self
      .request(Method::POST, &document.clone().into())?
      .header(METHOD_OVERRIDE_HEADER, "PATCH")
      .header(CONTENT_TYPE, "application/json")
      .body(serde_json::to_vec(&body)?)
      .build()?;
    Ok(Some(request))
  }

  /// Build a query request against a collection.
  pub fn build_query(&self, collection: &CollectionReference, query: &QueryBuilder) -> Result<Request> {
    let compiled = query.compile_structured()?;
    let mut builder = self.request(Method::GET, &collection.clone().into())?;
    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(q) = &compiled.query {
      params.push(("query", q.to_string()));
    }
    if let Some(sort) = &compiled.sort {
      params.push(("sort", sort.to_string()));
    }
    if let Some(projection) = &compiled.projection {
      params.push(("projection", projection.to_string()));
    }
    if let Some(limit) = compiled.limit {
      params.push(("limit", limit.to_string()));
    }
    if !params.is_empty() {
      builder = builder.query(&params);
    }
    Ok(builder.build()?)
  }

  /// Send a request and hand non-success responses to [`decode_error`].
  async fn execute(&self, request: Request) -> Result<reqwest::Response> {
    tracing::debug!("{} {}", request.method(), request.url().path());
    let response = self.http.execute(request).await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(decode_error(status, &body));
    }
    Ok(response)
  }

  /// Fetch a document; `None` if it does not exist.
  pub async fn get_document(&self, document: &DocumentReference) -> Result<Option<Document>> {
    let request = self.request(Method::GET, &document.clone().into())?.build()?;
    match self.execute(request).await {
      Ok(response) => {
        let value: Value = response.json().await?;
        Ok(Some(document_from_value(document, value)?))
      }
      Err(Error::Transport { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  pub async fn get_collection(&self, collection: &CollectionReference) -> Result<Collection> {
    let request = self.request(Method::GET, &collection.clone().into())?.build()?;
    let value: Value = self.execute(request).await?.json().await?;
    collection_from_value(collection, value)
  }

  pub async fn query(&self, collection: &CollectionReference, query: &QueryBuilder) -> Result<Collection> {
    let request = self.build_query(collection, query)?;
    let value: Value = self.execute(request).await?.json().await?;
    collection_from_value(collection, value)
  }

  /// Create or replace a document.
  pub async fn set_document(&self, document: &DocumentReference, data: &Value) -> Result<()> {
    if !data.is_object() {
      return Err(Error::Serialization(format!(
        "document body must be an object, found {}",
        crate::schema::kind_of(data)
      )));
    }
    let request = self
      .request(Method::PUT, &document.clone().into())?
      .json(data)
      .build()?;
    self.execute(request).await?;
    Ok(())
  }

  /// Store `data` under a freshly generated id.
  pub async fn add_document(&self, collection: &CollectionReference, data: &Value) -> Result<DocumentReference> {
    let document = collection.new_document();
    self.set_document(&document, data).await?;
    Ok(document)
  }

  /// Apply an update. An empty update makes no network call.
  pub async fn update_document(&self, document: &DocumentReference, update: &UpdateSpec) -> Result<()> {
    match self.build_update(document, update)? {
      Some(request) => {
        self.execute(request).await?;
        Ok(())
      }
      None => {
        tracing::trace!("Skipping empty update for {}", document);
        Ok(())
      }
    }
  }

  pub async fn delete_document(&self, document: &DocumentReference) -> Result<()> {
    let request = self.request(Method::DELETE, &document.clone().into())?.build()?;
    self.execute(request).await?;
    Ok(())
  }
}

/// Turn a non-success response into [`Error::Transport`].
///
/// Accepts `{"error": {"message": ...}}`, `{"error": "..."}`,
/// `{"message": "..."}` or plain text bodies.
pub fn decode_error(status: StatusCode, body: &str) -> Error {
  let message = serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| {
      let error = v.get("error").unwrap_or(&v);
      match error {
        Value::String(s) => Some(s.clone()),
        other => other.get("message").and_then(Value::as_str).map(str::to_string),
      }
    })
    .unwrap_or_else(|| {
      let trimmed = body.trim();
      if trimmed.is_empty() {
        status
          .canonical_reason()
          .unwrap_or("request failed")
          .to_string()
      } else {
        trimmed.chars().take(200).collect()
      }
    });
  Error::Transport {
    status: status.as_u16(),
    message,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_decode_error_shapes() {
    let err = decode_error(StatusCode::FORBIDDEN, r#"{"error": {"message": "denied"}}"#);
    assert_eq!(err.to_string(), "Transport error (403): denied");

    let err = decode_error(StatusCode::BAD_REQUEST, r#"{"error": "bad query"}"#);
    assert_eq!(err.to_string(), "Transport error (400): bad query");

    let err = decode_error(StatusCode::BAD_GATEWAY, "upstream down");
    assert_eq!(err.to_string(), "Transport error (502): upstream down");

    let err = decode_error(StatusCode::NOT_FOUND, "");
    assert_eq!(err.to_string(), "Transport error (404): Not Found");
  }
}
