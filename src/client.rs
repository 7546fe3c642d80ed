//! Client facade and connection options.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Collection, ConfigurationFrame, Document};
use crate::query::QueryBuilder;
use crate::reference::{CollectionReference, DocumentReference, Reference};
use crate::rest::RestClient;
use crate::subscription::{ListenOptions, ListenTarget, Subscription};
use crate::transport::{Connector, WebSocketConnector};
use crate::update::UpdateSpec;

/// Supplies the bearer token. Called for every request and every
/// connection attempt, so rotating tokens take effect immediately.
pub trait AuthProvider: Send + Sync + fmt::Debug {
  fn token(&self) -> Option<String>;
}

/// A fixed token, or none for unauthenticated access.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth(pub Option<String>);

impl AuthProvider for StaticAuth {
  fn token(&self) -> Option<String> {
    self.0.clone()
  }
}

/// Client options
#[derive(Debug, Clone)]
pub struct ClientOptions {
  pub base_url: String,
  pub database_id: String,
  /// Defaults to `base_url` with a `ws`/`wss` scheme.
  pub realtime_url: Option<String>,
  /// Sent with unauthenticated requests.
  pub project_name: Option<String>,
  pub auth_token: Option<String>,
  pub auto_reconnect: bool,
  /// Length of one backoff step between reconnect attempts.
  pub backoff_unit: Duration,
  pub timeout: Duration,
  auth_provider: Option<Arc<dyn AuthProvider>>,
}

impl ClientOptions {
  pub fn new(base_url: impl Into<String>, database_id: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
      database_id: database_id.into(),
      realtime_url: None,
      project_name: None,
      auth_token: None,
      auto_reconnect: true,
      backoff_unit: Duration::from_secs(1),
      timeout: Duration::from_secs(30),
      auth_provider: None,
    }
  }

  pub fn with_auth(mut self, token: impl Into<String>) -> Self {
    self.auth_token = Some(token.into());
    self
  }

  /// Use a custom token source instead of a fixed token.
  pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
    self.auth_provider = Some(provider);
    self
  }

  pub fn with_project_name(mut self, project: impl Into<String>) -> Self {
    self.project_name = Some(project.into());
    self
  }

  pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
    self.realtime_url = Some(url.into());
    self
  }

  pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
    self.auto_reconnect = enabled;
    self
  }

  pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
    self.backoff_unit = unit;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn auth_provider(&self) -> Arc<dyn AuthProvider> {
    match &self.auth_provider {
      Some(provider) => provider.clone(),
      None => Arc::new(StaticAuth(self.auth_token.clone())),
    }
  }

  fn parsed_base_url(&self) -> Result<Url> {
    Ok(Url::parse(&self.base_url)?)
  }

  /// The realtime endpoint, derived from the base URL unless set.
  pub fn resolved_realtime_url(&self) -> Result<Url> {
    if let Some(url) = &self.realtime_url {
      return Ok(Url::parse(url)?);
    }
    let mut url = self.parsed_base_url()?;
    let scheme = match url.scheme() {
      "https" => "wss",
      "http" => "ws",
      "ws" | "wss" => return Ok(url),
      other => {
        return Err(Error::Config(format!(
          "unsupported URL scheme '{}' for realtime",
          other
        )))
      }
    };
    url
      .set_scheme(scheme)
      .map_err(|_| Error::Config(format!("cannot switch {} to {}", self.base_url, scheme)))?;
    Ok(url)
  }
}

/// EmberDB client
#[derive(Debug, Clone)]
pub struct EmberDb {
  options: ClientOptions,
  rest: RestClient,
  realtime_url: Url,
  connector: Arc<dyn Connector>,
}

impl EmberDb {
  pub fn new(options: ClientOptions) -> Result<Self> {
    if options.database_id.is_empty() {
      return Err(Error::Config("database id is empty".to_string()));
    }
    let http = reqwest::Client::builder().timeout(options.timeout).build()?;
    let rest = RestClient::new(
      http,
      options.parsed_base_url()?,
      options.auth_provider(),
      options.project_name.clone(),
    );
    let realtime_url = options.resolved_realtime_url()?;

    Ok(Self {
      options,
      rest,
      realtime_url,
      connector: Arc::new(WebSocketConnector),
    })
  }

  /// Replace the realtime transport.
  pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
    self.connector = connector;
    self
  }

  pub fn options(&self) -> &ClientOptions {
    &self.options
  }

  pub fn database_id(&self) -> &str {
    &self.options.database_id
  }

  pub fn rest(&self) -> &RestClient {
    &self.rest
  }

  pub fn collection(&self, path: &str) -> Result<CollectionReference> {
    CollectionReference::new(path, self.options.database_id.clone())
  }

  pub fn document(&self, path: &str) -> Result<DocumentReference> {
    DocumentReference::new(path, self.options.database_id.clone())
  }

  pub async fn get_document(&self, document: &DocumentReference) -> Result<Option<Document>> {
    self.rest.get_document(document).await
  }

  pub async fn get_collection(&self, collection: &CollectionReference) -> Result<Collection> {
    self.rest.get_collection(collection).await
  }

  pub async fn query(&self, collection: &CollectionReference, query: &QueryBuilder) -> Result<Collection> {
    self.rest.query(collection, query).await
  }

  pub async fn set_document(&self, document: &DocumentReference, data: &Value) -> Result<()> {
    self.rest.set_document(document, data).await
  }

  pub async fn add_document(&self, collection: &CollectionReference, data: &Value) -> Result<DocumentReference> {
    self.rest.add_document(collection, data).await
  }

  pub async fn update_document(&self, document: &DocumentReference, update: &UpdateSpec) -> Result<()> {
    self.rest.update_document(document, update).await
  }

  pub async fn delete_document(&self, document: &DocumentReference) -> Result<()> {
    self.rest.delete_document(document).await
  }

  /// Listen to a collection. Must be called inside a tokio runtime.
  pub fn listen_collection(&self, collection: &CollectionReference, options: ListenOptions) -> Result<Subscription> {
    self.listen(collection.clone().into(), options)
  }

  /// Listen to a single document. Must be called inside a tokio runtime.
  pub fn listen_document(&self, document: &DocumentReference, options: ListenOptions) -> Result<Subscription> {
    self.listen(document.clone().into(), options)
  }

  fn listen(&self, reference: Reference, options: ListenOptions) -> Result<Subscription> {
    if reference.database_id() != self.options.database_id {
      return Err(Error::invalid_reference(
        reference.path(),
        format!(
          "belongs to database '{}', client is bound to '{}'",
          reference.database_id(),
          self.options.database_id
        ),
      ));
    }
    let configuration = ConfigurationFrame::from_query(&options.query)?
      .map(|frame| frame.encode())
      .transpose()?;

    Ok(Subscription::start(ListenTarget {
      reference,
      base_url: self.realtime_url.clone(),
      initial_full_result: options.send_initial_data,
      will_query: configuration.is_some(),
      configuration,
      project_name: self.options.project_name.clone(),
      auto_reconnect: options.auto_reconnect.unwrap_or(self.options.auto_reconnect),
      backoff_unit: self.options.backoff_unit,
      connector: self.connector.clone(),
      auth: self.options.auth_provider(),
    }))
  }
}
