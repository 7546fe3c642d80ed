//! Realtime subscription engine.
//!
//! Each subscription runs one task that owns its connection and dispatch
//! loop:
//!
//! ```text
//! Idle -> Connecting -> Open -> Streaming -> Reconnecting -> Connecting ...
//!                                        \-> Closed
//! ```
//!
//! Events reach the caller through a single ordered channel. The task
//! reports exactly one [`CloseReason`] when it reaches `Closed`, whichever
//! path led there.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::client::AuthProvider;
use crate::error::{Error, Result};
use crate::protocol::{decode_frame, listen_url, ChangeEvent, Decoded};
use crate::query::QueryBuilder;
use crate::reference::Reference;
use crate::transport::{Connection, Connector, TransportEvent};

/// Maximum reconnect delay, in backoff units.
pub const MAX_BACKOFF: u32 = 20;

/// Delay before reconnect attempt `attempt` (0-based): `min(20, 2^attempt)`.
pub fn reconnect_delay(attempt: u32) -> u32 {
  if attempt >= 5 {
    MAX_BACKOFF
  } else {
    (1u32 << attempt).min(MAX_BACKOFF)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
  Idle,
  Connecting,
  Open,
  Streaming,
  Reconnecting,
  Closed,
}

/// Why a subscription reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
  /// The server closed the connection normally.
  Completed,
  /// Abnormal close with automatic reconnect disabled.
  Disconnected(String),
  /// The first connection never opened.
  ConnectionFailed(String),
  /// Stopped by the caller.
  Stopped,
}

/// Options for a realtime listener.
#[derive(Debug, Clone, Default)]
pub struct ListenOptions {
  pub send_initial_data: bool,
  pub query: QueryBuilder,
  /// Overrides the client-wide reconnect setting.
  pub auto_reconnect: Option<bool>,
}

impl ListenOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_initial_data(mut self, send: bool) -> Self {
    self.send_initial_data = send;
    self
  }

  /// Filter, sort and project the stream server-side. A `limit` on the
  /// query is not sent; it only applies to one-shot queries.
  pub fn with_query(mut self, query: QueryBuilder) -> Self {
    self.query = query;
    self
  }

  pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
    self.auto_reconnect = Some(enabled);
    self
  }
}

/// Everything a subscription needs to (re)open its connection.
pub(crate) struct ListenTarget {
  pub reference: Reference,
  pub base_url: Url,
  pub initial_full_result: bool,
  pub will_query: bool,
  pub configuration: Option<String>,
  pub project_name: Option<String>,
  pub auto_reconnect: bool,
  pub backoff_unit: Duration,
  pub connector: Arc<dyn Connector>,
  pub auth: Arc<dyn AuthProvider>,
}

impl ListenTarget {
  /// Build the URL and read the token for one connection attempt.
  fn resolve(&self) -> Result<(Url, Option<String>)> {
    let token = self.auth.token();
    let project = if token.is_none() {
      self.project_name.as_deref()
    } else {
      None
    };
    let url = listen_url(
      &self.base_url,
      &self.reference,
      self.initial_full_result,
      project,
      self.will_query,
    )?;
    Ok((url, token))
  }
}

/// A live realtime subscription.
///
/// Read events with [`Subscription::next`] or as a [`Stream`]; the stream
/// ends once the subscription is closed. Dropping the handle stops it.
#[derive(Debug)]
pub struct Subscription {
  id: Uuid,
  events: mpsc::UnboundedReceiver<Result<ChangeEvent>>,
  state: watch::Receiver<SubscriptionState>,
  cancel: watch::Sender<bool>,
  closed_rx: Option<oneshot::Receiver<CloseReason>>,
  close_reason: Option<CloseReason>,
  task: Option<JoinHandle<()>>,
}

impl Subscription {
  /// Spawn the engine task. Must be called inside a tokio runtime.
  pub(crate) fn start(target: ListenTarget) -> Self {
    let id = Uuid::new_v4();
    let (events_tx, events) = mpsc::unbounded_channel();
    let (state_tx, state) = watch::channel(SubscriptionState::Idle);
    let (cancel, cancel_rx) = watch::channel(false);
    let (closed_tx, closed_rx) = oneshot::channel();

    let span = tracing::info_span!("subscription", id = %id, path = %target.reference);
    let engine = Engine {
      target,
      events: events_tx,
      state: state_tx,
      cancel: cancel_rx,
      first_opened: false,
      attempt: 0,
    };
    let task = tokio::spawn(engine.run(closed_tx).instrument(span));

    Self {
      id,
      events,
      state,
      cancel,
      closed_rx: Some(closed_rx),
      close_reason: None,
      task: Some(task),
    }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn state(&self) -> SubscriptionState {
    *self.state.borrow()
  }

  /// Next event, or `None` once the subscription is closed and drained.
  pub async fn next(&mut self) -> Option<Result<ChangeEvent>> {
    self.events.recv().await
  }

  /// Force the subscription to `Closed` without further reconnects.
  pub fn stop(&self) {
    self.cancel.send_replace(true);
  }

  /// Wait for the subscription to close and return why.
  pub async fn closed(&mut self) -> CloseReason {
    if let Some(reason) = &self.close_reason {
      return reason.clone();
    }
    let reason = match self.closed_rx.take() {
      Some(rx) => rx.await.unwrap_or(CloseReason::Stopped),
      None => CloseReason::Stopped,
    };
    if let Some(task) = self.task.take() {
      let _ = task.await;
    }
    self.close_reason = Some(reason.clone());
    reason
  }
}

impl Stream for Subscription {
  type Item = Result<ChangeEvent>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.get_mut().events.poll_recv(cx)
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.cancel.send_replace(true);
  }
}

enum Step {
  Reconnect,
  Close(CloseReason),
}

/// Resolves once the subscription is cancelled or its handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
  loop {
    if *cancel.borrow_and_update() {
      return;
    }
    if cancel.changed().await.is_err() {
      return;
    }
  }
}

struct Engine {
  target: ListenTarget,
  events: mpsc::UnboundedSender<Result<ChangeEvent>>,
  state: watch::Sender<SubscriptionState>,
  cancel: watch::Receiver<bool>,
  first_opened: bool,
  attempt: u32,
}

impl Engine {
  async fn run(mut self, closed: oneshot::Sender<CloseReason>) {
    let reason = self.drive().await;
    self.set_state(SubscriptionState::Closed);
    tracing::info!(?reason, "Subscription closed");
    // The sender is consumed here, so the close is reported exactly once.
    let _ = closed.send(reason);
  }

  fn set_state(&self, state: SubscriptionState) {
    tracing::debug!(?state, "Subscription state");
    self.state.send_replace(state);
  }

  fn is_cancelled(&self) -> bool {
    *self.cancel.borrow()
  }

  async fn drive(&mut self) -> CloseReason {
    loop {
      match self.connect_and_stream().await {
        Step::Close(reason) => return reason,
        Step::Reconnect => {
          self.set_state(SubscriptionState::Reconnecting);
          let delay = self.target.backoff_unit * reconnect_delay(self.attempt);
          self.attempt = self.attempt.saturating_add(1);
          tracing::warn!(attempt = self.attempt, ?delay, "Connection lost, reconnecting");

          let cancelled_during_backoff = tokio::select! {
            _ = cancelled(&mut self.cancel) => true,
            _ = tokio::time::sleep(delay) => false,
          };
          if cancelled_during_backoff {
            return CloseReason::Stopped;
          }
        }
      }
    }
  }

  async fn connect_and_stream(&mut self) -> Step {
    if self.is_cancelled() {
      return Step::Close(CloseReason::Stopped);
    }
    self.set_state(SubscriptionState::Connecting);

    let (url, token) = match self.target.resolve() {
      Ok(resolved) => resolved,
      Err(e) => {
        let reason = e.to_string();
        let _ = self.events.send(Err(e));
        return Step::Close(CloseReason::ConnectionFailed(reason));
      }
    };

    let connected = tokio::select! {
      _ = cancelled(&mut self.cancel) => None,
      result = self.target.connector.connect(&url, token) => Some(result),
    };
    let mut connection = match connected {
      None => return Step::Close(CloseReason::Stopped),
      Some(Ok(connection)) => connection,
      Some(Err(e)) => return self.lost(e.to_string()),
    };

    self.first_opened = true;
    self.set_state(SubscriptionState::Open);

    if let Some(frame) = &self.target.configuration {
      if let Err(e) = connection.send(frame.clone()).await {
        connection.close().await;
        return self.lost(e.to_string());
      }
    }
    self.set_state(SubscriptionState::Streaming);

    self.stream(connection.as_mut()).await
  }

  async fn stream(&mut self, connection: &mut dyn Connection) -> Step {
    loop {
      let event = tokio::select! {
        _ = cancelled(&mut self.cancel) => None,
        event = connection.recv() => Some(event),
      };
      match event {
        None => {
          connection.close().await;
          return Step::Close(CloseReason::Stopped);
        }
        Some(TransportEvent::Frame(text)) => {
          if !self.dispatch(&text) {
            connection.close().await;
            return Step::Close(CloseReason::Stopped);
          }
        }
        Some(TransportEvent::Closed { abnormal: false, reason }) => {
          tracing::debug!(%reason, "Server closed the connection");
          return Step::Close(CloseReason::Completed);
        }
        Some(TransportEvent::Closed { abnormal: true, reason }) => return self.lost(reason),
      }
    }
  }

  /// Decide what an abnormal close or failed connect leads to.
  fn lost(&mut self, reason: String) -> Step {
    if !self.first_opened {
      tracing::warn!(%reason, "Connection failed before opening");
      let _ = self.events.send(Err(Error::ConnectionFailed(reason.clone())));
      return Step::Close(CloseReason::ConnectionFailed(reason));
    }
    if self.target.auto_reconnect {
      Step::Reconnect
    } else {
      Step::Close(CloseReason::Disconnected(reason))
    }
  }

  /// Deliver one frame. Returns false once the caller is gone.
  fn dispatch(&mut self, text: &str) -> bool {
    let item = match decode_frame(text, &self.target.reference) {
      Ok(Decoded::Event(event)) => Ok(event),
      Ok(Decoded::ServerError(e)) => {
        tracing::warn!(error = %e, "Server reported an error");
        Err(e)
      }
      Ok(Decoded::Ignored(why)) => {
        tracing::debug!(%why, "Ignoring frame");
        return true;
      }
      Err(e) => {
        tracing::warn!(error = %e, "Malformed frame");
        Err(e)
      }
    };
    self.events.send(item).is_ok()
  }
}
