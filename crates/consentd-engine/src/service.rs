//! Consent service: the single writer of the consent record
//!
//! Every input (application updates, edge confirmations, configuration
//! changes, queries) enters one ordered mailbox. A single consumer boots the
//! state, then processes messages one at a time: merge, detect, persist,
//! publish. No two merges ever run against the same snapshot.
//!
//! Outputs:
//! - `ConsentEvent` over broadcast (consent response + edge forward)
//! - the published view over watch (shared state)
//! - saves to the persistence writer task

use crate::boot::{BootSequencer, ConsentState};
use crate::detector::{reconcile, Origin, Outcome};
use crate::persistence::{PersistenceGateway, PersistenceWriter};
use consentd_core::{apply_defaults, xdm, Clock, Consents, Error, Result, SystemClock};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// Every message the service accepts.
#[derive(Debug)]
pub enum ConsentMessage {
    /// Application update; the delta is forwarded to the edge on change.
    ExplicitUpdate(Consents),
    /// Edge consent preference response.
    RemoteConfirmation(Consents),
    /// New configuration defaults. Re-derives the view; never merged or persisted.
    ConfigChanged(Consents),
    /// Current defaulted view.
    GetQuery(oneshot::Sender<Consents>),
    /// Barrier: answered once everything queued earlier is processed and persisted.
    Sync(oneshot::Sender<()>),
    Shutdown,
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentEvent {
    /// Consent response: the full defaulted view after a change.
    Changed { consents: Consents },
    /// Edge update request: only what an explicit update changed.
    ForwardToEdge { consents: Consents },
}

impl ConsentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConsentEvent::Changed { .. } => "consent.response",
            ConsentEvent::ForwardToEdge { .. } => "edge.update_consent",
        }
    }

    pub fn consents(&self) -> &Consents {
        match self {
            ConsentEvent::Changed { consents } | ConsentEvent::ForwardToEdge { consents } => consents,
        }
    }

    /// `{ "consents": {...} }` event data.
    pub fn to_event_data(&self) -> Value {
        xdm::to_event_data(self.consents())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub mailbox_capacity: usize,
    pub event_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            event_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct ConsentService {
    mailbox: mpsc::Receiver<ConsentMessage>,
    events: broadcast::Sender<ConsentEvent>,
    shared: watch::Sender<Option<Consents>>,
    gateway: PersistenceGateway,
    clock: Arc<dyn Clock>,
    boot: Option<BootSequencer>,
    state: ConsentState,
}

impl ConsentService {
    /// Create the service and its handle. Nothing runs until [`ConsentService::run`];
    /// subscribe through the handle first to see the boot-time events.
    pub fn new(
        gateway: PersistenceGateway,
        defaults: Option<Consents>,
        config: ServiceConfig,
    ) -> (Self, ConsentHandle) {
        let (tx, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (shared, shared_rx) = watch::channel(None);

        let service = Self {
            mailbox,
            events: events.clone(),
            shared,
            gateway,
            clock: Arc::new(SystemClock),
            boot: Some(BootSequencer::new(defaults)),
            state: ConsentState::default(),
        };
        let handle = ConsentHandle {
            tx,
            events,
            shared: shared_rx,
        };
        (service, handle)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Boot, then process messages until Shutdown or every handle is dropped.
    pub async fn run(mut self) {
        if let Some(boot) = self.boot.take() {
            let shared = self.shared.clone();
            let events = self.events.clone();
            self.state = boot
                .run(&self.gateway, |view| {
                    shared.send_replace(Some(view.clone()));
                    if !view.is_empty() {
                        let _ = events.send(ConsentEvent::Changed {
                            consents: view.clone(),
                        });
                    }
                })
                .await;
        }

        let writer = self.gateway.spawn_writer();
        info!("ConsentService ready");

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                ConsentMessage::ExplicitUpdate(incoming) => {
                    self.handle_update(incoming, Origin::Explicit, &writer);
                }
                ConsentMessage::RemoteConfirmation(incoming) => {
                    self.handle_update(incoming, Origin::Remote, &writer);
                }
                ConsentMessage::ConfigChanged(defaults) => {
                    self.handle_config_changed(defaults);
                }
                ConsentMessage::GetQuery(reply) => {
                    let _ = reply.send(self.state.view.clone());
                }
                ConsentMessage::Sync(reply) => {
                    writer.flush().await;
                    let _ = reply.send(());
                }
                ConsentMessage::Shutdown => {
                    info!("ConsentService: received Shutdown");
                    break;
                }
            }
        }

        writer.flush().await;
        info!("ConsentService stopped");
    }

    fn handle_update(&mut self, incoming: Consents, origin: Origin, writer: &PersistenceWriter) {
        let outcome = reconcile(
            &self.state.stored,
            &incoming,
            &self.state.defaults,
            origin,
            self.clock.as_ref(),
        );

        let Outcome::Changed(r) = outcome else {
            debug!(?origin, categories = incoming.len(), "consents unchanged, nothing to do");
            return;
        };

        info!(?origin, categories = r.stored.len(), "consents changed");
        writer.save(r.stored.clone());
        self.state.stored = r.stored;
        self.publish(r.view);

        if let Some(delta) = r.forward {
            let _ = self.events.send(ConsentEvent::ForwardToEdge { consents: delta });
        }
    }

    fn handle_config_changed(&mut self, defaults: Consents) {
        self.state.defaults = defaults;
        let view = apply_defaults(&self.state.stored, &self.state.defaults);
        if view == self.state.view {
            debug!("default consents changed without affecting the published view");
            return;
        }
        info!(categories = self.state.defaults.len(), "default consents changed");
        self.publish(view);
    }

    fn publish(&mut self, view: Consents) {
        self.state.view = view.clone();
        self.shared.send_replace(Some(view.clone()));
        let _ = self.events.send(ConsentEvent::Changed { consents: view });
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheap, cloneable front door to a running service.
#[derive(Clone)]
pub struct ConsentHandle {
    tx: mpsc::Sender<ConsentMessage>,
    events: broadcast::Sender<ConsentEvent>,
    shared: watch::Receiver<Option<Consents>>,
}

impl ConsentHandle {
    async fn send(&self, msg: ConsentMessage) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| Error::ServiceClosed)
    }

    /// Update from `{ "consents": {...} }` event data. Null, empty and
    /// unrecognized payloads are dropped here and never reach the service.
    pub async fn update(&self, data: &Value) -> Result<()> {
        let has_content = data.as_object().is_some_and(|m| !m.is_empty());
        if !has_content {
            debug!("ignoring consent update with empty payload");
            return Ok(());
        }
        self.update_consents(xdm::from_event_data(data)).await
    }

    pub async fn update_consents(&self, consents: Consents) -> Result<()> {
        if consents.is_empty() {
            debug!("ignoring consent update without recognized categories");
            return Ok(());
        }
        self.send(ConsentMessage::ExplicitUpdate(consents)).await
    }

    /// Edge consent preference response (`{ "payload": [ {...} ] }`).
    pub async fn confirm(&self, data: &Value) -> Result<()> {
        self.confirm_consents(xdm::from_edge_response(data)).await
    }

    pub async fn confirm_consents(&self, consents: Consents) -> Result<()> {
        if consents.is_empty() {
            debug!("ignoring edge consent response without recognized categories");
            return Ok(());
        }
        self.send(ConsentMessage::RemoteConfirmation(consents)).await
    }

    /// Replace the configuration defaults (`{ "consents": {...} }`).
    pub async fn set_defaults(&self, data: &Value) -> Result<()> {
        self.set_default_consents(xdm::from_event_data(data)).await
    }

    pub async fn set_default_consents(&self, defaults: Consents) -> Result<()> {
        self.send(ConsentMessage::ConfigChanged(defaults)).await
    }

    /// Current defaulted view, after everything queued before this call.
    pub async fn current(&self) -> Result<Consents> {
        let (reply, rx) = oneshot::channel();
        self.send(ConsentMessage::GetQuery(reply)).await?;
        rx.await.map_err(|_| Error::ServiceClosed)
    }

    /// `{ "consents": {...} }`; the map is empty when nothing has been set.
    pub async fn get_consents(&self) -> Result<Value> {
        Ok(xdm::to_event_data(&self.current().await?))
    }

    /// Published shared state, `None` before boot.
    pub fn shared_state(&self) -> Option<Value> {
        self.shared.borrow().as_ref().map(xdm::to_event_data)
    }

    pub fn watch(&self) -> watch::Receiver<Option<Consents>> {
        self.shared.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsentEvent> {
        self.events.subscribe()
    }

    /// Wait until everything queued so far is processed and persisted.
    pub async fn sync(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ConsentMessage::Sync(reply)).await?;
        rx.await.map_err(|_| Error::ServiceClosed)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(ConsentMessage::Shutdown).await
    }
}
