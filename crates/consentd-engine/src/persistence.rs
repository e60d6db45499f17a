//! Persistence gateway: load-at-boot and save-on-change of the undefaulted record
//!
//! Saves are fire-and-forget: the service hands records to a writer task over
//! an ordered channel and never awaits the store. Failures are logged, not retried.

use crate::store::ConsentStore;
use consentd_core::{xdm, Consents, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub const DATASTORE_NAME: &str = "com.adobe.edge.consent";
pub const CONSENT_PREFERENCES: &str = "consent:preferences";

#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn ConsentStore>,
    name: String,
    key: String,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn ConsentStore>) -> Self {
        Self::with_location(store, DATASTORE_NAME, CONSENT_PREFERENCES)
    }

    pub fn with_location(
        store: Arc<dyn ConsentStore>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            key: key.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted record. Missing, unreadable and corrupt blobs all load as `None`.
    pub async fn load(&self) -> Option<Consents> {
        let blob = match self.store.read(&self.name, &self.key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!(store = %self.name, key = %self.key, "failed to read persisted consents: {}", e);
                return None;
            }
        };
        match xdm::from_json_str(&blob) {
            Ok(consents) => Some(consents),
            Err(e) => {
                warn!(store = %self.name, key = %self.key, "discarding corrupt persisted consents: {}", e);
                None
            }
        }
    }

    /// Write the record, or clear the entry when it has no categories.
    pub async fn save(&self, consents: &Consents) -> Result<()> {
        if consents.is_empty() {
            debug!(store = %self.name, "clearing persisted consents");
            return self.store.remove(&self.name, &self.key).await;
        }
        let blob = xdm::to_json_string(consents)?;
        self.store.write(&self.name, &self.key, blob).await
    }

    /// Start the writer task that owns all saves from here on.
    pub fn spawn_writer(&self) -> PersistenceWriter {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistCommand>();
        let gateway = self.clone();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    PersistCommand::Save(consents) => {
                        if let Err(e) = gateway.save(&consents).await {
                            warn!(store = %gateway.name, key = %gateway.key, "failed to persist consents: {}", e);
                        }
                    }
                    PersistCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("persistence writer stopped");
        });
        PersistenceWriter { tx }
    }
}

enum PersistCommand {
    Save(Consents),
    Flush(oneshot::Sender<()>),
}

/// Sending half of the writer task.
#[derive(Clone)]
pub struct PersistenceWriter {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistenceWriter {
    pub fn save(&self, consents: Consents) {
        if self.tx.send(PersistCommand::Save(consents)).is_err() {
            warn!("persistence writer gone, dropping save");
        }
    }

    /// Resolves once every save queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(PersistCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}
