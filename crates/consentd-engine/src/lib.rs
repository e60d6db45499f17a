//! consentd engine - single-writer consent service with persistence and change signals

pub mod boot;
pub mod detector;
pub mod persistence;
pub mod service;
pub mod store;

pub use boot::{BootPhase, BootSequencer, ConsentState};
pub use detector::{detect, reconcile, Origin, Outcome, Reconciliation};
pub use persistence::{PersistenceGateway, PersistenceWriter, CONSENT_PREFERENCES, DATASTORE_NAME};
pub use service::{ConsentEvent, ConsentHandle, ConsentMessage, ConsentService, ServiceConfig};
pub use store::{ConsentStore, FileStore, MemoryStore};
