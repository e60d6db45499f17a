//! Boot sequencer: load, default, publish, in that order, exactly once
//!
//! Uninitialized → Loaded → Defaulted → Ready. A step requested out of order
//! is logged and ignored; there is no way back.

use crate::persistence::PersistenceGateway;
use consentd_core::{apply_defaults, Consents};
use tracing::{info, warn};

/// The state cell the service owns once boot is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentState {
    /// Undefaulted truth: explicit updates and edge confirmations only.
    pub stored: Consents,
    /// Active configuration defaults.
    pub defaults: Consents,
    /// `stored` with `defaults` overlaid; what is published.
    pub view: Consents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootPhase {
    Uninitialized,
    Loaded { stored: Consents },
    Defaulted { stored: Consents, view: Consents },
    Ready,
}

pub struct BootSequencer {
    phase: BootPhase,
    defaults: Consents,
}

impl BootSequencer {
    pub fn new(defaults: Option<Consents>) -> Self {
        Self {
            phase: BootPhase::Uninitialized,
            defaults: defaults.unwrap_or_default(),
        }
    }

    pub fn phase(&self) -> &BootPhase {
        &self.phase
    }

    /// Uninitialized → Loaded. A missing or unreadable record loads as empty.
    pub async fn load(&mut self, gateway: &PersistenceGateway) {
        if self.phase != BootPhase::Uninitialized {
            warn!("boot: load requested in phase {:?}, ignoring", self.phase);
            return;
        }
        let stored = gateway.load().await.unwrap_or_default();
        info!(categories = stored.len(), "boot: loaded persisted consents");
        self.phase = BootPhase::Loaded { stored };
    }

    /// Loaded → Defaulted.
    pub fn apply_defaults(&mut self) {
        match std::mem::replace(&mut self.phase, BootPhase::Uninitialized) {
            BootPhase::Loaded { stored } => {
                let view = apply_defaults(&stored, &self.defaults);
                self.phase = BootPhase::Defaulted { stored, view };
            }
            other => {
                warn!("boot: apply_defaults requested in phase {:?}, ignoring", other);
                self.phase = other;
            }
        }
    }

    /// Defaulted → Ready. `publish` always runs, even for an empty view.
    pub fn publish(&mut self, publish: impl FnOnce(&Consents)) -> Option<ConsentState> {
        match std::mem::replace(&mut self.phase, BootPhase::Uninitialized) {
            BootPhase::Defaulted { stored, view } => {
                publish(&view);
                self.phase = BootPhase::Ready;
                info!(categories = view.len(), "boot: published initial consents");
                Some(ConsentState {
                    stored,
                    defaults: self.defaults.clone(),
                    view,
                })
            }
            other => {
                warn!("boot: publish requested in phase {:?}, ignoring", other);
                self.phase = other;
                None
            }
        }
    }

    /// Drive the whole sequence.
    pub async fn run(
        mut self,
        gateway: &PersistenceGateway,
        publish: impl FnOnce(&Consents),
    ) -> ConsentState {
        self.load(gateway).await;
        self.apply_defaults();
        self.publish(publish).unwrap_or_default()
    }
}
