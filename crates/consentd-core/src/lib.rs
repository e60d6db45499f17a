//! consentd core - consent record model, XDM codec, merge and default overlay

pub mod defaults;
pub mod error;
pub mod merge;
pub mod types;
pub mod xdm;

pub use defaults::apply_defaults;
pub use error::{Error, Result};
pub use merge::{merge, Clock, FixedClock, SystemClock};
pub use types::*;
