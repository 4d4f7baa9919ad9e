pub mod action;
pub mod state;

pub use self::{
    action::{ActionConfig, ActionKind, ActionNotAvailable, ActionOutcome, LedgerAction, Override},
    state::{
        CommunicationStatus, HtlcState, LedgerStateHistory, Role, Side, Status, SwapDetails,
        SwapStatus,
    },
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The location of a swap resource relative to a cnd's HTTP API.
///
/// Both parties' nodes serve the same swap under the same path, so a
/// reference obtained from one node can be resolved against the other.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SwapRef(String);

impl SwapRef {
    pub fn new(path: impl Into<String>) -> Self {
        SwapRef(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
