pub mod lnd;
mod node;

pub use self::node::{launch, Lnd};

use crate::{process::Process, quantity::Quantity, wallet::Wallet};
use serde::Deserialize;
use std::{fmt, sync::Arc};

/// The operations a scenario needs from a lightning node beyond what every
/// wallet offers.
#[async_trait::async_trait]
pub trait LightningNode: fmt::Debug + Send + Sync {
    async fn identity(&self) -> anyhow::Result<NodeIdentity>;

    async fn connect_peer(&self, peer: &NodeIdentity) -> anyhow::Result<()>;

    /// Opens a channel funded from this node's on-chain wallet and returns
    /// once it is active.
    async fn open_channel(&self, peer: &NodeIdentity, capacity: &Quantity) -> anyhow::Result<()>;

    async fn add_invoice(&self, amount: &Quantity) -> anyhow::Result<Invoice>;

    async fn pay(&self, payment_request: &str) -> anyhow::Result<()>;

    async fn lookup_invoice(&self, payment_hash: &str) -> anyhow::Result<InvoiceState>;
}

/// How other nodes reach a lightning node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdentity {
    pub pubkey: String,
    pub p2p_socket: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invoice {
    pub payment_request: String,
    /// Hex encoded.
    pub payment_hash: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceState {
    Open,
    Settled,
    Canceled,
    Accepted,
}

/// A lightning node seen both as a wallet and as a node.
#[derive(Clone)]
pub struct Lightning {
    pub wallet: Arc<dyn Wallet>,
    pub node: Arc<dyn LightningNode>,
}

impl fmt::Debug for Lightning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lightning").field("node", &self.node).finish()
    }
}

/// A lightning node together with the process that runs it.
#[derive(Clone, Debug)]
pub struct LightningHandle {
    pub lightning: Lightning,
    pub process: Arc<dyn Process>,
}
