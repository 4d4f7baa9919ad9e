use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LedgerKind {
    Bitcoin,
    Ethereum,
    Lightning,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BitcoinNetwork {
    Mainnet,
    Testnet,
    Regtest,
}

impl From<BitcoinNetwork> for ::bitcoin::Network {
    fn from(network: BitcoinNetwork) -> Self {
        match network {
            BitcoinNetwork::Mainnet => ::bitcoin::Network::Bitcoin,
            BitcoinNetwork::Testnet => ::bitcoin::Network::Testnet,
            BitcoinNetwork::Regtest => ::bitcoin::Network::Regtest,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChainId(u32);

impl ChainId {
    /// The chain id of the development chain the ledger provisioning sets up.
    pub const DEV: ChainId = ChainId(17);
}

impl From<u32> for ChainId {
    fn from(id: u32) -> Self {
        ChainId(id)
    }
}

impl From<ChainId> for u32 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A ledger as it appears in a swap request, e.g. `{"name": "bitcoin",
/// "network": "regtest"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Ledger {
    Bitcoin { network: BitcoinNetwork },
    Ethereum { chain_id: ChainId },
    Lightning,
}

impl Ledger {
    pub fn kind(&self) -> LedgerKind {
        match self {
            Ledger::Bitcoin { .. } => LedgerKind::Bitcoin,
            Ledger::Ethereum { .. } => LedgerKind::Ethereum,
            Ledger::Lightning => LedgerKind::Lightning,
        }
    }
}

/// The network parameters the provisioned ledgers run with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerParameters {
    pub bitcoin_network: BitcoinNetwork,
    pub chain_id: ChainId,
}

impl Default for LedgerParameters {
    fn default() -> Self {
        LedgerParameters {
            bitcoin_network: BitcoinNetwork::Regtest,
            chain_id: ChainId::DEV,
        }
    }
}

/// Every ledger kind maps to exactly one network in a test environment.
pub fn default_ledger_description(kind: LedgerKind, parameters: &LedgerParameters) -> Ledger {
    match kind {
        LedgerKind::Bitcoin => Ledger::Bitcoin {
            network: parameters.bitcoin_network,
        },
        LedgerKind::Ethereum => Ledger::Ethereum {
            chain_id: parameters.chain_id,
        },
        LedgerKind::Lightning => Ledger::Lightning,
    }
}
