use crate::{actor::ActorName, ethereum, ledger::LedgerKind, quantity::Quantity};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum_macros::{Display, EnumIter, EnumString};

/// Decimal places of the ERC20 token the test environment deploys.
pub const TOKEN_DECIMALS: u32 = 18;

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
pub enum AssetKind {
    Bitcoin,
    Ether,
    Erc20,
}

impl AssetKind {
    /// The ledger an asset is traded on if the scenario doesn't say otherwise.
    pub fn default_ledger(self) -> LedgerKind {
        match self {
            AssetKind::Bitcoin => LedgerKind::Bitcoin,
            AssetKind::Ether | AssetKind::Erc20 => LedgerKind::Ethereum,
        }
    }

    /// Whether transaction fees on `ledger` are paid in this asset.
    pub fn pays_fees_on(self, ledger: LedgerKind) -> bool {
        match (self, ledger) {
            (AssetKind::Bitcoin, LedgerKind::Bitcoin)
            | (AssetKind::Bitcoin, LedgerKind::Lightning)
            | (AssetKind::Ether, LedgerKind::Ethereum) => true,
            _ => false,
        }
    }
}

/// Identifies a balance an actor tracks.
///
/// The same asset can appear on different ledgers (bitcoin on-chain vs.
/// bitcoin over lightning) so the ledger is part of the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetKey {
    pub asset: AssetKind,
    pub ledger: LedgerKind,
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asset, self.ledger)
    }
}

impl FromStr for AssetKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ':');
        let asset = parts.next().unwrap_or_default();
        let ledger = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("asset key {} lacks a ledger", s))?;

        Ok(AssetKey {
            asset: asset.parse()?,
            ledger: ledger.parse()?,
        })
    }
}

/// An asset as it appears in a swap request, e.g. `{"name": "bitcoin",
/// "quantity": "100000000"}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Asset {
    #[serde(rename = "name")]
    pub kind: AssetKind,
    #[serde(skip)]
    pub ledger: LedgerKind,
    pub quantity: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_contract: Option<ethereum::Address>,
}

impl Asset {
    pub fn key(&self) -> AssetKey {
        AssetKey {
            asset: self.kind,
            ledger: self.ledger,
        }
    }

    pub fn with_quantity(&self, quantity: Quantity) -> Asset {
        Asset {
            quantity,
            ..self.clone()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum UnresolvableMapping {
    #[error("{asset} cannot be traded on {ledger}")]
    AssetOnLedger {
        asset: AssetKind,
        ledger: LedgerKind,
    },
    #[error("no token contract is configured for {0}")]
    MissingTokenContract(AssetKind),
}

/// Default quantities depend on who the counterparty is so that two
/// counterparties minting the same asset end up with distinguishable amounts.
pub fn default_quantity(
    asset: AssetKind,
    ledger: LedgerKind,
    counterparty: ActorName,
) -> Result<Quantity, UnresolvableMapping> {
    let quantity = match (asset, ledger, counterparty) {
        (AssetKind::Bitcoin, LedgerKind::Bitcoin, ActorName::Charlie) => {
            Quantity::from_sat(200_000_000)
        }
        (AssetKind::Bitcoin, LedgerKind::Bitcoin, _) => Quantity::from_sat(100_000_000),
        // lnd refuses channels above 0.16 BTC and we open 1.5 times the quantity
        (AssetKind::Bitcoin, LedgerKind::Lightning, ActorName::Charlie) => {
            Quantity::from_sat(11_000_000)
        }
        (AssetKind::Bitcoin, LedgerKind::Lightning, _) => Quantity::from_sat(10_000_000),
        (AssetKind::Ether, LedgerKind::Ethereum, ActorName::Charlie) => Quantity::ether(20),
        (AssetKind::Ether, LedgerKind::Ethereum, _) => Quantity::ether(10),
        (AssetKind::Erc20, LedgerKind::Ethereum, ActorName::Charlie) => {
            Quantity::from_units(200, TOKEN_DECIMALS)
        }
        (AssetKind::Erc20, LedgerKind::Ethereum, _) => Quantity::from_units(100, TOKEN_DECIMALS),
        (AssetKind::Bitcoin, LedgerKind::Ethereum, _)
        | (AssetKind::Ether, LedgerKind::Bitcoin, _)
        | (AssetKind::Ether, LedgerKind::Lightning, _)
        | (AssetKind::Erc20, LedgerKind::Bitcoin, _)
        | (AssetKind::Erc20, LedgerKind::Lightning, _) => {
            return Err(UnresolvableMapping::AssetOnLedger { asset, ledger })
        }
    };

    Ok(quantity)
}

pub fn default_asset_description(
    asset: AssetKind,
    ledger: LedgerKind,
    counterparty: ActorName,
    token_contract: Option<ethereum::Address>,
) -> Result<Asset, UnresolvableMapping> {
    let quantity = default_quantity(asset, ledger, counterparty)?;

    let token_contract = match asset {
        AssetKind::Erc20 => Some(
            token_contract.ok_or(UnresolvableMapping::MissingTokenContract(asset))?,
        ),
        AssetKind::Bitcoin | AssetKind::Ether => None,
    };

    Ok(Asset {
        kind: asset,
        ledger,
        quantity,
        token_contract,
    })
}
