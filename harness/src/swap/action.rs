use crate::{
    bitcoin,
    cnd::siren,
    ethereum::{self, Bytes, U256},
    ledger::{BitcoinNetwork, ChainId, LedgerKind},
    poll::PollConfig,
    quantity::Quantity,
    timestamp::Timestamp,
    wallet::{TransactionId, Wallets},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// The actions cnd offers on a swap resource, named as in the resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    Accept,
    Decline,
    Deploy,
    Fund,
    Redeem,
    Refund,
}

/// A transaction cnd asks the wallet of one ledger to perform.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "payload")]
pub enum LedgerAction {
    BitcoinSendAmountToAddress {
        to: ::bitcoin::Address,
        amount: Quantity,
        network: BitcoinNetwork,
    },
    BitcoinBroadcastSignedTransaction {
        hex: String,
        network: BitcoinNetwork,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_median_block_time: Option<Timestamp>,
    },
    EthereumDeployContract {
        data: Bytes,
        amount: Quantity,
        gas_limit: U256,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chain_id: Option<ChainId>,
    },
    EthereumCallContract {
        contract_address: ethereum::Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Bytes>,
        gas_limit: U256,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chain_id: Option<ChainId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_block_timestamp: Option<Timestamp>,
    },
}

impl LedgerAction {
    pub fn ledger(&self) -> LedgerKind {
        match self {
            LedgerAction::BitcoinSendAmountToAddress { .. }
            | LedgerAction::BitcoinBroadcastSignedTransaction { .. } => LedgerKind::Bitcoin,
            LedgerAction::EthereumDeployContract { .. }
            | LedgerAction::EthereumCallContract { .. } => LedgerKind::Ethereum,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LedgerAction::BitcoinSendAmountToAddress { .. } => "bitcoin-send-amount-to-address",
            LedgerAction::BitcoinBroadcastSignedTransaction { .. } => {
                "bitcoin-broadcast-signed-transaction"
            }
            LedgerAction::EthereumDeployContract { .. } => "ethereum-deploy-contract",
            LedgerAction::EthereumCallContract { .. } => "ethereum-call-contract",
        }
    }

    /// Applies an override that targets the ledger transaction itself.
    ///
    /// Overrides on action fields have been consumed while resolving the
    /// fields and are ignored here.
    pub fn apply(&mut self, override_: &Override) -> Result<(), OverrideNotApplicable> {
        match (self, override_) {
            (_, Override::FeePerWu(_)) => Ok(()),
            (
                LedgerAction::BitcoinSendAmountToAddress { amount, .. },
                Override::ScaleAmount { percent },
            )
            | (
                LedgerAction::EthereumDeployContract { amount, .. },
                Override::ScaleAmount { percent },
            ) => {
                *amount = amount.scale(*percent);
                Ok(())
            }
            (LedgerAction::EthereumDeployContract { gas_limit, .. }, Override::GasLimit(limit))
            | (LedgerAction::EthereumCallContract { gas_limit, .. }, Override::GasLimit(limit)) => {
                *gas_limit = *limit;
                Ok(())
            }
            (action, _) => Err(OverrideNotApplicable {
                override_: *override_,
                target: action.name().to_owned(),
            }),
        }
    }
}

/// A deliberate deviation from what cnd asks for, used to exercise the
/// protocol's handling of misbehaving parties.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Override {
    /// Send `percent` of the requested amount.
    ScaleAmount { percent: u32 },
    GasLimit(U256),
    /// Ask cnd for a transaction paying this fee rate.
    FeePerWu(u64),
}

impl Override {
    pub fn overfund() -> Self {
        Override::ScaleAmount { percent: 101 }
    }

    pub fn underfund() -> Self {
        Override::ScaleAmount { percent: 1 }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("{override_:?} cannot be applied to {target}")]
pub struct OverrideNotApplicable {
    pub override_: Override,
    pub target: String,
}

#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq)]
#[error("action {action} is not available on the swap")]
pub struct ActionNotAvailable {
    pub action: ActionKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActionOutcome {
    /// A ledger transaction was broadcast.
    Submitted(TransactionId),
    /// cnd took note of the action, nothing was sent to a ledger.
    Acknowledged,
}

impl ActionOutcome {
    pub fn transaction(&self) -> Option<&TransactionId> {
        match self {
            ActionOutcome::Submitted(transaction) => Some(transaction),
            ActionOutcome::Acknowledged => None,
        }
    }
}

/// How long to keep looking for an action that is not yet available.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActionConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for ActionConfig {
    fn default() -> Self {
        ActionConfig {
            timeout: Duration::from_secs(20),
            interval: Duration::from_secs(1),
        }
    }
}

impl From<ActionConfig> for PollConfig {
    fn from(config: ActionConfig) -> Self {
        PollConfig::every(config.interval).with_timeout(config.timeout)
    }
}

/// Fills in the fields an action declares with values from the actor's
/// wallets.
pub async fn resolve_fields(
    action: &siren::Action,
    wallets: &Wallets,
    overrides: &[Override],
) -> anyhow::Result<Vec<(String, String)>> {
    let fee_override = overrides.iter().find_map(|override_| match override_ {
        Override::FeePerWu(fee) => Some(*fee),
        _ => None,
    });
    let mut fee_field_seen = false;

    let mut resolved = Vec::with_capacity(action.fields.len());
    for field in &action.fields {
        let value = if field.has_classes(&["bitcoin", "feePerWU"]) {
            fee_field_seen = true;
            fee_override
                .unwrap_or(bitcoin::DEFAULT_FEE_PER_WU)
                .to_string()
        } else if field.has_classes(&["bitcoin", "address"]) {
            wallets.for_ledger(LedgerKind::Bitcoin)?.address().await?
        } else if field.has_classes(&["ethereum", "address"]) {
            wallets.for_ledger(LedgerKind::Ethereum)?.address().await?
        } else {
            match &field.value {
                Some(serde_json::Value::String(value)) => value.clone(),
                Some(value) => value.to_string(),
                None => anyhow::bail!(
                    "don't know how to fill field {} of class {:?} for action {}",
                    field.name,
                    field.class,
                    action.name
                ),
            }
        };

        resolved.push((field.name.clone(), value));
    }

    if let (Some(fee), false) = (fee_override, fee_field_seen) {
        return Err(OverrideNotApplicable {
            override_: Override::FeePerWu(fee),
            target: format!("action {}", action.name),
        }
        .into());
    }

    Ok(resolved)
}
