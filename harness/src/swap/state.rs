use crate::{cnd::siren, timestamp::Timestamp};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

pub type SwapDetails = siren::Entity<SwapProperties>;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SwapProperties {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    pub status: SwapStatus,
    #[serde(default)]
    pub state: Option<SwapState>,
}

impl SwapProperties {
    pub fn state(&self) -> anyhow::Result<&SwapState> {
        self.state
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("swap {} was served without its state", self.id))
    }
}

/// The party a cnd node plays in a swap. Alice is the one who sent the
/// request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
pub enum Role {
    Alice,
    Bob,
}

impl Role {
    /// The side this role locks up its asset on.
    pub fn funding_side(self) -> Side {
        match self {
            Role::Alice => Side::Alpha,
            Role::Bob => Side::Beta,
        }
    }

    /// The side this role receives its asset on.
    pub fn redeeming_side(self) -> Side {
        match self {
            Role::Alice => Side::Beta,
            Role::Bob => Side::Alpha,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Alpha,
    Beta,
}

/// What cnd itself reports as the overall status of a swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapStatus {
    InProgress,
    Swapped,
    NotSwapped,
    InternalFailure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CommunicationStatus {
    Sent,
    Accepted,
    Declined,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HtlcState {
    NotDeployed,
    Deployed,
    Funded,
    IncorrectlyFunded,
    Redeemed,
    Refunded,
}

impl HtlcState {
    fn stage(self) -> u8 {
        match self {
            HtlcState::NotDeployed => 0,
            HtlcState::Deployed => 1,
            HtlcState::Funded => 2,
            HtlcState::IncorrectlyFunded | HtlcState::Redeemed | HtlcState::Refunded => 3,
        }
    }

    /// Whether a ledger observed in `self` may later be observed in `next`.
    ///
    /// States only move forward. An incorrectly funded HTLC can still be
    /// refunded, every other final state is terminal.
    pub fn may_become(self, next: HtlcState) -> bool {
        self == next
            || next.stage() > self.stage()
            || (self == HtlcState::IncorrectlyFunded && next == HtlcState::Refunded)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SwapState {
    pub communication: Communication,
    pub alpha_ledger: LedgerState,
    pub beta_ledger: LedgerState,
}

impl SwapState {
    pub fn ledger(&self, side: Side) -> HtlcState {
        match side {
            Side::Alpha => self.alpha_ledger.status,
            Side::Beta => self.beta_ledger.status,
        }
    }

    pub fn expiry(&self, side: Side) -> Timestamp {
        match side {
            Side::Alpha => self.communication.alpha_expiry,
            Side::Beta => self.communication.beta_expiry,
        }
    }

    pub fn status(&self) -> Status {
        Status::derive(
            self.communication.status,
            self.alpha_ledger.status,
            self.beta_ledger.status,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Communication {
    pub status: CommunicationStatus,
    pub alpha_expiry: Timestamp,
    pub beta_expiry: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LedgerState {
    pub status: HtlcState,
}

/// The status of a swap as the harness derives it from the individual
/// ledger states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Status {
    Start,
    Accepted,
    Deployed,
    Funded,
    Redeemed,
    Refunded,
    IncorrectlyFunded,
    Swapped,
    Aborted,
}

impl Status {
    pub fn derive(communication: CommunicationStatus, alpha: HtlcState, beta: HtlcState) -> Status {
        use self::HtlcState::*;

        if communication == CommunicationStatus::Declined {
            return Status::Aborted;
        }

        match (alpha, beta) {
            (Redeemed, Redeemed) => Status::Swapped,
            (Refunded, Refunded) | (Refunded, NotDeployed) | (NotDeployed, Refunded) => {
                Status::Aborted
            }
            (Refunded, _) | (_, Refunded) => Status::Refunded,
            (IncorrectlyFunded, _) | (_, IncorrectlyFunded) => Status::IncorrectlyFunded,
            (Redeemed, _) | (_, Redeemed) => Status::Redeemed,
            (Funded, _) | (_, Funded) => Status::Funded,
            (Deployed, _) | (_, Deployed) => Status::Deployed,
            (NotDeployed, NotDeployed) => match communication {
                CommunicationStatus::Accepted => Status::Accepted,
                CommunicationStatus::Sent | CommunicationStatus::Declined => Status::Start,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[error("{side} ledger went from {from} back to {to}")]
pub struct LedgerStateRegressed {
    pub side: Side,
    pub from: HtlcState,
    pub to: HtlcState,
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[error("cnd reports {reported} but the ledger states say {derived}")]
pub struct StatusMismatch {
    pub reported: SwapStatus,
    pub derived: Status,
}

/// Remembers the latest state seen on each ledger and rejects observations
/// that would move backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LedgerStateHistory {
    alpha: Option<HtlcState>,
    beta: Option<HtlcState>,
}

impl LedgerStateHistory {
    pub fn observe(&mut self, side: Side, state: HtlcState) -> Result<(), LedgerStateRegressed> {
        let latest = match side {
            Side::Alpha => &mut self.alpha,
            Side::Beta => &mut self.beta,
        };

        match *latest {
            Some(previous) if !previous.may_become(state) => Err(LedgerStateRegressed {
                side,
                from: previous,
                to: state,
            }),
            _ => {
                *latest = Some(state);
                Ok(())
            }
        }
    }

    pub fn latest(&self, side: Side) -> Option<HtlcState> {
        match side {
            Side::Alpha => self.alpha,
            Side::Beta => self.beta,
        }
    }
}
