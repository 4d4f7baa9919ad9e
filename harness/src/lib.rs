#![warn(unused_extern_crates, missing_debug_implementations, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod actor;
pub mod actors;
pub mod asset;
pub mod bitcoin;
pub mod cnd;
pub mod config;
pub mod ethereum;
pub mod expiry;
pub mod jsonrpc;
pub mod ledger;
pub mod lightning;
pub mod poll;
pub mod process;
pub mod quantity;
pub mod swap;
pub mod timestamp;
pub mod trace;
pub mod wallet;

pub use self::{
    actor::{Actor, ActorName, TradeSide},
    actors::{Actors, Environment, Launcher},
    asset::{Asset, AssetKey, AssetKind},
    ledger::{Ledger, LedgerKind},
    quantity::Quantity,
    timestamp::Timestamp,
};
