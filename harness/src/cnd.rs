mod client;
mod config;
mod launcher;
pub mod siren;

pub use self::{
    client::{Client, Info, Peer, SwapRequest, SwapSummary, UnexpectedResponse},
    config::{CndConfig, HttpApi, HttpSocket},
    launcher::{CndLauncher, NodeWalletFactory},
};
