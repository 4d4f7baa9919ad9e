use crate::{
    config::{Bitcoind, Geth, LndBackend, TokenContract},
    ledger::{BitcoinNetwork, ChainId},
};
use config as config_rs;
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::Duration,
};

/// This struct aims to represent the configuration file as it appears on disk.
///
/// Most importantly, optional elements of the configuration file are
/// represented as `Option`s` here. This allows us to create a dedicated step
/// for filling in default values for absent configuration options.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct File {
    pub polling: Option<Polling>,
    pub expiries: Option<Expiries>,
    pub scenario: Option<Scenario>,
    pub logging: Option<Logging>,
    pub bitcoin: Option<Bitcoin>,
    pub ethereum: Option<Ethereum>,
    pub lightning: Option<Lightning>,
    pub cnd: Option<Cnd>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Polling {
    #[serde(default, with = "super::serde_duration::opt")]
    pub interval: Option<Duration>,
    #[serde(default, with = "super::serde_duration::opt")]
    pub cnd_interval: Option<Duration>,
    #[serde(default, with = "super::serde_duration::opt")]
    pub action_timeout: Option<Duration>,
    #[serde(default, with = "super::serde_duration::opt")]
    pub action_interval: Option<Duration>,
    #[serde(default, with = "super::serde_duration::opt")]
    pub fault_action_timeout: Option<Duration>,
    #[serde(default, with = "super::serde_duration::opt")]
    pub settle_delay: Option<Duration>,
    #[serde(default, with = "super::serde_duration::opt")]
    pub expiry_interval: Option<Duration>,
}

/// Offsets in seconds from the time a swap is requested.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Expiries {
    pub alpha: Option<u32>,
    pub beta: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default, with = "super::serde_duration::opt")]
    pub deadline: Option<Duration>,
    #[serde(default, with = "super::serde_duration::opt")]
    pub dump_timeout: Option<Duration>,
    pub log_root: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Bitcoin {
    pub network: BitcoinNetwork,
    pub bitcoind: Option<Bitcoind>,
    pub miner_wallet: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Ethereum {
    pub chain_id: ChainId,
    pub geth: Option<Geth>,
    pub token_contract: Option<TokenContract>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Lightning {
    pub lnd_binary: Option<PathBuf>,
    pub backend: Option<LndBackend>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Cnd {
    pub binary: Option<PathBuf>,
}

impl File {
    /// Reads the file at `config_file`, letting `HARNESS__SECTION__KEY`
    /// environment variables override what is in it.
    pub fn read<D>(config_file: D) -> Result<Self, config_rs::ConfigError>
    where
        D: AsRef<OsStr>,
    {
        let config_file = Path::new(&config_file);

        config_rs::Config::builder()
            .add_source(config_rs::File::from(config_file))
            .add_source(
                config_rs::Environment::with_prefix("HARNESS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Logging {
    pub level: Option<Level>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Level> for tracing::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => tracing::Level::ERROR,
            Level::Warn => tracing::Level::WARN,
            Level::Info => tracing::Level::INFO,
            Level::Debug => tracing::Level::DEBUG,
            Level::Trace => tracing::Level::TRACE,
        }
    }
}
