use crate::{
    config::{file, Bitcoind, File, Geth, LndBackend},
    ethereum,
    ledger::{BitcoinNetwork, ChainId, LedgerParameters},
    poll::PollConfig,
    swap::ActionConfig,
};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// The configuration the harness runs with, after defaults have been
/// applied to whatever the config file left out.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub polling: Polling,
    pub expiries: Expiries,
    pub scenario: Scenario,
    pub logging: Logging,
    pub bitcoin: Bitcoin,
    pub ethereum: Ethereum,
    pub lightning: Lightning,
    pub cnd: Cnd,
}

impl Settings {
    pub fn from_config_file_and_defaults(config_file: File) -> anyhow::Result<Self> {
        let File {
            polling,
            expiries,
            scenario,
            logging,
            bitcoin,
            ethereum,
            lightning,
            cnd,
        } = config_file;

        Ok(Self {
            polling: polling.map_or_else(Polling::default, Polling::from),
            expiries: expiries.map_or_else(Expiries::default, Expiries::from),
            scenario: scenario.map_or_else(Scenario::default, Scenario::from),
            logging: Logging {
                level: logging
                    .and_then(|logging| logging.level)
                    .unwrap_or(file::Level::Info),
            },
            bitcoin: bitcoin.map_or_else(Bitcoin::default, Bitcoin::from),
            ethereum: ethereum.map_or_else(Ethereum::default, Ethereum::from),
            lightning: lightning.map_or_else(Lightning::default, Lightning::from),
            cnd: Cnd {
                binary: cnd
                    .and_then(|cnd| cnd.binary)
                    .unwrap_or_else(|| PathBuf::from("cnd")),
            },
        })
    }

    pub fn ledger_parameters(&self) -> LedgerParameters {
        LedgerParameters {
            bitcoin_network: self.bitcoin.network,
            chain_id: self.ethereum.chain_id,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            polling: Polling::default(),
            expiries: Expiries::default(),
            scenario: Scenario::default(),
            logging: Logging {
                level: file::Level::Info,
            },
            bitcoin: Bitcoin::default(),
            ethereum: Ethereum::default(),
            lightning: Lightning::default(),
            cnd: Cnd {
                binary: PathBuf::from("cnd"),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Polling {
    /// Between two looks at cnd or a ledger while asserting a state.
    pub interval: Duration,
    /// Used by `poll_cnd_until`.
    pub cnd_interval: Duration,
    pub action: ActionConfig,
    /// Bounds the wait for actions taken with a deliberately wrong amount
    /// or gas limit.
    pub fault_action_timeout: Duration,
    /// How long to give cnd to look at a new block before asserting that
    /// nothing happened.
    pub settle_delay: Duration,
    pub expiry_interval: Duration,
}

impl Polling {
    pub fn assertion(&self) -> PollConfig {
        PollConfig::every(self.interval)
    }

    pub fn fault_action(&self) -> ActionConfig {
        ActionConfig {
            timeout: self.fault_action_timeout,
            ..self.action
        }
    }
}

impl Default for Polling {
    fn default() -> Self {
        Polling {
            interval: Duration::from_millis(200),
            cnd_interval: Duration::from_millis(500),
            action: ActionConfig::default(),
            fault_action_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(3),
            expiry_interval: Duration::from_secs(1),
        }
    }
}

impl From<file::Polling> for Polling {
    fn from(polling: file::Polling) -> Self {
        let default = Polling::default();

        Polling {
            interval: polling.interval.unwrap_or(default.interval),
            cnd_interval: polling.cnd_interval.unwrap_or(default.cnd_interval),
            action: ActionConfig {
                timeout: polling.action_timeout.unwrap_or(default.action.timeout),
                interval: polling.action_interval.unwrap_or(default.action.interval),
            },
            fault_action_timeout: polling
                .fault_action_timeout
                .unwrap_or(default.fault_action_timeout),
            settle_delay: polling.settle_delay.unwrap_or(default.settle_delay),
            expiry_interval: polling.expiry_interval.unwrap_or(default.expiry_interval),
        }
    }
}

/// Seconds after the request at which each side's HTLC expires.
///
/// Alpha has to expire after beta, otherwise Bob could refund beta and
/// still redeem alpha.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Expiries {
    pub alpha_offset: u32,
    pub beta_offset: u32,
}

impl Default for Expiries {
    fn default() -> Self {
        Expiries {
            alpha_offset: 8,
            beta_offset: 3,
        }
    }
}

impl From<file::Expiries> for Expiries {
    fn from(expiries: file::Expiries) -> Self {
        let default = Expiries::default();

        Expiries {
            alpha_offset: expiries.alpha.unwrap_or(default.alpha_offset),
            beta_offset: expiries.beta.unwrap_or(default.beta_offset),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    pub deadline: Duration,
    /// How long a failed scenario may spend dumping actor state before it
    /// is torn down anyway.
    pub dump_timeout: Duration,
    /// Each scenario logs into `<log_root>/tests/<scenario>`.
    pub log_root: PathBuf,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            deadline: Duration::from_secs(60),
            dump_timeout: Duration::from_secs(10),
            log_root: PathBuf::from("log"),
        }
    }
}

impl From<file::Scenario> for Scenario {
    fn from(scenario: file::Scenario) -> Self {
        let default = Scenario::default();

        Scenario {
            deadline: scenario.deadline.unwrap_or(default.deadline),
            dump_timeout: scenario.dump_timeout.unwrap_or(default.dump_timeout),
            log_root: scenario.log_root.unwrap_or(default.log_root),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Logging {
    pub level: file::Level,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bitcoin {
    pub network: BitcoinNetwork,
    pub bitcoind: Bitcoind,
    /// The bitcoind wallet that holds mature coinbase outputs to mint from.
    pub miner_wallet: String,
}

impl Bitcoind {
    fn new(network: BitcoinNetwork) -> Self {
        let node_url = match network {
            BitcoinNetwork::Mainnet => {
                Url::parse("http://localhost:8332").expect("static string to be a valid url")
            }
            BitcoinNetwork::Testnet => {
                Url::parse("http://localhost:18332").expect("static string to be a valid url")
            }
            BitcoinNetwork::Regtest => {
                Url::parse("http://localhost:18443").expect("static string to be a valid url")
            }
        };

        Bitcoind { node_url }
    }
}

impl Default for Bitcoin {
    fn default() -> Self {
        Bitcoin {
            network: BitcoinNetwork::Regtest,
            bitcoind: Bitcoind::new(BitcoinNetwork::Regtest),
            miner_wallet: "miner".to_owned(),
        }
    }
}

impl From<file::Bitcoin> for Bitcoin {
    fn from(bitcoin: file::Bitcoin) -> Self {
        let network = bitcoin.network;

        Bitcoin {
            network,
            bitcoind: bitcoin.bitcoind.unwrap_or_else(|| Bitcoind::new(network)),
            miner_wallet: bitcoin.miner_wallet.unwrap_or_else(|| "miner".to_owned()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ethereum {
    pub chain_id: ChainId,
    pub geth: Geth,
    /// The ERC20 contract deployed on the dev chain, if any.
    pub token_contract: Option<ethereum::Address>,
}

impl Default for Geth {
    fn default() -> Self {
        Geth {
            node_url: Url::parse("http://localhost:8545").expect("static string to be a valid url"),
        }
    }
}

impl Default for Ethereum {
    fn default() -> Self {
        Ethereum {
            chain_id: ChainId::DEV,
            geth: Geth::default(),
            token_contract: None,
        }
    }
}

impl From<file::Ethereum> for Ethereum {
    fn from(ethereum: file::Ethereum) -> Self {
        Ethereum {
            chain_id: ethereum.chain_id,
            geth: ethereum.geth.unwrap_or_default(),
            token_contract: ethereum.token_contract.map(|contract| contract.address),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lightning {
    pub lnd_binary: PathBuf,
    pub backend: LndBackend,
}

impl Default for LndBackend {
    fn default() -> Self {
        LndBackend {
            rpc_host: "localhost:18443".to_owned(),
            rpc_user: "bitcoin".to_owned(),
            rpc_pass: "bitcoin".to_owned(),
            zmq_pub_raw_block: "tcp://127.0.0.1:28332".to_owned(),
            zmq_pub_raw_tx: "tcp://127.0.0.1:28333".to_owned(),
        }
    }
}

impl Default for Lightning {
    fn default() -> Self {
        Lightning {
            lnd_binary: PathBuf::from("lnd"),
            backend: LndBackend::default(),
        }
    }
}

impl From<file::Lightning> for Lightning {
    fn from(lightning: file::Lightning) -> Self {
        Lightning {
            lnd_binary: lightning.lnd_binary.unwrap_or_else(|| PathBuf::from("lnd")),
            backend: lightning.backend.unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cnd {
    pub binary: PathBuf,
}
