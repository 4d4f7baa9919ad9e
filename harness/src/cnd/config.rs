use crate::{
    config::{file::Level, Bitcoind, Geth, Settings},
    ledger::{BitcoinNetwork, ChainId},
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
};
use url::Url;

/// The configuration file a cnd is started with.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CndConfig {
    pub http_api: HttpApi,
    pub network: Network,
    pub data: Data,
    pub bitcoin: Bitcoin,
    pub ethereum: Ethereum,
    pub logging: Logging,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct HttpApi {
    pub socket: HttpSocket,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct HttpSocket {
    pub address: IpAddr,
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Network {
    pub listen: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Data {
    pub dir: PathBuf,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Bitcoin {
    pub network: BitcoinNetwork,
    pub bitcoind: Bitcoind,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Ethereum {
    pub chain_id: ChainId,
    pub geth: Geth,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct Logging {
    pub level: Level,
}

impl CndConfig {
    pub fn new(settings: &Settings, http_port: u16, p2p_port: u16, data_dir: PathBuf) -> Self {
        CndConfig {
            http_api: HttpApi {
                socket: HttpSocket {
                    address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    port: http_port,
                },
            },
            network: Network {
                listen: vec![format!("/ip4/0.0.0.0/tcp/{}", p2p_port)],
            },
            data: Data { dir: data_dir },
            bitcoin: Bitcoin {
                network: settings.bitcoin.network,
                bitcoind: settings.bitcoin.bitcoind.clone(),
            },
            ethereum: Ethereum {
                chain_id: settings.ethereum.chain_id,
                geth: settings.ethereum.geth.clone(),
            },
            logging: Logging {
                level: Level::Debug,
            },
        }
    }

    pub fn http_api_url(&self) -> anyhow::Result<Url> {
        let HttpSocket { address, port } = self.http_api.socket;

        Url::parse(&format!("http://{}:{}", address, port))
            .with_context(|| format!("{}:{} is not a valid http socket", address, port))
    }

    pub async fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string(self)?;

        tokio::fs::write(path, contents)
            .await
            .with_context(|| format!("failed to write cnd config to {}", path.display()))
    }
}
