pub mod file;
mod serde_duration;
pub mod settings;

pub use self::{file::File, settings::*};

use crate::ethereum;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Bitcoind {
    pub node_url: Url,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Geth {
    pub node_url: Url,
}

/// Where lnd finds the bitcoind it runs against.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LndBackend {
    pub rpc_host: String,
    pub rpc_user: String,
    pub rpc_pass: String,
    pub zmq_pub_raw_block: String,
    pub zmq_pub_raw_tx: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TokenContract {
    pub address: ethereum::Address,
}

pub fn read_config<T>(config_file: &Option<PathBuf>, default_config_path: T) -> anyhow::Result<File>
where
    T: FnOnce() -> anyhow::Result<PathBuf>,
{
    let path = config_file
        .as_ref()
        .map(|path| {
            tracing::info!("Using config file {}", path.display());
            path
        })
        .map_or_else(
            || {
                let default_path = default_config_path()?;

                if default_path.exists() {
                    tracing::info!(
                        "Using config file at default path: {}",
                        default_path.display()
                    );
                    Ok(default_path)
                } else {
                    tracing::info!("No config file at default path {}", default_path.display());
                    Err(anyhow!("no config file"))
                }
            },
            |path| Ok(path.to_path_buf()),
        )
        .ok();

    match path {
        Some(path) => File::read(&path)
            .with_context(|| format!("failed to read config file {}", path.display())),
        None => Ok(File::default()),
    }
}
