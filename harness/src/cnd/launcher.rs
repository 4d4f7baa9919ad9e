use crate::{
    actor::ActorName,
    actors::{Daemon, Launcher},
    bitcoin,
    cnd::CndConfig,
    config::Settings,
    ethereum, lightning,
    lightning::LightningHandle,
    poll::Clock,
    process::{free_port, LocalProcess, Readiness},
    wallet::{MintLock, Wallet, WalletFactory, WalletOwner},
};
use anyhow::Context;
use std::{path::Path, sync::Arc};

/// Runs a local cnd binary per actor.
#[derive(Debug)]
pub struct CndLauncher {
    settings: Settings,
    clock: Arc<dyn Clock>,
}

impl CndLauncher {
    pub fn new(settings: Settings, clock: Arc<dyn Clock>) -> Self {
        CndLauncher { settings, clock }
    }
}

#[async_trait::async_trait]
impl Launcher for CndLauncher {
    async fn launch(&self, actor: ActorName, dir: &Path) -> anyhow::Result<Daemon> {
        let data_dir = dir.join(format!("{}-cnd", actor));
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let config = CndConfig::new(&self.settings, free_port()?, free_port()?, data_dir);
        let config_file = dir.join(format!("{}-cnd.toml", actor));
        config.write_to(&config_file).await?;

        let api = config.http_api_url()?;
        tracing::info!("{}'s cnd will serve its API on {}", actor, api);

        let process = LocalProcess::new(
            format!("{}'s cnd", actor),
            self.settings.cnd.binary.clone(),
            vec!["--config".to_owned(), config_file.display().to_string()],
            dir.join(format!("{}-cnd.log", actor)),
            Readiness::Http(api.clone()),
            self.clock.clone(),
        );

        Ok(Daemon {
            process: Arc::new(process),
            api,
        })
    }
}

/// Creates wallets on the nodes configured in [`Settings`].
///
/// All wallets created by one factory share a mint lock, the funding
/// accounts they mint from are shared as well.
#[derive(Debug)]
pub struct NodeWalletFactory {
    settings: Settings,
    mint_lock: MintLock,
    clock: Arc<dyn Clock>,
}

impl NodeWalletFactory {
    pub fn new(settings: Settings, clock: Arc<dyn Clock>) -> Self {
        NodeWalletFactory {
            settings,
            mint_lock: MintLock::default(),
            clock,
        }
    }
}

#[async_trait::async_trait]
impl WalletFactory for NodeWalletFactory {
    async fn bitcoin(&self, owner: &WalletOwner) -> anyhow::Result<Arc<dyn Wallet>> {
        let wallet = bitcoin::Wallet::new(
            &self.settings,
            owner,
            self.mint_lock.clone(),
            self.clock.clone(),
        )
        .await?;

        Ok(Arc::new(wallet))
    }

    async fn ethereum(&self, owner: &WalletOwner) -> anyhow::Result<Arc<dyn Wallet>> {
        let wallet = ethereum::Wallet::new(
            &self.settings,
            owner,
            self.mint_lock.clone(),
            self.clock.clone(),
        )
        .await?;

        Ok(Arc::new(wallet))
    }

    async fn lightning(&self, owner: &WalletOwner) -> anyhow::Result<LightningHandle> {
        lightning::launch(
            &self.settings,
            owner,
            self.mint_lock.clone(),
            self.clock.clone(),
        )
        .await
    }
}
