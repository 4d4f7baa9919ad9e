#![allow(dead_code)]

pub mod cnd;
pub mod world;

use self::{cnd::FakeCnd, world::World};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use swap_harness::{
    actors::{Daemon, Environment, Launcher},
    config::Settings,
    ethereum::Address,
    lightning::{Invoice, InvoiceState, Lightning, LightningHandle, LightningNode, NodeIdentity},
    poll::TokioClock,
    process::Process,
    swap::{ActionConfig, LedgerAction},
    wallet::{TransactionId, Wallet, WalletFactory, WalletOwner},
    ActorName, Asset, LedgerKind, Quantity, Timestamp,
};
use tempfile::TempDir;

pub const MAXIMUM_BITCOIN_FEE_SAT: u64 = 10_000;
pub const MAXIMUM_ETHER_FEE_WEI: u64 = 10_000_000_000_000_000;

/// Settings for scenarios against the fakes: short intervals, short
/// expiries, logs below `log_root`.
pub fn settings(log_root: &Path) -> Settings {
    let mut settings = Settings::default();

    settings.polling.interval = Duration::from_millis(10);
    settings.polling.cnd_interval = Duration::from_millis(10);
    settings.polling.action = ActionConfig {
        timeout: Duration::from_secs(1),
        interval: Duration::from_millis(10),
    };
    settings.polling.fault_action_timeout = Duration::from_secs(1);
    settings.polling.settle_delay = Duration::from_millis(50);
    settings.polling.expiry_interval = Duration::from_millis(10);
    settings.scenario.deadline = Duration::from_secs(30);
    settings.scenario.log_root = log_root.to_path_buf();
    settings.ethereum.token_contract = Some(Address::from_low_u64_be(0xe2c20));

    settings
}

/// A complete environment made of fakes, plus handles to look behind the
/// scenes.
#[derive(Debug)]
pub struct TestWorld {
    pub world: World,
    pub env: Environment,
    pub launcher: Arc<FakeLauncher>,
    pub wallets: Arc<FakeWalletFactory>,
    _log_root: TempDir,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_launcher(|world| FakeLauncher::new(world))
    }

    pub fn with_launcher(launcher: impl FnOnce(World) -> FakeLauncher) -> Self {
        let log_root = tempfile::tempdir().unwrap();
        let world = World::default();
        let launcher = Arc::new(launcher(world.clone()));
        let wallets = Arc::new(FakeWalletFactory::new(world.clone()));

        let env = Environment {
            settings: settings(log_root.path()),
            launcher: launcher.clone(),
            wallet_factory: wallets.clone(),
            clock: Arc::new(TokioClock),
        };

        TestWorld {
            world,
            env,
            launcher,
            wallets,
            _log_root: log_root,
        }
    }

    pub fn log_root(&self) -> &Path {
        self._log_root.path()
    }
}

#[derive(Debug)]
pub struct FakeProcess {
    name: String,
    running: Arc<AtomicBool>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeProcess {
    pub fn new(name: impl Into<String>, running: Arc<AtomicBool>) -> Self {
        FakeProcess {
            name: name.into(),
            running,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Process for FakeProcess {
    async fn start(&self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct FakeLauncher {
    world: World,
    fail_for: Option<ActorName>,
    launched: Mutex<Vec<(ActorName, Arc<FakeProcess>)>>,
}

impl FakeLauncher {
    pub fn new(world: World) -> Self {
        FakeLauncher {
            world,
            fail_for: None,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(world: World, actor: ActorName) -> Self {
        FakeLauncher {
            fail_for: Some(actor),
            ..FakeLauncher::new(world)
        }
    }

    pub fn launched(&self) -> Vec<(ActorName, Arc<FakeProcess>)> {
        self.launched.lock().unwrap().clone()
    }

    pub fn process_of(&self, actor: ActorName) -> Arc<FakeProcess> {
        self.launched()
            .into_iter()
            .find(|(name, _)| *name == actor)
            .map(|(_, process)| process)
            .unwrap()
    }
}

#[async_trait::async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, actor: ActorName, dir: &Path) -> anyhow::Result<Daemon> {
        if self.fail_for == Some(actor) {
            anyhow::bail!("{}'s cnd binary is missing", actor);
        }
        assert!(dir.is_dir(), "scenario directory must exist before launching");

        let running = Arc::new(AtomicBool::new(false));
        let api = FakeCnd::spawn(actor, self.world.clone(), running.clone());
        let process = Arc::new(FakeProcess::new(format!("{}'s cnd", actor), running));
        self.launched.lock().unwrap().push((actor, process.clone()));

        Ok(Daemon { process, api })
    }
}

#[derive(Debug)]
pub struct FakeWalletFactory {
    world: World,
    lightning_processes: Mutex<Vec<Arc<FakeProcess>>>,
}

impl FakeWalletFactory {
    pub fn new(world: World) -> Self {
        FakeWalletFactory {
            world,
            lightning_processes: Mutex::new(Vec::new()),
        }
    }

    pub fn lightning_processes(&self) -> Vec<Arc<FakeProcess>> {
        self.lightning_processes.lock().unwrap().clone()
    }

    fn wallet(&self, owner: &WalletOwner, ledger: LedgerKind) -> Arc<dyn Wallet> {
        Arc::new(FakeWallet {
            actor: owner.actor,
            ledger,
            world: self.world.clone(),
        })
    }
}

#[async_trait::async_trait]
impl WalletFactory for FakeWalletFactory {
    async fn bitcoin(&self, owner: &WalletOwner) -> anyhow::Result<Arc<dyn Wallet>> {
        Ok(self.wallet(owner, LedgerKind::Bitcoin))
    }

    async fn ethereum(&self, owner: &WalletOwner) -> anyhow::Result<Arc<dyn Wallet>> {
        Ok(self.wallet(owner, LedgerKind::Ethereum))
    }

    async fn lightning(&self, owner: &WalletOwner) -> anyhow::Result<LightningHandle> {
        let process = Arc::new(FakeProcess::new(
            format!("{}'s lnd", owner.actor),
            Arc::new(AtomicBool::new(false)),
        ));
        process.start().await?;
        self.lightning_processes
            .lock()
            .unwrap()
            .push(process.clone());

        Ok(LightningHandle {
            lightning: Lightning {
                wallet: self.wallet(owner, LedgerKind::Lightning),
                node: Arc::new(FakeLightningNode {
                    actor: owner.actor,
                    world: self.world.clone(),
                }),
            },
            process,
        })
    }
}

#[derive(Debug)]
pub struct FakeWallet {
    actor: ActorName,
    ledger: LedgerKind,
    world: World,
}

#[async_trait::async_trait]
impl Wallet for FakeWallet {
    fn ledger(&self) -> LedgerKind {
        self.ledger
    }

    fn maximum_fee(&self) -> Quantity {
        match self.ledger {
            LedgerKind::Bitcoin | LedgerKind::Lightning => {
                Quantity::from_sat(MAXIMUM_BITCOIN_FEE_SAT)
            }
            LedgerKind::Ethereum => Quantity::from_wei(MAXIMUM_ETHER_FEE_WEI),
        }
    }

    async fn address(&self) -> anyhow::Result<String> {
        Ok(match self.ledger {
            LedgerKind::Ethereum => format!("0x{:040x}", self.actor as u8 + 1),
            LedgerKind::Bitcoin | LedgerKind::Lightning => format!("bcrt1{}", self.actor),
        })
    }

    /// Leaves some headroom for fees and overfunding.
    async fn mint(&self, asset: &Asset) -> anyhow::Result<()> {
        self.world
            .credit(self.actor, asset.key(), &asset.quantity.scale(110));

        Ok(())
    }

    async fn balance_of(&self, asset: &Asset) -> anyhow::Result<Quantity> {
        if self.world.balances_stalled() {
            futures::future::pending::<()>().await;
        }

        Ok(self.world.balance(self.actor, asset.key()))
    }

    async fn blockchain_time(&self) -> anyhow::Result<Timestamp> {
        Ok(self.world.advance_time())
    }

    async fn execute(&self, action: &LedgerAction) -> anyhow::Result<TransactionId> {
        self.world.execute(self.actor, action)
    }

    async fn transaction_succeeded(&self, transaction: &TransactionId) -> anyhow::Result<bool> {
        self.world.transaction_succeeded(transaction)
    }
}

#[derive(Debug)]
pub struct FakeLightningNode {
    actor: ActorName,
    world: World,
}

fn lightning_identity(actor: ActorName) -> NodeIdentity {
    NodeIdentity {
        pubkey: format!("{}-pubkey", actor),
        p2p_socket: "127.0.0.1:9735".to_owned(),
    }
}

fn actor_of(identity: &NodeIdentity) -> anyhow::Result<ActorName> {
    let actor = identity
        .pubkey
        .strip_suffix("-pubkey")
        .ok_or_else(|| anyhow::anyhow!("unknown node {}", identity.pubkey))?
        .parse()?;

    Ok(actor)
}

#[async_trait::async_trait]
impl LightningNode for FakeLightningNode {
    async fn identity(&self) -> anyhow::Result<NodeIdentity> {
        Ok(lightning_identity(self.actor))
    }

    async fn connect_peer(&self, peer: &NodeIdentity) -> anyhow::Result<()> {
        self.world.connect(self.actor, actor_of(peer)?);

        Ok(())
    }

    async fn open_channel(&self, peer: &NodeIdentity, capacity: &Quantity) -> anyhow::Result<()> {
        self.world
            .open_channel(self.actor, actor_of(peer)?, capacity)
    }

    async fn add_invoice(&self, amount: &Quantity) -> anyhow::Result<Invoice> {
        let (payment_request, payment_hash) = self.world.add_invoice(self.actor, amount);

        Ok(Invoice {
            payment_request,
            payment_hash,
        })
    }

    async fn pay(&self, payment_request: &str) -> anyhow::Result<()> {
        self.world.pay(self.actor, payment_request)
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> anyhow::Result<InvoiceState> {
        self.world.lookup_invoice(payment_hash)
    }
}
