use crate::{
    actor::ActorName,
    asset::Asset,
    ledger::LedgerKind,
    lightning::{Lightning, LightningHandle},
    poll::{poll_until, Clock, PollConfig},
    quantity::Quantity,
    swap::LedgerAction,
    timestamp::Timestamp,
};
use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

/// How often a wallet looks at its balance while waiting for minted funds.
pub const MINT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Serializes sends from the funding accounts that all actors share.
pub type MintLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        TransactionId(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An actor's account on one ledger.
#[async_trait::async_trait]
pub trait Wallet: fmt::Debug + Send + Sync {
    fn ledger(&self) -> LedgerKind;

    /// Upper bound on the fees a single swap costs this wallet.
    fn maximum_fee(&self) -> Quantity;

    async fn address(&self) -> anyhow::Result<String>;

    /// Funds the wallet with `asset` and returns once the balance reflects
    /// it.
    async fn mint(&self, asset: &Asset) -> anyhow::Result<()>;

    async fn balance_of(&self, asset: &Asset) -> anyhow::Result<Quantity>;

    async fn blockchain_time(&self) -> anyhow::Result<Timestamp>;

    /// Hands a transaction cnd asked for to the ledger.
    async fn execute(&self, action: &LedgerAction) -> anyhow::Result<TransactionId>;

    async fn transaction_succeeded(&self, transaction: &TransactionId) -> anyhow::Result<bool>;
}

/// Polls the balance of `asset` until it reaches `minimum`.
pub async fn poll_until_minted(
    clock: &dyn Clock,
    wallet: &dyn Wallet,
    asset: &Asset,
    minimum: Quantity,
) -> anyhow::Result<()> {
    let minimum = &minimum;

    poll_until(
        clock,
        PollConfig::every(MINT_POLL_INTERVAL),
        &format!("{} to be minted", asset.key()),
        move || async move {
            let balance = wallet.balance_of(asset).await?;

            Ok(if &balance >= minimum { Some(()) } else { None })
        },
    )
    .await
}

/// The wallets of one actor, created the first time a swap needs them.
#[derive(Clone, Debug, Default)]
pub struct Wallets {
    bitcoin: Option<Arc<dyn Wallet>>,
    ethereum: Option<Arc<dyn Wallet>>,
    lightning: Option<Lightning>,
}

impl Wallets {
    pub fn for_ledger(&self, ledger: LedgerKind) -> anyhow::Result<Arc<dyn Wallet>> {
        let wallet = match ledger {
            LedgerKind::Bitcoin => self.bitcoin.clone(),
            LedgerKind::Ethereum => self.ethereum.clone(),
            LedgerKind::Lightning => self.lightning.as_ref().map(|ln| ln.wallet.clone()),
        };

        wallet.ok_or_else(|| anyhow::anyhow!("{} wallet is not initialised", ledger))
    }

    pub fn has(&self, ledger: LedgerKind) -> bool {
        match ledger {
            LedgerKind::Bitcoin => self.bitcoin.is_some(),
            LedgerKind::Ethereum => self.ethereum.is_some(),
            LedgerKind::Lightning => self.lightning.is_some(),
        }
    }

    pub fn insert(&mut self, wallet: Arc<dyn Wallet>) {
        match wallet.ledger() {
            LedgerKind::Bitcoin => self.bitcoin = Some(wallet),
            LedgerKind::Ethereum => self.ethereum = Some(wallet),
            LedgerKind::Lightning => {
                tracing::warn!("lightning wallets come with a node, use set_lightning")
            }
        }
    }

    pub fn set_lightning(&mut self, lightning: Lightning) {
        self.lightning = Some(lightning);
    }

    pub fn lightning(&self) -> anyhow::Result<&Lightning> {
        self.lightning
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("lightning node is not initialised"))
    }

    pub async fn execute(&self, action: &LedgerAction) -> anyhow::Result<TransactionId> {
        let wallet = self.for_ledger(action.ledger())?;

        wallet.execute(action).await
    }
}

/// Who a wallet is created for. Wallet names and data directories are
/// derived from it so that parallel scenarios don't share state.
#[derive(Clone, Debug, PartialEq)]
pub struct WalletOwner {
    pub actor: ActorName,
    pub scenario: String,
    pub dir: PathBuf,
}

impl WalletOwner {
    pub fn wallet_name(&self) -> String {
        format!("{}-{}-{}", self.scenario, self.actor, Timestamp::now())
    }
}

/// Creates the wallets an actor needs, on demand.
#[async_trait::async_trait]
pub trait WalletFactory: fmt::Debug + Send + Sync {
    async fn bitcoin(&self, owner: &WalletOwner) -> anyhow::Result<Arc<dyn Wallet>>;

    async fn ethereum(&self, owner: &WalletOwner) -> anyhow::Result<Arc<dyn Wallet>>;

    async fn lightning(&self, owner: &WalletOwner) -> anyhow::Result<LightningHandle>;
}
