use crate::{
    actors::{Actors, Daemon, Environment},
    asset::{default_asset_description, Asset, AssetKey, AssetKind, UnresolvableMapping},
    cnd::{self, siren, Peer, SwapRequest},
    ethereum::U256,
    expiry,
    ledger::{default_ledger_description, Ledger, LedgerKind},
    lightning::{Invoice, InvoiceState, LightningNode},
    poll::{poll_until, PollConfig},
    process::Process,
    quantity::Quantity,
    swap::{
        state::StatusMismatch, ActionConfig, ActionKind, ActionOutcome, CommunicationStatus,
        HtlcState, LedgerAction, LedgerStateHistory, Override, Role, Side, Status, SwapDetails,
        SwapRef, SwapStatus,
    },
    timestamp::Timestamp,
    wallet::{WalletOwner, Wallets},
};
use anyhow::Context;
use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
    time::Duration,
};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use tokio::sync::RwLock;
use tracing_futures::Instrument;

/// Fee rate far above anything a sane wallet would pay.
const HIGH_FEE_PER_WU: u64 = 100_000_000;

const SWAP_DETAILS_RETRIES: u32 = 5;
const SWAP_DETAILS_RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum ActorName {
    Alice,
    Bob,
    Charlie,
}

/// What an actor puts up or expects on one side of a swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradeSide {
    pub asset: AssetKind,
    pub ledger: LedgerKind,
}

impl TradeSide {
    pub fn new(asset: AssetKind, ledger: LedgerKind) -> Self {
        TradeSide { asset, ledger }
    }
}

impl From<AssetKind> for TradeSide {
    fn from(asset: AssetKind) -> Self {
        TradeSide {
            asset,
            ledger: asset.default_ledger(),
        }
    }
}

/// The ledgers and assets both parties of a swap agreed on.
#[derive(Clone, Debug, PartialEq)]
pub struct Terms {
    pub alpha_ledger: Ledger,
    pub alpha_asset: Asset,
    pub beta_ledger: Ledger,
    pub beta_asset: Asset,
}

impl Terms {
    pub fn ledger(&self, side: Side) -> LedgerKind {
        match side {
            Side::Alpha => self.alpha_ledger.kind(),
            Side::Beta => self.beta_ledger.kind(),
        }
    }

    pub fn asset(&self, side: Side) -> &Asset {
        match side {
            Side::Alpha => &self.alpha_asset,
            Side::Beta => &self.beta_asset,
        }
    }

    fn asset_by_key(&self, key: AssetKey) -> Option<&Asset> {
        Side::iter()
            .map(|side| self.asset(side))
            .find(|asset| asset.key() == key)
    }

    fn involves(&self, ledger: LedgerKind) -> bool {
        self.alpha_ledger.kind() == ledger || self.beta_ledger.kind() == ledger
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[error("{actor} has no active swap")]
pub struct NoActiveSwap {
    pub actor: ActorName,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{asset} balance is {actual} but should be at least {minimum}")]
pub struct BalanceInvariantViolation {
    pub asset: AssetKey,
    pub minimum: Quantity,
    pub actual: Quantity,
}

/// The overall status of a swap as cnd reports it and as it follows from
/// the ledger states.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusReport {
    pub reported: SwapStatus,
    pub derived: Status,
}

/// Everything worth knowing about an actor when a scenario failed.
#[derive(Clone, Debug, PartialEq)]
pub struct StateDump {
    pub actor: ActorName,
    pub swap: Option<SwapRef>,
    pub status: Option<SwapStatus>,
    pub details: Option<serde_json::Value>,
    pub balances: Vec<(AssetKey, Quantity)>,
}

#[derive(Debug, Default)]
struct State {
    swap: Option<SwapRef>,
    terms: Option<Terms>,
    counterparty: Option<ActorName>,
    starting_balances: BTreeMap<AssetKey, Quantity>,
    expected_changes: BTreeMap<AssetKey, Quantity>,
    history: LedgerStateHistory,
    lightning_process: Option<Arc<dyn Process>>,
}

/// One party of a scenario: a cnd, the wallets next to it and the harness'
/// bookkeeping about the swap it takes part in.
#[derive(Debug)]
pub struct Actor {
    name: ActorName,
    owner: WalletOwner,
    env: Environment,
    daemon: Daemon,
    cnd: cnd::Client,
    actors: Weak<Actors>,
    state: RwLock<State>,
    wallets: RwLock<Wallets>,
}

impl Actor {
    pub(crate) fn new(
        owner: WalletOwner,
        env: Environment,
        daemon: Daemon,
        cnd: cnd::Client,
        actors: Weak<Actors>,
    ) -> Self {
        Actor {
            name: owner.actor,
            owner,
            env,
            daemon,
            cnd,
            actors,
            state: RwLock::new(State::default()),
            wallets: RwLock::new(Wallets::default()),
        }
    }

    pub fn name(&self) -> ActorName {
        self.name
    }

    pub fn cnd(&self) -> &cnd::Client {
        &self.cnd
    }

    pub async fn swap(&self) -> Option<SwapRef> {
        self.state.read().await.swap.clone()
    }

    pub async fn terms(&self) -> Option<Terms> {
        self.state.read().await.terms.clone()
    }

    pub async fn starting_balance(&self, key: AssetKey) -> Option<Quantity> {
        self.state.read().await.starting_balances.get(&key).cloned()
    }

    pub async fn expected_change(&self, key: AssetKey) -> Option<Quantity> {
        self.state.read().await.expected_changes.get(&key).cloned()
    }

    /// Requests a swap from bob, bitcoin for ether unless told otherwise.
    pub async fn send_request(
        &self,
        alpha: Option<TradeSide>,
        beta: Option<TradeSide>,
    ) -> anyhow::Result<Option<SwapRef>> {
        let alpha = alpha.unwrap_or_else(|| {
            tracing::info!("alpha side not specified, defaulting to bitcoin");
            TradeSide::from(AssetKind::Bitcoin)
        });
        let beta = beta.unwrap_or_else(|| {
            tracing::info!("beta side not specified, defaulting to ether");
            TradeSide::from(AssetKind::Ether)
        });

        self.send_request_to(ActorName::Bob, alpha, beta).await
    }

    /// Sets both parties up for a swap and asks this actor's cnd to request
    /// it from `counterparty`.
    ///
    /// Swaps involving lightning only get as far as an open channel, cnd is
    /// not asked for them. `None` is returned in that case.
    pub async fn send_request_to(
        &self,
        counterparty: ActorName,
        alpha: TradeSide,
        beta: TradeSide,
    ) -> anyhow::Result<Option<SwapRef>> {
        if counterparty == self.name {
            anyhow::bail!("{} cannot trade with itself", self.name);
        }

        let to = self.peer(counterparty)?;
        let terms = self.resolve_terms(counterparty, alpha, beta)?;
        tracing::debug!("{} and {} agreed on {:?}", self.name, counterparty, terms);

        self.initialize_wallets(&terms)
            .instrument(self.span())
            .await?;
        to.initialize_wallets(&terms).instrument(to.span()).await?;

        self.agree_on(&terms, counterparty, Side::Beta).await;
        to.agree_on(&terms, self.name, Side::Alpha).await;

        self.set_starting_balances(&[
            terms.alpha_asset.clone(),
            terms.beta_asset.with_quantity(Quantity::zero()),
        ])
        .instrument(self.span())
        .await?;
        to.set_starting_balances(&[
            terms.alpha_asset.with_quantity(Quantity::zero()),
            terms.beta_asset.clone(),
        ])
        .instrument(to.span())
        .await?;

        if terms.involves(LedgerKind::Lightning) {
            self.open_lightning_channel(&to, &terms).await?;
            tracing::info!("lightning swaps are not requested through cnd");

            return Ok(None);
        }

        let info = to.cnd.info().await?;
        let settings = &self.env.settings;
        let now = Timestamp::now();
        let request = SwapRequest {
            alpha_ledger: terms.alpha_ledger,
            beta_ledger: terms.beta_ledger,
            alpha_asset: terms.alpha_asset.clone(),
            beta_asset: terms.beta_asset.clone(),
            alpha_ledger_refund_identity: self.identity_on(terms.alpha_ledger.kind()).await?,
            beta_ledger_redeem_identity: self.identity_on(terms.beta_ledger.kind()).await?,
            alpha_expiry: now.plus(settings.expiries.alpha_offset),
            beta_expiry: now.plus(settings.expiries.beta_offset),
            peer: Peer {
                peer_id: info.id,
                address_hint: info.listen_addresses.into_iter().next(),
            },
        };

        let swap = self.cnd.create_swap(&request).await?;
        tracing::info!("{} created swap {} with {}", self.name, swap, counterparty);

        self.state.write().await.swap = Some(swap.clone());
        to.state.write().await.swap = Some(swap.clone());

        Ok(Some(swap))
    }

    pub async fn accept(&self) -> anyhow::Result<()> {
        self.execute(ActionKind::Accept, &[], self.env.settings.polling.action)
            .await?;

        self.current_swap_is_accepted().await
    }

    pub async fn decline(&self) -> anyhow::Result<()> {
        self.execute(ActionKind::Decline, &[], self.env.settings.polling.action)
            .await?;

        Ok(())
    }

    pub async fn deploy(&self) -> anyhow::Result<()> {
        let outcome = self
            .execute(ActionKind::Deploy, &[], self.env.settings.polling.action)
            .await?;
        tracing::debug!("{} deployed its htlc: {:?}", self.name, outcome);

        let role = self.who_am_i().await?;
        self.assert_on_both_sides(role.funding_side(), HtlcState::Deployed)
            .await
    }

    pub async fn fund(&self) -> anyhow::Result<()> {
        let outcome = self
            .execute(ActionKind::Fund, &[], self.env.settings.polling.action)
            .await?;
        tracing::debug!("{} funded its htlc: {:?}", self.name, outcome);

        let role = self.who_am_i().await?;
        self.assert_on_both_sides(role.funding_side(), HtlcState::Funded)
            .await
    }

    pub async fn redeem(&self) -> anyhow::Result<()> {
        let outcome = self
            .execute(ActionKind::Redeem, &[], self.env.settings.polling.action)
            .await?;
        tracing::debug!("{} redeemed: {:?}", self.name, outcome);

        let role = self.who_am_i().await?;
        self.assert_on_both_sides(role.redeeming_side(), HtlcState::Redeemed)
            .await
    }

    /// Waits for the HTLC this actor funded to expire and takes the money
    /// back.
    pub async fn refund(&self) -> anyhow::Result<()> {
        let swap = self.active_swap().await?;
        let details = self.observe(&swap).await?;
        let properties = details.properties()?;
        let side = properties.role.funding_side();
        let expiry = properties.state()?.expiry(side);

        let ledger = self.agreed_terms().await?.ledger(side);
        let wallet = self.wallets.read().await.for_ledger(ledger)?;
        tracing::debug!("{} waits for {} to expire at {}", self.name, side, expiry);
        expiry::wait_for(
            &*self.env.clock,
            self.env.settings.polling.expiry_interval,
            &*wallet,
            expiry,
        )
        .await?;

        let outcome = self
            .execute(ActionKind::Refund, &[], self.env.settings.polling.action)
            .await?;
        tracing::debug!("{} refunded: {:?}", self.name, outcome);

        self.assert_on_both_sides(side, HtlcState::Refunded).await
    }

    /// Funds the HTLC with slightly more than agreed.
    pub async fn overfund(&self) -> anyhow::Result<ActionOutcome> {
        let outcome = self
            .execute(
                ActionKind::Fund,
                &[Override::overfund()],
                self.env.settings.polling.fault_action(),
            )
            .await?;
        tracing::debug!("{} overfunded: {:?}", self.name, outcome);

        Ok(outcome)
    }

    /// Funds the HTLC with a fraction of what was agreed.
    pub async fn underfund(&self) -> anyhow::Result<ActionOutcome> {
        let outcome = self
            .execute(
                ActionKind::Fund,
                &[Override::underfund()],
                self.env.settings.polling.fault_action(),
            )
            .await?;
        tracing::debug!("{} underfunded: {:?}", self.name, outcome);

        Ok(outcome)
    }

    /// Funds with a gas limit too low for the contract; the transaction has
    /// to fail.
    pub async fn fund_low_gas(&self, gas_limit: U256) -> anyhow::Result<()> {
        let outcome = self
            .execute(
                ActionKind::Fund,
                &[Override::GasLimit(gas_limit)],
                self.env.settings.polling.fault_action(),
            )
            .await?;
        let transaction = outcome
            .transaction()
            .context("funding did not produce a transaction")?;

        let role = self.who_am_i().await?;
        let ledger = self.agreed_terms().await?.ledger(role.funding_side());
        let wallet = self.wallets.read().await.for_ledger(ledger)?;

        if wallet.transaction_succeeded(transaction).await? {
            anyhow::bail!(
                "transaction {} with gas limit {} succeeded",
                transaction,
                gas_limit
            );
        }

        Ok(())
    }

    /// Returns what cnd answers when asked to redeem at an absurd fee rate.
    pub async fn redeem_with_high_fee(&self) -> anyhow::Result<LedgerAction> {
        let swap = self.active_swap().await?;
        let wallets = self.wallets.read().await.clone();

        self.cnd
            .fetch_ledger_action(
                &*self.env.clock,
                &swap,
                ActionKind::Redeem,
                &[Override::FeePerWu(HIGH_FEE_PER_WU)],
                &wallets,
                self.env.settings.polling.fault_action(),
            )
            .await
    }

    pub async fn current_swap_is_accepted(&self) -> anyhow::Result<()> {
        let swap = self.active_swap().await?;
        let swap = &swap;

        poll_until(
            &*self.env.clock,
            self.env.settings.polling.assertion(),
            &format!("{} to be accepted", swap),
            move || async move {
                let details = self.observe(swap).await?;
                let accepted = details
                    .properties()?
                    .state
                    .as_ref()
                    .map_or(false, |state| {
                        state.communication.status == CommunicationStatus::Accepted
                    });

                Ok(if accepted { Some(()) } else { None })
            },
        )
        .instrument(self.span())
        .await
    }

    /// Waits for cnd to report the swap as done and checks that every
    /// expected balance change arrived.
    pub async fn assert_swapped(&self) -> anyhow::Result<()> {
        let swap = self.active_swap().await?;
        let swap = &swap;
        tracing::debug!("{} waits for cnd to report {} as swapped", self.name, swap);

        let details = poll_until(
            &*self.env.clock,
            self.env.settings.polling.assertion(),
            &format!("{} to be swapped", swap),
            move || async move {
                let details = self.observe(swap).await?;
                let swapped = details.properties()?.status == SwapStatus::Swapped;

                Ok(if swapped { Some(details) } else { None })
            },
        )
        .instrument(self.span())
        .await?;

        let properties = details.properties()?;
        let derived = properties.state()?.status();
        if derived != Status::Swapped {
            return Err(StatusMismatch {
                reported: properties.status,
                derived,
            }
            .into());
        }

        let expected_changes = self.state.read().await.expected_changes.clone();
        for (key, change) in expected_changes {
            tracing::debug!("checking that {} balance changed by {}", key, change);
            self.assert_balance(key, Some(&change)).await?;
        }

        Ok(())
    }

    /// Checks that no tracked balance lost more than the fees.
    pub async fn assert_refunded(&self) -> anyhow::Result<()> {
        tracing::debug!("checking that {}'s swap was refunded", self.name);

        let keys = self
            .state
            .read()
            .await
            .starting_balances
            .keys()
            .copied()
            .collect::<Vec<_>>();
        for key in keys {
            self.assert_balance(key, None).await?;
        }

        Ok(())
    }

    pub async fn assert_alpha_deployed(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Alpha, HtlcState::Deployed)
            .await
    }

    pub async fn assert_beta_deployed(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Beta, HtlcState::Deployed)
            .await
    }

    pub async fn assert_alpha_funded(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Alpha, HtlcState::Funded).await
    }

    pub async fn assert_beta_funded(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Beta, HtlcState::Funded).await
    }

    pub async fn assert_alpha_redeemed(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Alpha, HtlcState::Redeemed)
            .await
    }

    pub async fn assert_beta_redeemed(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Beta, HtlcState::Redeemed).await
    }

    pub async fn assert_alpha_refunded(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Alpha, HtlcState::Refunded)
            .await
    }

    pub async fn assert_beta_refunded(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Beta, HtlcState::Refunded).await
    }

    pub async fn assert_alpha_incorrectly_funded(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Alpha, HtlcState::IncorrectlyFunded)
            .await
    }

    pub async fn assert_beta_incorrectly_funded(&self) -> anyhow::Result<()> {
        self.assert_ledger_state(Side::Beta, HtlcState::IncorrectlyFunded)
            .await
    }

    pub async fn assert_alpha_not_deployed(&self) -> anyhow::Result<()> {
        self.env
            .clock
            .sleep(self.env.settings.polling.settle_delay)
            .await;
        self.assert_ledger_state(Side::Alpha, HtlcState::NotDeployed)
            .await
    }

    pub async fn assert_beta_not_deployed(&self) -> anyhow::Result<()> {
        self.env
            .clock
            .sleep(self.env.settings.polling.settle_delay)
            .await;
        self.assert_ledger_state(Side::Beta, HtlcState::NotDeployed)
            .await
    }

    pub async fn who_am_i(&self) -> anyhow::Result<Role> {
        let swap = self.active_swap().await?;
        let details = self.observe(&swap).await?;

        Ok(details.properties()?.role)
    }

    pub async fn status(&self) -> anyhow::Result<StatusReport> {
        let swap = self.active_swap().await?;
        let details = self.observe(&swap).await?;
        let properties = details.properties()?;

        Ok(StatusReport {
            reported: properties.status,
            derived: properties.state()?.status(),
        })
    }

    /// Polls an arbitrary resource of this actor's cnd until `predicate`
    /// holds.
    pub async fn poll_cnd_until<F>(&self, path: &str, predicate: F) -> anyhow::Result<siren::Entity>
    where
        F: Fn(&siren::Entity) -> bool,
    {
        let predicate = &predicate;

        poll_until(
            &*self.env.clock,
            PollConfig::every(self.env.settings.polling.cnd_interval),
            &format!("{} to satisfy the predicate", path),
            move || async move {
                let entity: siren::Entity = self.cnd.fetch(path).await?;

                Ok(if predicate(&entity) { Some(entity) } else { None })
            },
        )
        .await
    }

    /// Fetches a swap that cnd might not know about yet.
    pub async fn poll_swap_details(&self, path: &str) -> anyhow::Result<SwapDetails> {
        let mut retries = 0;

        loop {
            match self.cnd.fetch(path).await {
                Ok(details) => return Ok(details),
                Err(e) if retries < SWAP_DETAILS_RETRIES => {
                    tracing::debug!("swap {} not available yet: {:#}", path, e);
                    retries += 1;
                    self.env.clock.sleep(SWAP_DETAILS_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(e.context(format!("could not retrieve swap {}", path))),
            }
        }
    }

    pub async fn create_ln_invoice(&self, amount: &Quantity) -> anyhow::Result<Invoice> {
        tracing::debug!("{} creates an invoice for {} sat", self.name, amount);

        self.lightning_node().await?.add_invoice(amount).await
    }

    pub async fn pay_ln_invoice(&self, payment_request: &str) -> anyhow::Result<()> {
        tracing::debug!("{} pays invoice {}", self.name, payment_request);

        self.lightning_node().await?.pay(payment_request).await
    }

    pub async fn assert_ln_invoice_settled(&self, payment_hash: &str) -> anyhow::Result<()> {
        let state = self
            .lightning_node()
            .await?
            .lookup_invoice(payment_hash)
            .await?;
        tracing::debug!("invoice {} is {:?}", payment_hash, state);

        if state != InvoiceState::Settled {
            anyhow::bail!("invoice {} is {:?}, not settled", payment_hash, state);
        }

        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.daemon.process.start().await
    }

    /// Stops cnd and, if this actor runs one, its lightning node.
    pub async fn stop(&self) -> anyhow::Result<()> {
        tracing::debug!("stopping {}", self.name);

        let cnd = self.daemon.process.stop().await;

        let lightning = self.state.read().await.lightning_process.clone();
        let lightning = match lightning {
            Some(process) if process.is_running() => process.stop().await,
            _ => Ok(()),
        };

        cnd.and(lightning)
    }

    /// Restarts cnd. The swap and the balances tracked for it are kept.
    pub async fn restart(&self) -> anyhow::Result<()> {
        self.daemon.process.stop().await?;
        self.state.write().await.history = LedgerStateHistory::default();

        self.start().await
    }

    pub fn is_running(&self) -> bool {
        self.daemon.process.is_running()
    }

    /// Collects and logs what the actor knows. Parts that cannot be read
    /// are left out.
    pub async fn dump_state(&self) -> StateDump {
        let (swap, terms) = {
            let state = self.state.read().await;
            (state.swap.clone(), state.terms.clone())
        };

        let mut dump = StateDump {
            actor: self.name,
            swap: swap.clone(),
            status: None,
            details: None,
            balances: Vec::new(),
        };

        if let Some(swap) = swap {
            match self.cnd.fetch_details(&swap).await {
                Ok(details) => {
                    dump.status = details.properties.as_ref().map(|p| p.status);
                    dump.details = serde_json::to_value(&details).ok();
                }
                Err(e) => tracing::warn!("failed to fetch {}: {:#}", swap, e),
            }
        }

        if let Some(terms) = terms {
            let wallets = self.wallets.read().await.clone();

            for side in Side::iter() {
                let asset = terms.asset(side);
                let balance = match wallets.for_ledger(asset.ledger) {
                    Ok(wallet) => wallet.balance_of(asset).await,
                    Err(e) => Err(e),
                };

                match balance {
                    Ok(balance) => dump.balances.push((asset.key(), balance)),
                    Err(e) => tracing::warn!("failed to read {} balance: {:#}", asset.key(), e),
                }
            }
        }

        tracing::info!(
            "{}: swap {:?}, status {:?}, balances {:?}",
            self.name,
            dump.swap,
            dump.status,
            dump.balances
        );
        tracing::debug!("{}: swap details {:?}", self.name, dump.details);

        dump
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("actor", name = %self.name)
    }

    fn peer(&self, name: ActorName) -> anyhow::Result<Arc<Actor>> {
        let actors = self
            .actors
            .upgrade()
            .context("the actors of this scenario are gone")?;

        let actor = actors.get(name)?.clone();

        Ok(actor)
    }

    async fn counterparty(&self) -> anyhow::Result<Arc<Actor>> {
        let name = self
            .state
            .read()
            .await
            .counterparty
            .ok_or(NoActiveSwap { actor: self.name })?;

        self.peer(name)
    }

    async fn active_swap(&self) -> anyhow::Result<SwapRef> {
        let swap = self.state.read().await.swap.clone();

        swap.ok_or_else(|| NoActiveSwap { actor: self.name }.into())
    }

    async fn agreed_terms(&self) -> anyhow::Result<Terms> {
        let terms = self.state.read().await.terms.clone();

        terms.ok_or_else(|| NoActiveSwap { actor: self.name }.into())
    }

    fn resolve_terms(
        &self,
        counterparty: ActorName,
        alpha: TradeSide,
        beta: TradeSide,
    ) -> Result<Terms, UnresolvableMapping> {
        let parameters = self.env.settings.ledger_parameters();
        let token_contract = self.env.settings.ethereum.token_contract;

        Ok(Terms {
            alpha_ledger: default_ledger_description(alpha.ledger, &parameters),
            alpha_asset: default_asset_description(
                alpha.asset,
                alpha.ledger,
                counterparty,
                token_contract,
            )?,
            beta_ledger: default_ledger_description(beta.ledger, &parameters),
            beta_asset: default_asset_description(
                beta.asset,
                beta.ledger,
                counterparty,
                token_contract,
            )?,
        })
    }

    /// Replaces whatever this actor tracked with the bookkeeping for a new
    /// swap in which it receives the asset on `receiving`.
    async fn agree_on(&self, terms: &Terms, counterparty: ActorName, receiving: Side) {
        let received = terms.asset(receiving);
        let mut state = self.state.write().await;

        if let Some(previous) = state.swap.take() {
            tracing::info!("{} abandons swap {}", self.name, previous);
        }
        state.terms = Some(terms.clone());
        state.counterparty = Some(counterparty);
        state.starting_balances.clear();
        state.expected_changes.clear();
        state
            .expected_changes
            .insert(received.key(), received.quantity.clone());
        state.history = LedgerStateHistory::default();
    }

    async fn initialize_wallets(&self, terms: &Terms) -> anyhow::Result<()> {
        let factory = &self.env.wallet_factory;

        for ledger in Side::iter().map(|side| terms.ledger(side)) {
            if self.wallets.read().await.has(ledger) {
                continue;
            }
            tracing::info!("initialising {} wallet of {}", ledger, self.name);

            match ledger {
                LedgerKind::Bitcoin => {
                    let wallet = factory.bitcoin(&self.owner).await?;
                    self.wallets.write().await.insert(wallet);
                }
                LedgerKind::Ethereum => {
                    let wallet = factory.ethereum(&self.owner).await?;
                    self.wallets.write().await.insert(wallet);
                }
                LedgerKind::Lightning => {
                    let handle = factory.lightning(&self.owner).await?;
                    self.wallets.write().await.set_lightning(handle.lightning);
                    self.state.write().await.lightning_process = Some(handle.process);
                }
            }
        }

        Ok(())
    }

    /// Mints every asset with a non-zero quantity and records the resulting
    /// balance. Zero quantities are recorded as zero without looking at the
    /// wallet.
    async fn set_starting_balances(&self, assets: &[Asset]) -> anyhow::Result<()> {
        for asset in assets {
            let balance = if asset.quantity.is_zero() {
                Quantity::zero()
            } else {
                let wallet = self.wallets.read().await.for_ledger(asset.ledger)?;

                tracing::debug!("minting {} {} for {}", asset.quantity, asset.key(), self.name);
                wallet.mint(asset).await?;
                wallet.balance_of(asset).await?
            };

            tracing::debug!("starting {} balance of {} is {}", asset.key(), self.name, balance);
            self.state
                .write()
                .await
                .starting_balances
                .insert(asset.key(), balance);
        }

        Ok(())
    }

    async fn open_lightning_channel(&self, to: &Actor, terms: &Terms) -> anyhow::Result<()> {
        let mine = self.lightning_node().await?;
        let theirs = to.lightning_node().await?;
        tracing::debug!("connecting lightning nodes of {} and {}", self.name, to.name);

        mine.connect_peer(&theirs.identity().await?).await?;

        // channels hold a bit more than the swap so fees don't get in the way
        if terms.alpha_ledger.kind() == LedgerKind::Lightning {
            let capacity = terms.alpha_asset.quantity.ratio(3, 2);
            mine.open_channel(&theirs.identity().await?, &capacity)
                .await
        } else {
            let capacity = terms.beta_asset.quantity.ratio(3, 2);
            theirs
                .open_channel(&mine.identity().await?, &capacity)
                .await
        }
    }

    async fn lightning_node(&self) -> anyhow::Result<Arc<dyn LightningNode>> {
        let wallets = self.wallets.read().await;

        Ok(wallets.lightning()?.node.clone())
    }

    async fn identity_on(&self, ledger: LedgerKind) -> anyhow::Result<Option<String>> {
        match ledger {
            LedgerKind::Ethereum => {
                let wallet = self.wallets.read().await.for_ledger(ledger)?;

                Ok(Some(wallet.address().await?))
            }
            LedgerKind::Bitcoin | LedgerKind::Lightning => Ok(None),
        }
    }

    async fn execute(
        &self,
        kind: ActionKind,
        overrides: &[Override],
        config: ActionConfig,
    ) -> anyhow::Result<ActionOutcome> {
        let swap = self.active_swap().await?;
        let wallets = self.wallets.read().await.clone();

        self.cnd
            .execute_action(&*self.env.clock, &swap, kind, overrides, &wallets, config)
            .instrument(self.span())
            .await
    }

    /// Fetches the swap and feeds both ledger states into the history.
    async fn observe(&self, swap: &SwapRef) -> anyhow::Result<SwapDetails> {
        let details = self.cnd.fetch_details(swap).await?;

        if let Some(swap_state) = details.properties()?.state.as_ref() {
            let mut state = self.state.write().await;
            for side in Side::iter() {
                state.history.observe(side, swap_state.ledger(side))?;
            }
        }

        Ok(details)
    }

    async fn assert_ledger_state(&self, side: Side, expected: HtlcState) -> anyhow::Result<()> {
        let swap = self.active_swap().await?;
        let swap = &swap;
        tracing::debug!(
            "{} waits for cnd to see the {} ledger of {} as {}",
            self.name,
            side,
            swap,
            expected
        );

        poll_until(
            &*self.env.clock,
            self.env.settings.polling.assertion(),
            &format!("{} ledger of {} to be {}", side, swap, expected),
            move || async move {
                let details = self.observe(swap).await?;
                let observed = details
                    .properties()?
                    .state
                    .as_ref()
                    .map(|state| state.ledger(side));

                Ok(if observed == Some(expected) {
                    Some(())
                } else {
                    None
                })
            },
        )
        .instrument(self.span())
        .await?;

        tracing::debug!("{} saw the {} ledger as {}", self.name, side, expected);

        Ok(())
    }

    /// Asserts a ledger state on this actor and, if its cnd is up, on the
    /// counterparty.
    async fn assert_on_both_sides(&self, side: Side, expected: HtlcState) -> anyhow::Result<()> {
        self.assert_ledger_state(side, expected).await?;

        let counterparty = self.counterparty().await?;
        if counterparty.is_running() {
            counterparty.assert_ledger_state(side, expected).await?;
        } else {
            tracing::info!(
                "{} is down, not checking its view of the {} ledger",
                counterparty.name,
                side
            );
        }

        Ok(())
    }

    /// Compares the current balance with the starting balance plus
    /// `change`, tolerating the wallet's maximum fee if fees are paid in
    /// this asset.
    async fn assert_balance(&self, key: AssetKey, change: Option<&Quantity>) -> anyhow::Result<()> {
        let (asset, starting) = {
            let state = self.state.read().await;
            let asset = state
                .terms
                .as_ref()
                .and_then(|terms| terms.asset_by_key(key))
                .cloned()
                .with_context(|| format!("{} does not trade {}", self.name, key))?;
            let starting = state
                .starting_balances
                .get(&key)
                .cloned()
                .with_context(|| format!("no starting balance recorded for {}", key))?;

            (asset, starting)
        };

        let wallet = self.wallets.read().await.for_ledger(key.ledger)?;
        let fee = if key.asset.pays_fees_on(key.ledger) {
            wallet.maximum_fee()
        } else {
            Quantity::zero()
        };

        let expected = match change {
            Some(change) => &starting + change,
            None => starting,
        };
        let minimum = expected.saturating_sub(&fee);
        let actual = wallet.balance_of(&asset).await?;

        if actual < minimum {
            return Err(BalanceInvariantViolation {
                asset: key,
                minimum,
                actual,
            }
            .into());
        }
        tracing::debug!("{} balance of {} is {}, at least {}", key, self.name, actual, minimum);

        Ok(())
    }
}
