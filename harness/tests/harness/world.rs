//! In-memory ledgers shared by all fakes of a test.

use anyhow::Context;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};
use swap_harness::{
    ethereum::{Address, U256},
    lightning::InvoiceState,
    swap::{CommunicationStatus, HtlcState, LedgerAction, Role, Side, SwapStatus},
    wallet::TransactionId,
    ActorName, AssetKey, AssetKind, LedgerKind, Quantity, Timestamp,
};

pub const BITCOIN_FEE_SAT: u64 = 1_000;
pub const ETHER_FEE_WEI: u64 = 1_000_000_000_000_000;
/// Contract interactions with less gas fail.
pub const MINIMUM_GAS: u64 = 100_000;
/// How far the ledgers move on whenever somebody looks at the time.
pub const BLOCK_TIME_SECS: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Deploy,
    Fund,
    Redeem,
    Refund,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Deploy => "deploy",
            Operation::Fund => "fund",
            Operation::Redeem => "redeem",
            Operation::Refund => "refund",
        }
    }
}

/// What a fake ledger transaction does, encoded into its payload.
pub fn encode(operation: Operation, id: &str, side: Side) -> Vec<u8> {
    format!("{}:{}:{}", operation.as_str(), id, side).into_bytes()
}

fn decode(payload: &[u8]) -> anyhow::Result<(Operation, String, Side)> {
    let payload = std::str::from_utf8(payload)?;
    let mut parts = payload.splitn(3, ':');

    let operation = match parts.next() {
        Some("deploy") => Operation::Deploy,
        Some("fund") => Operation::Fund,
        Some("redeem") => Operation::Redeem,
        Some("refund") => Operation::Refund,
        other => anyhow::bail!("unknown operation {:?}", other),
    };
    let id = parts.next().context("payload lacks a swap id")?.to_owned();
    let side = match parts.next() {
        Some("alpha") => Side::Alpha,
        Some("beta") => Side::Beta,
        other => anyhow::bail!("unknown side {:?}", other),
    };

    Ok((operation, id, side))
}

/// The address bitcoin is sent to when funding an HTLC.
pub fn htlc_address(id: &str, side: Side) -> bitcoin::Address {
    let script = bitcoin::Script::from(format!("{}:{}", id, side).into_bytes());

    bitcoin::Address::p2wsh(&script, bitcoin::Network::Regtest)
}

pub fn contract_address(id: &str, side: Side) -> Address {
    let index = id.parse::<u64>().unwrap_or_default() * 2;
    let index = match side {
        Side::Alpha => index,
        Side::Beta => index + 1,
    };

    Address::from_low_u64_be(0xc0_0000 + index)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Htlc {
    pub asset: AssetKey,
    pub quantity: Quantity,
    pub state: HtlcState,
    pub locked: Quantity,
    pub expiry: Timestamp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FakeSwap {
    pub id: String,
    pub alice: ActorName,
    pub bob: ActorName,
    pub communication: CommunicationStatus,
    /// Overrides what cnd derives from the HTLCs.
    pub reported_status: Option<SwapStatus>,
    pub alpha: Htlc,
    pub beta: Htlc,
}

impl FakeSwap {
    pub fn htlc(&self, side: Side) -> &Htlc {
        match side {
            Side::Alpha => &self.alpha,
            Side::Beta => &self.beta,
        }
    }

    fn htlc_mut(&mut self, side: Side) -> &mut Htlc {
        match side {
            Side::Alpha => &mut self.alpha,
            Side::Beta => &mut self.beta,
        }
    }

    pub fn role_of(&self, actor: ActorName) -> Option<Role> {
        if actor == self.alice {
            Some(Role::Alice)
        } else if actor == self.bob {
            Some(Role::Bob)
        } else {
            None
        }
    }

    pub fn counterparty_of(&self, actor: ActorName) -> ActorName {
        if actor == self.alice {
            self.bob
        } else {
            self.alice
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub from: ActorName,
    pub to: ActorName,
    pub capacity: Quantity,
}

#[derive(Clone, Debug)]
struct Invoice {
    owner: ActorName,
    amount: Quantity,
    state: InvoiceState,
}

#[derive(Debug)]
struct Ledgers {
    time: Timestamp,
    balances: HashMap<(ActorName, AssetKey), Quantity>,
    swaps: BTreeMap<String, FakeSwap>,
    transactions: HashMap<String, bool>,
    peers: Vec<(ActorName, ActorName)>,
    channels: Vec<Channel>,
    invoices: HashMap<String, Invoice>,
    next_id: u64,
    balances_stalled: bool,
}

/// Bitcoin, ethereum and lightning in one mutex. Every actor's wallets and
/// cnd look at the same instance.
#[derive(Clone, Debug)]
pub struct World {
    ledgers: Arc<Mutex<Ledgers>>,
}

impl Default for World {
    fn default() -> Self {
        World {
            ledgers: Arc::new(Mutex::new(Ledgers {
                time: Timestamp::now(),
                balances: HashMap::new(),
                swaps: BTreeMap::new(),
                transactions: HashMap::new(),
                peers: Vec::new(),
                channels: Vec::new(),
                invoices: HashMap::new(),
                next_id: 0,
                balances_stalled: false,
            })),
        }
    }
}

impl World {
    fn lock(&self) -> MutexGuard<'_, Ledgers> {
        self.ledgers.lock().unwrap()
    }

    pub fn time(&self) -> Timestamp {
        self.lock().time
    }

    /// Mines a block.
    pub fn advance_time(&self) -> Timestamp {
        let mut ledgers = self.lock();
        ledgers.time = ledgers.time.plus(BLOCK_TIME_SECS);

        ledgers.time
    }

    pub fn balance(&self, actor: ActorName, asset: AssetKey) -> Quantity {
        self.lock()
            .balances
            .get(&(actor, asset))
            .cloned()
            .unwrap_or_default()
    }

    pub fn credit(&self, actor: ActorName, asset: AssetKey, amount: &Quantity) {
        self.lock().credit(actor, asset, amount)
    }

    /// Takes `amount` away as if somebody else had spent it.
    pub fn take(&self, actor: ActorName, asset: AssetKey, amount: &Quantity) -> anyhow::Result<()> {
        self.lock().debit(actor, asset, amount)
    }

    /// From now on balance queries never get an answer.
    pub fn stall_balances(&self) {
        self.lock().balances_stalled = true;
    }

    pub fn balances_stalled(&self) -> bool {
        self.lock().balances_stalled
    }

    pub fn create_swap(
        &self,
        alice: ActorName,
        bob: ActorName,
        alpha: (AssetKey, Quantity, Timestamp),
        beta: (AssetKey, Quantity, Timestamp),
    ) -> String {
        let mut ledgers = self.lock();
        ledgers.next_id += 1;
        let id = ledgers.next_id.to_string();

        let htlc = |(asset, quantity, expiry): (AssetKey, Quantity, Timestamp)| Htlc {
            asset,
            quantity,
            state: HtlcState::NotDeployed,
            locked: Quantity::zero(),
            expiry,
        };
        ledgers.swaps.insert(
            id.clone(),
            FakeSwap {
                id: id.clone(),
                alice,
                bob,
                communication: CommunicationStatus::Sent,
                reported_status: None,
                alpha: htlc(alpha),
                beta: htlc(beta),
            },
        );

        id
    }

    pub fn swap(&self, id: &str) -> Option<FakeSwap> {
        self.lock().swaps.get(id).cloned()
    }

    pub fn swaps_of(&self, actor: ActorName) -> Vec<FakeSwap> {
        self.lock()
            .swaps
            .values()
            .filter(|swap| swap.role_of(actor).is_some())
            .cloned()
            .collect()
    }

    pub fn respond(
        &self,
        id: &str,
        actor: ActorName,
        response: CommunicationStatus,
    ) -> anyhow::Result<()> {
        let mut ledgers = self.lock();
        let swap = ledgers.swaps.get_mut(id).context("unknown swap")?;

        if swap.bob != actor {
            anyhow::bail!("only the receiving party can respond to a request");
        }
        if swap.communication != CommunicationStatus::Sent {
            anyhow::bail!("request was already answered with {}", swap.communication);
        }
        swap.communication = response;

        Ok(())
    }

    pub fn force_reported_status(&self, id: &str, status: SwapStatus) {
        if let Some(swap) = self.lock().swaps.get_mut(id) {
            swap.reported_status = Some(status);
        }
    }

    /// Puts an HTLC into a state no matter what happened before.
    pub fn force_state(&self, id: &str, side: Side, state: HtlcState) {
        if let Some(swap) = self.lock().swaps.get_mut(id) {
            swap.htlc_mut(side).state = state;
        }
    }

    pub fn execute(
        &self,
        actor: ActorName,
        action: &LedgerAction,
    ) -> anyhow::Result<TransactionId> {
        let mut ledgers = self.lock();
        ledgers.next_id += 1;
        let transaction = format!("tx{}", ledgers.next_id);

        let (operation, id, side, amount, gas_limit) = match action {
            LedgerAction::BitcoinSendAmountToAddress { to, amount, .. } => {
                let (id, side) = ledgers
                    .swaps
                    .keys()
                    .flat_map(|id| vec![(id.clone(), Side::Alpha), (id.clone(), Side::Beta)])
                    .find(|(id, side)| &htlc_address(id, *side) == to)
                    .context("bitcoin sent to an address that is not an htlc")?;

                (Operation::Fund, id, side, Some(amount.clone()), None)
            }
            LedgerAction::BitcoinBroadcastSignedTransaction { hex: payload, .. } => {
                let (operation, id, side) = decode(&hex::decode(payload)?)?;

                (operation, id, side, None, None)
            }
            LedgerAction::EthereumDeployContract {
                data,
                amount,
                gas_limit,
                ..
            } => {
                let (operation, id, side) = decode(&data.0)?;

                (operation, id, side, Some(amount.clone()), Some(*gas_limit))
            }
            LedgerAction::EthereumCallContract {
                data, gas_limit, ..
            } => {
                let data = data.as_ref().context("contract call without data")?;
                let (operation, id, side) = decode(&data.0)?;

                (operation, id, side, None, Some(*gas_limit))
            }
        };

        if let Some(gas_limit) = gas_limit {
            if gas_limit < U256::from(MINIMUM_GAS) {
                ledgers.transactions.insert(transaction.clone(), false);
                return Ok(TransactionId::from(transaction));
            }
        }

        ledgers.apply(actor, operation, &id, side, amount)?;
        ledgers.transactions.insert(transaction.clone(), true);

        Ok(TransactionId::from(transaction))
    }

    pub fn transaction_succeeded(&self, transaction: &TransactionId) -> anyhow::Result<bool> {
        self.lock()
            .transactions
            .get(transaction.as_str())
            .copied()
            .with_context(|| format!("unknown transaction {}", transaction))
    }

    pub fn connect(&self, from: ActorName, to: ActorName) {
        self.lock().peers.push((from, to));
    }

    pub fn open_channel(
        &self,
        from: ActorName,
        to: ActorName,
        capacity: &Quantity,
    ) -> anyhow::Result<()> {
        let mut ledgers = self.lock();
        let connected = ledgers
            .peers
            .iter()
            .any(|pair| *pair == (from, to) || *pair == (to, from));
        if !connected {
            anyhow::bail!("{} is not connected to {}", from, to);
        }

        ledgers.channels.push(Channel {
            from,
            to,
            capacity: capacity.clone(),
        });

        Ok(())
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.lock().channels.clone()
    }

    pub fn add_invoice(&self, owner: ActorName, amount: &Quantity) -> (String, String) {
        let mut ledgers = self.lock();
        ledgers.next_id += 1;
        let payment_hash = format!("{:064x}", ledgers.next_id);

        ledgers.invoices.insert(
            payment_hash.clone(),
            Invoice {
                owner,
                amount: amount.clone(),
                state: InvoiceState::Open,
            },
        );

        (format!("lnbcrt{}", payment_hash), payment_hash)
    }

    pub fn pay(&self, payer: ActorName, payment_request: &str) -> anyhow::Result<()> {
        let mut ledgers = self.lock();
        let payment_hash = payment_request
            .strip_prefix("lnbcrt")
            .context("not a regtest payment request")?;

        let invoice = ledgers
            .invoices
            .get(payment_hash)
            .cloned()
            .context("unknown invoice")?;
        let routable = ledgers.channels.iter().any(|channel| {
            ((channel.from, channel.to) == (payer, invoice.owner)
                || (channel.from, channel.to) == (invoice.owner, payer))
                && channel.capacity >= invoice.amount
        });
        if !routable {
            anyhow::bail!("no route from {} to {}", payer, invoice.owner);
        }

        let key = AssetKey {
            asset: AssetKind::Bitcoin,
            ledger: LedgerKind::Lightning,
        };
        ledgers.debit(payer, key, &invoice.amount)?;
        ledgers.credit(invoice.owner, key, &invoice.amount);
        if let Some(invoice) = ledgers.invoices.get_mut(payment_hash) {
            invoice.state = InvoiceState::Settled;
        }

        Ok(())
    }

    pub fn lookup_invoice(&self, payment_hash: &str) -> anyhow::Result<InvoiceState> {
        self.lock()
            .invoices
            .get(payment_hash)
            .map(|invoice| invoice.state)
            .context("unknown invoice")
    }
}

impl Ledgers {
    fn credit(&mut self, actor: ActorName, asset: AssetKey, amount: &Quantity) {
        let balance = self.balances.entry((actor, asset)).or_default();
        *balance = &*balance + amount;
    }

    fn debit(
        &mut self,
        actor: ActorName,
        asset: AssetKey,
        amount: &Quantity,
    ) -> anyhow::Result<()> {
        let balance = self.balances.entry((actor, asset)).or_default();
        if *balance < *amount {
            anyhow::bail!("{} has {} {} but needs {}", actor, balance, asset, amount);
        }
        *balance = balance.saturating_sub(amount);

        Ok(())
    }

    /// Fees are taken from what is there, actors without gas money pay
    /// nothing.
    fn charge_fee(&mut self, actor: ActorName, ledger: LedgerKind) {
        let (asset, fee) = match ledger {
            LedgerKind::Bitcoin | LedgerKind::Lightning => (
                AssetKey {
                    asset: AssetKind::Bitcoin,
                    ledger,
                },
                Quantity::from_sat(BITCOIN_FEE_SAT),
            ),
            LedgerKind::Ethereum => (
                AssetKey {
                    asset: AssetKind::Ether,
                    ledger,
                },
                Quantity::from_wei(ETHER_FEE_WEI),
            ),
        };

        let balance = self.balances.entry((actor, asset)).or_default();
        *balance = balance.saturating_sub(&fee);
    }

    fn apply(
        &mut self,
        actor: ActorName,
        operation: Operation,
        id: &str,
        side: Side,
        amount: Option<Quantity>,
    ) -> anyhow::Result<()> {
        let htlc = self
            .swaps
            .get(id)
            .with_context(|| format!("unknown swap {}", id))?
            .htlc(side)
            .clone();
        let time = self.time;

        let (state, locked) = match (operation, htlc.state) {
            (Operation::Deploy, HtlcState::NotDeployed) => (HtlcState::Deployed, htlc.locked),
            (Operation::Fund, HtlcState::NotDeployed) | (Operation::Fund, HtlcState::Deployed) => {
                let amount = amount.unwrap_or_else(|| htlc.quantity.clone());
                self.debit(actor, htlc.asset, &amount)?;

                let state = if amount == htlc.quantity {
                    HtlcState::Funded
                } else {
                    HtlcState::IncorrectlyFunded
                };

                (state, amount)
            }
            (Operation::Redeem, HtlcState::Funded) => {
                self.credit(actor, htlc.asset, &htlc.locked);

                (HtlcState::Redeemed, Quantity::zero())
            }
            (Operation::Refund, HtlcState::Funded)
            | (Operation::Refund, HtlcState::IncorrectlyFunded) => {
                if time < htlc.expiry {
                    anyhow::bail!("htlc expires at {}, it is only {}", htlc.expiry, time);
                }
                self.credit(actor, htlc.asset, &htlc.locked);

                (HtlcState::Refunded, Quantity::zero())
            }
            (operation, state) => anyhow::bail!(
                "cannot {} an htlc that is {}",
                operation.as_str(),
                state
            ),
        };
        self.charge_fee(actor, htlc.asset.ledger);

        if let Some(swap) = self.swaps.get_mut(id) {
            let htlc = swap.htlc_mut(side);
            htlc.state = state;
            htlc.locked = locked;
        }

        Ok(())
    }
}
