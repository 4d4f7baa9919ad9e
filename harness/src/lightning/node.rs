use crate::{
    asset::{Asset, AssetKind},
    bitcoin::{self, bitcoind},
    config::Settings,
    ledger::LedgerKind,
    lightning::{
        lnd, Invoice, InvoiceState, Lightning, LightningHandle, LightningNode, NodeIdentity,
    },
    poll::{poll_until, Clock, PollConfig},
    process::{free_port, LocalProcess, Process, Readiness},
    quantity::Quantity,
    swap::LedgerAction,
    timestamp::Timestamp,
    wallet::{self, MintLock, TransactionId, WalletOwner},
};
use anyhow::Context;
use std::{sync::Arc, time::Duration};

const CHANNEL_CONFIRMATIONS: u32 = 6;
const NODE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const NODE_TIMEOUT: Duration = Duration::from_secs(30);

/// An lnd node backed by the shared bitcoind.
#[derive(Debug)]
pub struct Lnd {
    client: lnd::Client,
    identity: NodeIdentity,
    bitcoind: bitcoind::Client,
    miner_wallet: String,
    mint_lock: MintLock,
    clock: Arc<dyn Clock>,
}

/// Starts an lnd for `owner` and waits until it has synced to the chain.
pub async fn launch(
    settings: &Settings,
    owner: &WalletOwner,
    mint_lock: MintLock,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<LightningHandle> {
    let dir = owner.dir.join(format!("{}-lnd", owner.actor));
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let network = settings.bitcoin.network;
    let backend = &settings.lightning.backend;
    let p2p_port = free_port()?;
    let rpc_port = free_port()?;
    let rest_port = free_port()?;

    let tls_cert = dir.join("tls.cert");
    let macaroon = dir
        .join("data")
        .join("chain")
        .join("bitcoin")
        .join(network.to_string())
        .join("admin.macaroon");

    let args = vec![
        format!("--lnddir={}", dir.display()),
        format!("--listen=127.0.0.1:{}", p2p_port),
        format!("--rpclisten=127.0.0.1:{}", rpc_port),
        format!("--restlisten=127.0.0.1:{}", rest_port),
        "--bitcoin.active".to_owned(),
        format!("--bitcoin.{}", network),
        "--bitcoin.node=bitcoind".to_owned(),
        format!("--bitcoind.rpchost={}", backend.rpc_host),
        format!("--bitcoind.rpcuser={}", backend.rpc_user),
        format!("--bitcoind.rpcpass={}", backend.rpc_pass),
        format!("--bitcoind.zmqpubrawblock={}", backend.zmq_pub_raw_block),
        format!("--bitcoind.zmqpubrawtx={}", backend.zmq_pub_raw_tx),
        "--noseedbackup".to_owned(),
        "--nobootstrap".to_owned(),
        "--debuglevel=debug".to_owned(),
    ];

    let process: Arc<dyn Process> = Arc::new(LocalProcess::new(
        format!("{}'s lnd", owner.actor),
        settings.lightning.lnd_binary.clone(),
        args,
        owner.dir.join(format!("{}-lnd.log", owner.actor)),
        Readiness::File(macaroon.clone()),
        clock.clone(),
    ));
    process.start().await?;

    let url = format!("https://localhost:{}", rest_port).parse()?;
    let client = lnd::Client::new(url, &tls_cert, &macaroon).await?;

    let info = poll_until(
        &*clock,
        PollConfig::every(NODE_POLL_INTERVAL).with_timeout(NODE_TIMEOUT),
        "lnd to sync to chain",
        || async {
            let info = client.get_info().await?;

            Ok(if info.synced_to_chain { Some(info) } else { None })
        },
    )
    .await?;

    let lnd = Arc::new(Lnd {
        client,
        identity: NodeIdentity {
            pubkey: info.identity_pubkey,
            p2p_socket: format!("127.0.0.1:{}", p2p_port),
        },
        bitcoind: bitcoind::Client::new(settings.bitcoin.bitcoind.node_url.clone()),
        miner_wallet: settings.bitcoin.miner_wallet.clone(),
        mint_lock,
        clock,
    });

    Ok(LightningHandle {
        lightning: Lightning {
            wallet: lnd.clone(),
            node: lnd,
        },
        process,
    })
}

impl Lnd {
    async fn generate_blocks(&self, count: u32) -> anyhow::Result<()> {
        let miner_address = self.bitcoind.get_new_address(&self.miner_wallet).await?;
        self.bitcoind
            .generate_to_address(count, &miner_address)
            .await?;

        Ok(())
    }

    fn sat(quantity: &Quantity) -> anyhow::Result<u64> {
        quantity
            .to_u64()
            .with_context(|| format!("{} sat do not fit into lightning", quantity))
    }
}

#[async_trait::async_trait]
impl wallet::Wallet for Lnd {
    fn ledger(&self) -> LedgerKind {
        LedgerKind::Lightning
    }

    fn maximum_fee(&self) -> Quantity {
        Quantity::zero()
    }

    async fn address(&self) -> anyhow::Result<String> {
        Ok(self.identity.pubkey.clone())
    }

    /// Funds the node's on-chain wallet with enough to open a channel of
    /// one and a half times the quantity.
    async fn mint(&self, asset: &Asset) -> anyhow::Result<()> {
        if asset.kind != AssetKind::Bitcoin {
            anyhow::bail!("lightning wallet cannot hold {}", asset.kind);
        }

        let starting_balance = self.balance_of(asset).await?;
        let funding = ::bitcoin::Amount::from_sat(Self::sat(&asset.quantity.ratio(3, 2))?)
            + bitcoin::fee_allowance();
        let address: ::bitcoin::Address = self.client.new_address().await?.parse()?;

        {
            let _guard = self.mint_lock.lock().await;

            self.bitcoind
                .send_to_address(&self.miner_wallet, &address, funding)
                .await?;
            self.generate_blocks(1).await?;
        }

        wallet::poll_until_minted(
            &*self.clock,
            self,
            asset,
            starting_balance + Quantity::from(funding),
        )
        .await
    }

    async fn balance_of(&self, asset: &Asset) -> anyhow::Result<Quantity> {
        if asset.kind != AssetKind::Bitcoin {
            anyhow::bail!("lightning wallet cannot hold {}", asset.kind);
        }

        let on_chain = self.client.confirmed_wallet_balance().await?;
        let in_channels = self.client.channel_balance().await?;

        Ok(Quantity::from_sat(on_chain) + Quantity::from_sat(in_channels))
    }

    async fn blockchain_time(&self) -> anyhow::Result<Timestamp> {
        let info = self.client.get_info().await?;

        Ok(Timestamp::from_secs_u64(info.best_header_timestamp))
    }

    async fn execute(&self, action: &LedgerAction) -> anyhow::Result<TransactionId> {
        anyhow::bail!("lightning wallet does not execute {:?}", action)
    }

    async fn transaction_succeeded(&self, transaction: &TransactionId) -> anyhow::Result<bool> {
        anyhow::bail!("lightning wallet does not track transaction {}", transaction)
    }
}

#[async_trait::async_trait]
impl LightningNode for Lnd {
    async fn identity(&self) -> anyhow::Result<NodeIdentity> {
        Ok(self.identity.clone())
    }

    async fn connect_peer(&self, peer: &NodeIdentity) -> anyhow::Result<()> {
        match self
            .client
            .connect_peer(&peer.pubkey, &peer.p2p_socket)
            .await
        {
            Err(e) if format!("{:#}", e).contains("already connected") => Ok(()),
            result => result,
        }
    }

    async fn open_channel(&self, peer: &NodeIdentity, capacity: &Quantity) -> anyhow::Result<()> {
        self.client
            .open_channel(&peer.pubkey, Self::sat(capacity)?)
            .await?;
        self.generate_blocks(CHANNEL_CONFIRMATIONS).await?;

        let client = &self.client;
        let pubkey = peer.pubkey.as_str();
        poll_until(
            &*self.clock,
            PollConfig::every(NODE_POLL_INTERVAL).with_timeout(NODE_TIMEOUT),
            &format!("channel to {} to become active", pubkey),
            move || async move {
                let channels = client.list_channels().await?;
                let active = channels
                    .iter()
                    .any(|channel| channel.remote_pubkey == pubkey && channel.active);

                Ok(if active { Some(()) } else { None })
            },
        )
        .await
    }

    async fn add_invoice(&self, amount: &Quantity) -> anyhow::Result<Invoice> {
        let payment_request = self.client.add_invoice(Self::sat(amount)?).await?;
        let decoded = self.client.decode_payment_request(&payment_request).await?;

        Ok(Invoice {
            payment_request,
            payment_hash: decoded.payment_hash,
        })
    }

    async fn pay(&self, payment_request: &str) -> anyhow::Result<()> {
        self.client.send_payment(payment_request).await
    }

    async fn lookup_invoice(&self, payment_hash: &str) -> anyhow::Result<InvoiceState> {
        self.client.lookup_invoice(payment_hash).await
    }
}
