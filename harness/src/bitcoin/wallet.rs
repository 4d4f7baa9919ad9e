use crate::{
    asset::{Asset, AssetKind},
    bitcoin::{self, bitcoind},
    config::Settings,
    expiry,
    ledger::{BitcoinNetwork, LedgerKind},
    poll::Clock,
    quantity::Quantity,
    swap::LedgerAction,
    timestamp::Timestamp,
    wallet::{self, MintLock, TransactionId, WalletOwner},
};
use anyhow::Context;
use std::{sync::Arc, time::Duration};

/// A bitcoind wallet that belongs to a single actor.
#[derive(Debug, Clone)]
pub struct Wallet {
    client: bitcoind::Client,
    name: String,
    miner_wallet: String,
    network: BitcoinNetwork,
    mint_lock: MintLock,
    clock: Arc<dyn Clock>,
    expiry_interval: Duration,
}

impl Wallet {
    pub async fn new(
        settings: &Settings,
        owner: &WalletOwner,
        mint_lock: MintLock,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let client = bitcoind::Client::new(settings.bitcoin.bitcoind.node_url.clone());

        let network = client.network().await?;
        if network != settings.bitcoin.network {
            anyhow::bail!(
                "bitcoind runs on {} but the harness is configured for {}",
                network,
                settings.bitcoin.network
            );
        }

        let name = owner.wallet_name();
        client.create_wallet(&name).await?;
        tracing::info!("created bitcoind wallet {}", name);

        Ok(Wallet {
            client,
            name,
            miner_wallet: settings.bitcoin.miner_wallet.clone(),
            network,
            mint_lock,
            clock,
            expiry_interval: settings.polling.expiry_interval,
        })
    }

    fn check_network(&self, network: BitcoinNetwork) -> anyhow::Result<()> {
        if network != self.network {
            anyhow::bail!(
                "action is meant for {} but the wallet is on {}",
                network,
                self.network
            );
        }

        Ok(())
    }
}

fn ensure_bitcoin(asset: &Asset) -> anyhow::Result<()> {
    match asset.kind {
        AssetKind::Bitcoin => Ok(()),
        AssetKind::Ether | AssetKind::Erc20 => {
            anyhow::bail!("bitcoin wallet cannot hold {}", asset.kind)
        }
    }
}

#[async_trait::async_trait]
impl wallet::Wallet for Wallet {
    fn ledger(&self) -> LedgerKind {
        LedgerKind::Bitcoin
    }

    fn maximum_fee(&self) -> Quantity {
        bitcoin::maximum_fee()
    }

    async fn address(&self) -> anyhow::Result<String> {
        let address = self.client.get_new_address(&self.name).await?;

        Ok(address.to_string())
    }

    async fn mint(&self, asset: &Asset) -> anyhow::Result<()> {
        ensure_bitcoin(asset)?;

        let starting_balance = self.balance_of(asset).await?;
        let sat = asset
            .quantity
            .to_u64()
            .with_context(|| format!("cannot mint {} sat", asset.quantity))?;
        let amount = ::bitcoin::Amount::from_sat(sat) + bitcoin::fee_allowance();

        let address = self.client.get_new_address(&self.name).await?;
        {
            let _guard = self.mint_lock.lock().await;

            self.client
                .send_to_address(&self.miner_wallet, &address, amount)
                .await?;
            let miner_address = self.client.get_new_address(&self.miner_wallet).await?;
            self.client.generate_to_address(1, &miner_address).await?;
        }
        tracing::debug!("minted {} to {}", amount, address);

        wallet::poll_until_minted(
            &*self.clock,
            self,
            asset,
            starting_balance + Quantity::from(amount),
        )
        .await
    }

    async fn balance_of(&self, asset: &Asset) -> anyhow::Result<Quantity> {
        ensure_bitcoin(asset)?;

        let balance = self.client.get_balance(&self.name).await?;

        Ok(Quantity::from(balance))
    }

    async fn blockchain_time(&self) -> anyhow::Result<Timestamp> {
        self.client.median_time().await
    }

    async fn execute(&self, action: &LedgerAction) -> anyhow::Result<TransactionId> {
        let txid = match action {
            LedgerAction::BitcoinSendAmountToAddress {
                to,
                amount,
                network,
            } => {
                self.check_network(*network)?;
                let sat = amount
                    .to_u64()
                    .with_context(|| format!("cannot send {} sat", amount))?;

                self.client
                    .send_to_address(&self.name, to, ::bitcoin::Amount::from_sat(sat))
                    .await?
            }
            LedgerAction::BitcoinBroadcastSignedTransaction {
                hex,
                network,
                min_median_block_time,
            } => {
                self.check_network(*network)?;
                if let Some(min_median_block_time) = min_median_block_time {
                    expiry::wait_for(
                        &*self.clock,
                        self.expiry_interval,
                        self,
                        *min_median_block_time,
                    )
                    .await?;
                }

                self.client.send_raw_transaction(hex).await?
            }
            LedgerAction::EthereumDeployContract { .. }
            | LedgerAction::EthereumCallContract { .. } => {
                anyhow::bail!("bitcoin wallet cannot execute {:?}", action)
            }
        };

        tracing::info!("bitcoin transaction {} sent", txid);

        Ok(TransactionId::from(txid))
    }

    async fn transaction_succeeded(&self, transaction: &TransactionId) -> anyhow::Result<bool> {
        let transaction = self
            .client
            .get_transaction(&self.name, transaction.as_str())
            .await?;

        Ok(transaction.confirmations >= 0)
    }
}
