use crate::{
    asset::{Asset, AssetKind},
    config::Settings,
    ethereum::{
        self,
        geth::{Client, TransactionReceipt, TransactionRequest},
        Address, Bytes, H256,
    },
    expiry,
    ledger::{ChainId, LedgerKind},
    poll::{poll_until, Clock, PollConfig},
    quantity::Quantity,
    swap::LedgerAction,
    timestamp::Timestamp,
    wallet::{self, MintLock, TransactionId, WalletOwner},
};
use anyhow::Context;
use std::{sync::Arc, time::Duration};

/// Actor accounts are throw-away, they share one passphrase.
const PASSPHRASE: &str = "harness";

/// Gas for an ERC20 `transfer`, with room to spare.
const TRANSFER_GAS_LIMIT: u64 = 100_000;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// A geth-managed account that belongs to a single actor.
#[derive(Debug, Clone)]
pub struct Wallet {
    client: Client,
    account: Address,
    dev_account: Address,
    chain_id: ChainId,
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
        let client = Client::new(settings.ethereum.geth.node_url.clone());

        let chain_id = client.chain_id().await?;
        if chain_id != settings.ethereum.chain_id {
            anyhow::bail!(
                "geth runs chain {} but the harness is configured for {}",
                chain_id,
                settings.ethereum.chain_id
            );
        }

        let dev_account = client
            .accounts()
            .await?
            .into_iter()
            .next()
            .context("geth has no dev account to mint from")?;
        let account = client.new_account(PASSPHRASE).await?;
        tracing::info!("created ethereum account {:?} for {}", account, owner.actor);

        Ok(Wallet {
            client,
            account,
            dev_account,
            chain_id,
            mint_lock,
            clock,
            expiry_interval: settings.polling.expiry_interval,
        })
    }

    pub fn account(&self) -> Address {
        self.account
    }

    fn check_chain(&self, chain_id: Option<ChainId>) -> anyhow::Result<()> {
        match chain_id {
            Some(chain_id) if chain_id != self.chain_id => anyhow::bail!(
                "action is meant for chain {} but the wallet is on {}",
                chain_id,
                self.chain_id
            ),
            _ => Ok(()),
        }
    }

    async fn wait_for_receipt(&self, hash: H256) -> anyhow::Result<TransactionReceipt> {
        let hash = format!("{:?}", hash);
        let what = format!("receipt of {}", hash);
        let hash = hash.as_str();
        let client = &self.client;

        poll_until(
            &*self.clock,
            PollConfig::every(RECEIPT_POLL_INTERVAL).with_timeout(RECEIPT_TIMEOUT),
            &what,
            move || client.get_transaction_receipt(hash),
        )
        .await
    }

    /// Sends from the dev account and waits until the transaction is mined.
    async fn send_from_dev_account(&self, request: TransactionRequest) -> anyhow::Result<()> {
        let hash = self.client.send_transaction(request).await?;
        let receipt = self.wait_for_receipt(hash).await?;

        if !receipt.is_successful() {
            anyhow::bail!("mint transaction {:?} reverted", hash);
        }

        Ok(())
    }

    fn token_contract(asset: &Asset) -> anyhow::Result<Address> {
        asset
            .token_contract
            .with_context(|| format!("{} asset without token contract", asset.kind))
    }
}

#[async_trait::async_trait]
impl wallet::Wallet for Wallet {
    fn ledger(&self) -> LedgerKind {
        LedgerKind::Ethereum
    }

    fn maximum_fee(&self) -> Quantity {
        ethereum::maximum_fee()
    }

    async fn address(&self) -> anyhow::Result<String> {
        Ok(format!("{:?}", self.account))
    }

    async fn mint(&self, asset: &Asset) -> anyhow::Result<()> {
        let ether = Asset {
            kind: AssetKind::Ether,
            ledger: LedgerKind::Ethereum,
            quantity: ethereum::gas_allowance(),
            token_contract: None,
        };

        let starting_balance = self.balance_of(asset).await?;
        let expected_balance = match asset.kind {
            AssetKind::Ether => {
                starting_balance + asset.quantity.clone() + ethereum::gas_allowance()
            }
            AssetKind::Erc20 => starting_balance + asset.quantity.clone(),
            AssetKind::Bitcoin => anyhow::bail!("ethereum wallet cannot hold bitcoin"),
        };

        {
            let _guard = self.mint_lock.lock().await;

            let value = match asset.kind {
                AssetKind::Ether => (asset.quantity.clone() + ether.quantity.clone()).to_u256()?,
                _ => ether.quantity.to_u256()?,
            };
            self.send_from_dev_account(TransactionRequest {
                from: self.dev_account,
                to: Some(self.account),
                value: Some(value),
                gas: None,
                data: None,
            })
            .await?;

            if let AssetKind::Erc20 = asset.kind {
                let data = ethereum::transfer_call_data(self.account, asset.quantity.to_u256()?);

                self.send_from_dev_account(TransactionRequest {
                    from: self.dev_account,
                    to: Some(Self::token_contract(asset)?),
                    value: None,
                    gas: Some(TRANSFER_GAS_LIMIT.into()),
                    data: Some(Bytes(data)),
                })
                .await?;
            }
        }
        tracing::debug!("minted {} {} to {:?}", asset.quantity, asset.kind, self.account);

        wallet::poll_until_minted(&*self.clock, self, asset, expected_balance).await
    }

    async fn balance_of(&self, asset: &Asset) -> anyhow::Result<Quantity> {
        match asset.kind {
            AssetKind::Ether => self.client.get_balance(self.account).await,
            AssetKind::Erc20 => {
                self.client
                    .erc20_balance(self.account, Self::token_contract(asset)?)
                    .await
            }
            AssetKind::Bitcoin => anyhow::bail!("ethereum wallet cannot hold bitcoin"),
        }
    }

    async fn blockchain_time(&self) -> anyhow::Result<Timestamp> {
        self.client.latest_block_timestamp().await
    }

    async fn execute(&self, action: &LedgerAction) -> anyhow::Result<TransactionId> {
        let request = match action {
            LedgerAction::EthereumDeployContract {
                data,
                amount,
                gas_limit,
                chain_id,
            } => {
                self.check_chain(*chain_id)?;

                TransactionRequest {
                    from: self.account,
                    to: None,
                    value: Some(amount.to_u256()?),
                    gas: Some(*gas_limit),
                    data: Some(data.clone()),
                }
            }
            LedgerAction::EthereumCallContract {
                contract_address,
                data,
                gas_limit,
                chain_id,
                min_block_timestamp,
            } => {
                self.check_chain(*chain_id)?;
                if let Some(min_block_timestamp) = min_block_timestamp {
                    expiry::wait_for(
                        &*self.clock,
                        self.expiry_interval,
                        self,
                        *min_block_timestamp,
                    )
                    .await?;
                }

                TransactionRequest {
                    from: self.account,
                    to: Some(*contract_address),
                    value: None,
                    gas: Some(*gas_limit),
                    data: data.clone(),
                }
            }
            LedgerAction::BitcoinSendAmountToAddress { .. }
            | LedgerAction::BitcoinBroadcastSignedTransaction { .. } => {
                anyhow::bail!("ethereum wallet cannot execute {:?}", action)
            }
        };

        let hash = self
            .client
            .personal_send_transaction(request, PASSPHRASE)
            .await?;
        let receipt = self.wait_for_receipt(hash).await?;
        tracing::info!(
            "ethereum transaction {:?} mined, successful: {}",
            hash,
            receipt.is_successful()
        );

        Ok(TransactionId::from(format!("{:?}", hash)))
    }

    async fn transaction_succeeded(&self, transaction: &TransactionId) -> anyhow::Result<bool> {
        let receipt = self
            .client
            .get_transaction_receipt(transaction.as_str())
            .await?;

        Ok(receipt.map_or(false, |receipt| receipt.is_successful()))
    }
}
