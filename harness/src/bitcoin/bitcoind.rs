use crate::{jsonrpc, ledger::BitcoinNetwork, timestamp::Timestamp};
use anyhow::Context;
use ::bitcoin::{Address, Amount};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Client {
    rpc_client: jsonrpc::Client,
}

impl Client {
    pub fn new(url: url::Url) -> Self {
        Client {
            rpc_client: jsonrpc::Client::new(url),
        }
    }

    pub async fn network(&self) -> anyhow::Result<BitcoinNetwork> {
        let blockchain_info = self.blockchain_info().await?;

        let network = match blockchain_info.chain.as_str() {
            "main" => BitcoinNetwork::Mainnet,
            "test" => BitcoinNetwork::Testnet,
            "regtest" => BitcoinNetwork::Regtest,
            other => anyhow::bail!("bitcoind runs on unsupported chain {}", other),
        };

        Ok(network)
    }

    /// The median time past of the chain tip, which is what timelocks are
    /// checked against.
    pub async fn median_time(&self) -> anyhow::Result<Timestamp> {
        let blockchain_info = self.blockchain_info().await?;

        Ok(Timestamp::from_secs_u64(blockchain_info.mediantime))
    }

    async fn blockchain_info(&self) -> anyhow::Result<BlockchainInfo> {
        let blockchain_info = self
            .rpc_client
            .send::<Vec<()>, BlockchainInfo>(jsonrpc::Request::new("getblockchaininfo", vec![]))
            .await
            .context("failed to get blockchain info")?;

        Ok(blockchain_info)
    }

    pub async fn create_wallet(&self, wallet_name: &str) -> anyhow::Result<CreateWalletResponse> {
        let response = self
            .rpc_client
            .send(jsonrpc::Request::new(
                "createwallet",
                vec![jsonrpc::serialize(wallet_name)?],
            ))
            .await
            .with_context(|| format!("failed to create wallet {}", wallet_name))?;

        Ok(response)
    }

    pub async fn get_new_address(&self, wallet_name: &str) -> anyhow::Result<Address> {
        let address = self
            .rpc_client
            .send_with_path(
                &wallet_path(wallet_name),
                jsonrpc::Request::new("getnewaddress", Vec::<()>::new()),
            )
            .await?;

        Ok(address)
    }

    pub async fn get_balance(&self, wallet_name: &str) -> anyhow::Result<Amount> {
        let balances = self
            .rpc_client
            .send_with_path::<_, Balances>(
                &wallet_path(wallet_name),
                jsonrpc::Request::new("getbalances", Vec::<()>::new()),
            )
            .await?;

        let trusted = Amount::from_btc(balances.mine.trusted)?;
        let pending = Amount::from_btc(balances.mine.untrusted_pending)?;

        Ok(trusted + pending)
    }

    pub async fn send_to_address(
        &self,
        wallet_name: &str,
        address: &Address,
        amount: Amount,
    ) -> anyhow::Result<String> {
        let txid = self
            .rpc_client
            .send_with_path(
                &wallet_path(wallet_name),
                jsonrpc::Request::new(
                    "sendtoaddress",
                    vec![
                        jsonrpc::serialize(address)?,
                        jsonrpc::serialize(amount.to_btc())?,
                    ],
                ),
            )
            .await
            .with_context(|| format!("failed to send {} to {}", amount, address))?;

        Ok(txid)
    }

    pub async fn send_raw_transaction(&self, transaction_hex: &str) -> anyhow::Result<String> {
        let txid = self
            .rpc_client
            .send(jsonrpc::Request::new(
                "sendrawtransaction",
                vec![transaction_hex],
            ))
            .await
            .context("failed to broadcast transaction")?;

        Ok(txid)
    }

    pub async fn generate_to_address(
        &self,
        nblocks: u32,
        address: &Address,
    ) -> anyhow::Result<Vec<BlockHash>> {
        let response = self
            .rpc_client
            .send(jsonrpc::Request::new(
                "generatetoaddress",
                vec![
                    jsonrpc::serialize(nblocks)?,
                    jsonrpc::serialize(address)?,
                ],
            ))
            .await?;

        Ok(response)
    }

    pub async fn get_transaction(
        &self,
        wallet_name: &str,
        txid: &str,
    ) -> anyhow::Result<WalletTransaction> {
        let transaction = self
            .rpc_client
            .send_with_path(
                &wallet_path(wallet_name),
                jsonrpc::Request::new("gettransaction", vec![txid]),
            )
            .await?;

        Ok(transaction)
    }
}

fn wallet_path(wallet_name: &str) -> String {
    format!("/wallet/{}", wallet_name)
}

#[derive(Debug, Deserialize)]
struct BlockchainInfo {
    chain: String,
    mediantime: u64,
}

#[derive(Debug, Deserialize)]
pub struct BlockHash(String);

#[derive(Debug, Deserialize)]
pub struct CreateWalletResponse {
    pub name: String,
    #[serde(default)]
    pub warning: String,
}

#[derive(Debug, Deserialize)]
struct Balances {
    mine: MineBalances,
}

#[derive(Debug, Deserialize)]
struct MineBalances {
    trusted: f64,
    untrusted_pending: f64,
}

#[derive(Debug, Deserialize)]
pub struct WalletTransaction {
    pub txid: String,
    /// Negative if the transaction conflicts with the best chain.
    pub confirmations: i64,
}
