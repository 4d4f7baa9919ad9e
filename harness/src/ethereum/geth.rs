use crate::{
    ethereum::{balance_of_call_data, Address, Bytes, H256, U256},
    jsonrpc,
    ledger::ChainId,
    quantity::Quantity,
    timestamp::Timestamp,
};
use anyhow::Context;
use ethereum_types::U64;
use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

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

    pub async fn chain_id(&self) -> anyhow::Result<ChainId> {
        let chain_id = self
            .rpc_client
            .send::<Vec<()>, String>(jsonrpc::Request::with_version(
                "net_version",
                vec![],
                JSONRPC_VERSION,
            ))
            .await
            .context("failed to fetch net version")?;
        let chain_id: u32 = chain_id.parse()?;

        Ok(ChainId::from(chain_id))
    }

    pub async fn accounts(&self) -> anyhow::Result<Vec<Address>> {
        let accounts = self
            .rpc_client
            .send::<Vec<()>, Vec<Address>>(jsonrpc::Request::with_version(
                "eth_accounts",
                vec![],
                JSONRPC_VERSION,
            ))
            .await
            .context("failed to list accounts")?;

        Ok(accounts)
    }

    pub async fn new_account(&self, passphrase: &str) -> anyhow::Result<Address> {
        let account = self
            .rpc_client
            .send(jsonrpc::Request::with_version(
                "personal_newAccount",
                vec![passphrase],
                JSONRPC_VERSION,
            ))
            .await
            .context("failed to create account")?;

        Ok(account)
    }

    pub async fn get_balance(&self, address: Address) -> anyhow::Result<Quantity> {
        let amount: String = self
            .rpc_client
            .send(jsonrpc::Request::with_version(
                "eth_getBalance",
                vec![jsonrpc::serialize(address)?, jsonrpc::serialize("latest")?],
                JSONRPC_VERSION,
            ))
            .await
            .context("failed to get balance")?;

        Quantity::from_hex_str(&amount)
    }

    pub async fn erc20_balance(
        &self,
        account: Address,
        token_contract: Address,
    ) -> anyhow::Result<Quantity> {
        #[derive(Debug, Serialize)]
        struct CallRequest {
            to: Address,
            data: Bytes,
        }

        let call_request = CallRequest {
            to: token_contract,
            data: Bytes(balance_of_call_data(account)),
        };

        let quantity: String = self
            .rpc_client
            .send(jsonrpc::Request::with_version(
                "eth_call",
                vec![
                    jsonrpc::serialize(call_request)?,
                    jsonrpc::serialize("latest")?,
                ],
                JSONRPC_VERSION,
            ))
            .await
            .context("failed to get erc20 token balance")?;

        Quantity::from_hex_str(&quantity)
    }

    pub async fn latest_block_timestamp(&self) -> anyhow::Result<Timestamp> {
        let block: Option<Block> = self
            .rpc_client
            .send(jsonrpc::Request::with_version(
                "eth_getBlockByNumber",
                vec![jsonrpc::serialize("latest")?, jsonrpc::serialize(false)?],
                JSONRPC_VERSION,
            ))
            .await
            .context("failed to get latest block")?;
        let block = block.context("node has no latest block")?;

        Ok(Timestamp::from_secs_u64(block.timestamp.low_u64()))
    }

    /// Sends from an account the node keeps unlocked, like the dev account.
    pub async fn send_transaction(&self, request: TransactionRequest) -> anyhow::Result<H256> {
        let hash = self
            .rpc_client
            .send(jsonrpc::Request::with_version(
                "eth_sendTransaction",
                vec![request],
                JSONRPC_VERSION,
            ))
            .await
            .context("failed to send transaction")?;

        Ok(hash)
    }

    /// Unlocks `request.from` with `passphrase` for this one transaction.
    pub async fn personal_send_transaction(
        &self,
        request: TransactionRequest,
        passphrase: &str,
    ) -> anyhow::Result<H256> {
        let hash = self
            .rpc_client
            .send(jsonrpc::Request::with_version(
                "personal_sendTransaction",
                vec![jsonrpc::serialize(request)?, jsonrpc::serialize(passphrase)?],
                JSONRPC_VERSION,
            ))
            .await
            .context("failed to send transaction")?;

        Ok(hash)
    }

    pub async fn get_transaction_receipt(
        &self,
        transaction_hash: &str,
    ) -> anyhow::Result<Option<TransactionReceipt>> {
        let receipt = self
            .rpc_client
            .send(jsonrpc::Request::with_version(
                "eth_getTransactionReceipt",
                vec![transaction_hash],
                JSONRPC_VERSION,
            ))
            .await
            .context("failed to get transaction receipt")?;

        Ok(receipt)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TransactionRequest {
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

#[derive(Debug, Deserialize)]
struct Block {
    timestamp: U256,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// `1` on success, `0` if the transaction reverted.
    #[serde(default)]
    pub status: Option<U64>,
}

impl TransactionReceipt {
    pub fn is_successful(&self) -> bool {
        self.status == Some(U64::one())
    }
}
