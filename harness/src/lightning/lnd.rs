//! A client for lnd's REST interface.

use crate::{jsonrpc::ConnectionFailed, lightning::InvoiceState};
use anyhow::Context;
use futures::TryFutureExt;
use reqwest::{Certificate, StatusCode};
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::{path::Path, str::FromStr};
use url::Url;

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    url: Url,
    macaroon: String,
}

impl Client {
    /// lnd serves its REST API over TLS with a self-signed certificate and
    /// authenticates requests with the admin macaroon.
    pub async fn new(url: Url, tls_cert: &Path, macaroon: &Path) -> anyhow::Result<Self> {
        let certificate = tokio::fs::read(tls_cert)
            .await
            .with_context(|| format!("failed to read {}", tls_cert.display()))?;
        let macaroon = tokio::fs::read(macaroon)
            .await
            .with_context(|| format!("failed to read {}", macaroon.display()))?;

        let http = reqwest::Client::builder()
            .add_root_certificate(Certificate::from_pem(&certificate)?)
            .build()?;

        Ok(Client {
            http,
            url,
            macaroon: hex::encode(macaroon),
        })
    }

    pub async fn get_info(&self) -> anyhow::Result<GetInfo> {
        self.get("/v1/getinfo").await
    }

    pub async fn connect_peer(&self, pubkey: &str, host: &str) -> anyhow::Result<()> {
        #[derive(Debug, Serialize)]
        struct LightningAddress<'a> {
            pubkey: &'a str,
            host: &'a str,
        }

        #[derive(Debug, Serialize)]
        struct ConnectPeerRequest<'a> {
            addr: LightningAddress<'a>,
            perm: bool,
        }

        let _: serde_json::Value = self
            .post("/v1/peers", &ConnectPeerRequest {
                addr: LightningAddress { pubkey, host },
                perm: false,
            })
            .await?;

        Ok(())
    }

    pub async fn open_channel(&self, pubkey: &str, local_funding_sat: u64) -> anyhow::Result<()> {
        #[derive(Debug, Serialize)]
        struct OpenChannelRequest<'a> {
            node_pubkey_string: &'a str,
            local_funding_amount: String,
        }

        let _: serde_json::Value = self
            .post("/v1/channels", &OpenChannelRequest {
                node_pubkey_string: pubkey,
                local_funding_amount: local_funding_sat.to_string(),
            })
            .await?;

        Ok(())
    }

    pub async fn list_channels(&self) -> anyhow::Result<Vec<Channel>> {
        #[derive(Debug, Deserialize)]
        struct ListChannels {
            #[serde(default)]
            channels: Vec<Channel>,
        }

        let list: ListChannels = self.get("/v1/channels").await?;

        Ok(list.channels)
    }

    pub async fn channel_balance(&self) -> anyhow::Result<u64> {
        #[derive(Debug, Deserialize)]
        struct ChannelBalance {
            #[serde(default, deserialize_with = "string_u64")]
            balance: u64,
        }

        let balance: ChannelBalance = self.get("/v1/balance/channels").await?;

        Ok(balance.balance)
    }

    pub async fn confirmed_wallet_balance(&self) -> anyhow::Result<u64> {
        #[derive(Debug, Deserialize)]
        struct WalletBalance {
            #[serde(default, deserialize_with = "string_u64")]
            confirmed_balance: u64,
        }

        let balance: WalletBalance = self.get("/v1/balance/blockchain").await?;

        Ok(balance.confirmed_balance)
    }

    pub async fn new_address(&self) -> anyhow::Result<String> {
        #[derive(Debug, Deserialize)]
        struct NewAddress {
            address: String,
        }

        // type 0 is a native segwit address
        let response: NewAddress = self.get("/v1/newaddress?type=0").await?;

        Ok(response.address)
    }

    /// Returns the payment request of the new invoice.
    pub async fn add_invoice(&self, value_sat: u64) -> anyhow::Result<String> {
        #[derive(Debug, Serialize)]
        struct AddInvoiceRequest {
            value: String,
        }

        #[derive(Debug, Deserialize)]
        struct AddInvoiceResponse {
            payment_request: String,
        }

        let response: AddInvoiceResponse = self
            .post("/v1/invoices", &AddInvoiceRequest {
                value: value_sat.to_string(),
            })
            .await?;

        Ok(response.payment_request)
    }

    pub async fn decode_payment_request(&self, payment_request: &str) -> anyhow::Result<PayReq> {
        self.get(&format!("/v1/payreq/{}", payment_request)).await
    }

    pub async fn send_payment(&self, payment_request: &str) -> anyhow::Result<()> {
        #[derive(Debug, Serialize)]
        struct SendRequest<'a> {
            payment_request: &'a str,
        }

        #[derive(Debug, Deserialize)]
        struct SendResponse {
            #[serde(default)]
            payment_error: String,
        }

        let response: SendResponse = self
            .post("/v1/channels/transactions", &SendRequest { payment_request })
            .await?;

        if !response.payment_error.is_empty() {
            anyhow::bail!("payment failed: {}", response.payment_error);
        }

        Ok(())
    }

    pub async fn lookup_invoice(&self, payment_hash: &str) -> anyhow::Result<InvoiceState> {
        #[derive(Debug, Deserialize)]
        struct Invoice {
            state: InvoiceState,
        }

        let invoice: Invoice = self.get(&format!("/v1/invoice/{}", payment_hash)).await?;

        Ok(invoice.state)
    }

    async fn get<R>(&self, path: &str) -> anyhow::Result<R>
    where
        R: DeserializeOwned,
    {
        let response = self
            .http
            .get(self.url.join(path)?)
            .header(MACAROON_HEADER, &self.macaroon)
            .send()
            .map_err(ConnectionFailed)
            .await?;

        Self::parse(path, response).await
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> anyhow::Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url.join(path)?)
            .header(MACAROON_HEADER, &self.macaroon)
            .json(body)
            .send()
            .map_err(ConnectionFailed)
            .await?;

        Self::parse(path, response).await
    }

    async fn parse<R>(path: &str, response: reqwest::Response) -> anyhow::Result<R>
    where
        R: DeserializeOwned,
    {
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("lnd answered {} with {}: {}", path, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("failed to deserialize lnd response to {}", path))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GetInfo {
    pub identity_pubkey: String,
    #[serde(default)]
    pub synced_to_chain: bool,
    #[serde(default, deserialize_with = "string_u64")]
    pub best_header_timestamp: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Channel {
    pub remote_pubkey: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, deserialize_with = "string_u64")]
    pub local_balance: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PayReq {
    pub payment_hash: String,
    #[serde(default, deserialize_with = "string_u64")]
    pub num_satoshis: u64,
}

/// lnd encodes 64 bit integers as JSON strings.
fn string_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let string = String::deserialize(deserializer)?;

    u64::from_str(&string).map_err(de::Error::custom)
}
