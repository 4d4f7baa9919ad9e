use anyhow::Context;
use futures::TryFutureExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;

pub const JSONRPC_VERSION: &str = "1.0";

#[derive(Clone, Debug)]
pub struct Client {
    inner: reqwest::Client,
    url: url::Url,
}

impl Client {
    pub fn new(base_url: url::Url) -> Self {
        Self {
            inner: reqwest::Client::new(),
            url: base_url,
        }
    }

    pub async fn send<Req, Res>(&self, request: Request<Req>) -> anyhow::Result<Res>
    where
        Req: Debug + Serialize,
        Res: Debug + DeserializeOwned,
    {
        self.send_with_path("", request).await
    }

    /// bitcoind serves wallet specific calls under `/wallet/<name>`.
    pub async fn send_with_path<Req, Res>(
        &self,
        path: &str,
        request: Request<Req>,
    ) -> anyhow::Result<Res>
    where
        Req: Debug + Serialize,
        Res: Debug + DeserializeOwned,
    {
        let url = self.url.join(path)?;

        tracing::trace!("sending {} to {}", request.method, url);

        let response = self
            .inner
            .post(url)
            .json(&request)
            .send()
            .map_err(ConnectionFailed)
            .await?
            .json::<Response<Res>>()
            .await
            .context("failed to deserialize JSON response as JSON-RPC response")?
            .into_result()
            .with_context(|| format!("JSON-RPC request {} failed", request.method))?;

        Ok(response)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Request<T> {
    id: String,
    jsonrpc: String,
    method: String,
    params: T,
}

impl<T> Request<T> {
    pub fn new(method: &str, params: T) -> Self {
        Self::with_version(method, params, JSONRPC_VERSION)
    }

    pub fn with_version(method: &str, params: T, jsonrpc: &str) -> Self {
        Self {
            id: "1".to_owned(),
            jsonrpc: jsonrpc.to_owned(),
            method: method.to_owned(),
            params,
        }
    }
}

/// bitcoind sends `result` and `error` side by side, one of them `null`.
#[derive(Deserialize, Debug, PartialEq)]
pub struct Response<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

impl<R> Response<R>
where
    R: DeserializeOwned,
{
    fn into_result(self) -> anyhow::Result<R> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error.into()),
            (Some(result), None) => Ok(result),
            // `null` is a legitimate result for calls like `eth_getTransactionReceipt`
            (None, None) => Ok(serde_json::from_value(serde_json::Value::Null)
                .context("JSON-RPC response contained neither result nor error")?),
        }
    }
}

#[derive(Debug, Deserialize, thiserror::Error, PartialEq)]
#[error("JSON-RPC request failed with code {code}: {message}")]
pub struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, thiserror::Error)]
#[error("connection error: {0}")]
pub struct ConnectionFailed(#[from] pub reqwest::Error);

pub fn serialize<T>(t: T) -> anyhow::Result<serde_json::Value>
where
    T: Serialize,
{
    let value = serde_json::to_value(t).context("failed to serialize parameter")?;

    Ok(value)
}
