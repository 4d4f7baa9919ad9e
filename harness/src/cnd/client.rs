use crate::{
    asset::Asset,
    cnd::siren,
    jsonrpc::ConnectionFailed,
    ledger::Ledger,
    poll::{poll_until, Clock, Timeout},
    swap::{
        action::{resolve_fields, OverrideNotApplicable},
        ActionConfig, ActionKind, ActionNotAvailable, ActionOutcome, LedgerAction, Override,
        SwapDetails, SwapRef, SwapStatus,
    },
    timestamp::Timestamp,
    wallet::Wallets,
};
use anyhow::Context;
use futures::TryFutureExt;
use reqwest::{header::LOCATION, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// Talks to the HTTP API of a single cnd.
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
}

/// What `GET /` tells about a node.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Info {
    pub id: String,
    #[serde(default)]
    pub listen_addresses: Vec<String>,
}

/// The body of `POST /swaps/rfc003`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SwapRequest {
    pub alpha_ledger: Ledger,
    pub beta_ledger: Ledger,
    pub alpha_asset: Asset,
    pub beta_asset: Asset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_ledger_refund_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta_ledger_redeem_identity: Option<String>,
    pub alpha_expiry: Timestamp,
    pub beta_expiry: Timestamp,
    pub peer: Peer,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Peer {
    pub peer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_hint: Option<String>,
}

/// An entry of the `GET /swaps` collection.
#[derive(Clone, Debug, PartialEq)]
pub struct SwapSummary {
    pub swap: SwapRef,
    pub protocol: Option<String>,
    pub status: SwapStatus,
}

#[derive(Debug, thiserror::Error)]
#[error("cnd answered with {status}: {body}")]
pub struct UnexpectedResponse {
    pub status: StatusCode,
    pub body: String,
}

impl Client {
    pub fn new(base_url: Url) -> anyhow::Result<Self> {
        // cnd comes back on the same port after a restart, pooled connections
        // would point at the old process
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Client { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn info(&self) -> anyhow::Result<Info> {
        let response = self
            .http
            .get(self.base_url.clone())
            .send()
            .map_err(ConnectionFailed)
            .await?;

        json(check(response).await?).await
    }

    pub async fn create_swap(&self, request: &SwapRequest) -> anyhow::Result<SwapRef> {
        let response = self
            .http
            .post(self.base_url.join("swaps/rfc003")?)
            .json(request)
            .send()
            .map_err(ConnectionFailed)
            .await?;

        let response = check(response).await?;
        if response.status() != StatusCode::CREATED {
            anyhow::bail!("cnd created the swap with {} instead of 201", response.status());
        }

        let location = response
            .headers()
            .get(LOCATION)
            .context("cnd did not say where the swap lives")?
            .to_str()
            .context("location header is not valid utf-8")?;

        Ok(swap_ref_from_location(location))
    }

    /// Fetches a siren entity by its path relative to the API root.
    pub async fn fetch<P>(&self, path: &str) -> anyhow::Result<siren::Entity<P>>
    where
        P: DeserializeOwned,
    {
        let response = self
            .http
            .get(self.base_url.join(path)?)
            .header(reqwest::header::ACCEPT, "application/vnd.siren+json")
            .send()
            .map_err(ConnectionFailed)
            .await?;

        json(check(response).await?)
            .await
            .with_context(|| format!("failed to read siren entity at {}", path))
    }

    pub async fn fetch_details(&self, swap: &SwapRef) -> anyhow::Result<SwapDetails> {
        self.fetch(swap.path()).await
    }

    pub async fn list_swaps(&self) -> anyhow::Result<Vec<SwapSummary>> {
        #[derive(Deserialize)]
        struct Properties {
            #[serde(default)]
            protocol: Option<String>,
            status: SwapStatus,
        }

        let collection: siren::Entity = self.fetch("swaps").await?;

        collection
            .entities
            .into_iter()
            .map(|entity| -> anyhow::Result<SwapSummary> {
                let href = entity
                    .link("self")
                    .map(|link| link.href.clone())
                    .or_else(|| entity.href.clone())
                    .context("swap in collection has no self link")?;
                let properties: Properties = serde_json::from_value(
                    entity
                        .properties
                        .context("swap in collection has no properties")?,
                )?;

                Ok(SwapSummary {
                    swap: SwapRef::new(href),
                    protocol: properties.protocol,
                    status: properties.status,
                })
            })
            .collect()
    }

    /// Asks cnd for the ledger transaction behind a GET action without
    /// executing it.
    pub async fn fetch_ledger_action(
        &self,
        clock: &dyn Clock,
        swap: &SwapRef,
        kind: ActionKind,
        overrides: &[Override],
        wallets: &Wallets,
        config: ActionConfig,
    ) -> anyhow::Result<LedgerAction> {
        let action = self.wait_for_action(clock, swap, kind, config).await?;

        match action.method {
            siren::Method::Get => self.get_ledger_action(&action, overrides, wallets).await,
            method => anyhow::bail!("{} is a {:?} action, not a ledger action", kind, method),
        }
    }

    /// Executes an action once cnd offers it.
    ///
    /// GET actions describe a ledger transaction which is handed to the
    /// matching wallet, POST actions are answered by cnd directly.
    pub async fn execute_action(
        &self,
        clock: &dyn Clock,
        swap: &SwapRef,
        kind: ActionKind,
        overrides: &[Override],
        wallets: &Wallets,
        config: ActionConfig,
    ) -> anyhow::Result<ActionOutcome> {
        let action = self.wait_for_action(clock, swap, kind, config).await?;

        match action.method {
            siren::Method::Get => {
                let ledger_action = self.get_ledger_action(&action, overrides, wallets).await?;
                tracing::debug!("executing {} of {} as {:?}", kind, swap, ledger_action);

                let transaction = wallets.execute(&ledger_action).await?;
                tracing::info!("{} of {} sent in {}", kind, swap, transaction);

                Ok(ActionOutcome::Submitted(transaction))
            }
            siren::Method::Post => {
                if let Some(override_) = overrides
                    .iter()
                    .find(|override_| !matches!(override_, Override::FeePerWu(_)))
                {
                    return Err(OverrideNotApplicable {
                        override_: *override_,
                        target: format!("action {}", action.name),
                    }
                    .into());
                }

                let body = resolve_fields(&action, wallets, overrides)
                    .await?
                    .into_iter()
                    .map(|(name, value)| (name, serde_json::Value::String(value)))
                    .collect::<serde_json::Map<_, _>>();

                let response = self
                    .http
                    .post(self.base_url.join(&action.href)?)
                    .json(&body)
                    .send()
                    .map_err(ConnectionFailed)
                    .await?;
                check(response).await?;
                tracing::info!("{} of {} acknowledged", kind, swap);

                Ok(ActionOutcome::Acknowledged)
            }
            method => anyhow::bail!("cnd offers {} as {:?} which is not supported", kind, method),
        }
    }

    async fn wait_for_action(
        &self,
        clock: &dyn Clock,
        swap: &SwapRef,
        kind: ActionKind,
        config: ActionConfig,
    ) -> anyhow::Result<siren::Action> {
        let name = kind.to_string();
        let name = name.as_str();

        poll_until(
            clock,
            config.into(),
            &format!("{} to become available on {}", kind, swap),
            move || async move {
                let details = self.fetch_details(swap).await?;

                Ok(details.action(name).cloned())
            },
        )
        .await
        .map_err(|e| {
            if e.is::<Timeout>() {
                ActionNotAvailable { action: kind }.into()
            } else {
                e
            }
        })
    }

    async fn get_ledger_action(
        &self,
        action: &siren::Action,
        overrides: &[Override],
        wallets: &Wallets,
    ) -> anyhow::Result<LedgerAction> {
        let query = resolve_fields(action, wallets, overrides).await?;

        let response = self
            .http
            .get(self.base_url.join(&action.href)?)
            .query(&query)
            .send()
            .map_err(ConnectionFailed)
            .await?;

        let mut ledger_action: LedgerAction = json(check(response).await?)
            .await
            .with_context(|| format!("cnd answered {} without a ledger action", action.name))?;

        for override_ in overrides {
            ledger_action.apply(override_)?;
        }

        Ok(ledger_action)
    }
}

fn swap_ref_from_location(location: &str) -> SwapRef {
    match Url::parse(location) {
        Ok(url) => SwapRef::new(url.path()),
        Err(_) => SwapRef::new(location),
    }
}

async fn check(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    Err(UnexpectedResponse { status, body }.into())
}

async fn json<T>(response: reqwest::Response) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let body = response.bytes().await.map_err(ConnectionFailed)?;

    Ok(serde_json::from_slice(&body)?)
}
