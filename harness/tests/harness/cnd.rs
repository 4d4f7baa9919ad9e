//! A cnd that keeps its swaps in the shared [`World`] and serves them the
//! way the real one does.

use super::world::{contract_address, encode, htlc_address, FakeSwap, Htlc, Operation, World};
use anyhow::Context;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use swap_harness::{
    ethereum::{Bytes, U256},
    ledger::{BitcoinNetwork, ChainId},
    swap::{CommunicationStatus, HtlcState, LedgerAction, Role, Side, SwapStatus},
    ActorName, AssetKey, AssetKind, LedgerKind, Quantity, Timestamp,
};
use url::Url;
use warp::{
    http::{header::LOCATION, StatusCode},
    reply::{self, Reply, Response},
    Filter,
};

const GAS_LIMIT: u64 = 150_000;
const P2P_PORT: u16 = 9939;

pub fn peer_id(actor: ActorName) -> String {
    format!("{}-peer", actor)
}

#[derive(Clone, Debug)]
pub struct FakeCnd {
    actor: ActorName,
    world: World,
    running: Arc<AtomicBool>,
}

impl FakeCnd {
    /// Serves the API on an ephemeral port. Requests are answered with 503
    /// until `running` is set.
    pub fn spawn(actor: ActorName, world: World, running: Arc<AtomicBool>) -> Url {
        let cnd = FakeCnd {
            actor,
            world,
            running,
        };

        let (address, server) = warp::serve(routes(cnd)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Url::parse(&format!("http://{}/", address)).unwrap()
    }

    fn serve(&self, handler: impl FnOnce(&FakeCnd) -> anyhow::Result<Response>) -> Response {
        if !self.running.load(Ordering::SeqCst) {
            return reply::with_status("cnd is down", StatusCode::SERVICE_UNAVAILABLE)
                .into_response();
        }

        handler(self).unwrap_or_else(|e| {
            reply::with_status(format!("{:#}", e), StatusCode::BAD_REQUEST).into_response()
        })
    }

    fn info(&self) -> anyhow::Result<Response> {
        Ok(reply::json(&json!({
            "id": peer_id(self.actor),
            "listen_addresses": [format!("/ip4/127.0.0.1/tcp/{}", P2P_PORT)],
        }))
        .into_response())
    }

    fn create(&self, request: Value) -> anyhow::Result<Response> {
        let peer = request["peer"]["peer_id"]
            .as_str()
            .and_then(|peer| peer.strip_suffix("-peer"))
            .context("request lacks a peer")?
            .parse::<ActorName>()?;

        let alpha = htlc_terms(&request, "alpha")?;
        let beta = htlc_terms(&request, "beta")?;
        if alpha.0.ledger == LedgerKind::Lightning || beta.0.ledger == LedgerKind::Lightning {
            anyhow::bail!("rfc003 does not support lightning");
        }

        let id = self.world.create_swap(self.actor, peer, alpha, beta);
        let location = format!("/swaps/rfc003/{}", id);

        Ok(reply::with_status(
            reply::with_header(reply::json(&json!({})), LOCATION, location),
            StatusCode::CREATED,
        )
        .into_response())
    }

    fn list(&self) -> anyhow::Result<Response> {
        let entities = self
            .world
            .swaps_of(self.actor)
            .iter()
            .map(|swap| {
                json!({
                    "class": ["swap"],
                    "rel": ["item"],
                    "properties": { "protocol": "rfc003", "status": status(swap) },
                    "links": [{ "rel": ["self"], "href": swap_path(&swap.id) }],
                })
            })
            .collect::<Vec<_>>();

        Ok(reply::json(&json!({ "class": ["swaps"], "entities": entities })).into_response())
    }

    fn details(&self, id: &str) -> anyhow::Result<Response> {
        let (swap, role) = match self.swap(id) {
            Some(found) => found,
            None => return Ok(not_found(id)),
        };

        Ok(reply::json(&json!({
            "class": ["swap"],
            "properties": {
                "id": swap.id,
                "role": role,
                "counterparty": peer_id(swap.counterparty_of(self.actor)),
                "protocol": "rfc003",
                "status": status(&swap),
                "state": {
                    "communication": {
                        "status": swap.communication,
                        "alpha_expiry": swap.alpha.expiry,
                        "beta_expiry": swap.beta.expiry,
                    },
                    "alpha_ledger": { "status": swap.alpha.state },
                    "beta_ledger": { "status": swap.beta.state },
                },
            },
            "links": [{ "rel": ["self"], "href": swap_path(&swap.id) }],
            "actions": actions(&swap, role),
        }))
        .into_response())
    }

    fn post_action(
        &self,
        id: &str,
        name: &str,
        body: HashMap<String, String>,
    ) -> anyhow::Result<Response> {
        let (swap, role) = match self.swap(id) {
            Some(found) => found,
            None => return Ok(not_found(id)),
        };
        if !is_offered(&swap, role, name) {
            anyhow::bail!("{} is not available", name);
        }

        let response = match name {
            "accept" => {
                for field in accept_fields(&swap) {
                    let name = field["name"].as_str().unwrap_or_default();
                    if !body.contains_key(name) {
                        anyhow::bail!("accept lacks {}", name);
                    }
                }
                CommunicationStatus::Accepted
            }
            "decline" => CommunicationStatus::Declined,
            _ => anyhow::bail!("{} is not a POST action", name),
        };
        self.world.respond(id, self.actor, response)?;

        Ok(reply::json(&json!({})).into_response())
    }

    fn get_action(
        &self,
        id: &str,
        name: &str,
        query: HashMap<String, String>,
    ) -> anyhow::Result<Response> {
        let (swap, role) = match self.swap(id) {
            Some(found) => found,
            None => return Ok(not_found(id)),
        };
        if !is_offered(&swap, role, name) {
            anyhow::bail!("{} is not available", name);
        }

        let (operation, side) = match name {
            "deploy" => (Operation::Deploy, role.funding_side()),
            "fund" => (Operation::Fund, role.funding_side()),
            "redeem" => (Operation::Redeem, role.redeeming_side()),
            "refund" => (Operation::Refund, role.funding_side()),
            _ => anyhow::bail!("{} is not a GET action", name),
        };
        for field in ledger_action_fields(swap.htlc(side), operation) {
            let name = field["name"].as_str().unwrap_or_default();
            if !query.contains_key(name) {
                anyhow::bail!("{} lacks {}", operation.as_str(), name);
            }
        }

        let action = ledger_action(&swap, operation, side);

        Ok(reply::json(&action).into_response())
    }

    fn swap(&self, id: &str) -> Option<(FakeSwap, Role)> {
        let swap = self.world.swap(id)?;
        let role = swap.role_of(self.actor)?;

        Some((swap, role))
    }
}

fn routes(
    cnd: FakeCnd,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone + Send + Sync + 'static {
    let with_cnd = warp::any().map(move || cnd.clone());

    let info = warp::path::end()
        .and(warp::get())
        .and(with_cnd.clone())
        .map(|cnd: FakeCnd| cnd.serve(|cnd| cnd.info()));
    let create = warp::path!("swaps" / "rfc003")
        .and(warp::post())
        .and(with_cnd.clone())
        .and(warp::body::json())
        .map(|cnd: FakeCnd, request: Value| cnd.serve(|cnd| cnd.create(request)));
    let list = warp::path!("swaps")
        .and(warp::get())
        .and(with_cnd.clone())
        .map(|cnd: FakeCnd| cnd.serve(|cnd| cnd.list()));
    let details = warp::path!("swaps" / "rfc003" / String)
        .and(warp::get())
        .and(with_cnd.clone())
        .map(|id: String, cnd: FakeCnd| cnd.serve(|cnd| cnd.details(&id)));
    let post_action = warp::path!("swaps" / "rfc003" / String / String)
        .and(warp::post())
        .and(with_cnd.clone())
        .and(warp::body::json())
        .map(
            |id: String, name: String, cnd: FakeCnd, body: HashMap<String, String>| {
                cnd.serve(|cnd| cnd.post_action(&id, &name, body))
            },
        );
    let get_action = warp::path!("swaps" / "rfc003" / String / String)
        .and(warp::get())
        .and(with_cnd)
        .and(warp::query::<HashMap<String, String>>())
        .map(
            |id: String, name: String, cnd: FakeCnd, query: HashMap<String, String>| {
                cnd.serve(|cnd| cnd.get_action(&id, &name, query))
            },
        );

    info.or(create)
        .unify()
        .or(list)
        .unify()
        .or(details)
        .unify()
        .or(post_action)
        .unify()
        .or(get_action)
        .unify()
}

fn swap_path(id: &str) -> String {
    format!("/swaps/rfc003/{}", id)
}

fn not_found(id: &str) -> Response {
    reply::with_status(format!("no swap {}", id), StatusCode::NOT_FOUND).into_response()
}

fn htlc_terms(request: &Value, side: &str) -> anyhow::Result<(AssetKey, Quantity, Timestamp)> {
    let asset = &request[format!("{}_asset", side)];
    let ledger = &request[format!("{}_ledger", side)];

    let key = format!(
        "{}:{}",
        asset["name"].as_str().context("asset without name")?,
        ledger["name"].as_str().context("ledger without name")?
    )
    .parse::<AssetKey>()?;
    let quantity = asset["quantity"]
        .as_str()
        .context("asset without quantity")?
        .parse::<Quantity>()?;
    let expiry = serde_json::from_value::<Timestamp>(request[format!("{}_expiry", side)].clone())?;

    Ok((key, quantity, expiry))
}

fn status(swap: &FakeSwap) -> SwapStatus {
    use HtlcState::*;

    if let Some(status) = swap.reported_status {
        return status;
    }
    if swap.communication == CommunicationStatus::Declined {
        return SwapStatus::NotSwapped;
    }

    match (swap.alpha.state, swap.beta.state) {
        (Redeemed, Redeemed) => SwapStatus::Swapped,
        (Refunded, Deployed) | (Refunded, Funded) | (Deployed, Refunded) | (Funded, Refunded) => {
            SwapStatus::InProgress
        }
        (Refunded, _) | (_, Refunded) => SwapStatus::NotSwapped,
        _ => SwapStatus::InProgress,
    }
}

/// The actions cnd offers `role` in the current state of `swap`.
fn actions(swap: &FakeSwap, role: Role) -> Vec<Value> {
    let href = |name: &str| format!("{}/{}", swap_path(&swap.id), name);

    match (swap.communication, role) {
        (CommunicationStatus::Sent, Role::Bob) => vec![
            json!({
                "name": "accept",
                "href": href("accept"),
                "method": "POST",
                "type": "application/json",
                "fields": accept_fields(swap),
            }),
            json!({
                "name": "decline",
                "href": href("decline"),
                "method": "POST",
                "type": "application/json",
            }),
        ],
        (CommunicationStatus::Accepted, _) => {
            let mut actions = Vec::new();

            let funding = swap.htlc(role.funding_side());
            let funding_action = match funding.state {
                HtlcState::NotDeployed if funding.asset.asset == AssetKind::Erc20 => {
                    Some(Operation::Deploy)
                }
                HtlcState::NotDeployed | HtlcState::Deployed => Some(Operation::Fund),
                HtlcState::Funded | HtlcState::IncorrectlyFunded => Some(Operation::Refund),
                HtlcState::Redeemed | HtlcState::Refunded => None,
            };
            if let Some(operation) = funding_action {
                actions.push((operation, funding));
            }

            // bob can only redeem once alice revealed the secret on beta
            let redeeming = swap.htlc(role.redeeming_side());
            let secret_known = role == Role::Alice || swap.beta.state == HtlcState::Redeemed;
            if redeeming.state == HtlcState::Funded && secret_known {
                actions.push((Operation::Redeem, redeeming));
            }

            actions
                .into_iter()
                .map(|(operation, htlc)| {
                    json!({
                        "name": operation.as_str(),
                        "href": href(operation.as_str()),
                        "method": "GET",
                        "fields": ledger_action_fields(htlc, operation),
                    })
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

fn is_offered(swap: &FakeSwap, role: Role, name: &str) -> bool {
    actions(swap, role)
        .iter()
        .any(|action| action["name"].as_str() == Some(name))
}

fn accept_fields(swap: &FakeSwap) -> Vec<Value> {
    let mut fields = Vec::new();

    if swap.alpha.asset.ledger == LedgerKind::Ethereum {
        fields.push(json!({
            "name": "alpha_ledger_redeem_identity",
            "class": ["ethereum", "address"],
            "type": "text",
        }));
    }
    if swap.beta.asset.ledger == LedgerKind::Ethereum {
        fields.push(json!({
            "name": "beta_ledger_refund_identity",
            "class": ["ethereum", "address"],
            "type": "text",
        }));
    }

    fields
}

fn ledger_action_fields(htlc: &Htlc, operation: Operation) -> Vec<Value> {
    match (htlc.asset.ledger, operation) {
        (LedgerKind::Bitcoin, Operation::Redeem) | (LedgerKind::Bitcoin, Operation::Refund) => {
            vec![
                json!({ "name": "address", "class": ["bitcoin", "address"], "type": "text" }),
                json!({ "name": "fee_per_wu", "class": ["bitcoin", "feePerWU"], "type": "number" }),
            ]
        }
        _ => Vec::new(),
    }
}

fn ledger_action(swap: &FakeSwap, operation: Operation, side: Side) -> LedgerAction {
    let htlc = swap.htlc(side);
    let payload = encode(operation, &swap.id, side);
    let min_timestamp = match operation {
        Operation::Refund => Some(htlc.expiry),
        Operation::Deploy | Operation::Fund | Operation::Redeem => None,
    };
    let chain_id = Some(ChainId::DEV);

    match (htlc.asset.ledger, htlc.asset.asset, operation) {
        (LedgerKind::Bitcoin, _, Operation::Fund) => LedgerAction::BitcoinSendAmountToAddress {
            to: htlc_address(&swap.id, side),
            amount: htlc.quantity.clone(),
            network: BitcoinNetwork::Regtest,
        },
        (LedgerKind::Bitcoin, _, _) | (LedgerKind::Lightning, _, _) => {
            LedgerAction::BitcoinBroadcastSignedTransaction {
                hex: hex::encode(payload),
                network: BitcoinNetwork::Regtest,
                min_median_block_time: min_timestamp,
            }
        }
        (LedgerKind::Ethereum, AssetKind::Erc20, Operation::Deploy) => {
            LedgerAction::EthereumDeployContract {
                data: Bytes(payload),
                amount: Quantity::zero(),
                gas_limit: U256::from(GAS_LIMIT),
                chain_id,
            }
        }
        (LedgerKind::Ethereum, AssetKind::Ether, Operation::Fund)
        | (LedgerKind::Ethereum, AssetKind::Ether, Operation::Deploy) => {
            LedgerAction::EthereumDeployContract {
                data: Bytes(payload),
                amount: htlc.quantity.clone(),
                gas_limit: U256::from(GAS_LIMIT),
                chain_id,
            }
        }
        (LedgerKind::Ethereum, _, _) => LedgerAction::EthereumCallContract {
            contract_address: contract_address(&swap.id, side),
            data: Some(Bytes(payload)),
            gas_limit: U256::from(GAS_LIMIT),
            chain_id,
            min_block_timestamp: min_timestamp,
        },
    }
}
