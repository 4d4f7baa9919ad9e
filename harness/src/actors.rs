//! Sets up the actors of one scenario and guarantees they are torn down
//! again.

use crate::{
    actor::{Actor, ActorName, StateDump},
    cnd::{self, CndLauncher, NodeWalletFactory},
    config::Settings,
    poll::{Clock, Timeout, TokioClock},
    process::Process,
    wallet::{WalletFactory, WalletOwner},
};
use anyhow::Context;
use futures::FutureExt;
use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing_futures::Instrument;
use url::Url;

/// Brings up the protocol daemon of one actor.
#[async_trait::async_trait]
pub trait Launcher: fmt::Debug + Send + Sync {
    /// Prepares a daemon whose logs and data live in `dir`. The returned
    /// process is not started yet.
    async fn launch(&self, actor: ActorName, dir: &Path) -> anyhow::Result<Daemon>;
}

/// A protocol daemon and where its HTTP API is served.
#[derive(Clone, Debug)]
pub struct Daemon {
    pub process: Arc<dyn Process>,
    pub api: Url,
}

/// Everything the actors of a scenario share with the outside world.
#[derive(Clone, Debug)]
pub struct Environment {
    pub settings: Settings,
    pub launcher: Arc<dyn Launcher>,
    pub wallet_factory: Arc<dyn WalletFactory>,
    pub clock: Arc<dyn Clock>,
}

impl Environment {
    /// Local cnd binaries talking to the nodes configured in `settings`.
    pub fn local(settings: Settings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);

        Environment {
            launcher: Arc::new(CndLauncher::new(settings.clone(), clock.clone())),
            wallet_factory: Arc::new(NodeWalletFactory::new(settings.clone(), clock.clone())),
            settings,
            clock,
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("scenario name {0:?} must consist of ascii letters, digits and dashes")]
pub struct InvalidScenarioName(pub String);

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[error("{0} appears more than once in the scenario")]
pub struct DuplicateActor(pub ActorName);

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[error("{0} does not take part in this scenario")]
pub struct UnknownActor(pub ActorName);

#[derive(Debug)]
pub struct Actors {
    scenario: String,
    dir: PathBuf,
    actors: BTreeMap<ActorName, Arc<Actor>>,
}

impl Actors {
    /// Launches and starts a daemon for each of `names`.
    ///
    /// Log files go to `<log_root>/tests/<scenario>`, which is emptied
    /// first.
    pub async fn create(
        env: &Environment,
        scenario: &str,
        names: &[ActorName],
    ) -> anyhow::Result<Arc<Actors>> {
        validate_scenario_name(scenario)?;
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(DuplicateActor(*name).into());
            }
        }

        let dir = env.settings.scenario.log_root.join("tests").join(scenario);
        if tokio::fs::metadata(&dir).await.is_ok() {
            tokio::fs::remove_dir_all(&dir)
                .await
                .with_context(|| format!("failed to clear {}", dir.display()))?;
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let mut daemons = Vec::with_capacity(names.len());
        for name in names {
            match launch(env, *name, &dir).await {
                Ok(daemon) => daemons.push((*name, daemon)),
                Err(e) => {
                    for (started, daemon) in daemons {
                        if let Err(e) = daemon.process.stop().await {
                            tracing::warn!("failed to stop {}'s cnd: {:#}", started, e);
                        }
                    }
                    return Err(e.context(format!("failed to bring up {}", name)));
                }
            }
        }

        let mut clients = Vec::with_capacity(daemons.len());
        for (name, daemon) in daemons {
            let client = cnd::Client::new(daemon.api.clone())?;
            clients.push((name, daemon, client));
        }

        let actors = Arc::new_cyclic(|weak| Actors {
            actors: clients
                .into_iter()
                .map(|(name, daemon, client)| {
                    let owner = WalletOwner {
                        actor: name,
                        scenario: scenario.to_owned(),
                        dir: dir.clone(),
                    };
                    let actor = Actor::new(owner, env.clone(), daemon, client, weak.clone());

                    (name, Arc::new(actor))
                })
                .collect(),
            scenario: scenario.to_owned(),
            dir,
        });
        tracing::info!("created actors {:?} for {}", names, scenario);

        Ok(actors)
    }

    /// Creates the actors, runs `body` within the scenario deadline and
    /// tears everything down. If `body` fails, times out or panics the state
    /// of every actor is dumped first.
    pub async fn run<F, Fut>(
        env: &Environment,
        scenario: &str,
        names: &[ActorName],
        body: F,
    ) -> anyhow::Result<()>
    where
        F: FnOnce(Arc<Actors>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let span = tracing::info_span!("scenario", name = %scenario);

        async {
            let actors = Actors::create(env, scenario, names).await?;
            let deadline = env.settings.scenario.deadline;

            let body = AssertUnwindSafe(body(actors.clone())).catch_unwind();
            let outcome = tokio::time::timeout(deadline, body).await;
            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(anyhow::anyhow!(
                    "scenario panicked: {}",
                    panic_message(panic.as_ref())
                )),
                Err(_) => Err(Timeout {
                    what: format!("scenario {}", scenario),
                    after: deadline,
                }
                .into()),
            };

            if let Err(e) = &result {
                tracing::error!("scenario {} failed: {:#}", scenario, e);

                let dump_timeout = env.settings.scenario.dump_timeout;
                if tokio::time::timeout(dump_timeout, actors.dump_state())
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        "gave up dumping the state of {} after {:?}",
                        scenario,
                        dump_timeout
                    );
                }
            }
            actors.teardown().await;

            result
        }
        .instrument(span)
        .await
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, name: ActorName) -> anyhow::Result<&Arc<Actor>> {
        self.actors
            .get(&name)
            .ok_or_else(|| UnknownActor(name).into())
    }

    pub fn alice(&self) -> anyhow::Result<&Arc<Actor>> {
        self.get(ActorName::Alice)
    }

    pub fn bob(&self) -> anyhow::Result<&Arc<Actor>> {
        self.get(ActorName::Bob)
    }

    pub fn charlie(&self) -> anyhow::Result<&Arc<Actor>> {
        self.get(ActorName::Charlie)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Actor>> {
        self.actors.values()
    }

    pub async fn dump_state(&self) -> Vec<StateDump> {
        let mut dumps = Vec::with_capacity(self.actors.len());
        for actor in self.iter() {
            dumps.push(actor.dump_state().await);
        }

        dumps
    }

    /// Stops every daemon and lightning node. Failures are logged, not
    /// returned.
    pub async fn teardown(&self) {
        for actor in self.iter() {
            if let Err(e) = actor.stop().await {
                tracing::warn!("failed to stop {}: {:#}", actor.name(), e);
            }
        }
        tracing::info!("tore down {}", self.scenario);
    }
}

async fn launch(env: &Environment, name: ActorName, dir: &Path) -> anyhow::Result<Daemon> {
    let daemon = env.launcher.launch(name, dir).await?;
    daemon.process.start().await?;

    Ok(daemon)
}

fn validate_scenario_name(name: &str) -> Result<(), InvalidScenarioName> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(InvalidScenarioName(name.to_owned()))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown cause".to_owned()
    }
}
