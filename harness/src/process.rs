//! Starting and stopping the daemons an actor runs.

use crate::poll::{poll_until, Clock, PollConfig};
use anyhow::Context;
use std::{
    fmt::Debug,
    fs::OpenOptions,
    net::{Ipv4Addr, TcpListener},
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{process::Child, sync::Mutex};
use url::Url;

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(200);
const READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Something that can be brought up and down again while keeping whatever
/// it persisted.
#[async_trait::async_trait]
pub trait Process: Debug + Send + Sync {
    /// Returns once the process is ready to serve requests.
    async fn start(&self) -> anyhow::Result<()>;

    /// Returns once the process is gone.
    async fn stop(&self) -> anyhow::Result<()>;

    fn is_running(&self) -> bool;
}

/// How to tell that a freshly spawned process is up.
#[derive(Clone, Debug, PartialEq)]
pub enum Readiness {
    /// Any HTTP response from this URL.
    Http(Url),
    /// The file exists.
    File(PathBuf),
}

#[derive(Debug)]
pub struct LocalProcess {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    log_file: PathBuf,
    readiness: Readiness,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    child: Mutex<Option<Child>>,
}

impl LocalProcess {
    pub fn new(
        name: impl Into<String>,
        program: PathBuf,
        args: Vec<String>,
        log_file: PathBuf,
        readiness: Readiness,
        clock: Arc<dyn Clock>,
    ) -> Self {
        LocalProcess {
            name: name.into(),
            program,
            args,
            log_file,
            readiness,
            clock,
            running: AtomicBool::new(false),
            child: Mutex::new(None),
        }
    }

    fn spawn(&self) -> anyhow::Result<Child> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .with_context(|| format!("failed to open log file {}", self.log_file.display()))?;

        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        Ok(child)
    }

    async fn is_ready(&self) -> bool {
        match &self.readiness {
            Readiness::Http(url) => reqwest::get(url.clone()).await.is_ok(),
            Readiness::File(path) => tokio::fs::metadata(path).await.is_ok(),
        }
    }
}

#[async_trait::async_trait]
impl Process for LocalProcess {
    async fn start(&self) -> anyhow::Result<()> {
        let mut guard = self.child.lock().await;
        if guard.is_some() {
            anyhow::bail!("{} is already running", self.name);
        }

        *guard = Some(self.spawn()?);
        tracing::info!("started {}, logging to {}", self.name, self.log_file.display());

        let child = &mut *guard;
        let result = poll_until(
            &*self.clock,
            PollConfig::every(READINESS_POLL_INTERVAL).with_timeout(READINESS_TIMEOUT),
            &format!("{} to become ready", self.name),
            || {
                let exited = child
                    .as_mut()
                    .map(|child| child.try_wait())
                    .transpose()
                    .map(|status| status.flatten());

                async move {
                    if let Some(status) = exited? {
                        anyhow::bail!("exited with {} before becoming ready", status);
                    }

                    Ok(if self.is_ready().await { Some(()) } else { None })
                }
            },
        )
        .await;

        if let Err(e) = result {
            *guard = None;
            return Err(e.context(format!("failed to start {}", self.name)));
        }

        self.running.store(true, Ordering::SeqCst);

        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut guard = self.child.lock().await;

        if let Some(mut child) = guard.take() {
            if child.try_wait()?.is_none() {
                child
                    .kill()
                    .await
                    .with_context(|| format!("failed to kill {}", self.name))?;
            }
            tracing::info!("stopped {}", self.name);
        }
        self.running.store(false, Ordering::SeqCst);

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Asks the OS for a port nobody listens on.
///
/// The port is released again before returning, a process started shortly
/// after can bind it.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();

    Ok(port)
}
