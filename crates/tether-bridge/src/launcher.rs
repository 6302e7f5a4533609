//! Starting a backend and attaching a session to it.
//!
//! [`Launcher::launch`] spawns `tether serve` on a random local port and
//! hands the connection to [`Launcher::attach`], which drives the debuggee
//! to its first stop, loads persisted breakpoints, registers the session
//! and starts the poller.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tether_config::Config;
use tether_core::{LaunchRequest, SessionKey, Status, StopReason};
use tether_platform::BackendCommand;
use tether_rpc::{RpcClient, Transport};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::poller::spawn_poller;
use crate::proxy::BackendProxy;
use crate::registry::{OutputCallback, SessionRegistry, StatusCallback};
use crate::retry::RetryPolicy;
use crate::sync::BreakpointSync;

/// Starts sessions and wires them into a registry.
pub struct Launcher<T = RpcClient> {
    registry: Arc<SessionRegistry<T>>,
    sync: Arc<BreakpointSync<T>>,
    config: Config,
    status_subscribers: Vec<StatusCallback>,
    output_subscribers: Vec<OutputCallback>,
}

impl<T: Transport + 'static> Launcher<T> {
    pub fn new(
        registry: Arc<SessionRegistry<T>>,
        sync: Arc<BreakpointSync<T>>,
        config: Config,
    ) -> Self {
        Self {
            registry,
            sync,
            config,
            status_subscribers: Vec::new(),
            output_subscribers: Vec::new(),
        }
    }

    /// Subscribe every new session's status feed to `callback`.
    pub fn with_status_subscriber(mut self, callback: StatusCallback) -> Self {
        self.status_subscribers.push(callback);
        self
    }

    /// Subscribe every new session's output feed to `callback`.
    pub fn with_output_subscriber(mut self, callback: OutputCallback) -> Self {
        self.output_subscribers.push(callback);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry<T>> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Launch `request` on the backend behind `proxy` and register the
    /// session under `key`, replacing any session already there.
    ///
    /// Returns the poller task.
    ///
    /// # Errors
    ///
    /// Fails if `prepare` fails, if the debuggee ends before its first
    /// stop, or if loading breakpoints or `start` fails. The session is
    /// not registered in any of these cases.
    pub async fn attach(
        &self,
        key: SessionKey,
        proxy: BackendProxy<T>,
        request: &LaunchRequest,
        process: Option<Child>,
    ) -> Result<JoinHandle<()>, BridgeError> {
        self.stop_existing(&key).await;

        info!(%key, executable = %request.executable.display(), "preparing debuggee");
        proxy.prepare(request).await?;
        wait_for_initial_stop(&proxy, self.config.poll.initial_stop_interval()).await?;

        let proxy = Arc::new(proxy);
        let loaded = self.sync.load(&key, &proxy).await?;
        debug!(%key, loaded, "breakpoints loaded");

        self.registry.register(key.clone(), proxy.clone());
        if let Some(child) = process {
            self.registry.attach_process(&key, child);
        }
        for callback in &self.status_subscribers {
            self.registry.subscribe_status(&key, callback.clone());
        }
        for callback in &self.output_subscribers {
            self.registry.subscribe_output(&key, callback.clone());
        }

        if let Err(err) = proxy.start().await {
            self.registry.teardown(&key).await;
            return Err(err.into());
        }
        self.registry
            .set_status(&key, Status::stopped([StopReason::Signal]));
        info!(%key, "session started");
        Ok(spawn_poller(
            self.registry.clone(),
            key,
            self.config.poll.interval(),
        ))
    }

    async fn stop_existing(&self, key: &SessionKey) {
        let Some(old) = self.registry.handle(key) else {
            return;
        };
        info!(%key, "replacing running session");
        if let Err(err) = old.shutdown_server().await {
            if !err.is_unreachable() {
                warn!(%key, "old backend did not shut down cleanly: {err}");
            }
        }
        self.registry.teardown(key).await;
    }
}

impl Launcher<RpcClient> {
    /// Spawn a backend for `project` and attach a session to it.
    ///
    /// # Errors
    ///
    /// Fails if no executable is configured, if the backend process
    /// cannot be spawned, or for any reason [`Launcher::attach`] fails.
    pub async fn launch(
        &self,
        key: SessionKey,
        project: &Path,
    ) -> Result<JoinHandle<()>, BridgeError> {
        let request = self.config.debug.launch_request(project)?;
        let backend = &self.config.backend;
        let port = pick_port(backend.port_range);
        let proxy = BackendProxy::localhost(port, RetryPolicy::from_config(&self.config.retry))?;

        let child = BackendCommand::current_exe()?
            .arg("serve")
            .arg(&backend.adapter)
            .arg(port.to_string())
            .current_dir(project)
            .spawn()?;
        info!(%key, port, adapter = %backend.adapter, "backend spawned");
        tokio::time::sleep(backend.startup_delay()).await;

        self.attach(key, proxy, &request, Some(child)).await
    }
}

fn pick_port([lo, hi]: [u16; 2]) -> u16 {
    if lo >= hi {
        return lo;
    }
    rand::thread_rng().gen_range(lo..=hi)
}

async fn wait_for_initial_stop<T: Transport>(
    proxy: &BackendProxy<T>,
    interval: Duration,
) -> Result<(), BridgeError> {
    loop {
        let status = proxy.status().await?;
        if status.is_initial_stop() {
            debug!(%status, "debuggee reached its initial stop");
            return Ok(());
        }
        if status.is_terminal() {
            return Err(BridgeError::NoInitialStop(status));
        }
        tokio::time::sleep(interval).await;
    }
}
