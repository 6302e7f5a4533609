//! Per-session state owned by the editor side.
//!
//! One entry per session key: the backend handle, the last status the
//! poller observed, the status and output subscriber sets and, when the
//! backend was spawned locally, its process handle. Fan-out always works
//! on a snapshot of the subscriber set taken under the lock, so a session
//! unregistered mid-delivery is not an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tether_core::{SessionKey, Status};
use tether_rpc::RpcClient;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::proxy::BackendProxy;

/// Called with each distinct status of a session.
pub type StatusCallback = Arc<dyn Fn(&SessionKey, &Status) -> anyhow::Result<()> + Send + Sync>;

/// Called with each chunk of debuggee output.
pub type OutputCallback = Arc<dyn Fn(&SessionKey, &str) -> anyhow::Result<()> + Send + Sync>;

/// How long a torn-down backend process gets to exit before it is killed.
const REAP_GRACE: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn insert_unique<F: ?Sized>(set: &mut Vec<Arc<F>>, callback: Arc<F>) {
    if !set.iter().any(|c| Arc::ptr_eq(c, &callback)) {
        set.push(callback);
    }
}

struct Entry<T> {
    handle: Arc<BackendProxy<T>>,
    status: Status,
    status_subscribers: Vec<StatusCallback>,
    output_subscribers: Vec<OutputCallback>,
    process: Option<Child>,
}

/// What [`SessionRegistry::unregister`] hands back for teardown.
pub struct Detached<T> {
    /// The backend handle that was registered.
    pub handle: Arc<BackendProxy<T>>,
    /// The locally spawned backend process, if any.
    pub process: Option<Child>,
}

impl<T> Detached<T> {
    /// Wait briefly for the backend process to exit, then kill it.
    pub async fn reap(self) {
        let Some(mut child) = self.process else {
            return;
        };
        match tokio::time::timeout(REAP_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "backend process exited"),
            Ok(Err(e)) => warn!("waiting for backend process failed: {e}"),
            Err(_) => {
                warn!("backend process did not exit, killing it");
                if let Err(e) = child.kill().await {
                    warn!("failed to kill backend process: {e}");
                }
            }
        }
    }
}

/// Session key to session state.
pub struct SessionRegistry<T = RpcClient> {
    sessions: Mutex<HashMap<SessionKey, Entry<T>>>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` for `key` with empty subscriber sets and an
    /// `unknown` status. A previous entry is replaced without teardown.
    pub fn register(&self, key: SessionKey, handle: Arc<BackendProxy<T>>) {
        let entry = Entry {
            handle,
            status: Status::Unknown,
            status_subscribers: Vec::new(),
            output_subscribers: Vec::new(),
            process: None,
        };
        if lock(&self.sessions).insert(key.clone(), entry).is_some() {
            debug!(%key, "replaced registered session");
        }
        info!(%key, "session registered");
    }

    /// Keep the backend process of `key` so teardown can reap it.
    pub fn attach_process(&self, key: &SessionKey, process: Child) -> bool {
        match lock(&self.sessions).get_mut(key) {
            Some(entry) => {
                entry.process = Some(process);
                true
            }
            None => false,
        }
    }

    /// Remove everything held for `key`.
    pub fn unregister(&self, key: &SessionKey) -> Option<Detached<T>> {
        let entry = lock(&self.sessions).remove(key)?;
        info!(%key, "session unregistered");
        Some(Detached {
            handle: entry.handle,
            process: entry.process,
        })
    }

    /// Unregister `key` and reap its backend process.
    pub async fn teardown(&self, key: &SessionKey) -> bool {
        let detached = self.unregister(key);
        match detached {
            Some(detached) => {
                detached.reap().await;
                true
            }
            None => false,
        }
    }

    pub fn handle(&self, key: &SessionKey) -> Option<Arc<BackendProxy<T>>> {
        lock(&self.sessions).get(key).map(|e| e.handle.clone())
    }

    pub fn is_registered(&self, key: &SessionKey) -> bool {
        lock(&self.sessions).contains_key(key)
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        lock(&self.sessions).keys().cloned().collect()
    }

    /// Last status cached for `key`.
    pub fn status(&self, key: &SessionKey) -> Option<Status> {
        lock(&self.sessions).get(key).map(|e| e.status.clone())
    }

    /// Overwrite the cached status without notifying anyone.
    pub fn set_status(&self, key: &SessionKey, status: Status) -> bool {
        match lock(&self.sessions).get_mut(key) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    /// Add a status subscriber; the same callback is only held once.
    pub fn subscribe_status(&self, key: &SessionKey, callback: StatusCallback) -> bool {
        match lock(&self.sessions).get_mut(key) {
            Some(entry) => {
                insert_unique(&mut entry.status_subscribers, callback);
                true
            }
            None => false,
        }
    }

    /// Add an output subscriber; the same callback is only held once.
    pub fn subscribe_output(&self, key: &SessionKey, callback: OutputCallback) -> bool {
        match lock(&self.sessions).get_mut(key) {
            Some(entry) => {
                insert_unique(&mut entry.output_subscribers, callback);
                true
            }
            None => false,
        }
    }

    /// Record `status` and, if it differs from the cached value, notify
    /// the status subscribers. Returns whether it changed.
    pub fn observe_status(&self, key: &SessionKey, status: Status) -> bool {
        let subscribers = {
            let mut sessions = lock(&self.sessions);
            let Some(entry) = sessions.get_mut(key) else {
                return false;
            };
            if entry.status == status {
                return false;
            }
            info!(%key, "state change {} -> {}", entry.status, status);
            entry.status = status.clone();
            entry.status_subscribers.clone()
        };
        for callback in subscribers {
            if let Err(e) = callback(key, &status) {
                warn!(%key, "status subscriber failed: {e:#}");
            }
        }
        true
    }

    /// Hand `text` to every output subscriber. Failures are dropped.
    pub fn publish_output(&self, key: &SessionKey, text: &str) {
        let subscribers = match lock(&self.sessions).get(key) {
            Some(entry) => entry.output_subscribers.clone(),
            None => return,
        };
        for callback in subscribers {
            let _ = callback(key, text);
        }
    }
}
