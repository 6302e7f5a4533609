//! Reconciling persisted breakpoints with a backend's live table.
//!
//! The two sides name breakpoints differently: the store by
//! `(file, line)`, the backend by an id it assigned. Live ids are looked
//! up by scanning the backend's list on every operation and are never
//! kept on this side.

use std::path::Path;
use std::sync::Arc;

use tether_core::{Breakpoint, SessionKey};
use tether_rpc::{RpcClient, RpcError, Transport};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::proxy::BackendProxy;
use crate::registry::SessionRegistry;
use crate::store::BreakpointStore;

/// Give a backend exactly the persisted set: clear its table, then create
/// each breakpoint and disable the ones persisted as disabled.
pub async fn load_into_backend<T: Transport>(
    proxy: &BackendProxy<T>,
    persisted: &[Breakpoint],
) -> Result<(), RpcError> {
    proxy.delete_all_breakpoints().await?;
    for bp in persisted {
        let id = proxy.set_breakpoint(bp).await?;
        if !bp.enabled {
            proxy.disable_breakpoint(id).await?;
        }
    }
    Ok(())
}

/// The backend's live breakpoints in persisted form.
pub async fn read_from_backend<T: Transport>(
    proxy: &BackendProxy<T>,
) -> Result<Vec<Breakpoint>, RpcError> {
    let live = proxy.breakpoints().await?;
    Ok(live.into_iter().map(|bp| bp.into_persisted()).collect())
}

/// Result of [`BreakpointSync::toggle_breakpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Added,
    Removed,
}

/// Editor-side breakpoint operations for every session in a registry.
///
/// All writes to the store happen under one lock, so the attached path
/// (read back and replace) and the detached path (edit the persisted list)
/// never interleave.
pub struct BreakpointSync<T = RpcClient> {
    registry: Arc<SessionRegistry<T>>,
    store: Arc<dyn BreakpointStore>,
    lock: Mutex<()>,
}

impl<T: Transport> BreakpointSync<T> {
    pub fn new(registry: Arc<SessionRegistry<T>>, store: Arc<dyn BreakpointStore>) -> Self {
        Self {
            registry,
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn BreakpointStore> {
        &self.store
    }

    /// The persisted list of `key`.
    pub async fn persisted(&self, key: &SessionKey) -> Result<Vec<Breakpoint>, BridgeError> {
        let _guard = self.lock.lock().await;
        self.store.load(key)
    }

    /// Push the persisted list of `key` into a freshly attached backend.
    pub async fn load(
        &self,
        key: &SessionKey,
        proxy: &BackendProxy<T>,
    ) -> Result<usize, BridgeError> {
        let _guard = self.lock.lock().await;
        let persisted = self.store.load(key)?;
        load_into_backend(proxy, &persisted).await?;
        debug!(%key, count = persisted.len(), "breakpoints loaded into backend");
        Ok(persisted.len())
    }

    /// Overwrite the persisted list of `key` with the backend's live list.
    pub async fn save_from_backend(
        &self,
        key: &SessionKey,
        proxy: &BackendProxy<T>,
    ) -> Result<Vec<Breakpoint>, BridgeError> {
        let _guard = self.lock.lock().await;
        self.replace_from_backend(key, proxy).await
    }

    async fn replace_from_backend(
        &self,
        key: &SessionKey,
        proxy: &BackendProxy<T>,
    ) -> Result<Vec<Breakpoint>, BridgeError> {
        let list = read_from_backend(proxy).await?;
        self.store.save(key, &list)?;
        Ok(list)
    }

    /// Add a breakpoint at `file:line`, or remove every breakpoint there.
    pub async fn toggle_breakpoint(
        &self,
        key: &SessionKey,
        file: &Path,
        line: u32,
    ) -> Result<Toggled, BridgeError> {
        let _guard = self.lock.lock().await;
        let mut persisted = self.store.load(key)?;
        let present = persisted.iter().any(|bp| bp.is_at(file, line));
        let outcome = if present {
            persisted.retain(|bp| !bp.is_at(file, line));
            Toggled::Removed
        } else {
            persisted.push(Breakpoint::new(file, line));
            Toggled::Added
        };

        if let Some(proxy) = self.registry.handle(key) {
            let live = match outcome {
                Toggled::Added => proxy.set_breakpoint(&Breakpoint::new(file, line)).await.map(drop),
                Toggled::Removed => delete_live(&proxy, file, line).await,
            };
            match live {
                Ok(()) => {
                    self.replace_from_backend(key, &proxy).await?;
                    return Ok(outcome);
                }
                Err(e) if e.is_unreachable() => {
                    warn!(%key, "backend gone, saving breakpoints locally: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.store.save(key, &persisted)?;
        Ok(outcome)
    }

    /// Flip the enabled flag of the breakpoint at `file:line`.
    ///
    /// Returns the new flag, or `None` (and changes nothing) when no
    /// breakpoint sits there.
    pub async fn toggle_enabled(
        &self,
        key: &SessionKey,
        file: &Path,
        line: u32,
    ) -> Result<Option<bool>, BridgeError> {
        let _guard = self.lock.lock().await;
        let mut persisted = self.store.load(key)?;
        let mut enabled = None;
        for bp in persisted.iter_mut().filter(|bp| bp.is_at(file, line)) {
            bp.enabled = !bp.enabled;
            enabled = Some(bp.enabled);
        }
        let Some(enabled) = enabled else {
            return Ok(None);
        };

        if let Some(proxy) = self.registry.handle(key) {
            match set_live_enabled(&proxy, file, line, enabled).await {
                Ok(()) => {
                    self.replace_from_backend(key, &proxy).await?;
                    return Ok(Some(enabled));
                }
                Err(e) if e.is_unreachable() => {
                    warn!(%key, "backend gone, saving breakpoints locally: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.store.save(key, &persisted)?;
        Ok(Some(enabled))
    }
}

async fn delete_live<T: Transport>(
    proxy: &BackendProxy<T>,
    file: &Path,
    line: u32,
) -> Result<(), RpcError> {
    for live in proxy.breakpoints().await? {
        if live.is_at(file, line) {
            proxy.delete_breakpoint(live.id).await?;
        }
    }
    Ok(())
}

async fn set_live_enabled<T: Transport>(
    proxy: &BackendProxy<T>,
    file: &Path,
    line: u32,
    enabled: bool,
) -> Result<(), RpcError> {
    for live in proxy.breakpoints().await? {
        if !live.is_at(file, line) {
            continue;
        }
        if enabled {
            proxy.enable_breakpoint(live.id).await?;
        } else {
            proxy.disable_breakpoint(live.id).await?;
        }
    }
    Ok(())
}
