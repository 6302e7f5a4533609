//! Session control from the editor: run, pause, step, stop.

use std::fmt;
use std::str::FromStr;

use tether_core::{SessionKey, Status};
use tether_rpc::{RpcError, Transport};
use tracing::{debug, info};

use crate::error::BridgeError;
use crate::registry::SessionRegistry;

/// A control command for a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Continue,
    Pause,
    StepInto,
    StepOver,
    StepOut,
    /// Kill the debuggee; the backend keeps running.
    Stop,
}

impl SessionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Pause => "pause",
            Self::StepInto => "step_into",
            Self::StepOver => "step_over",
            Self::StepOut => "step_out",
            Self::Stop => "stop",
        }
    }

    /// Status cached before the call is issued, so the next poll only
    /// reports a change once the debuggee has moved on.
    pub fn expected_status(self) -> Option<Status> {
        match self {
            Self::Continue => Some(Status::Running),
            Self::StepInto | Self::StepOver | Self::StepOut => Some(Status::Stepping),
            Self::Pause | Self::Stop => None,
        }
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "continue" => Self::Continue,
            "pause" => Self::Pause,
            "step_into" => Self::StepInto,
            "step_over" => Self::StepOver,
            "step_out" => Self::StepOut,
            "stop" => Self::Stop,
            other => return Err(format!("unknown session action: {other}")),
        })
    }
}

/// Run `action` on the session of `key`. Without a session this does
/// nothing; a backend that has gone away is torn down instead of
/// reported.
pub async fn perform<T: Transport>(
    registry: &SessionRegistry<T>,
    key: &SessionKey,
    action: SessionAction,
) -> Result<(), BridgeError> {
    let Some(proxy) = registry.handle(key) else {
        debug!(%key, %action, "no session, ignoring action");
        return Ok(());
    };
    if let Some(status) = action.expected_status() {
        registry.set_status(key, status);
    }
    let result = match action {
        SessionAction::Continue => proxy.start().await,
        SessionAction::Pause => proxy.pause().await,
        SessionAction::StepInto => proxy.step_into().await,
        SessionAction::StepOver => proxy.step_over().await,
        SessionAction::StepOut => proxy.step_out().await,
        SessionAction::Stop => proxy.stop().await,
    };
    settle(registry, key, result).await
}

/// Shut down the backend of `key`.
pub async fn stop_debugger<T: Transport>(
    registry: &SessionRegistry<T>,
    key: &SessionKey,
) -> Result<(), BridgeError> {
    let Some(proxy) = registry.handle(key) else {
        return Ok(());
    };
    info!(%key, "stopping debugger");
    let result = proxy.shutdown_server().await;
    settle(registry, key, result).await
}

async fn settle<T: Transport>(
    registry: &SessionRegistry<T>,
    key: &SessionKey,
    result: Result<(), RpcError>,
) -> Result<(), BridgeError> {
    match result {
        Err(err) if err.is_unreachable() => {
            info!(%key, "backend already gone: {err}");
            registry.teardown(key).await;
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::proxy::BackendProxy;
    use crate::retry::RetryPolicy;
    use crate::test_support::ScriptedTransport;

    fn registered() -> (SessionRegistry<ScriptedTransport>, SessionKey) {
        let registry = SessionRegistry::new();
        let key = SessionKey::new("w1");
        let proxy = BackendProxy::new(
            ScriptedTransport::new(),
            RetryPolicy::new(Duration::from_millis(1)),
        );
        registry.register(key.clone(), Arc::new(proxy));
        (registry, key)
    }

    #[tokio::test]
    async fn actions_map_to_backend_methods() {
        let (registry, key) = registered();
        for action in [
            SessionAction::Continue,
            SessionAction::Pause,
            SessionAction::StepInto,
            SessionAction::StepOver,
            SessionAction::StepOut,
            SessionAction::Stop,
        ] {
            perform(&registry, &key, action).await.unwrap();
        }
        let proxy = registry.handle(&key).unwrap();
        assert_eq!(
            proxy.transport().calls(),
            vec!["start", "pause", "step_into", "step_over", "step_out", "stop"]
        );
    }

    #[tokio::test]
    async fn continue_and_steps_seed_the_cached_status() {
        let (registry, key) = registered();
        perform(&registry, &key, SessionAction::Continue)
            .await
            .unwrap();
        assert_eq!(registry.status(&key), Some(Status::Running));
        perform(&registry, &key, SessionAction::StepOver)
            .await
            .unwrap();
        assert_eq!(registry.status(&key), Some(Status::Stepping));
        perform(&registry, &key, SessionAction::Pause).await.unwrap();
        assert_eq!(registry.status(&key), Some(Status::Stepping));
    }

    #[tokio::test]
    async fn missing_session_is_a_no_op() {
        let registry = SessionRegistry::<ScriptedTransport>::new();
        let key = SessionKey::new("nobody");
        perform(&registry, &key, SessionAction::Continue)
            .await
            .unwrap();
        stop_debugger(&registry, &key).await.unwrap();
    }

    #[tokio::test]
    async fn faults_reach_the_caller() {
        let (registry, key) = registered();
        registry.handle(&key).unwrap().transport().reply(
            "step_into",
            Err(RpcError::Fault {
                code: 1,
                message: "no process to step".into(),
            }),
        );
        let err = perform(&registry, &key, SessionAction::StepInto)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "backend call failed: fault 1: no process to step"
        );
        assert!(registry.is_registered(&key));
    }

    #[tokio::test]
    async fn stopping_a_dead_backend_tears_down() {
        let (registry, key) = registered();
        let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        registry
            .handle(&key)
            .unwrap()
            .transport()
            .reply("shutdown_server", Err(RpcError::ConnectionRefused(addr)));
        stop_debugger(&registry, &key).await.unwrap();
        assert!(!registry.is_registered(&key));
    }

    #[tokio::test]
    async fn stop_debugger_calls_shutdown_server() {
        let (registry, key) = registered();
        let proxy = registry.handle(&key).unwrap();
        proxy.transport().fallback("shutdown_server", json!(null));
        stop_debugger(&registry, &key).await.unwrap();
        assert_eq!(proxy.transport().calls(), vec!["shutdown_server"]);
    }

    #[test]
    fn names_round_trip() {
        for name in ["continue", "pause", "step_into", "step_over", "step_out", "stop"] {
            let action: SessionAction = name.parse().unwrap();
            assert_eq!(action.to_string(), name);
        }
        assert!("jump".parse::<SessionAction>().is_err());
    }
}
