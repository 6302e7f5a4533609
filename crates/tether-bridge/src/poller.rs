//! Periodic status and output polling.
//!
//! The backend cannot push, so each active session gets a task that asks
//! for the status and drains stdout once per interval. The task has no
//! cancellation handle; it stops when it finds its session gone from the
//! registry.

use std::sync::Arc;
use std::time::Duration;

use tether_core::{SessionKey, Status};
use tether_rpc::{RpcError, Transport};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls one session.
pub struct Poller<T> {
    registry: Arc<SessionRegistry<T>>,
    key: SessionKey,
    interval: Duration,
}

/// Start polling `key` on its own task.
pub fn spawn_poller<T: Transport + 'static>(
    registry: Arc<SessionRegistry<T>>,
    key: SessionKey,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(Poller::new(registry, key, interval).run())
}

impl<T: Transport> Poller<T> {
    pub fn new(registry: Arc<SessionRegistry<T>>, key: SessionKey, interval: Duration) -> Self {
        Self {
            registry,
            key,
            interval,
        }
    }

    /// Poll until the session is unregistered.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !self.tick().await {
                break;
            }
        }
        debug!(key = %self.key, "poller stopped");
    }

    /// One poll. Returns `false` once the session is gone.
    pub async fn tick(&self) -> bool {
        let Some(handle) = self.registry.handle(&self.key) else {
            return false;
        };

        match handle.status().await {
            Ok(status) => {
                self.registry.observe_status(&self.key, status);
            }
            Err(err) if err.is_unreachable() => {
                self.backend_gone(&err).await;
                return false;
            }
            Err(err) if err.is_fault() => {
                debug!(key = %self.key, "status unavailable this tick: {err}");
            }
            Err(err) => warn!(key = %self.key, "status query failed: {err}"),
        }

        match handle.stdout().await {
            Ok(text) if !text.is_empty() => self.registry.publish_output(&self.key, &text),
            Ok(_) => {}
            Err(err) if err.is_unreachable() => {
                self.backend_gone(&err).await;
                return false;
            }
            Err(err) => debug!(key = %self.key, "stdout query failed: {err}"),
        }

        self.registry.is_registered(&self.key)
    }

    async fn backend_gone(&self, err: &RpcError) {
        info!(key = %self.key, "backend down: {err}");
        self.registry
            .observe_status(&self.key, Status::BackendUnreachable);
        self.registry.teardown(&self.key).await;
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::proxy::BackendProxy;
    use crate::registry::{OutputCallback, StatusCallback};
    use crate::retry::RetryPolicy;
    use crate::test_support::ScriptedTransport;

    struct Fixture {
        registry: Arc<SessionRegistry<ScriptedTransport>>,
        key: SessionKey,
        statuses: Arc<Mutex<Vec<String>>>,
        output: Arc<Mutex<String>>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(SessionRegistry::new());
        let key = SessionKey::new("w1");
        let proxy = BackendProxy::new(
            ScriptedTransport::new(),
            RetryPolicy::new(Duration::from_millis(10)),
        );
        proxy.transport().fallback("get_stdout", json!(""));
        registry.register(key.clone(), Arc::new(proxy));

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let seen = statuses.clone();
        let on_status: StatusCallback =
            Arc::new(move |_: &SessionKey, status: &Status| -> anyhow::Result<()> {
                seen.lock().unwrap().push(status.to_string());
                Ok(())
            });
        let output = Arc::new(Mutex::new(String::new()));
        let sink = output.clone();
        let on_output: OutputCallback =
            Arc::new(move |_: &SessionKey, text: &str| -> anyhow::Result<()> {
                sink.lock().unwrap().push_str(text);
                Ok(())
            });
        registry.subscribe_status(&key, on_status);
        registry.subscribe_output(&key, on_output);
        Fixture {
            registry,
            key,
            statuses,
            output,
        }
    }

    impl Fixture {
        fn proxy(&self) -> Arc<BackendProxy<ScriptedTransport>> {
            self.registry.handle(&self.key).unwrap()
        }

        fn poller(&self) -> Poller<ScriptedTransport> {
            Poller::new(self.registry.clone(), self.key.clone(), DEFAULT_POLL_INTERVAL)
        }
    }

    #[tokio::test]
    async fn distinct_statuses_are_delivered_once_in_order() {
        let f = fixture();
        let proxy = f.proxy();
        for status in ["running", "running", "stopped,breakpoint", "stopped,breakpoint", "running"] {
            proxy.transport().reply("get_status", Ok(json!(status)));
        }
        let poller = f.poller();
        for _ in 0..5 {
            assert!(poller.tick().await);
        }
        assert_eq!(
            *f.statuses.lock().unwrap(),
            vec!["running", "stopped,breakpoint", "running"]
        );
        assert_eq!(f.registry.status(&f.key), Some(Status::Running));
    }

    #[tokio::test]
    async fn fault_skips_the_status_but_not_the_output() {
        let f = fixture();
        let proxy = f.proxy();
        proxy.transport().reply(
            "get_status",
            Err(RpcError::Fault {
                code: 5,
                message: "debugger error".into(),
            }),
        );
        proxy.transport().reply("get_stdout", Ok(json!("partial ")));
        assert!(f.poller().tick().await);
        assert!(f.statuses.lock().unwrap().is_empty());
        assert_eq!(f.registry.status(&f.key), Some(Status::Unknown));
        assert_eq!(*f.output.lock().unwrap(), "partial ");
    }

    #[tokio::test]
    async fn empty_output_is_not_published() {
        let f = fixture();
        f.proxy()
            .transport()
            .reply("get_status", Ok(json!("running")));
        assert!(f.poller().tick().await);
        assert!(f.output.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refused_connection_tears_the_session_down() {
        let f = fixture();
        let addr: SocketAddr = "127.0.0.1:12999".parse().unwrap();
        f.proxy()
            .transport()
            .reply("get_status", Err(RpcError::ConnectionRefused(addr)));
        assert!(!f.poller().tick().await);
        assert_eq!(*f.statuses.lock().unwrap(), vec!["backend unreachable"]);
        assert!(!f.registry.is_registered(&f.key));
    }

    #[tokio::test]
    async fn busy_backend_is_invisible_to_subscribers() {
        let f = fixture();
        let proxy = f.proxy();
        proxy.transport().reply("get_status", Err(RpcError::ConnectionBusy));
        proxy.transport().reply("get_status", Ok(json!("stepping")));
        proxy.transport().reply("get_stdout", Err(RpcError::ResponseNotReady));
        proxy.transport().reply("get_stdout", Ok(json!("out\n")));
        assert!(f.poller().tick().await);
        assert_eq!(*f.statuses.lock().unwrap(), vec!["stepping"]);
        assert_eq!(*f.output.lock().unwrap(), "out\n");
    }

    #[tokio::test(start_paused = true)]
    async fn poller_exits_when_the_session_is_unregistered() {
        let f = fixture();
        f.proxy()
            .transport()
            .fallback("get_status", json!("stopped,signal"));
        let task = spawn_poller(f.registry.clone(), f.key.clone(), DEFAULT_POLL_INTERVAL);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(*f.statuses.lock().unwrap(), vec!["stopped,signal"]);
        let polls = f.proxy().transport().params("get_status").len();
        assert_eq!(polls, 2);

        f.registry.unregister(&f.key);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.registry.status(&f.key), None);
    }
}
