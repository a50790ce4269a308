use super::InstanceKey;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Best-effort flush run when the window is closing.
pub type FlushHook = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Handle for one registration. Only its holder can remove the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookToken(u64);

struct Registration {
    token: HookToken,
    hook: FlushHook,
}

/// Close-time flush hooks, one per mounted timer instance.
#[derive(Default)]
pub struct UnloadGuard {
    hooks: Mutex<HashMap<InstanceKey, Registration>>,
    next_token: AtomicU64,
}

impl UnloadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InstanceKey, Registration>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `hook` for `key`, replacing whatever an earlier mount left there.
    pub fn register(&self, key: InstanceKey, hook: FlushHook) -> HookToken {
        let token = HookToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(key, Registration { token, hook });
        token
    }

    /// Remove the hook for `key` if it is still the one `token` installed.
    /// Returns false when a newer mount owns the key.
    pub fn unregister(&self, key: &InstanceKey, token: HookToken) -> bool {
        let mut hooks = self.lock();
        match hooks.get(key) {
            Some(current) if current.token == token => {
                hooks.remove(key);
                true
            }
            Some(_) => {
                debug!("[SHUTDOWN] Keeping newer hook for {}", key);
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every hook concurrently and wait at most `timeout`.
    /// Returns how many hooks finished in time.
    pub async fn fire(&self, timeout: Duration) -> usize {
        let hooks: Vec<FlushHook> = self.lock().values().map(|r| r.hook.clone()).collect();
        if hooks.is_empty() {
            return 0;
        }
        let total = hooks.len();
        info!("[SHUTDOWN] Flushing {} timer(s) before close", total);

        let mut set = JoinSet::new();
        for hook in hooks {
            set.spawn(hook());
        }

        let mut finished = 0;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = set.join_next().await {
                if result.is_ok() {
                    finished += 1;
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "[SHUTDOWN] Flush timed out after {:?}: {}/{} timer(s) saved",
                timeout, finished, total
            );
            set.abort_all();
        }
        finished
    }
}
