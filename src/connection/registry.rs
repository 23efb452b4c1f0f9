use super::ConnectionHandle;
use crate::core::{DocError, Result};
use crate::storage::{Connector, DocumentStore};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type PendingConnect = Shared<BoxFuture<'static, Result<Arc<dyn DocumentStore>>>>;

enum Slot {
    /// An establishment attempt every concurrent acquirer awaits.
    Connecting { attempt: u64, future: PendingConnect },
    Ready(ConnectionHandle),
}

/// Connection registry
///
/// Caches one live [`ConnectionHandle`] per resolved endpoint URL. The first
/// `acquire` for an endpoint starts the physical connection; callers arriving
/// while it is in flight await the same attempt and observe the same result,
/// so one endpoint never gets two physical connections. Failed attempts are
/// not cached.
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    slots: Mutex<HashMap<String, Slot>>,
    next_attempt: AtomicU64,
    attempts: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
            next_attempt: AtomicU64::new(1),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Return the cached handle for `endpoint`, connecting on first use.
    pub async fn acquire(&self, endpoint: &str) -> Result<ConnectionHandle> {
        let (attempt, future) = {
            let mut slots = self.slots.lock()?;
            match slots.get(endpoint) {
                Some(Slot::Ready(handle)) => return Ok(handle.clone()),
                Some(Slot::Connecting { attempt, future }) => (*attempt, future.clone()),
                None => {
                    let attempt = self.next_attempt.fetch_add(1, Ordering::SeqCst);
                    self.attempts.fetch_add(1, Ordering::SeqCst);
                    debug!("[registry] connecting to {}", super::redact_url(endpoint));

                    let connector = Arc::clone(&self.connector);
                    let url = endpoint.to_string();
                    let future = async move { connector.connect(&url).await }
                        .boxed()
                        .shared();
                    slots.insert(
                        endpoint.to_string(),
                        Slot::Connecting {
                            attempt,
                            future: future.clone(),
                        },
                    );
                    (attempt, future)
                }
            }
        };

        let outcome = future.await;

        let mut slots = self.slots.lock()?;
        let owns_slot = match slots.get(endpoint) {
            // another waiter already promoted this attempt
            Some(Slot::Ready(handle)) => return Ok(handle.clone()),
            Some(Slot::Connecting { attempt: current, .. }) => *current == attempt,
            None => false,
        };

        if owns_slot {
            match &outcome {
                Ok(store) => {
                    let handle = ConnectionHandle::new(endpoint, Arc::clone(store))?;
                    slots.insert(endpoint.to_string(), Slot::Ready(handle.clone()));
                    return Ok(handle);
                }
                Err(err) => {
                    warn!(
                        "[registry] connection to {} failed: {}",
                        super::redact_url(endpoint),
                        err
                    );
                    slots.remove(endpoint);
                }
            }
        }
        drop(slots);

        // Slot was closed or replaced while connecting: hand out an unregistered handle.
        let store = outcome?;
        ConnectionHandle::new(endpoint, store)
    }

    /// Close the handle's connection and forget it.
    ///
    /// Returns `false` when that connection is no longer cached, so a stale
    /// handle never closes a newer connection to the same endpoint.
    pub async fn close(&self, handle: &ConnectionHandle) -> Result<bool> {
        self.remove_ready(handle.endpoint(), |cached| cached.same_connection(handle))
            .await
    }

    /// Close and forget whatever connection is cached for `endpoint`.
    pub async fn release(&self, endpoint: &str) -> Result<bool> {
        self.remove_ready(endpoint, |_| true).await
    }

    async fn remove_ready<F>(&self, endpoint: &str, accept: F) -> Result<bool>
    where
        F: Fn(&ConnectionHandle) -> bool,
    {
        let removed = {
            let mut slots = self.slots.lock()?;
            if matches!(slots.get(endpoint), Some(Slot::Ready(cached)) if accept(cached)) {
                slots.remove(endpoint)
            } else {
                None
            }
        };

        match removed {
            Some(Slot::Ready(handle)) => {
                debug!("[registry] closing {}", super::redact_url(endpoint));
                handle.store().close().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Close every cached connection.
    pub async fn close_all(&self) -> Result<usize> {
        let handles: Vec<ConnectionHandle> = {
            let mut slots = self.slots.lock()?;
            let ready: Vec<String> = slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
                .map(|(key, _)| key.clone())
                .collect();
            ready
                .into_iter()
                .filter_map(|key| match slots.remove(&key) {
                    Some(Slot::Ready(handle)) => Some(handle),
                    _ => None,
                })
                .collect()
        };

        let mut first_error: Option<DocError> = None;
        for handle in &handles {
            if let Err(err) = handle.store().close().await {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(handles.len()),
        }
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.slots
            .lock()
            .map(|slots| matches!(slots.get(endpoint), Some(Slot::Ready(_))))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> RegistryStats {
        let (cached, connecting) = self
            .slots
            .lock()
            .map(|slots| {
                slots.values().fold((0, 0), |(ready, pending), slot| match slot {
                    Slot::Ready(_) => (ready + 1, pending),
                    Slot::Connecting { .. } => (ready, pending + 1),
                })
            })
            .unwrap_or((0, 0));

        RegistryStats {
            cached,
            connecting,
            connects_attempted: self.attempts.load(Ordering::SeqCst),
        }
    }
}

/// Registry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub cached: usize,
    pub connecting: usize,
    pub connects_attempted: usize,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Registry Stats: {} cached, {} connecting, {} attempts",
            self.cached, self.connecting, self.connects_attempted
        )
    }
}
