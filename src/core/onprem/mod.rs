//! On-prem RPC bridge.
//!
//! Lets a poller running inside a private network serve request/response
//! calls without accepting inbound connections. A dispatcher enqueues a
//! [`PendingRequest`] and suspends; the poller drains the queue over HTTP and
//! posts results back, which wakes the matching dispatcher.
//!
//! Responses that arrive with no live dispatcher (late, duplicate or unknown
//! ids) are kept as orphans until a periodic sweep drops them.
//!
//! # Example
//!
//! ```rust,no_run
//! use callbridge::core::onprem::{OnPremBridge, OnPremConfig};
//! use serde_json::json;
//!
//! # async fn demo() {
//! let bridge = OnPremBridge::new(OnPremConfig::default());
//! let result = bridge
//!     .execute("get_device_vlans", json!({"device_name": "core-sw-01"}))
//!     .await;
//! # let _ = result;
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default time a dispatcher waits for the poller.
pub const DEFAULT_ONPREM_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of a response nobody is waiting for.
pub const DEFAULT_ORPHAN_TTL: Duration = Duration::from_secs(60);

/// Errors returned to a dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OnPremError {
    /// No response was submitted before the deadline.
    #[error("Request timed out")]
    Timeout { request_id: String, after: Duration },

    /// The caller abandoned the wait (session teardown).
    #[error("Request cancelled")]
    Cancelled { request_id: String },
}

/// A request waiting to be picked up by the poller.
///
/// Serialized as `{id, tool, params, timestamp}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PendingRequest {
    #[serde(rename = "id")]
    pub request_id: String,
    pub tool: String,
    pub params: Value,
    /// RFC 3339 creation time.
    pub timestamp: String,
}

/// A submitted result, keyed by request id.
#[derive(Debug, Clone)]
struct ResponseRecord {
    result: Value,
    received_at: Instant,
}

/// What happened to a submitted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A dispatcher was waiting and has been woken.
    Delivered,
    /// No dispatcher is waiting; the record is held until reaped.
    Orphaned,
}

/// Snapshot of the bridge's bookkeeping, exposed on the status route.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct OnPremStats {
    /// Requests enqueued but not yet polled.
    pub pending: usize,
    /// Dispatchers currently suspended.
    pub waiting: usize,
    /// Stored responses not yet consumed.
    pub orphans: usize,
}

/// Tuning knobs for [`OnPremBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnPremConfig {
    pub timeout: Duration,
    pub orphan_ttl: Duration,
}

impl Default for OnPremConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ONPREM_TIMEOUT,
            orphan_ttl: DEFAULT_ORPHAN_TTL,
        }
    }
}

/// Shared request queue plus response store.
///
/// One instance is shared by every call session and the HTTP poll/submit
/// handlers. All operations are safe under concurrent use.
#[derive(Debug)]
pub struct OnPremBridge {
    config: OnPremConfig,
    queue: Mutex<VecDeque<PendingRequest>>,
    responses: Mutex<HashMap<String, ResponseRecord>>,
    waiters: Mutex<HashMap<String, Arc<Notify>>>,
}

/// Removes the waiter entry however `execute` exits.
struct WaiterGuard<'a> {
    bridge: &'a OnPremBridge,
    request_id: String,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.bridge.waiters.lock().remove(&self.request_id);
    }
}

impl OnPremBridge {
    pub fn new(config: OnPremConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(VecDeque::new()),
            responses: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> OnPremConfig {
        self.config
    }

    /// Enqueue a request and wait for its result with the configured timeout.
    pub async fn execute(&self, tool: &str, params: Value) -> Result<Value, OnPremError> {
        self.execute_with_cancel(tool, params, &CancellationToken::new())
            .await
    }

    /// Same as [`execute`](Self::execute), but gives up early when `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        tool: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, OnPremError> {
        let request_id = Uuid::new_v4().to_string();
        let notify = Arc::new(Notify::new());
        let deadline = Instant::now() + self.config.timeout;

        // Waiter is registered before the request becomes visible to the poller.
        self.waiters
            .lock()
            .insert(request_id.clone(), Arc::clone(&notify));
        let _guard = WaiterGuard {
            bridge: self,
            request_id: request_id.clone(),
        };

        self.queue.lock().push_back(PendingRequest {
            request_id: request_id.clone(),
            tool: tool.to_string(),
            params,
            timestamp: now_rfc3339(),
        });
        debug!(request_id = %request_id, tool = %tool, "Enqueued on-prem request");

        loop {
            if let Some(record) = self.take_response(&request_id) {
                return Ok(record.result);
            }

            // notify_one stores a permit, so a submit landing between the check
            // above and this await is not lost.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(request_id = %request_id, "On-prem request cancelled");
                    return Err(OnPremError::Cancelled { request_id });
                }
                _ = notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(record) = self.take_response(&request_id) {
                        return Ok(record.result);
                    }
                    warn!(
                        request_id = %request_id,
                        tool = %tool,
                        timeout_ms = self.config.timeout.as_millis() as u64,
                        "On-prem request timed out"
                    );
                    return Err(OnPremError::Timeout {
                        request_id,
                        after: self.config.timeout,
                    });
                }
            }
        }
    }

    /// Pop the oldest pending request, if any.
    pub fn dequeue_next(&self) -> Option<PendingRequest> {
        self.queue.lock().pop_front()
    }

    /// Store a result for `request_id` and wake its dispatcher.
    ///
    /// Always accepted. A second submit for the same id replaces the first if
    /// the dispatcher has not consumed it yet.
    pub fn submit_result(&self, request_id: &str, result: Value) -> SubmitOutcome {
        let replaced = self
            .responses
            .lock()
            .insert(
                request_id.to_string(),
                ResponseRecord {
                    result,
                    received_at: Instant::now(),
                },
            )
            .is_some();
        if replaced {
            debug!(request_id = %request_id, "Replaced unconsumed on-prem response");
        }

        let waiter = self.waiters.lock().get(request_id).cloned();
        match waiter {
            Some(notify) => {
                notify.notify_one();
                SubmitOutcome::Delivered
            }
            None => {
                warn!(request_id = %request_id, "On-prem response has no waiting dispatcher");
                SubmitOutcome::Orphaned
            }
        }
    }

    /// Drop stored responses older than the orphan TTL that nobody waits for.
    ///
    /// Returns how many records were removed.
    pub fn reap_orphans(&self) -> usize {
        let waiters = self.waiters.lock();
        let mut responses = self.responses.lock();
        let ttl = self.config.orphan_ttl;
        let before = responses.len();
        responses.retain(|id, record| {
            waiters.contains_key(id) || record.received_at.elapsed() < ttl
        });
        before - responses.len()
    }

    pub fn stats(&self) -> OnPremStats {
        OnPremStats {
            pending: self.queue.lock().len(),
            waiting: self.waiters.lock().len(),
            orphans: self.responses.lock().len(),
        }
    }

    /// Run [`reap_orphans`](Self::reap_orphans) every `interval` until `shutdown` fires.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = bridge.reap_orphans();
                        if reaped > 0 {
                            info!(reaped, "Reaped orphaned on-prem responses");
                        }
                    }
                }
            }
            debug!("On-prem reaper stopped");
        })
    }

    fn take_response(&self, request_id: &str) -> Option<ResponseRecord> {
        self.responses.lock().remove(request_id)
    }
}

impl Default for OnPremBridge {
    fn default() -> Self {
        Self::new(OnPremConfig::default())
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
