//! Egress endpoint rotation.
//!
//! An [`EndpointPool`] is built once per process and shared (behind an `Arc`)
//! by every pipeline run. All cursor and retirement bookkeeping happens under
//! one lock so concurrent runs see a consistent rotation.

use crate::config::EndpointSettings;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// One way of reaching a backend: an optional proxy plus an optional request identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EndpointDescriptor {
    pub label: String,
    pub proxy: Option<String>,
    pub cookies_file: Option<PathBuf>,
    pub user_agent: Option<String>,
}

impl EndpointDescriptor {
    /// Direct egress with the default identity.
    pub fn direct() -> Self {
        Self {
            label: "direct".to_string(),
            proxy: None,
            cookies_file: None,
            user_agent: None,
        }
    }

    /// A candidate routed through `proxy`.
    pub fn proxy(proxy: &str) -> Self {
        Self {
            label: proxy.to_string(),
            proxy: Some(proxy.to_string()),
            cookies_file: None,
            user_agent: None,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.proxy.is_none() && self.cookies_file.is_none() && self.user_agent.is_none()
    }
}

impl std::fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug)]
struct Slot {
    descriptor: EndpointDescriptor,
    consecutive_failures: u32,
    failed_since_success: bool,
    retired: bool,
}

#[derive(Debug, Default)]
struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
}

impl PoolState {
    fn position(&self, descriptor: &EndpointDescriptor) -> Option<usize> {
        self.slots.iter().position(|s| &s.descriptor == descriptor)
    }
}

/// Round-robin pool of egress candidates with failure-driven retirement.
///
/// An empty pool means direct egress: [`EndpointPool::next`] always yields
/// [`EndpointDescriptor::direct`] and failure reports are ignored.
#[derive(Debug)]
pub struct EndpointPool {
    state: Mutex<PoolState>,
    failure_threshold: u32,
}

impl EndpointPool {
    /// Create a pool over `candidates`. A candidate is retired once its
    /// consecutive failures exceed `failure_threshold`.
    pub fn new(candidates: Vec<EndpointDescriptor>, failure_threshold: u32) -> Self {
        let slots = candidates
            .into_iter()
            .map(|descriptor| Slot {
                descriptor,
                consecutive_failures: 0,
                failed_since_success: false,
                retired: false,
            })
            .collect();

        Self {
            state: Mutex::new(PoolState { slots, cursor: 0 }),
            failure_threshold,
        }
    }

    /// A pool with no candidates.
    pub fn direct() -> Self {
        Self::new(Vec::new(), 1)
    }

    pub fn from_settings(settings: &EndpointSettings) -> Self {
        let candidates = settings
            .candidates
            .iter()
            .enumerate()
            .map(|(i, c)| EndpointDescriptor {
                label: c
                    .label
                    .clone()
                    .or_else(|| c.proxy.clone())
                    .unwrap_or_else(|| format!("identity-{}", i + 1)),
                proxy: c.proxy.clone(),
                cookies_file: c
                    .cookies_file
                    .as_deref()
                    .map(crate::config::Settings::expand_path),
                user_agent: c.user_agent.clone(),
            })
            .collect();

        Self::new(candidates, settings.failure_threshold)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Bookkeeping stays valid even if a holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the pool rotates at all.
    pub fn is_direct(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Number of candidates not yet retired.
    pub fn active_count(&self) -> usize {
        self.lock().slots.iter().filter(|s| !s.retired).count()
    }

    /// Next candidate in round-robin order, skipping retired ones.
    ///
    /// Returns `None` only when every configured candidate has been retired.
    pub fn next(&self) -> Option<EndpointDescriptor> {
        let mut state = self.lock();
        let n = state.slots.len();
        if n == 0 {
            return Some(EndpointDescriptor::direct());
        }

        for step in 0..n {
            let idx = (state.cursor + step) % n;
            if !state.slots[idx].retired {
                state.cursor = (idx + 1) % n;
                let descriptor = state.slots[idx].descriptor.clone();
                debug!(endpoint = %descriptor, "Selected endpoint");
                return Some(descriptor);
            }
        }

        None
    }

    /// Record a failed attempt through `descriptor`.
    pub fn report_failure(&self, descriptor: &EndpointDescriptor) {
        let threshold = self.failure_threshold;
        let mut state = self.lock();
        let n = state.slots.len();
        let Some(idx) = state.position(descriptor) else {
            return;
        };

        if state.cursor == idx {
            state.cursor = (idx + 1) % n;
        }

        let slot = &mut state.slots[idx];
        slot.consecutive_failures += 1;
        slot.failed_since_success = true;

        if !slot.retired && slot.consecutive_failures > threshold {
            slot.retired = true;
            warn!(
                endpoint = %slot.descriptor,
                failures = slot.consecutive_failures,
                "Retiring endpoint"
            );
        } else {
            info!(
                endpoint = %slot.descriptor,
                failures = slot.consecutive_failures,
                "Endpoint failed"
            );
        }
    }

    /// Record a successful attempt through `descriptor`.
    pub fn report_success(&self, descriptor: &EndpointDescriptor) {
        let mut state = self.lock();
        let Some(idx) = state.position(descriptor) else {
            return;
        };

        state.slots[idx].consecutive_failures = 0;
        for slot in &mut state.slots {
            slot.failed_since_success = false;
        }
    }

    /// True once every candidate failed (or was retired) since the last success.
    ///
    /// A direct pool is never exhausted; callers bound their retries themselves.
    pub fn is_exhausted(&self) -> bool {
        let state = self.lock();
        !state.slots.is_empty()
            && state
                .slots
                .iter()
                .all(|s| s.retired || s.failed_since_success)
    }
}

impl Default for EndpointPool {
    fn default() -> Self {
        Self::direct()
    }
}
