// SPDX-License-Identifier: Apache-2.0

//! Lightweight in-memory counters for the entitlement engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct SyncMetrics {
    refresh_requests: AtomicU64,
    network_fetches: AtomicU64,
    coalesced_joins: AtomicU64,
    fetch_failures: AtomicU64,
    fallback_installs: AtomicU64,
    discarded_responses: AtomicU64,
    fetch_duration_total_ms: AtomicU64,
    fetch_duration_max_ms: AtomicU64,
    upgrades_ok: AtomicU64,
    upgrades_failed: AtomicU64,
    trials_ok: AtomicU64,
    trials_failed: AtomicU64,
    local_rejections: AtomicU64,
}

static SYNC_METRICS: OnceLock<SyncMetrics> = OnceLock::new();

fn metrics() -> &'static SyncMetrics {
    SYNC_METRICS.get_or_init(SyncMetrics::default)
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_refresh_request() {
    bump(&metrics().refresh_requests);
}

pub fn record_coalesced_join() {
    bump(&metrics().coalesced_joins);
}

/// One status+plans round trip to the backend.
pub fn record_fetch(duration_ms: f64, success: bool) {
    let duration_ms = duration_ms.max(0.0) as u64;
    let metrics = metrics();
    bump(&metrics.network_fetches);
    if !success {
        bump(&metrics.fetch_failures);
    }
    metrics
        .fetch_duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);

    let mut current = metrics.fetch_duration_max_ms.load(Ordering::Relaxed);
    while duration_ms > current {
        match metrics.fetch_duration_max_ms.compare_exchange(
            current,
            duration_ms,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

pub fn record_fallback_install() {
    bump(&metrics().fallback_installs);
}

pub fn record_discarded_response() {
    bump(&metrics().discarded_responses);
}

pub fn record_upgrade(success: bool) {
    let metrics = metrics();
    bump(if success {
        &metrics.upgrades_ok
    } else {
        &metrics.upgrades_failed
    });
}

pub fn record_trial(success: bool) {
    let metrics = metrics();
    bump(if success {
        &metrics.trials_ok
    } else {
        &metrics.trials_failed
    });
}

pub fn record_local_rejection() {
    bump(&metrics().local_rejections);
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncMetricsSnapshot {
    pub refresh_requests: u64,
    pub network_fetches: u64,
    pub coalesced_joins: u64,
    pub fetch_failures: u64,
    pub fallback_installs: u64,
    pub discarded_responses: u64,
    pub avg_fetch_ms: Option<f64>,
    pub max_fetch_ms: Option<u64>,
    pub upgrades_ok: u64,
    pub upgrades_failed: u64,
    pub trials_ok: u64,
    pub trials_failed: u64,
    pub local_rejections: u64,
}

pub fn snapshot() -> SyncMetricsSnapshot {
    let m = metrics();
    let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

    let fetches = load(&m.network_fetches);
    let total_ms = load(&m.fetch_duration_total_ms);
    let max_ms = load(&m.fetch_duration_max_ms);

    SyncMetricsSnapshot {
        refresh_requests: load(&m.refresh_requests),
        network_fetches: fetches,
        coalesced_joins: load(&m.coalesced_joins),
        fetch_failures: load(&m.fetch_failures),
        fallback_installs: load(&m.fallback_installs),
        discarded_responses: load(&m.discarded_responses),
        avg_fetch_ms: (fetches > 0).then(|| total_ms as f64 / fetches as f64),
        max_fetch_ms: (max_ms > 0).then_some(max_ms),
        upgrades_ok: load(&m.upgrades_ok),
        upgrades_failed: load(&m.upgrades_failed),
        trials_ok: load(&m.trials_ok),
        trials_failed: load(&m.trials_failed),
        local_rejections: load(&m.local_rejections),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_move_by_deltas() {
        // Other tests share the process-wide counters, so compare deltas.
        let initial = snapshot();

        record_fetch(120.0, true);
        let s1 = snapshot();
        assert!(s1.network_fetches >= initial.network_fetches + 1);

        record_fetch(30.0, false);
        let s2 = snapshot();
        assert!(s2.fetch_failures >= s1.fetch_failures + 1);

        record_upgrade(true);
        record_upgrade(false);
        record_trial(false);
        record_coalesced_join();
        let s3 = snapshot();
        assert!(s3.upgrades_ok >= initial.upgrades_ok + 1);
        assert!(s3.upgrades_failed >= initial.upgrades_failed + 1);
        assert!(s3.trials_failed >= initial.trials_failed + 1);
        assert!(s3.coalesced_joins >= initial.coalesced_joins + 1);

        record_fetch(987_654.0, true);
        assert!(snapshot().max_fetch_ms.unwrap() >= 987_654);
    }

    #[test]
    fn snapshot_serializes() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert!(json.get("network_fetches").is_some());
        assert!(json.get("discarded_responses").is_some());
    }
}
