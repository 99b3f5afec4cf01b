// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use vaultsentry_lib::backend::memory::AccountRecord;
use vaultsentry_lib::backend::{BackendError, InMemoryBackend};
use vaultsentry_lib::clock::ManualClock;
use vaultsentry_lib::entitlement::{
    Account, EntitlementService, FallbackPolicy, Freshness, RejectReason, SyncError,
    TransitionError, TrialState,
};
use vaultsentry_lib::{metrics, Feature, Quota, Tier};

struct Harness {
    clock: Arc<ManualClock>,
    backend: Arc<InMemoryBackend>,
    service: EntitlementService,
}

fn t0() -> DateTime<Utc> {
    "2026-03-01T09:30:00Z".parse().unwrap()
}

fn harness_with(tier: Tier, latency: Duration) -> Harness {
    let clock = Arc::new(ManualClock::new(t0()));
    let backend = Arc::new(
        InMemoryBackend::new(AccountRecord::new(tier), clock.clone()).with_latency(latency),
    );
    let account = Account::new("user-1", "dev@example.com", tier);
    let service = EntitlementService::new(
        backend.clone(),
        clock.clone(),
        Some(account),
        FallbackPolicy::Optimistic,
    );
    Harness {
        clock,
        backend,
        service,
    }
}

fn harness(tier: Tier) -> Harness {
    harness_with(tier, Duration::ZERO)
}

#[tokio::test]
async fn upgrade_lifts_repository_quota_without_reload() {
    let h = harness(Tier::Basic);
    h.backend.set_repositories_used(1);

    h.service.refresh_status().await.unwrap();
    assert!(!h.service.can_add_repository());

    let receipt = h.service.upgrade_tier(Tier::Premium).await.unwrap();
    assert!(receipt.refreshed);
    assert_eq!(receipt.message, "Successfully upgraded to Premium");

    let snapshot = h.service.refresh_status().await.unwrap();
    let status = snapshot.status.as_ref().unwrap();
    assert_eq!(status.tier, Tier::Premium);
    assert_eq!(status.limits.max_repositories, Quota::Limited(10));
    assert!(h.service.can_add_repository());
    assert_eq!(h.service.current_tier(), Some(Tier::Premium));
}

#[tokio::test]
async fn concurrent_refreshes_issue_one_request() {
    let h = harness_with(Tier::Premium, Duration::from_millis(40));
    let before = metrics::snapshot();

    let (a, b) = tokio::join!(h.service.refresh_status(), h.service.refresh_status());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    let calls = h.backend.calls();
    assert_eq!(calls.status, 1);
    assert_eq!(calls.plans, 1);
    assert!(metrics::snapshot().coalesced_joins >= before.coalesced_joins + 1);
}

#[tokio::test]
async fn trial_expires_lazily_at_fourteen_days() {
    let h = harness(Tier::Basic);
    h.service.refresh_status().await.unwrap();

    let receipt = h.service.start_trial().await.unwrap();
    assert_eq!(receipt.message, "Your 14-day Premium Plus trial has started!");
    assert_eq!(
        h.service.trial_state(),
        Some(TrialState::TrialActive {
            ends_at: t0() + ChronoDuration::days(14)
        })
    );
    let calls_after_start = h.backend.calls();

    h.clock
        .advance(ChronoDuration::days(13) + ChronoDuration::hours(23) + ChronoDuration::minutes(59));
    assert!(h.service.check_feature(Feature::SsoEnabled));
    assert!(h.service.check_feature(Feature::CustomBranding));
    assert_eq!(h.service.effective_tier(), Some(Tier::PremiumPlus));

    h.clock.advance(ChronoDuration::minutes(1));
    assert!(!h.service.check_feature(Feature::SsoEnabled));
    assert!(!h.service.check_feature(Feature::CustomBranding));
    assert!(h.service.check_feature(Feature::EntropyAnalysis));
    assert_eq!(h.service.effective_tier(), Some(Tier::Basic));
    assert_eq!(h.service.trial_state(), Some(TrialState::TrialExpired));

    // Nothing above touched the network.
    assert_eq!(h.backend.calls(), calls_after_start);

    let err = h.service.start_trial().await.unwrap_err();
    assert_eq!(err, TransitionError::Rejected(RejectReason::TrialAlreadyUsed));

    // The lapsed trial leaves the account on Basic, so an upgrade is allowed.
    assert_eq!(h.service.current_tier(), Some(Tier::Basic));
    h.service.upgrade_tier(Tier::Premium).await.unwrap();
    assert_eq!(h.service.effective_tier(), Some(Tier::Premium));
}

#[tokio::test]
async fn downgrade_is_rejected_without_network_call() {
    let h = harness(Tier::PremiumPlus);
    h.service.refresh_status().await.unwrap();

    let err = h.service.upgrade_tier(Tier::Premium).await.unwrap_err();
    assert_eq!(
        err,
        TransitionError::Rejected(RejectReason::UseDowngradeFlow {
            current: Tier::PremiumPlus,
            target: Tier::Premium,
        })
    );

    let err = h.service.upgrade_tier(Tier::PremiumPlus).await.unwrap_err();
    assert_eq!(
        err,
        TransitionError::Rejected(RejectReason::AlreadyOnPlan(Tier::PremiumPlus))
    );
    assert_eq!(h.backend.calls().upgrade, 0);
}

#[tokio::test]
async fn upgrade_during_active_trial_is_rejected_locally() {
    let h = harness(Tier::Basic);
    h.service.refresh_status().await.unwrap();
    h.service.start_trial().await.unwrap();

    assert_eq!(h.service.current_tier(), Some(Tier::PremiumPlus));
    assert!(!h.service.can_upgrade_to(Tier::Premium));
    assert!(!h.service.can_upgrade_to(Tier::PremiumPlus));

    let err = h.service.upgrade_tier(Tier::Premium).await.unwrap_err();
    assert_eq!(
        err,
        TransitionError::Rejected(RejectReason::UseDowngradeFlow {
            current: Tier::PremiumPlus,
            target: Tier::Premium,
        })
    );
    let err = h.service.upgrade_tier(Tier::PremiumPlus).await.unwrap_err();
    assert_eq!(
        err,
        TransitionError::Rejected(RejectReason::AlreadyOnPlan(Tier::PremiumPlus))
    );
    assert_eq!(h.backend.calls().upgrade, 0);
    assert_eq!(h.service.effective_tier(), Some(Tier::PremiumPlus));
}

#[tokio::test]
async fn trial_from_premium_fails_and_keeps_tier() {
    let h = harness(Tier::Premium);
    h.service.refresh_status().await.unwrap();
    let before = h.service.snapshot();

    let err = h.service.start_trial().await.unwrap_err();
    assert_eq!(
        err,
        TransitionError::Rejected(RejectReason::TrialUnavailable(Tier::Premium))
    );
    assert_eq!(h.backend.calls().start_trial, 0);
    assert!(Arc::ptr_eq(&before, &h.service.snapshot()));
    assert_eq!(h.service.current_tier(), Some(Tier::Premium));
}

#[tokio::test]
async fn failed_upgrade_leaves_state_untouched() {
    let h = harness(Tier::Basic);
    h.service.refresh_status().await.unwrap();
    let before = h.service.snapshot();

    h.backend
        .set_failure(Some(BackendError::http(402, "Payment required")));
    let err = h.service.upgrade_tier(Tier::Premium).await.unwrap_err();
    assert_eq!(err, TransitionError::Backend(BackendError::http(402, "Payment required")));

    assert!(Arc::ptr_eq(&before, &h.service.snapshot()));
    assert_eq!(h.service.last_error().as_deref(), Some("Payment required"));
    // No automatic retry.
    assert_eq!(h.backend.calls().upgrade, 1);
}

#[tokio::test]
async fn degraded_status_is_labelled() {
    let h = harness(Tier::Basic);
    h.backend
        .set_failure(Some(BackendError::network("connection refused")));

    let err = h.service.refresh_status().await.unwrap_err();
    assert!(matches!(err, SyncError::Backend(_)));
    assert_eq!(h.service.freshness(), Some(Freshness::Fallback));
    assert!(h.service.can_add_repository());
    assert!(h.service.can_run_scan());
    assert_eq!(h.service.plans().len(), 3);

    h.backend.set_failure(None);
    h.backend.set_repositories_used(1);
    h.service.refresh_status().await.unwrap();
    assert_eq!(h.service.freshness(), Some(Freshness::Authoritative));
    assert!(!h.service.can_add_repository());

    h.backend
        .set_failure(Some(BackendError::Timeout { timeout_ms: 10_000 }));
    let _ = h.service.refresh_status().await;
    assert_eq!(h.service.freshness(), Some(Freshness::Stale));
    assert!(!h.service.can_add_repository());
}

#[tokio::test]
async fn late_response_after_logout_is_discarded() {
    let h = harness_with(Tier::Premium, Duration::from_millis(60));
    let before = metrics::snapshot();

    let (result, ()) = tokio::join!(h.service.refresh_status(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.service.logout();
    });

    assert_eq!(result.unwrap_err(), SyncError::SignedOut);
    let snapshot = h.service.snapshot();
    assert!(snapshot.status.is_none());
    assert!(snapshot.plans.is_empty());
    assert_eq!(h.backend.calls().status, 1);
    assert!(metrics::snapshot().discarded_responses >= before.discarded_responses + 1);
}

#[tokio::test]
async fn post_upgrade_refresh_does_not_reuse_older_fetch() {
    let h = harness_with(Tier::Basic, Duration::from_millis(30));

    let (_, upgraded) = tokio::join!(
        h.service.refresh_status(),
        h.service.upgrade_tier(Tier::Premium)
    );
    let receipt = upgraded.unwrap();

    assert!(receipt.refreshed);
    let status = receipt.snapshot.status.clone().unwrap();
    assert_eq!(status.tier, Tier::Premium);
    assert_eq!(h.backend.calls().status, 2);
    assert_eq!(h.service.status().unwrap().tier, Tier::Premium);
}

#[tokio::test]
async fn switching_account_drops_previous_entitlements() {
    let h = harness(Tier::PremiumPlus);
    h.service.refresh_status().await.unwrap();
    assert!(h.service.check_feature(Feature::SsoEnabled));

    h.service
        .sign_in(Account::new("user-2", "second@example.com", Tier::Basic));
    assert!(h.service.status().is_none());
    assert!(!h.service.check_feature(Feature::SsoEnabled));
    assert_eq!(h.service.effective_tier(), Some(Tier::Basic));
    assert_eq!(h.service.current_tier(), Some(Tier::Basic));
    assert_eq!(h.service.plans().len(), 3);
}

#[tokio::test]
async fn confirmed_upgrade_survives_failed_follow_up_refresh() {
    let h = harness(Tier::Basic);
    h.backend
        .set_status_failure(Some(BackendError::network("connection reset")));

    let receipt = h.service.upgrade_tier(Tier::Premium).await.unwrap();
    assert!(!receipt.refreshed);
    assert_eq!(h.backend.calls().upgrade, 1);

    let status = h.service.status().unwrap();
    assert_eq!(status.freshness, Freshness::Fallback);
    assert_eq!(status.tier, Tier::Premium);
    assert_eq!(status.limits.max_repositories, Quota::Limited(10));
    assert_eq!(h.service.current_tier(), Some(Tier::Premium));
}
