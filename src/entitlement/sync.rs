// SPDX-License-Identifier: Apache-2.0

//! Authoritative status fetching.
//!
//! At most one status+plans fetch is in flight per session; concurrent
//! refreshes share it. Every snapshot replacement goes through [`commit`],
//! which only accepts a result whose ticket is newer than the last commit.
//! Tickets are issued from one monotonic counter, so a response started
//! before a logout or a transition can never overwrite what came after.
//!
//! [`commit`]: SyncState::commit

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use vsentry_core::{PlanInfo, Tier, TierCatalog};

use super::error::SyncError;
use super::status::{Account, EntitlementSnapshot, SubscriptionStatus};
use super::upgrade::TransitionReceipt;
use crate::backend::{BackendError, SubscriptionBackend};
use crate::clock::Clock;
use crate::metrics;

pub type SyncResult = Result<Arc<EntitlementSnapshot>, SyncError>;

type SharedFetch = Shared<BoxFuture<'static, SyncResult>>;

struct InFlight {
    ticket: u64,
    future: SharedFetch,
}

struct SyncState {
    backend: Arc<dyn SubscriptionBackend>,
    clock: Arc<dyn Clock>,
    snapshot: watch::Sender<Arc<EntitlementSnapshot>>,
    account: RwLock<Option<Account>>,
    in_flight: Mutex<Option<InFlight>>,
    tickets: AtomicU64,
    committed: Mutex<u64>,
    last_error: Mutex<Option<String>>,
}

impl SyncState {
    fn issue_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Must be called with the in-flight slot locked.
    fn start_fetch(self: &Arc<Self>) -> InFlight {
        let ticket = self.issue_ticket();
        let state = Arc::clone(self);
        let future = async move {
            let result = state.fetch(ticket).await;
            state.finish(ticket);
            result
        }
        .boxed()
        .shared();

        InFlight { ticket, future }
    }

    fn finish(&self, ticket: u64) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|in_flight| in_flight.ticket == ticket) {
            slot.take();
        }
    }

    async fn fetch(&self, ticket: u64) -> SyncResult {
        let account = self.account.read().clone();
        let Some(account) = account else {
            return Err(SyncError::SignedOut);
        };

        let started = Instant::now();
        let fetched = tokio::try_join!(self.backend.fetch_status(), self.backend.fetch_plans());
        metrics::record_fetch(started.elapsed().as_secs_f64() * 1000.0, fetched.is_ok());
        let now = self.clock.now();

        match fetched {
            Ok((response, plans)) => {
                let status = SubscriptionStatus::from_response(response, &plans, now);
                let tier = status.tier;
                match self.commit(ticket, |_| (Some(status), plans)) {
                    Some(snapshot) => {
                        *self.last_error.lock() = None;
                        info!(
                            ticket,
                            revision = snapshot.revision,
                            tier = tier.as_str(),
                            "Committed authoritative status"
                        );
                        Ok(snapshot)
                    }
                    None => self.superseded(),
                }
            }
            Err(err) => {
                warn!(ticket, error = %err, "Status refresh failed");
                let committed = self.commit(ticket, |current| degrade(current, &account, now));
                if committed.is_some() {
                    *self.last_error.lock() = Some(err.to_string());
                }
                Err(SyncError::Backend(err))
            }
        }
    }

    /// Result for a caller whose response lost to a newer commit.
    fn superseded(&self) -> SyncResult {
        if self.account.read().is_none() {
            return Err(SyncError::SignedOut);
        }
        Ok(self.snapshot.borrow().clone())
    }

    fn commit<F>(&self, ticket: u64, build: F) -> Option<Arc<EntitlementSnapshot>>
    where
        F: FnOnce(&EntitlementSnapshot) -> (Option<SubscriptionStatus>, Vec<PlanInfo>),
    {
        let mut committed = self.committed.lock();
        if ticket <= *committed {
            metrics::record_discarded_response();
            info!(ticket, committed = *committed, "Discarding out-of-date response");
            return None;
        }
        *committed = ticket;

        let current = self.snapshot.borrow().clone();
        let (status, plans) = build(&current);
        let next = Arc::new(EntitlementSnapshot {
            status,
            plans,
            revision: current.revision + 1,
        });
        self.snapshot.send_replace(Arc::clone(&next));
        Some(next)
    }
}

/// Snapshot contents after a failed refresh.
fn degrade(
    current: &EntitlementSnapshot,
    account: &Account,
    now: DateTime<Utc>,
) -> (Option<SubscriptionStatus>, Vec<PlanInfo>) {
    let status = match current.status.as_ref() {
        Some(status) if status.freshness.is_server_data() => {
            warn!("Keeping last-known-good status, marked stale");
            status.marked_stale()
        }
        _ => {
            let fallback = SubscriptionStatus::fallback(account, now);
            metrics::record_fallback_install();
            warn!(tier = fallback.tier.as_str(), "No server data, using catalog fallback");
            fallback
        }
    };

    let plans = if current.plans.is_empty() {
        TierCatalog::default_plans()
    } else {
        current.plans.clone()
    };
    (Some(status), plans)
}

/// Owner of the shared entitlement snapshot for one session.
#[derive(Clone)]
pub struct RemoteSync {
    state: Arc<SyncState>,
}

impl RemoteSync {
    pub fn new(
        backend: Arc<dyn SubscriptionBackend>,
        clock: Arc<dyn Clock>,
        account: Option<Account>,
    ) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(EntitlementSnapshot::initial()));
        Self {
            state: Arc::new(SyncState {
                backend,
                clock,
                snapshot,
                account: RwLock::new(account),
                in_flight: Mutex::new(None),
                tickets: AtomicU64::new(0),
                committed: Mutex::new(0),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn backend(&self) -> &dyn SubscriptionBackend {
        self.state.backend.as_ref()
    }

    pub fn backend_id(&self) -> &'static str {
        self.state.backend.backend_id()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.state.clock.now()
    }

    pub fn snapshot(&self) -> Arc<EntitlementSnapshot> {
        self.state.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EntitlementSnapshot>> {
        self.state.snapshot.subscribe()
    }

    pub fn account(&self) -> Option<Account> {
        self.state.account.read().clone()
    }

    /// Attaches `account`. Switching to a different user drops the previous
    /// user's snapshot and any fetch still in flight for them.
    pub fn sign_in(&self, account: Account) {
        let user_id = account.user_id.clone();
        let previous = self.state.account.write().replace(account);
        let switched = previous.is_none_or(|previous| previous.user_id != user_id);
        if switched {
            self.reset(TierCatalog::default_plans());
        }
        info!(user_id = %user_id, switched, "Account attached");
    }

    /// Tier stored by the backend right now: the trial tier while a trial
    /// runs, Basic once it has lapsed. Upgrades are checked against it.
    pub fn current_tier(&self) -> Option<Tier> {
        let account = self.account()?;
        let now = self.now();
        Some(match self.snapshot().status.as_ref() {
            Some(status) => status.effective_tier(now),
            None => account.effective_tier(now),
        })
    }

    /// Permanent tier of the signed-in account, ignoring a trial elevation.
    /// Trial eligibility is checked against it.
    pub fn base_tier(&self) -> Option<Tier> {
        let account = self.account()?;
        Some(match self.snapshot().status.as_ref() {
            Some(status) => status.base_tier(),
            None => account.base_tier(),
        })
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.last_error.lock().clone()
    }

    pub(crate) fn record_error(&self, err: &BackendError) {
        *self.state.last_error.lock() = Some(err.to_string());
    }

    /// Refresh, joining a fetch that is already in flight.
    #[instrument(skip(self), fields(backend = self.backend_id()))]
    pub async fn refresh_status(&self) -> SyncResult {
        self.refresh_after(0).await
    }

    /// Refresh with data requested after `bound` was issued. An older fetch
    /// still in flight is awaited first, then a new one is started.
    #[instrument(skip(self), fields(backend = self.backend_id()))]
    pub async fn refresh_newer_than(&self, bound: u64) -> SyncResult {
        self.refresh_after(bound).await
    }

    /// A point in the ticket sequence for [`Self::refresh_newer_than`].
    pub fn issue_ticket(&self) -> u64 {
        self.state.issue_ticket()
    }

    async fn refresh_after(&self, bound: u64) -> SyncResult {
        metrics::record_refresh_request();
        loop {
            let (ticket, joined, future) = {
                let mut slot = self.state.in_flight.lock();
                match slot.as_ref() {
                    Some(in_flight) => (in_flight.ticket, true, in_flight.future.clone()),
                    None => {
                        let in_flight = self.state.start_fetch();
                        let started = (in_flight.ticket, false, in_flight.future.clone());
                        *slot = Some(in_flight);
                        started
                    }
                }
            };

            if ticket > bound {
                if joined {
                    metrics::record_coalesced_join();
                    debug!(ticket, "Joining in-flight refresh");
                }
                return future.await;
            }

            debug!(ticket, bound, "Waiting for an earlier refresh to settle");
            let _ = future.await;
        }
    }

    /// Follow-up after a confirmed transition. A failed refresh does not
    /// undo the transition.
    pub(crate) async fn reconcile_after_mutation(&self, message: String) -> TransitionReceipt {
        let bound = self.issue_ticket();
        match self.refresh_newer_than(bound).await {
            Ok(snapshot) => TransitionReceipt {
                message,
                snapshot,
                refreshed: true,
            },
            Err(err) => {
                warn!(error = %err, "Refresh after transition failed");
                TransitionReceipt {
                    message,
                    snapshot: self.snapshot(),
                    refreshed: false,
                }
            }
        }
    }

    /// Records a backend-confirmed transition on the account so a catalog
    /// fallback built before the next successful fetch reflects it.
    pub(crate) fn apply_confirmed(&self, update: impl FnOnce(&mut Account)) {
        if let Some(account) = self.state.account.write().as_mut() {
            update(account);
        }
    }

    /// Clears the snapshot and forgets the account. Responses still in
    /// flight are discarded when they land.
    pub fn logout(&self) {
        *self.state.account.write() = None;
        self.reset(Vec::new());
        info!("Signed out, entitlement state cleared");
    }

    /// Drops the in-flight fetch and commits an empty snapshot under a fresh
    /// ticket, so nothing issued before this point can commit afterwards.
    fn reset(&self, plans: Vec<PlanInfo>) {
        let state = &self.state;
        state.in_flight.lock().take();
        *state.last_error.lock() = None;

        let ticket = state.issue_ticket();
        state.commit(ticket, |_| (None, plans));
    }
}
