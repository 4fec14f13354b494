//! Fetch Scheduler (C7): one worker per active subscription, coordinating
//! periodic pulls, the per-account stats cache, and event emission.
//!
//! Each worker is a `tokio::spawn`ed cooperative loop gated by a child
//! [`CancellationToken`], mirroring the crate-wide cancellation discipline:
//! every long-lived worker checks its token before I/O and between loop
//! iterations rather than relying on the network layer to interrupt it.

use crate::account::Account;
use crate::bus::EventBus;
use crate::events::Event;
use crate::fetcher::{FetchOptions, Fetcher};
use crate::ledger::{SyncLedger, SyncMode};
use crate::message::Message;
use crate::store::MessageStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Minimum polling interval for any subscription, per the scheduler
/// contract.
pub const MIN_INTERVAL: Duration = Duration::from_secs(30);

/// Optional filter applied to a subscription's fetched batch before
/// publishing.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    /// Case-insensitive substring match against `From`.
    pub from_contains: Option<String>,
    /// Case-insensitive substring match against `Subject`.
    pub subject_contains: Option<String>,
    /// Case-insensitive substring match against any text field.
    pub keyword: Option<String>,
}

impl SubscriptionFilter {
    fn matches(&self, message: &Message) -> bool {
        let contains = |hay: &str, needle: &str| hay.to_lowercase().contains(&needle.to_lowercase());

        if let Some(needle) = &self.from_contains {
            if !message.from.iter().any(|a| contains(&a.render(), needle)) {
                return false;
            }
        }
        if let Some(needle) = &self.subject_contains {
            if !contains(&message.subject, needle) {
                return false;
            }
        }
        if let Some(needle) = &self.keyword {
            if !contains(&message.all_text(), needle) {
                return false;
            }
        }
        true
    }
}

/// A long-lived declaration to monitor one `(account, folder)`.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Opaque id, assigned at creation.
    pub id: u64,
    /// Owning account.
    pub account_id: u64,
    /// Mailbox to monitor.
    pub folder: String,
    /// Polling interval, floored at [`MIN_INTERVAL`].
    pub interval: Duration,
    /// Whether fetched messages should include decoded bodies.
    pub include_body: bool,
    /// Optional filter narrowing which new messages are published.
    pub filter: Option<SubscriptionFilter>,
    /// Opaque client metadata.
    pub metadata: Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Optional expiry; past this time the worker self-terminates.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Builds a subscription with the interval floor enforced.
    #[must_use]
    pub fn new(id: u64, account_id: u64, folder: impl Into<String>, interval: Duration) -> Self {
        Self {
            id,
            account_id,
            folder: folder.into(),
            interval: interval.max(MIN_INTERVAL),
            include_body: true,
            filter: None,
            metadata: Value::Null,
            created_at: Utc::now(),
            expires_at: None,
        }
    }
}

/// Per-account, purely informational statistics, refreshed on each
/// successful commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountStats {
    /// Total messages committed for this account across all folders.
    pub count: u64,
    /// Epoch millis of the oldest message seen, if any.
    pub oldest_date_millis: Option<i64>,
    /// Epoch millis of the newest message seen, if any.
    pub newest_date_millis: Option<i64>,
    /// Approximate total size in bytes.
    pub approx_size_bytes: u64,
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    next_run_at: Arc<AtomicI64>,
}

/// Owns one worker per active subscription.
pub struct Scheduler {
    fetcher: Arc<Fetcher>,
    store: Arc<dyn MessageStore>,
    ledger: Arc<SyncLedger>,
    bus: Arc<EventBus>,
    accounts: Arc<DashMap<u64, Account>>,
    subscriptions: Arc<DashMap<u64, Subscription>>,
    workers: DashMap<u64, Worker>,
    stats: Arc<DashMap<u64, AccountStats>>,
    fetch_now_locks: Arc<DashMap<u64, Arc<Mutex<()>>>>,
}

impl Scheduler {
    /// Builds a scheduler over shared collaborators.
    #[must_use]
    pub fn new(
        fetcher: Arc<Fetcher>,
        store: Arc<dyn MessageStore>,
        ledger: Arc<SyncLedger>,
        bus: Arc<EventBus>,
        accounts: Arc<DashMap<u64, Account>>,
    ) -> Self {
        Self {
            fetcher,
            store,
            ledger,
            bus,
            accounts,
            subscriptions: Arc::new(DashMap::new()),
            workers: DashMap::new(),
            stats: Arc::new(DashMap::new()),
            fetch_now_locks: Arc::new(DashMap::new()),
        }
    }

    /// Registers `subscription` and spawns its worker.
    #[instrument(name = "Scheduler::subscribe", skip(self, subscription), fields(subscription_id = subscription.id))]
    pub fn subscribe(&self, subscription: Subscription) {
        let id = subscription.id;
        self.subscriptions.insert(id, subscription.clone());
        self.bus.subscribe(id, crate::bus::MIN_CHANNEL_CAPACITY);
        self.spawn_worker(subscription);
    }

    /// Cancels and awaits the subscription's worker, then removes its
    /// registration and bus channel.
    #[instrument(name = "Scheduler::unsubscribe", skip(self))]
    pub async fn unsubscribe(&self, subscription_id: u64) {
        if let Some((_, worker)) = self.workers.remove(&subscription_id) {
            worker.cancel.cancel();
            let _ = worker.handle.await;
        }
        self.subscriptions.remove(&subscription_id);
        self.bus.unsubscribe(subscription_id);
    }

    /// Subscriptions owned by `account_id`.
    #[must_use]
    pub fn by_account(&self, account_id: u64) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .filter(|e| e.value().account_id == account_id)
            .map(|e| e.value().clone())
            .collect()
    }

    /// All active subscriptions.
    #[must_use]
    pub fn all(&self) -> Vec<Subscription> {
        self.subscriptions.iter().map(|e| e.value().clone()).collect()
    }

    /// The per-account stats cache, informational only.
    #[must_use]
    pub fn stats(&self, account_id: u64) -> AccountStats {
        self.stats.get(&account_id).map(|s| *s).unwrap_or_default()
    }

    /// Synchronously triggers one fetch cycle for `subscription_id`,
    /// bypassing the wait but still respecting the single-worker-per-sub
    /// rule — it takes the worker's own turn by running the same cycle body
    /// under the subscription's per-id lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription is unknown or the underlying
    /// fetch fails.
    #[instrument(name = "Scheduler::fetch_now", skip(self))]
    pub async fn fetch_now(&self, subscription_id: u64, force: bool) -> crate::error::Result<usize> {
        let subscription = self
            .subscriptions
            .get(&subscription_id)
            .map(|e| e.value().clone())
            .ok_or(crate::error::CoreError::NoMatch)?;

        let lock = self
            .fetch_now_locks
            .entry(subscription_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let cancel = CancellationToken::new();
        let mode = if force {
            SyncMode::Full
        } else {
            SyncMode::Incremental
        };
        self.run_cycle(&subscription, mode, &cancel).await
    }

    fn spawn_worker(&self, subscription: Subscription) {
        let cancel = CancellationToken::new();
        let next_run_at = Arc::new(AtomicI64::new(Utc::now().timestamp_millis()));

        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let ledger = Arc::clone(&self.ledger);
        let bus = Arc::clone(&self.bus);
        let accounts = Arc::clone(&self.accounts);
        let stats = Arc::clone(&self.stats);
        let worker_cancel = cancel.clone();
        let worker_next_run_at = Arc::clone(&next_run_at);

        let handle = tokio::spawn(async move {
            run_worker_loop(
                subscription,
                fetcher,
                store,
                ledger,
                bus,
                accounts,
                stats,
                worker_cancel,
                worker_next_run_at,
            )
            .await;
        });

        self.workers.insert(
            subscription.id,
            Worker {
                handle,
                cancel,
                next_run_at,
            },
        );
    }

    async fn run_cycle(
        &self,
        subscription: &Subscription,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> crate::error::Result<usize> {
        run_fetch_cycle(
            subscription,
            mode,
            &self.fetcher,
            &self.store,
            &self.ledger,
            &self.bus,
            &self.accounts,
            &self.stats,
            cancel,
        )
        .await
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker_loop(
    subscription: Subscription,
    fetcher: Arc<Fetcher>,
    store: Arc<dyn MessageStore>,
    ledger: Arc<SyncLedger>,
    bus: Arc<EventBus>,
    accounts: Arc<DashMap<u64, Account>>,
    stats: Arc<DashMap<u64, AccountStats>>,
    cancel: CancellationToken,
    next_run_at: Arc<AtomicI64>,
) {
    loop {
        if cancel.is_cancelled() {
            debug!(subscription_id = subscription.id, "worker cancelled, exiting");
            return;
        }

        if let Some(expires_at) = subscription.expires_at {
            if Utc::now() >= expires_at {
                info!(subscription_id = subscription.id, "subscription expired, exiting");
                return;
            }
        }

        let target_millis = next_run_at.load(Ordering::SeqCst);
        let now_millis = Utc::now().timestamp_millis();
        let wait_millis = (target_millis - now_millis).max(0) as u64;

        tokio::select! {
            () = cancel.cancelled() => {
                debug!(subscription_id = subscription.id, "worker cancelled during wait");
                return;
            }
            () = tokio::time::sleep(Duration::from_millis(wait_millis)) => {}
        }

        if cancel.is_cancelled() {
            return;
        }

        match run_fetch_cycle(
            &subscription,
            SyncMode::Incremental,
            &fetcher,
            &store,
            &ledger,
            &bus,
            &accounts,
            &stats,
            &cancel,
        )
        .await
        {
            Ok(n) => debug!(subscription_id = subscription.id, new_count = n, "fetch cycle complete"),
            Err(e) => warn!(subscription_id = subscription.id, error = %e, "fetch cycle failed"),
        }

        let next = Utc::now() + chrono::Duration::from_std(subscription.interval).unwrap_or_default();
        next_run_at.store(next.timestamp_millis(), Ordering::SeqCst);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_fetch_cycle(
    subscription: &Subscription,
    mode: SyncMode,
    fetcher: &Fetcher,
    store: &Arc<dyn MessageStore>,
    ledger: &SyncLedger,
    bus: &EventBus,
    accounts: &DashMap<u64, Account>,
    stats: &DashMap<u64, AccountStats>,
    cancel: &CancellationToken,
) -> crate::error::Result<usize> {
    let now = Utc::now();

    bus.publish(subscription.id, Event::fetch_start(subscription.id, now));

    let account = accounts
        .get(&subscription.account_id)
        .map(|a| a.value().clone())
        .ok_or(crate::error::CoreError::NoMatch)?;

    let default_start = now - chrono::Duration::days(30);
    let window = ledger.next(subscription.account_id, &subscription.folder, mode, default_start, now);

    let options = FetchOptions {
        folder: subscription.folder.clone(),
        include_body: subscription.include_body,
        start_date: Some(window.start.date_naive()),
        end_date: Some(window.end.date_naive()),
        ..FetchOptions::default()
    };

    let fetch_result = fetcher.fetch(&account, &options, cancel).await;

    let batch = match fetch_result {
        Ok(batch) => batch,
        Err(e) => {
            bus.publish(
                subscription.id,
                Event::fetch_error(subscription.id, e.to_string(), Utc::now()),
            );
            return Err(e);
        }
    };

    let mut fresh = Vec::with_capacity(batch.len());
    for message in batch {
        if !store.exists(subscription.account_id, &message.dedup_key()).await {
            fresh.push(message);
        }
    }

    let filtered: Vec<Message> = match &subscription.filter {
        Some(filter) => fresh.into_iter().filter(|m| filter.matches(m)).collect(),
        None => fresh,
    };

    let inserted = store.put_batch(filtered).await?;

    ledger.commit(
        subscription.account_id,
        &subscription.folder,
        window,
        inserted.len() as u64,
    );

    update_stats(stats, subscription.account_id, &inserted);

    if let Some(mut account) = accounts.get_mut(&subscription.account_id) {
        account.mark_synced(Utc::now());
    }

    for message in &inserted {
        bus.publish(
            subscription.id,
            Event::new_email(subscription.id, message.clone(), Utc::now()),
        );
    }

    bus.publish(
        subscription.id,
        Event::fetch_complete(subscription.id, inserted.len(), Utc::now()),
    );

    Ok(inserted.len())
}

fn update_stats(stats: &DashMap<u64, AccountStats>, account_id: u64, inserted: &[Message]) {
    if inserted.is_empty() {
        return;
    }

    stats
        .entry(account_id)
        .and_modify(|s| accumulate_stats(s, inserted))
        .or_insert_with(|| {
            let mut s = AccountStats::default();
            accumulate_stats(&mut s, inserted);
            s
        });
}

fn accumulate_stats(s: &mut AccountStats, inserted: &[Message]) {
    s.count += inserted.len() as u64;
    for message in inserted {
        let millis = message.received_date.timestamp_millis();
        s.oldest_date_millis = Some(s.oldest_date_millis.map_or(millis, |o| o.min(millis)));
        s.newest_date_millis = Some(s.newest_date_millis.map_or(millis, |n| n.max(millis)));
        s.approx_size_bytes += u64::from(message.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_interval_is_floored() {
        let sub = Subscription::new(1, 1, "INBOX", Duration::from_secs(5));
        assert_eq!(sub.interval, MIN_INTERVAL);
    }

    #[test]
    fn subscription_interval_above_floor_is_kept() {
        let sub = Subscription::new(1, 1, "INBOX", Duration::from_secs(120));
        assert_eq!(sub.interval, Duration::from_secs(120));
    }

    #[test]
    fn filter_matches_subject_substring() {
        use crate::message::Address;
        let filter = SubscriptionFilter {
            subject_contains: Some("invoice".into()),
            ..Default::default()
        };
        let message = Message {
            id: 1,
            account_id: 1,
            folder: "INBOX".into(),
            message_id: "a@b.com".into(),
            envelope_date: None,
            received_date: Utc::now(),
            from: vec![Address::bare("a@b.com")],
            to: vec![],
            cc: vec![],
            bcc: vec![],
            subject: "Your Invoice #42".into(),
            flags: vec![],
            plain_body: None,
            html_body: None,
            size: 0,
            attachments: vec![],
        };
        assert!(filter.matches(&message));
    }

    #[test]
    fn stats_accumulate_across_batches() {
        use crate::message::Address;
        let stats = DashMap::new();
        let message = Message {
            id: 1,
            account_id: 1,
            folder: "INBOX".into(),
            message_id: "a@b.com".into(),
            envelope_date: None,
            received_date: Utc::now(),
            from: vec![Address::bare("a@b.com")],
            to: vec![],
            cc: vec![],
            bcc: vec![],
            subject: "s".into(),
            flags: vec![],
            plain_body: None,
            html_body: None,
            size: 100,
            attachments: vec![],
        };
        update_stats(&stats, 1, &[message.clone()]);
        update_stats(&stats, 1, &[message]);

        let s = *stats.get(&1).unwrap();
        assert_eq!(s.count, 2);
        assert_eq!(s.approx_size_bytes, 200);
    }
}
