//! Waiter Registry (C8): short-lived predicate waiters attached to one
//! account, for HTTP long-poll / WebSocket `wait-for-email` semantics.
//!
//! The single correctness-critical invariant: `start_time` is frozen at
//! construction and never slides forward as the waiter ticks. A sliding
//! window would miss messages that arrive out of order relative to the
//! poller's clock (see open question in the design notes this module
//! implements).

use crate::account::Account;
use crate::error::{Result, WaiterError};
use crate::extractor::{self, ExtractorRow};
use crate::fetcher::{FetchOptions, Fetcher};
use crate::message::Message;
use crate::resolver;
use crate::store::{MessageStore, SearchOptions};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Default tick interval for HTTP long-poll waiters.
pub const DEFAULT_HTTP_INTERVAL: Duration = Duration::from_secs(5);
/// Tick interval for WebSocket waiters.
pub const WEBSOCKET_INTERVAL: Duration = Duration::from_secs(1);
/// Default HTTP waiter timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Default WebSocket waiter timeout.
pub const DEFAULT_WEBSOCKET_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Parses a client-supplied start time: RFC3339 first, then
/// epoch-milliseconds, falling back to "now" on failure (per the waiter's
/// lenient input contract — a caller with a bad clock still gets a usable
/// waiter rather than a 400).
#[must_use]
pub fn parse_start_time(raw: &str) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(millis) = raw.parse::<i64>() {
        if let chrono::LocalResult::Single(dt) = Utc.timestamp_millis_opt(millis) {
            return dt;
        }
    }
    Utc::now()
}

/// Successful delivery from [`wait`] or one [`poll`] call.
#[derive(Debug, Clone)]
pub struct WaitHit {
    /// The delivered message.
    pub message: Message,
    /// Extractor matches, if extractors were configured.
    pub matches: Option<Vec<String>>,
}

/// The result of a completed [`wait`] call.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// A matching message was found and delivered.
    Found(WaitHit),
    /// The deadline elapsed with nothing delivered.
    Timeout,
}

/// Candidate messages for one waiter tick: everything received within the
/// frozen `[start_time, now]` window and addressed to `account`, not yet
/// delivered this waiter's lifetime.
async fn candidates(
    store: &dyn MessageStore,
    account: &Account,
    start_time: DateTime<Utc>,
    seen: &HashSet<String>,
) -> Vec<Message> {
    let (page, _total) = store
        .search(&SearchOptions {
            account_id: account.id,
            since: Some(start_time),
            ..Default::default()
        })
        .await
        .unwrap_or_default();

    page.into_iter()
        .filter(|m| addressed_to_account(m, account))
        .filter(|m| !seen.contains(m.dedup_key().as_ref()))
        .collect()
}

/// Candidate messages for one from-server tick: fetches `folder` directly
/// from the upstream server instead of the store, for the WebSocket variant's
/// lowest-latency path (spec: "WebSocket waiters read messages via the
/// fetcher directly... for lowest latency"). Fetch failures are logged and
/// treated as an empty tick rather than aborting the waiter — a transient
/// IMAP hiccup should not end a long-lived streaming wait.
async fn candidates_from_server(
    fetcher: &Fetcher,
    account: &Account,
    folder: &str,
    start_time: DateTime<Utc>,
    seen: &HashSet<String>,
    cancel: &CancellationToken,
) -> Vec<Message> {
    let options = FetchOptions {
        folder: folder.to_string(),
        start_date: Some(start_time.date_naive()),
        include_attachments: false,
        ..Default::default()
    };

    let messages = match fetcher.fetch(account, &options, cancel).await {
        Ok(messages) => messages,
        Err(e) => {
            warn!(account_id = account.id, error = %e, "from-server waiter tick failed, skipping");
            return Vec::new();
        }
    };

    messages
        .into_iter()
        .filter(|m| m.received_date >= start_time)
        .filter(|m| addressed_to_account(m, account))
        .filter(|m| !seen.contains(m.dedup_key().as_ref()))
        .collect()
}

fn addressed_to_account(message: &Message, account: &Account) -> bool {
    message
        .to
        .iter()
        .chain(message.cc.iter())
        .chain(message.bcc.iter())
        .any(|addr| resolver::addressed_to(&addr.render(), account))
}

fn try_match(message: &Message, extractors: &[ExtractorRow]) -> Result<Option<Vec<String>>> {
    if extractors.is_empty() {
        return Ok(Some(Vec::new()));
    }
    match extractor::evaluate(message, extractors)? {
        Some(result) => Ok(Some(result.matches)),
        None => Ok(None),
    }
}

/// Runs one waiter to completion: polls every `interval` until a matching
/// message is found, `timeout` elapses, or `cancel` fires.
///
/// # Errors
///
/// Returns [`WaiterError::Cancelled`] if `cancel` fires before a match or
/// timeout. Never returns [`WaiterError::Timeout`] as an `Err` — timeout is
/// a normal [`WaitOutcome::Timeout`] return, matching the contract's
/// `{found: false, status: "timeout"}` reply shape.
#[instrument(name = "waiter::wait", skip(store, account, extractors, cancel), fields(account_id = account.id))]
pub async fn wait(
    store: Arc<dyn MessageStore>,
    account: &Account,
    start_time: DateTime<Utc>,
    interval: Duration,
    timeout: Duration,
    extractors: &[ExtractorRow],
    cancel: &CancellationToken,
) -> Result<WaitOutcome> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        if cancel.is_cancelled() {
            return Err(WaiterError::Cancelled.into());
        }

        for message in candidates(store.as_ref(), account, start_time, &seen).await {
            seen.insert(message.dedup_key().into_owned());

            match try_match(&message, extractors)? {
                Some(matches) => {
                    debug!(account_id = account.id, "waiter delivered a match");
                    return Ok(WaitOutcome::Found(WaitHit {
                        message,
                        matches: (!extractors.is_empty()).then_some(matches),
                    }));
                }
                None => continue,
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok(WaitOutcome::Timeout);
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let sleep = interval.min(remaining);

        tokio::select! {
            () = cancel.cancelled() => return Err(WaiterError::Cancelled.into()),
            () = tokio::time::sleep(sleep) => {}
        }
    }
}

/// The WebSocket variant of [`wait`]: reads `folder` from the upstream server
/// on every tick via `fetcher` instead of the store, bypassing the store's
/// commit latency entirely. Same predicate, extractor evaluation, and
/// `dedup_key`-based dedup as the store-backed path; same deadline and
/// cancellation contract.
///
/// # Errors
///
/// Returns [`WaiterError::Cancelled`] if `cancel` fires before a match or
/// timeout. Never returns [`WaiterError::Timeout`] as an `Err`, matching
/// [`wait`]'s contract.
#[instrument(name = "waiter::wait_from_server", skip(fetcher, account, extractors, cancel), fields(account_id = account.id))]
pub async fn wait_from_server(
    fetcher: Arc<Fetcher>,
    account: &Account,
    folder: &str,
    start_time: DateTime<Utc>,
    timeout: Duration,
    extractors: &[ExtractorRow],
    cancel: &CancellationToken,
) -> Result<WaitOutcome> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        if cancel.is_cancelled() {
            return Err(WaiterError::Cancelled.into());
        }

        for message in
            candidates_from_server(fetcher.as_ref(), account, folder, start_time, &seen, cancel).await
        {
            seen.insert(message.dedup_key().into_owned());

            match try_match(&message, extractors)? {
                Some(matches) => {
                    debug!(account_id = account.id, "from-server waiter delivered a match");
                    return Ok(WaitOutcome::Found(WaitHit {
                        message,
                        matches: (!extractors.is_empty()).then_some(matches),
                    }));
                }
                None => continue,
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok(WaitOutcome::Timeout);
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let sleep = WEBSOCKET_INTERVAL.min(remaining);

        tokio::select! {
            () = cancel.cancelled() => return Err(WaiterError::Cancelled.into()),
            () = tokio::time::sleep(sleep) => {}
        }
    }
}

/// Stateless single-tick variant: the caller retains `processed_ids` across
/// calls instead of the registry holding waiter state. Returns the
/// cumulative processed-id set the caller should pass back next call.
///
/// # Errors
///
/// Propagates extractor evaluation errors from [`crate::extractor::evaluate`].
#[instrument(name = "waiter::poll", skip(store, account, processed_ids, extractors), fields(account_id = account.id))]
pub async fn poll(
    store: Arc<dyn MessageStore>,
    account: &Account,
    start_time: DateTime<Utc>,
    processed_ids: &[String],
    extractors: &[ExtractorRow],
) -> Result<(Option<WaitHit>, Vec<String>)> {
    let mut seen: HashSet<String> = processed_ids.iter().cloned().collect();
    let mut cumulative: Vec<String> = processed_ids.to_vec();

    for message in candidates(store.as_ref(), account, start_time, &seen).await {
        let key = message.dedup_key().into_owned();
        seen.insert(key.clone());
        cumulative.push(key);

        if let Some(matches) = try_match(&message, extractors)? {
            return Ok((
                Some(WaitHit {
                    message,
                    matches: (!extractors.is_empty()).then_some(matches),
                }),
                cumulative,
            ));
        }
    }

    Ok((None, cumulative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Address;
    use crate::store::InMemoryStore;
    use chrono::Duration as ChronoDuration;

    fn account() -> Account {
        Account::builder()
            .id(1)
            .address("me@example.com")
            .password("x")
            .build()
            .unwrap()
    }

    fn message(minutes_ago: i64, message_id: &str, subject: &str) -> Message {
        Message {
            id: 0,
            account_id: 1,
            folder: "INBOX".into(),
            message_id: message_id.into(),
            envelope_date: None,
            received_date: Utc::now() - ChronoDuration::minutes(minutes_ago),
            from: vec![Address::bare("sender@example.com")],
            to: vec![Address::bare("me@example.com")],
            cc: vec![],
            bcc: vec![],
            subject: subject.into(),
            flags: vec![],
            plain_body: None,
            html_body: None,
            size: 0,
            attachments: vec![],
        }
    }

    #[test]
    fn parse_start_time_accepts_rfc3339() {
        let parsed = parse_start_time("2024-01-01T00:00:00Z");
        assert_eq!(parsed.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn parse_start_time_accepts_epoch_millis() {
        let parsed = parse_start_time("1704067200000");
        assert_eq!(parsed.timestamp(), 1_704_067_200);
    }

    #[test]
    fn parse_start_time_falls_back_to_now_on_garbage() {
        let before = Utc::now();
        let parsed = parse_start_time("not-a-date");
        assert!(parsed >= before);
    }

    #[tokio::test]
    async fn wait_delivers_first_eligible_message_with_no_extractors() {
        let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
        let acct = account();
        store
            .put_batch(vec![message(1, "abc@example.com", "hi")])
            .await
            .unwrap();

        let start = Utc::now() - ChronoDuration::minutes(10);
        let cancel = CancellationToken::new();
        let outcome = wait(
            Arc::clone(&store),
            &acct,
            start,
            Duration::from_millis(10),
            Duration::from_secs(2),
            &[],
            &cancel,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, WaitOutcome::Found(_)));
    }

    #[tokio::test]
    async fn wait_times_out_when_nothing_matches() {
        let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
        let acct = account();
        let start = Utc::now() - ChronoDuration::minutes(10);
        let cancel = CancellationToken::new();

        let outcome = wait(
            store,
            &acct,
            start,
            Duration::from_millis(10),
            Duration::from_millis(50),
            &[],
            &cancel,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, WaitOutcome::Timeout));
    }

    #[tokio::test]
    async fn wait_never_delivers_messages_before_start_time() {
        let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
        let acct = account();
        store
            .put_batch(vec![message(120, "old@example.com", "old")])
            .await
            .unwrap();

        let start = Utc::now() - ChronoDuration::minutes(5);
        let cancel = CancellationToken::new();
        let outcome = wait(
            store,
            &acct,
            start,
            Duration::from_millis(10),
            Duration::from_millis(50),
            &[],
            &cancel,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, WaitOutcome::Timeout));
    }

    #[tokio::test]
    async fn poll_is_stateless_across_calls_via_processed_ids() {
        let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
        let acct = account();
        store
            .put_batch(vec![message(1, "abc@example.com", "hi")])
            .await
            .unwrap();

        let start = Utc::now() - ChronoDuration::minutes(10);
        let (hit, processed) = poll(Arc::clone(&store), &acct, start, &[], &[]).await.unwrap();
        assert!(hit.is_some());
        assert_eq!(processed.len(), 1);

        let (hit2, processed2) = poll(store, &acct, start, &processed, &[]).await.unwrap();
        assert!(hit2.is_none());
        assert_eq!(processed2.len(), 1);
    }

    #[tokio::test]
    async fn seed_scenario_regex_extractor_wait() {
        let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
        let acct = account();
        store
            .put_batch(vec![message(0, "x@example.com", "Invoice #4242")])
            .await
            .unwrap();

        let rows = vec![ExtractorRow {
            field: crate::extractor::Field::Subject,
            is_match: None,
            extract: crate::extractor::ExtractorKind::Regex {
                pattern: r"Invoice #(\d+)".into(),
            },
        }];

        let start = Utc::now() - ChronoDuration::minutes(1);
        let cancel = CancellationToken::new();
        let outcome = wait(
            store,
            &acct,
            start,
            Duration::from_millis(10),
            Duration::from_secs(2),
            &rows,
            &cancel,
        )
        .await
        .unwrap();

        match outcome {
            WaitOutcome::Found(hit) => assert_eq!(hit.matches, Some(vec!["4242".to_string()])),
            WaitOutcome::Timeout => panic!("expected a match"),
        }
    }
}
