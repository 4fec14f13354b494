//! Integration tests for mailcore.
//!
//! Most tests here exercise cross-module wiring (store + ledger + bus +
//! trigger engine + waiter) entirely in-process against [`InMemoryStore`],
//! so they run in CI with no network access. A handful of tests require a
//! real IMAP server and are `#[ignore]`d by default:
//!
//! ```bash
//! export MAILCORE_TEST_EMAIL="your@email.com"
//! export MAILCORE_TEST_PASSWORD="your-app-password"
//!
//! # Optional: proxy configuration
//! export MAILCORE_TEST_PROXY_HOST="proxy.example.com"
//! export MAILCORE_TEST_PROXY_PORT="1080"
//!
//! cargo test --features integration-tests -- --ignored
//! ```

use chrono::{Duration as ChronoDuration, Utc};
use mailcore::account::Account;
use mailcore::bus::EventBus;
use mailcore::extractor::{self, ExtractorKind, ExtractorRow, Field};
use mailcore::fetcher::{FetchOptions, Fetcher};
use mailcore::ledger::{SyncLedger, SyncMode};
use mailcore::message::{Address, Message};
use mailcore::scheduler::{Scheduler, Subscription};
use mailcore::store::{InMemoryStore, MessageStore, SearchOptions};
use mailcore::trigger::{FiringStatus, Leaf, Trigger, TriggerAction, TriggerCondition, TriggerEngine};
use mailcore::waiter::{self, WaitOutcome};
use mailcore::Socks5Proxy;
use dashmap::DashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// Test Fixtures
// ─────────────────────────────────────────────────────────────────────────────

fn get_test_credentials() -> Option<(String, String)> {
    dotenvy::dotenv().ok();
    let email = env::var("MAILCORE_TEST_EMAIL").ok()?;
    let password = env::var("MAILCORE_TEST_PASSWORD").ok()?;
    Some((email, password))
}

fn get_test_proxy() -> Option<Socks5Proxy> {
    let host = env::var("MAILCORE_TEST_PROXY_HOST").ok()?;
    let port: u16 = env::var("MAILCORE_TEST_PROXY_PORT").ok()?.parse().ok()?;

    let proxy = match (
        env::var("MAILCORE_TEST_PROXY_USER").ok(),
        env::var("MAILCORE_TEST_PROXY_PASS").ok(),
    ) {
        (Some(user), Some(pass)) => Socks5Proxy::with_auth(&host, port, user, pass),
        _ => Socks5Proxy::new(host, port),
    };

    Some(proxy)
}

fn get_test_account() -> Option<Account> {
    let (email, password) = get_test_credentials()?;

    let mut builder = Account::builder().id(1).address(&email).password(password);
    if let Some(proxy) = get_test_proxy() {
        builder = builder.proxy(proxy);
    }

    builder.build().ok()
}

fn message(account_id: u64, minutes_ago: i64, message_id: &str, subject: &str, body: &str) -> Message {
    Message {
        id: 0,
        account_id,
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
        plain_body: Some(body.into()),
        html_body: None,
        size: body.len() as u32,
        attachments: vec![],
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Real IMAP Server Tests (require credentials)
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_fetch_and_verify_against_real_server() {
    let mut account = get_test_account().expect("test account from environment variables");
    let fetcher = Fetcher::new();

    fetcher.verify(&mut account).await.expect("account should verify");
    assert!(account.verified_at.is_some());

    let messages = fetcher
        .fetch(&account, &FetchOptions::default(), &CancellationToken::new())
        .await
        .expect("fetch should succeed");

    println!("fetched {} messages", messages.len());
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_waiter_against_real_server() {
    let account = get_test_account().expect("test account from environment variables");
    let fetcher = Fetcher::new();
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());

    let batch = fetcher
        .fetch(&account, &FetchOptions::default(), &CancellationToken::new())
        .await
        .expect("fetch should succeed");
    store.put_batch(batch).await.expect("store should accept batch");

    let start = Utc::now() - ChronoDuration::hours(24);
    let cancel = CancellationToken::new();
    let outcome = waiter::wait(
        store,
        &account,
        start,
        Duration::from_secs(1),
        Duration::from_secs(5),
        &[],
        &cancel,
    )
    .await
    .expect("wait should not error");

    match outcome {
        WaitOutcome::Found(hit) => println!("found message: {}", hit.message.subject),
        WaitOutcome::Timeout => println!("no message found in the last 24h (expected if inbox is quiet)"),
    }
}

#[tokio::test]
#[ignore = "requires intentionally wrong credentials"]
async fn test_invalid_credentials_reject_cleanly() {
    let account = Account::builder()
        .id(1)
        .address("test@gmail.com")
        .password("wrong-password")
        .build()
        .expect("valid account structure");

    let fetcher = Fetcher::new();
    let result = fetcher
        .fetch(&account, &FetchOptions::default(), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    let err = result.unwrap_err();
    println!("connection error: {err}");
    println!("category: {}", err.category());
}

// ─────────────────────────────────────────────────────────────────────────────
// Account Builder Validation (no network required)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_email_format_is_rejected() {
    let result = Account::builder()
        .id(1)
        .address("not-an-email")
        .password("password")
        .build();
    assert!(result.is_err());
}

#[test]
fn test_missing_required_fields_are_rejected() {
    let result = Account::builder().id(1).password("password").build();
    assert!(result.is_err());

    let result = Account::builder().id(1).address("test@example.com").build();
    assert!(result.is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Store + Ledger + Scheduler Wiring (in-process, no network)
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ledger_window_advances_as_store_commits() {
    let store = InMemoryStore::new();
    let ledger = SyncLedger::new();
    let default_start = Utc::now() - ChronoDuration::days(30);

    let first_end = Utc::now();
    let window = ledger.next(1, "INBOX", SyncMode::Incremental, default_start, first_end);
    let batch = vec![message(1, 10, "a@example.com", "first", "hi")];
    let inserted = store.put_batch(batch).await.unwrap();
    ledger.commit(1, "INBOX", window, inserted.len() as u64);

    let entry = ledger.entry(1, "INBOX").unwrap();
    assert_eq!(entry.emails_processed, 1);
    assert_eq!(entry.last_sync_end, first_end);

    let second_end = Utc::now();
    let window2 = ledger.next(1, "INBOX", SyncMode::Incremental, default_start, second_end);
    assert_eq!(window2.start, first_end);
}

#[tokio::test]
async fn test_scheduler_subscribe_unsubscribe_lifecycle() {
    let accounts = Arc::new(DashMap::new());
    accounts.insert(
        1,
        Account::builder()
            .id(1)
            .address("user@example.com")
            .password("x")
            .build()
            .unwrap(),
    );

    let bus = Arc::new(EventBus::new());
    let scheduler = Scheduler::new(
        Arc::new(Fetcher::new()),
        Arc::new(InMemoryStore::new()),
        Arc::new(SyncLedger::new()),
        Arc::clone(&bus),
        accounts,
    );

    let sub = Subscription::new(1, 1, "INBOX", Duration::from_secs(30));
    scheduler.subscribe(sub);
    assert!(bus.is_subscribed(1));
    assert_eq!(scheduler.all().len(), 1);

    scheduler.unsubscribe(1).await;
    assert!(!bus.is_subscribed(1));
    assert_eq!(scheduler.all().len(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Trigger Engine + Store Wiring (in-process, no network)
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_trigger_fires_on_seeded_alert_message() {
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
    store
        .put_batch(vec![message(1, 0, "a@example.com", "ALERT: disk full", "body")])
        .await
        .unwrap();

    let engine = TriggerEngine::new(Arc::clone(&store));
    engine
        .enable(Trigger {
            id: 1,
            name: "disk-alert".into(),
            enabled: true,
            check_interval: Duration::from_millis(20),
            account_id: 1,
            filters: mailcore::trigger::TriggerFilters::default(),
            condition: TriggerCondition::Leaf(Leaf::SubjectContains {
                value: "alert".into(),
            }),
            actions: vec![TriggerAction::Log],
            enable_logging: true,
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.disable(1).await;

    let stats = engine.stats(1);
    assert!(stats.total > 0);
    assert_eq!(stats.success, stats.total);

    let log = engine.log().await;
    assert!(!log.is_empty());
    assert_eq!(log[0].status, FiringStatus::Success);
}

#[tokio::test]
async fn test_trigger_filters_narrow_candidates_before_condition() {
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
    let mut archived = message(1, 0, "a@example.com", "ALERT: disk full", "body");
    archived.folder = "Archive".into();
    store
        .put_batch(vec![
            message(1, 0, "b@example.com", "ALERT: disk full", "body"),
            archived,
        ])
        .await
        .unwrap();

    let engine = TriggerEngine::new(Arc::clone(&store));
    engine
        .enable(Trigger {
            id: 1,
            name: "disk-alert-inbox-only".into(),
            enabled: true,
            check_interval: Duration::from_millis(20),
            account_id: 1,
            filters: mailcore::trigger::TriggerFilters {
                folders: vec!["INBOX".into()],
                ..Default::default()
            },
            condition: TriggerCondition::Leaf(Leaf::SubjectContains {
                value: "alert".into(),
            }),
            actions: vec![TriggerAction::Log],
            enable_logging: false,
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.disable(1).await;

    let stats = engine.stats(1);
    assert_eq!(stats.total, 1, "only the INBOX message should have fired");
    assert!(
        engine.log().await.is_empty(),
        "enable_logging: false must suppress the execution log"
    );
}

#[tokio::test]
async fn test_trigger_rejects_invalid_condition_at_enable_time() {
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
    let engine = TriggerEngine::new(store);

    let result = engine.enable(Trigger {
        id: 1,
        name: "broken".into(),
        enabled: true,
        check_interval: Duration::from_secs(30),
        account_id: 1,
        filters: mailcore::trigger::TriggerFilters::default(),
        condition: TriggerCondition::And { terms: vec![] },
        actions: vec![TriggerAction::Log],
        enable_logging: true,
    });

    assert!(result.is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Waiter + Extractor Wiring (in-process, no network)
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_waiter_delivers_otp_via_regex_extractor() {
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
    let account = Account::builder()
        .id(1)
        .address("me@example.com")
        .password("x")
        .build()
        .unwrap();

    store
        .put_batch(vec![message(
            1,
            0,
            "otp@example.com",
            "Your code",
            "Your verification code is 482913. Do not share it.",
        )])
        .await
        .unwrap();

    let rows = vec![ExtractorRow {
        field: Field::Body,
        is_match: None,
        extract: ExtractorKind::Regex {
            pattern: r"\b(\d{6})\b".into(),
        },
    }];

    let start = Utc::now() - ChronoDuration::minutes(5);
    let cancel = CancellationToken::new();
    let outcome = waiter::wait(
        store,
        &account,
        start,
        Duration::from_millis(10),
        Duration::from_secs(2),
        &rows,
        &cancel,
    )
    .await
    .unwrap();

    match outcome {
        WaitOutcome::Found(hit) => assert_eq!(hit.matches, Some(vec!["482913".to_string()])),
        WaitOutcome::Timeout => panic!("expected the seeded OTP message to match"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extractor Backends (no network)
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_extractor_script_backend_extracts_json_field() {
    let msg = message(1, 0, "a@example.com", "payload", r#"{"code":"9911"}"#);
    let rows = vec![ExtractorRow {
        field: Field::Body,
        is_match: None,
        extract: ExtractorKind::Script {
            source: r#"
                let needle = "\"code\":\"";
                let start = value.index_of(needle);
                if start < 0 { () }
                else {
                    let rest = value.sub_string(start + needle.len);
                    let end = rest.index_of("\"");
                    if end < 0 { () } else { rest.sub_string(0, end) }
                }
            "#
            .into(),
        },
    }];

    let result = extractor::evaluate(&msg, &rows).unwrap().unwrap();
    assert_eq!(result.matches, vec!["9911".to_string()]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Store Search (no network)
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_store_search_filters_by_since_and_subject() {
    let store = InMemoryStore::new();
    store
        .put_batch(vec![
            message(1, 5, "recent@example.com", "Invoice ready", "body"),
            message(1, 120, "old@example.com", "Invoice stale", "body"),
        ])
        .await
        .unwrap();

    let (results, total) = store
        .search(&SearchOptions {
            account_id: 1,
            since: Some(Utc::now() - ChronoDuration::minutes(30)),
            subject_contains: Some("invoice".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(total, 1);
    assert_eq!(results[0].message_id, "recent@example.com");
}
