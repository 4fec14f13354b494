//! # mailcore
//!
//! Multi-account mail ingestion and dispatch core: periodic IMAP fetch,
//! incremental sync, deduplicated storage, pattern/script/template
//! extraction, one-shot waiters, and condition-triggered actions.
//!
//! This crate is the engine a mail-automation service embeds; it owns no
//! HTTP surface itself. A host process wires [`Account`]s in, subscribes a
//! [`Scheduler`] to poll them, and reads results back off an [`EventBus`] or
//! a [`MessageStore`] query.
//!
//! ## Components
//!
//! - [`account`] — account/provider configuration (`ImapConfig`'s successor)
//! - [`fetcher`] — stateless, cancellable IMAP fetch (`ImapEmailClient`'s successor)
//! - [`ledger`] — per-(account, folder) incremental sync watermarks
//! - [`store`] — deduplicated, indexed message storage
//! - [`extractor`] — regex/script/template field extraction
//! - [`events`] / [`bus`] — the pub/sub fan-out for new-message notifications
//! - [`scheduler`] — one worker per subscription, driving the fetch loop
//! - [`waiter`] — short-lived predicate waits for a single matching email
//! - [`trigger`] — condition-gated background actions over the store
//!
//! ## Features
//!
//! - **`observability`**: Enables OpenTelemetry integration for distributed
//!   tracing. Without this feature, tracing spans are still emitted but
//!   require no OTEL dependencies.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailcore::account::Account;
//! use mailcore::fetcher::{FetchOptions, Fetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mailcore::Result<()> {
//! let account = Account::builder()
//!     .id(1)
//!     .address("user@gmail.com")
//!     .password("app-password")
//!     .build()?;
//!
//! let fetcher = Fetcher::new();
//! let cancel = CancellationToken::new();
//! let messages = fetcher.fetch(&account, &FetchOptions::default(), &cancel).await?;
//! println!("fetched {} messages", messages.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Scheduling Periodic Fetch
//!
//! ```no_run
//! use mailcore::account::Account;
//! use mailcore::bus::EventBus;
//! use mailcore::fetcher::Fetcher;
//! use mailcore::ledger::SyncLedger;
//! use mailcore::scheduler::{Scheduler, Subscription};
//! use mailcore::store::InMemoryStore;
//! use dashmap::DashMap;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> mailcore::Result<()> {
//! # let account = Account::builder().id(1).address("a@b.com").password("x").build()?;
//! let accounts = Arc::new(DashMap::new());
//! accounts.insert(account.id, account);
//!
//! let scheduler = Scheduler::new(
//!     Arc::new(Fetcher::new()),
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(SyncLedger::new()),
//!     Arc::new(EventBus::new()),
//!     accounts,
//! );
//!
//! let subscription = Subscription::new(1, 1, "INBOX", Duration::from_secs(60));
//! scheduler.subscribe(subscription);
//! # Ok(())
//! # }
//! ```
//!
//! ## Waiting for a Single Match
//!
//! ```no_run
//! use mailcore::account::Account;
//! use mailcore::extractor::{ExtractorKind, ExtractorRow, Field};
//! use mailcore::store::InMemoryStore;
//! use mailcore::waiter::{self, WaitOutcome};
//! use chrono::Utc;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mailcore::Result<()> {
//! # let account = Account::builder().id(1).address("a@b.com").password("x").build()?;
//! let store = Arc::new(InMemoryStore::new());
//! let rows = vec![ExtractorRow {
//!     field: Field::Subject,
//!     is_match: None,
//!     extract: ExtractorKind::Regex { pattern: r"\d{6}".into() },
//! }];
//!
//! match waiter::wait(
//!     store,
//!     &account,
//!     Utc::now(),
//!     Duration::from_secs(5),
//!     Duration::from_secs(60),
//!     &rows,
//!     &CancellationToken::new(),
//! ).await? {
//!     WaitOutcome::Found(hit) => println!("matched: {:?}", hit.matches),
//!     WaitOutcome::Timeout => println!("nothing matched in time"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Using a SOCKS5 Proxy
//!
//! ```no_run
//! use mailcore::account::Account;
//! use mailcore::proxy::Socks5Proxy;
//!
//! # fn example() -> mailcore::Result<()> {
//! let account = Account::builder()
//!     .id(1)
//!     .address("user@gmail.com")
//!     .password("app-password")
//!     .proxy(Socks5Proxy::with_auth("proxy.example.com", 1080, "user", "pass"))
//!     .build()?;
//! # let _ = account;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every error implements `std::error::Error` and provides context. Use
//! [`CoreError::is_retryable`] to decide whether an operation can be retried
//! on the scheduler's next tick; the core itself never retries internally:
//!
//! ```
//! use mailcore::CoreError;
//!
//! fn handle_error(error: &CoreError) {
//!     if error.is_retryable() {
//!         println!("transient error, category={}: {error}", error.category());
//!     } else {
//!         println!("permanent error, category={}: {error}", error.category());
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. Every major operation emits
//! a span with structured fields suitable for distributed tracing.
//!
//! ### Span Naming Convention
//!
//! - `Scheduler::subscribe` / `Scheduler::unsubscribe` / `Scheduler::fetch_now`
//! - `TriggerEngine::enable` / `TriggerEngine::disable`
//! - `waiter::wait` / `waiter::poll` / `waiter::wait_from_server`
//! - `session::authenticate` - IMAP authentication
//! - `connection::establish_tls` - TLS connection
//!
//! ### Standard Fields
//!
//! - `account_id` - Owning account id
//! - `subscription_id` / `trigger_id` - Owning subscription/trigger id
//! - `imap_host` - IMAP server hostname
//! - `proxy_enabled` - Whether a proxy tunnel is used
//!
//! Enable the `observability` feature for OpenTelemetry integration.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod account;
pub mod bus;
pub mod error;
pub mod events;
pub mod extractor;
pub mod fetcher;
pub mod known_servers;
pub mod ledger;
pub mod message;
pub mod proxy;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod trigger;
pub mod waiter;

// Internal modules
mod connection;
mod parser;
mod session;

// Re-exports for ergonomic API
pub use account::Account;
pub use email_address::EmailAddress;
pub use error::{CoreError, ErrorCategory, Result};
pub use known_servers::ServerRegistry;
pub use message::Message;
pub use proxy::{ProxyAuth, Socks5Proxy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        let _ = Account::builder();
        let _ = Socks5Proxy::new("localhost", 1080);
        let _ = fetcher::Fetcher::new();
        let _ = store::InMemoryStore::new();
        let _ = ledger::SyncLedger::new();
        let _ = bus::EventBus::new();
    }
}
