//! Basic example: wait for an OTP code from email.
//!
//! This example demonstrates the most common use case: fetching from an IMAP
//! account and waiting for a message containing a 6-digit OTP code.
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example basic_otp
//! ```
//!
//! For Gmail, you'll need to use an [App Password](https://support.google.com/accounts/answer/185833).

use chrono::Utc;
use mailcore::account::Account;
use mailcore::extractor::{ExtractorKind, ExtractorRow, Field};
use mailcore::fetcher::{FetchOptions, Fetcher};
use mailcore::store::{InMemoryStore, MessageStore};
use mailcore::waiter::{self, WaitOutcome};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> mailcore::Result<()> {
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    println!("Connecting to IMAP server for {email}...");

    let account = Account::builder()
        .id(1)
        .address(&email)
        .password(password)
        .build()?;

    let fetcher = Fetcher::new();
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryStore::new());
    let cancel = CancellationToken::new();

    println!("Fetching inbox to seed the store...");
    let messages = fetcher.fetch(&account, &FetchOptions::default(), &cancel).await?;
    store.put_batch(messages).await?;

    println!("Waiting for a 6-digit OTP code...");
    println!("(Send yourself an email with a 6-digit code, or press Ctrl+C to cancel)");

    let rows = vec![ExtractorRow {
        field: Field::Body,
        is_match: None,
        extract: ExtractorKind::Regex {
            pattern: r"\b(\d{6})\b".into(),
        },
    }];

    match waiter::wait(
        store,
        &account,
        Utc::now() - chrono::Duration::minutes(5),
        Duration::from_secs(5),
        Duration::from_secs(120),
        &rows,
        &cancel,
    )
    .await?
    {
        WaitOutcome::Found(hit) => println!("Got OTP code: {:?}", hit.matches),
        WaitOutcome::Timeout => println!("No OTP arrived in time."),
    }

    Ok(())
}
