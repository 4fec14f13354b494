//! Example: using tracing for observability.
//!
//! This example demonstrates how to enable structured logging using the
//! `tracing` ecosystem. Every major operation in this crate emits tracing
//! spans and events.
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! # Set log level (trace, debug, info, warn, error)
//! export RUST_LOG=mailcore=debug
//!
//! cargo run --example with_tracing
//! ```

use mailcore::account::Account;
use mailcore::extractor::{self, ExtractorKind, ExtractorRow, Field};
use mailcore::fetcher::{FetchOptions, Fetcher};
use std::env;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> mailcore::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mailcore=info")),
        )
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    tracing::info!(email = %email, "starting mailcore example");

    let account = Account::builder()
        .id(1)
        .address(&email)
        .password(password)
        .build()?;

    tracing::debug!("account built successfully");

    // Fetching emits spans for connection, TLS, authentication, and search.
    let fetcher = Fetcher::new();
    let messages = fetcher
        .fetch(&account, &FetchOptions::default(), &CancellationToken::new())
        .await?;

    tracing::info!(count = messages.len(), "fetch complete, searching for OTP codes");

    let rows = vec![ExtractorRow {
        field: Field::Body,
        is_match: None,
        extract: ExtractorKind::Regex {
            pattern: r"\b(\d{6})\b".into(),
        },
    }];

    let mut found = false;
    for message in &messages {
        if let Some(result) = extractor::evaluate(message, &rows)? {
            tracing::info!(otp = ?result.matches, "found OTP code");
            println!("\nFound OTP: {:?}", result.matches);
            found = true;
            break;
        }
    }
    if !found {
        tracing::warn!("no OTP code found");
        println!("\nNo OTP found");
    }

    tracing::info!("example completed successfully");

    Ok(())
}
