//! Example: proper error handling with retries.
//!
//! This example demonstrates how to handle errors properly, including
//! implementing retry logic based on [`CoreError::is_retryable`].
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example error_handling
//! ```

use mailcore::account::Account;
use mailcore::extractor::{self, ExtractorKind, ExtractorRow, Field};
use mailcore::fetcher::{FetchOptions, Fetcher};
use mailcore::{CoreError, ErrorCategory};
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Fetches with automatic retry for transient failures.
async fn fetch_with_retry(
    fetcher: &Fetcher,
    account: &Account,
) -> Result<Vec<mailcore::Message>, CoreError> {
    let mut last_error = None;
    let mut backoff = INITIAL_BACKOFF;
    let cancel = CancellationToken::new();

    for attempt in 1..=MAX_RETRIES {
        println!("Fetch attempt {attempt}/{MAX_RETRIES}...");

        match fetcher.fetch(account, &FetchOptions::default(), &cancel).await {
            Ok(messages) => {
                println!("Fetched successfully!");
                return Ok(messages);
            }
            Err(e) => {
                println!("  Error: {e}");
                println!("  Category: {}", e.category());
                println!("  Retryable: {}", e.is_retryable());

                if e.is_retryable() && attempt < MAX_RETRIES {
                    println!("  Retrying in {backoff:?}...");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    last_error = Some(e);
                } else {
                    return Err(e);
                }
            }
        }
    }

    Err(last_error.unwrap())
}

/// Searches fetched messages for an OTP code, classifying errors.
fn search_with_error_handling(messages: &[mailcore::Message]) -> Result<Option<String>, CoreError> {
    let rows = vec![ExtractorRow {
        field: Field::Body,
        is_match: None,
        extract: ExtractorKind::Regex {
            pattern: r"\b(\d{6})\b".into(),
        },
    }];

    for message in messages {
        match extractor::evaluate(message, &rows) {
            Ok(Some(result)) => return Ok(result.matches.into_iter().next()),
            Ok(None) => continue,
            Err(e) => match e.category() {
                ErrorCategory::Extractor => {
                    println!("Extractor error (isolated per row already, unexpected here): {e}");
                    continue;
                }
                _ => return Err(e),
            },
        }
    }

    println!("No matching email found (this is normal)");
    Ok(None)
}

#[tokio::main]
async fn main() {
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    println!("mailcore - Error Handling Example\n");
    println!("====================================\n");

    let account = match Account::builder().id(1).address(&email).password(password).build() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("This error is NOT retryable - fix your configuration");
            std::process::exit(1);
        }
    };

    let fetcher = Fetcher::new();

    let messages = match fetch_with_retry(&fetcher, &account).await {
        Ok(m) => m,
        Err(e) => {
            eprintln!("\nFailed to fetch after {MAX_RETRIES} attempts");
            eprintln!("Final error: {e}");
            std::process::exit(1);
        }
    };

    println!("\nSearching for OTP codes...");
    match search_with_error_handling(&messages) {
        Ok(Some(code)) => println!("Found OTP: {code}"),
        Ok(None) => println!("No OTP found in recent emails"),
        Err(e) => eprintln!("Search failed: {e}"),
    }

    println!("Done!");
}
