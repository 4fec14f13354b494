//! Example: find a matching email among recently fetched messages.
//!
//! Unlike `basic_otp`, this example shows a single fetch-then-search pass
//! with no polling.
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example find_recent
//! ```

use mailcore::account::Account;
use mailcore::extractor::{self, ExtractorKind, ExtractorRow, Field};
use mailcore::fetcher::{FetchOptions, Fetcher};
use std::env;
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
    let options = FetchOptions {
        start_date: Some((chrono::Utc::now() - chrono::Duration::hours(24)).date_naive()),
        ..FetchOptions::default()
    };
    let messages = fetcher.fetch(&account, &options, &CancellationToken::new()).await?;

    println!("Fetched {} messages from the last 24 hours.\n", messages.len());

    let probes: &[(&str, ExtractorRow)] = &[
        (
            "6-digit OTP codes",
            ExtractorRow {
                field: Field::Body,
                is_match: None,
                extract: ExtractorKind::Regex {
                    pattern: r"\b(\d{6})\b".into(),
                },
            },
        ),
        (
            "GitHub URLs",
            ExtractorRow {
                field: Field::Body,
                is_match: None,
                extract: ExtractorKind::Regex {
                    pattern: r"(https?://github\.com/\S+)".into(),
                },
            },
        ),
        (
            "verification tokens",
            ExtractorRow {
                field: Field::Body,
                is_match: None,
                extract: ExtractorKind::Regex {
                    pattern: r"token[=:]?\s*([a-zA-Z0-9]{16,})".into(),
                },
            },
        ),
    ];

    for (label, row) in probes {
        println!("Looking for {label}...");
        let mut found = false;
        for message in &messages {
            if let Some(result) = extractor::evaluate(message, std::slice::from_ref(row))? {
                println!("  Found: {:?}", result.matches);
                found = true;
                break;
            }
        }
        if !found {
            println!("  Not found");
        }
        println!();
    }

    Ok(())
}
