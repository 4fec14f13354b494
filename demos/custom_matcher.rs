//! Example: using custom extractors for complex extraction.
//!
//! This example demonstrates the three extractor backends:
//! - `Regex` for pattern-based extraction
//! - `Script` for arbitrary sandboxed logic
//! - `Template` for formatting a matched value
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example custom_matcher
//! ```

use mailcore::account::Account;
use mailcore::extractor::{self, ExtractorKind, ExtractorRow, Field};
use mailcore::fetcher::{FetchOptions, Fetcher};
use std::env;
use tokio_util::sync::CancellationToken;

/// Extracts order IDs in the format "ORD-XXXXX".
fn order_id_row() -> ExtractorRow {
    ExtractorRow {
        field: Field::Body,
        is_match: None,
        extract: ExtractorKind::Regex {
            pattern: r"(ORD-\d{5,})".into(),
        },
    }
}

/// Extracts the first monetary amount found in the body.
fn amount_row() -> ExtractorRow {
    ExtractorRow {
        field: Field::Body,
        is_match: None,
        extract: ExtractorKind::Regex {
            pattern: r"\$(\d+(?:\.\d{2})?)".into(),
        },
    }
}

/// A sandboxed-script row that extracts a JSON-ish `"code": "..."` field.
/// Rhai has no regex builtin, so the lookup is done with plain string ops.
fn json_field_row(field_name: &str) -> ExtractorRow {
    ExtractorRow {
        field: Field::Body,
        is_match: None,
        extract: ExtractorKind::Script {
            source: format!(
                r#"
                let needle = "\"{field_name}\":\"";
                let start = value.index_of(needle);
                if start < 0 {{ () }}
                else {{
                    let rest = value.sub_string(start + needle.len);
                    let end = rest.index_of("\"");
                    if end < 0 {{ () }} else {{ rest.sub_string(0, end) }}
                }}
                "#
            ),
        },
    }
}

/// Extracts activation/verification links via template-assisted regex.
fn activation_link_row() -> ExtractorRow {
    ExtractorRow {
        field: Field::Body,
        is_match: None,
        extract: ExtractorKind::Regex {
            pattern: r"(https?://\S*(?:activate|verify|confirm)\S*)".into(),
        },
    }
}

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
        start_date: Some((chrono::Utc::now() - chrono::Duration::days(7)).date_naive()),
        ..FetchOptions::default()
    };
    let messages = fetcher.fetch(&account, &options, &CancellationToken::new()).await?;

    println!("Fetched {} messages from the last 7 days.\n", messages.len());

    let probes: &[(&str, ExtractorRow)] = &[
        ("order IDs (ORD-XXXXX)", order_id_row()),
        ("dollar amounts", amount_row()),
        ("JSON 'code' field", json_field_row("code")),
        ("activation/verification links", activation_link_row()),
    ];

    for (label, row) in probes {
        println!("Looking for {label}...");
        let mut found = false;
        for message in &messages {
            if let Some(result) = extractor::evaluate(message, std::slice::from_ref(row))? {
                println!("   Found: {:?}", result.matches);
                found = true;
                break;
            }
        }
        if !found {
            println!("   Not found");
        }
    }

    println!("\nDone!");
    Ok(())
}
