//! Example: connect through a SOCKS5 proxy.
//!
//! This example shows how to route IMAP connections through a SOCKS5 proxy,
//! which is useful for:
//! - Bypassing network restrictions
//! - Testing from different geographic locations
//! - Privacy/anonymity requirements
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! export PROXY_HOST="proxy.example.com"
//! export PROXY_PORT="1080"
//! # Optional: for authenticated proxies
//! export PROXY_USER="username"
//! export PROXY_PASS="password"
//!
//! cargo run --example with_proxy
//! ```

use mailcore::account::Account;
use mailcore::extractor::{ExtractorKind, ExtractorRow, Field};
use mailcore::fetcher::{FetchOptions, FetchTimeouts, Fetcher};
use mailcore::{extractor, Socks5Proxy};
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> mailcore::Result<()> {
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    let proxy_host = env::var("PROXY_HOST").expect("PROXY_HOST environment variable required");
    let proxy_port: u16 = env::var("PROXY_PORT")
        .expect("PROXY_PORT environment variable required")
        .parse()
        .expect("PROXY_PORT must be a valid port number");

    let proxy = match (env::var("PROXY_USER").ok(), env::var("PROXY_PASS").ok()) {
        (Some(user), Some(pass)) => {
            println!("Using authenticated SOCKS5 proxy at {proxy_host}:{proxy_port}");
            Socks5Proxy::with_auth(&proxy_host, proxy_port, user, pass)
        }
        _ => {
            println!("Using SOCKS5 proxy at {proxy_host}:{proxy_port}");
            Socks5Proxy::new(&proxy_host, proxy_port)
        }
    };

    println!("Connecting to IMAP server for {email} via proxy...");

    let account = Account::builder()
        .id(1)
        .address(&email)
        .password(password)
        .proxy(proxy)
        .build()?;

    let fetcher = Fetcher::with_timeouts(FetchTimeouts {
        connect: Duration::from_secs(60),
        auth: Duration::from_secs(60),
        ..FetchTimeouts::default()
    });

    let options = FetchOptions {
        start_date: Some((chrono::Utc::now() - chrono::Duration::hours(1)).date_naive()),
        ..FetchOptions::default()
    };
    let messages = fetcher.fetch(&account, &options, &CancellationToken::new()).await?;

    println!("Connected via proxy! Fetched {} messages.", messages.len());

    println!("\nSearching for OTP codes in recent emails...");
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
            println!("Found OTP: {:?}", result.matches);
            found = true;
            break;
        }
    }
    if !found {
        println!("No OTP found");
    }

    println!("\nDisconnected from proxy.");
    Ok(())
}
