//! Example: wiring the scheduler, event bus, and trigger engine together.
//!
//! Simulates a small dashboard backend: one subscription polling an inbox,
//! one trigger logging "alert" subjects, and a task draining the bus to
//! print new-mail notifications as they arrive.
//!
//! # Usage
//!
//! ```bash
//! export EMAIL_ADDRESS="your@email.com"
//! export EMAIL_PASSWORD="your-app-password"
//! cargo run --example dashboard
//! ```

use dashmap::DashMap;
use mailcore::account::Account;
use mailcore::bus::EventBus;
use mailcore::fetcher::Fetcher;
use mailcore::ledger::SyncLedger;
use mailcore::scheduler::{Scheduler, Subscription};
use mailcore::store::InMemoryStore;
use mailcore::trigger::{Leaf, Trigger, TriggerAction, TriggerCondition, TriggerEngine};
use std::env;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> mailcore::Result<()> {
    let email = env::var("EMAIL_ADDRESS").expect("EMAIL_ADDRESS environment variable required");
    let password =
        env::var("EMAIL_PASSWORD").expect("EMAIL_PASSWORD environment variable required");

    let account = Account::builder()
        .id(1)
        .address(&email)
        .password(password)
        .build()?;

    let accounts = Arc::new(DashMap::new());
    accounts.insert(account.id, account);

    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(EventBus::new());

    let scheduler = Scheduler::new(
        Arc::new(Fetcher::new()),
        store.clone(),
        Arc::new(SyncLedger::new()),
        Arc::clone(&bus),
        accounts,
    );

    let subscription_id = 1;
    let mut subscriber = bus.subscribe(subscription_id, 100);
    scheduler.subscribe(Subscription::new(subscription_id, 1, "INBOX", Duration::from_secs(60)));

    let triggers = TriggerEngine::new(store.clone());
    triggers.enable(Trigger {
        id: 1,
        name: "alert-subject".into(),
        enabled: true,
        check_interval: Duration::from_secs(30),
        account_id: 1,
        filters: mailcore::trigger::TriggerFilters::default(),
        condition: TriggerCondition::Leaf(Leaf::SubjectContains {
            value: "alert".into(),
        }),
        actions: vec![TriggerAction::Log],
        enable_logging: true,
    })?;

    println!("Scheduler and trigger running. Listening for events for 2 minutes...");

    let listen = tokio::spawn(async move {
        while let Some(event) = subscriber.recv().await {
            println!("event: {event:?}");
        }
    });

    tokio::time::sleep(Duration::from_secs(120)).await;

    listen.abort();
    scheduler.unsubscribe(subscription_id).await;
    triggers.disable(1).await;

    let log = triggers.log().await;
    println!("\nTrigger execution log ({} entries):", log.len());
    for entry in &log {
        println!("  {entry:?}");
    }

    Ok(())
}
