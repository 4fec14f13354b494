//! Message Store (C4): a deduplicated, indexed store of parsed messages.
//!
//! Modeled as a trait so persistence mechanics stay swappable behind an
//! abstract transactional key-indexed store; [`InMemoryStore`] is the one
//! concrete implementation the crate ships, backed by `dashmap`.

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Computes the synthetic intra-fetch dedup fingerprint for a message with
/// no `Message-ID`, from `(subject, from, date, size)`. Not guaranteed
/// stable across fetches — only used to de-duplicate within one batch.
#[must_use]
pub fn fingerprint(message: &Message) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.subject.as_bytes());
    for addr in &message.from {
        hasher.update(addr.email.as_bytes());
    }
    if let Some(date) = message.envelope_date {
        hasher.update(date.timestamp().to_le_bytes());
    }
    hasher.update(message.size.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Sort order for [`SearchOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Newest first (server/search default).
    #[default]
    DateDesc,
    /// Oldest first.
    DateAsc,
}

/// Options for [`MessageStore::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// `0` means "all accounts".
    pub account_id: u64,
    /// Restrict to one folder, if set.
    pub folder: Option<String>,
    /// Inclusive lower bound on `received_date`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `received_date`.
    pub before: Option<DateTime<Utc>>,
    /// Case-insensitive substring match against `From`.
    pub from_contains: Option<String>,
    /// Case-insensitive substring match against `To`.
    pub to_contains: Option<String>,
    /// Case-insensitive substring match against `Cc`.
    pub cc_contains: Option<String>,
    /// Case-insensitive substring match against `Subject`.
    pub subject_contains: Option<String>,
    /// Case-insensitive substring match against either body.
    pub body_contains: Option<String>,
    /// Case-insensitive substring match against any text field.
    pub keyword: Option<String>,
    /// Sort order of the returned page.
    pub sort_by: SortBy,
    /// Maximum rows to return.
    pub limit: usize,
    /// Rows to skip before the page starts.
    pub offset: usize,
}

/// Aggregate counts exposed for dashboards.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCounts {
    /// Total messages across all accounts.
    pub total: u64,
    /// Messages with no `\Seen` flag.
    pub unread: u64,
    /// Messages received today (UTC).
    pub today: u64,
    /// Messages received yesterday (UTC).
    pub yesterday: u64,
    /// Messages received before yesterday.
    pub total_until_yesterday: u64,
}

/// A deterministic pagination cursor over `(sort_key, id)`.
#[derive(Debug, Clone)]
pub struct Cursor {
    messages: Vec<Message>,
    batch_size: usize,
    position: usize,
}

impl Cursor {
    /// Returns the next page, or `None` once exhausted.
    pub fn next_page(&mut self) -> Option<Vec<Message>> {
        if self.position >= self.messages.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.messages.len());
        let page = self.messages[self.position..end].to_vec();
        self.position = end;
        Some(page)
    }
}

/// The Message Store contract (C4). Object-safe so a host process can swap
/// in a real database behind this trait without touching the rest of the
/// crate.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Inserts many messages. Dedup is by `(account_id, message.dedup_key())`
    /// — `message_id` when present, otherwise the synthetic intra-fetch
    /// fingerprint — and must be idempotent: a conflicting row is silently
    /// skipped, never an error. Returns the messages that were newly
    /// inserted (with `id` populated), in input order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::BatchCommit`] if the whole batch could not be
    /// committed; a successful call either commits all messages (net of
    /// dedup skips) or none — dedup itself never raises.
    async fn put_batch(&self, messages: Vec<Message>) -> Result<Vec<Message>>;

    /// `true` if a message with this `(account_id, dedup_key)` exists.
    /// Callers without an actual `message_id` should pass
    /// [`crate::message::Message::dedup_key`]'s output to stay consistent
    /// with `put_batch`'s dedup index.
    async fn exists(&self, account_id: u64, message_id: &str) -> bool;

    /// Searches messages, returning the matching page and the total count
    /// before pagination.
    async fn search(&self, options: &SearchOptions) -> Result<(Vec<Message>, usize)>;

    /// Builds a deterministic cursor over `search`'s matching set, for
    /// streaming extraction over large result sets.
    async fn cursor(&self, options: SearchOptions, batch_size: usize) -> Result<Cursor>;

    /// Aggregate counts for dashboards.
    async fn counts(&self, account_id: u64) -> StoreCounts;

    /// Messages for `account_id` received at or after `since` — the
    /// waiter's hot path.
    async fn since(&self, account_id: u64, since: DateTime<Utc>) -> Vec<Message>;

    /// Marks the store-assigned `id` `\Seen` in the store-side
    /// representation; never touches the upstream mailbox. Returns `true` if
    /// the flag was newly set, `false` if it was already present or the
    /// message does not exist.
    async fn mark_read(&self, id: u64) -> bool;
}

/// `dashmap`-backed in-memory [`MessageStore`].
///
/// Writes are serialized per account via a striped set of
/// [`tokio::sync::Mutex`] guards rather than one global lock, since the
/// store is the one shared mutable resource every fetch and waiter touches.
pub struct InMemoryStore {
    messages: DashMap<u64, Message>,
    dedup_index: DashMap<(u64, String), u64>,
    next_id: AtomicU64,
    account_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: DashMap::new(),
            dedup_index: DashMap::new(),
            next_id: AtomicU64::new(1),
            account_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, account_id: u64) -> Arc<Mutex<()>> {
        self.account_locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn matches(message: &Message, options: &SearchOptions) -> bool {
        if options.account_id != 0 && message.account_id != options.account_id {
            return false;
        }
        if let Some(folder) = &options.folder {
            if &message.folder != folder {
                return false;
            }
        }
        if let Some(since) = options.since {
            if message.received_date < since {
                return false;
            }
        }
        if let Some(before) = options.before {
            if message.received_date >= before {
                return false;
            }
        }
        let contains = |hay: &str, needle: &str| hay.to_lowercase().contains(&needle.to_lowercase());

        if let Some(needle) = &options.from_contains {
            if !message.from.iter().any(|a| contains(&a.render(), needle)) {
                return false;
            }
        }
        if let Some(needle) = &options.to_contains {
            if !message.to.iter().any(|a| contains(&a.render(), needle)) {
                return false;
            }
        }
        if let Some(needle) = &options.cc_contains {
            if !message.cc.iter().any(|a| contains(&a.render(), needle)) {
                return false;
            }
        }
        if let Some(needle) = &options.subject_contains {
            if !contains(&message.subject, needle) {
                return false;
            }
        }
        if let Some(needle) = &options.body_contains {
            let body = message
                .plain_body
                .as_deref()
                .or(message.html_body.as_deref())
                .unwrap_or_default();
            if !contains(body, needle) {
                return false;
            }
        }
        if let Some(needle) = &options.keyword {
            if !contains(&message.all_text(), needle) {
                return false;
            }
        }
        true
    }

    fn sorted_matches(&self, options: &SearchOptions) -> Vec<Message> {
        let mut matched: Vec<Message> = self
            .messages
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|m| Self::matches(m, options))
            .collect();

        matched.sort_by(|a, b| match options.sort_by {
            SortBy::DateDesc => b
                .received_date
                .cmp(&a.received_date)
                .then_with(|| b.id.cmp(&a.id)),
            SortBy::DateAsc => a
                .received_date
                .cmp(&b.received_date)
                .then_with(|| a.id.cmp(&b.id)),
        });

        matched
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn put_batch(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        let mut inserted = Vec::with_capacity(messages.len());

        for mut message in messages {
            let dedup_key = message.dedup_key().into_owned();

            let lock = self.lock_for(message.account_id);
            let _guard = lock.lock().await;

            let key = (message.account_id, dedup_key);
            if self.dedup_index.contains_key(&key) {
                continue;
            }

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            message.id = id;
            self.dedup_index.insert(key, id);
            self.messages.insert(id, message.clone());
            inserted.push(message);
        }

        Ok(inserted)
    }

    async fn exists(&self, account_id: u64, message_id: &str) -> bool {
        self.dedup_index
            .contains_key(&(account_id, message_id.to_string()))
    }

    async fn search(&self, options: &SearchOptions) -> Result<(Vec<Message>, usize)> {
        let matched = self.sorted_matches(options);
        let total = matched.len();
        let limit = if options.limit == 0 {
            total
        } else {
            options.limit
        };
        let page = matched
            .into_iter()
            .skip(options.offset)
            .take(limit)
            .collect();
        Ok((page, total))
    }

    async fn cursor(&self, options: SearchOptions, batch_size: usize) -> Result<Cursor> {
        let messages = self.sorted_matches(&options);
        Ok(Cursor {
            messages,
            batch_size: batch_size.max(1),
            position: 0,
        })
    }

    async fn counts(&self, account_id: u64) -> StoreCounts {
        let now = Utc::now();
        let today = now.date_naive();
        let yesterday = today.pred_opt().unwrap_or(today);

        let mut counts = StoreCounts::default();
        for entry in &self.messages {
            let m = entry.value();
            if account_id != 0 && m.account_id != account_id {
                continue;
            }
            counts.total += 1;
            if !m.is_seen() {
                counts.unread += 1;
            }
            let day = m.received_date.date_naive();
            if day == today {
                counts.today += 1;
            } else if day == yesterday {
                counts.yesterday += 1;
            } else if day < yesterday {
                counts.total_until_yesterday += 1;
            }
        }
        counts
    }

    async fn mark_read(&self, id: u64) -> bool {
        let Some(mut entry) = self.messages.get_mut(&id) else {
            return false;
        };
        if entry.flags.contains(&crate::message::Flag::Seen) {
            return false;
        }
        entry.flags.push(crate::message::Flag::Seen);
        true
    }

    async fn since(&self, account_id: u64, since: DateTime<Utc>) -> Vec<Message> {
        let options = SearchOptions {
            account_id,
            since: Some(since),
            sort_by: SortBy::DateDesc,
            ..Default::default()
        };
        self.sorted_matches(&options)
    }
}
