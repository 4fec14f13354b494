//! Event types published on the [`crate::bus`].

use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminant for [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// A new message was committed to the store and is being fanned out.
    NewEmail,
    /// A scheduler worker began a fetch cycle.
    FetchStart,
    /// A scheduler worker finished a fetch cycle.
    FetchComplete,
    /// A scheduler worker's fetch cycle failed.
    FetchError,
}

/// Payload carried by an [`Event`]. Events carry ids and snapshots, never
/// live references, so they remain valid after the publishing worker moves
/// on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// Carried by [`EventType::NewEmail`].
    Message(Box<Message>),
    /// Carried by [`EventType::FetchComplete`].
    FetchSummary {
        /// Count of newly committed messages this cycle.
        new_count: usize,
    },
    /// Carried by [`EventType::FetchError`].
    Error {
        /// Human-readable failure detail.
        detail: String,
    },
    /// Carried by [`EventType::FetchStart`], and as a default for payload-less events.
    None,
}

/// One bus event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Discriminant.
    pub event_type: EventType,
    /// The subscription this event concerns, if any.
    pub subscription_id: Option<u64>,
    /// Wall-clock time the event was published.
    pub timestamp: DateTime<Utc>,
    /// Event-specific data.
    pub payload: EventPayload,
}

impl Event {
    /// Builds a `new-email` event.
    #[must_use]
    pub fn new_email(subscription_id: u64, message: Message, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: EventType::NewEmail,
            subscription_id: Some(subscription_id),
            timestamp,
            payload: EventPayload::Message(Box::new(message)),
        }
    }

    /// Builds a `fetch-start` event.
    #[must_use]
    pub fn fetch_start(subscription_id: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: EventType::FetchStart,
            subscription_id: Some(subscription_id),
            timestamp,
            payload: EventPayload::None,
        }
    }

    /// Builds a `fetch-complete` event.
    #[must_use]
    pub fn fetch_complete(subscription_id: u64, new_count: usize, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: EventType::FetchComplete,
            subscription_id: Some(subscription_id),
            timestamp,
            payload: EventPayload::FetchSummary { new_count },
        }
    }

    /// Builds a `fetch-error` event.
    #[must_use]
    pub fn fetch_error(subscription_id: u64, detail: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: EventType::FetchError,
            subscription_id: Some(subscription_id),
            timestamp,
            payload: EventPayload::Error {
                detail: detail.into(),
            },
        }
    }
}
