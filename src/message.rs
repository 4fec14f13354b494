//! The parsed email and its constituent types.
//!
//! A [`Message`] is the unit the rest of the crate operates on: the fetcher
//! produces them, the store deduplicates and indexes them, the extractor
//! engine reads fields off them, and waiters/triggers match against them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single `Name <addr>` style mailbox reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Display name, if the header carried one (`"Jane Doe" <jane@x.com>`).
    pub name: Option<String>,
    /// The bare email address, lower-cased domain preserved as received.
    pub email: String,
}

impl Address {
    /// Builds an address with no display name.
    #[must_use]
    pub fn bare(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Renders as `"Name <email>"` or just `email` when there is no name.
    #[must_use]
    pub fn render(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("{name} <{}>", self.email),
            _ => self.email.clone(),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// A decoded flag on a message (`\Seen`, `\Flagged`, or a custom keyword).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// `\Seen`
    Seen,
    /// `\Flagged`
    Flagged,
    /// `\Draft`
    Draft,
    /// `\Answered`
    Answered,
    /// `\Deleted`
    Deleted,
    /// Any other IMAP keyword flag, verbatim.
    Custom(String),
}

/// A single MIME attachment. The raw bytes are only populated when the
/// fetcher was asked to `include_attachments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Filename as declared in the `Content-Disposition`/`Content-Type` header.
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub mime_type: String,
    /// Size in bytes.
    pub size: usize,
    /// Decoded bytes, present only when attachment bodies were fetched.
    pub data: Option<Vec<u8>>,
}

/// A fully parsed email, the unit of storage, dispatch, and matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Local, store-assigned id. `0` until the message has been persisted.
    pub id: u64,
    /// Owning account id.
    pub account_id: u64,
    /// IMAP folder the message was fetched from.
    pub folder: String,
    /// RFC 5322 `Message-ID` header, without angle brackets. Empty string if
    /// the message carried none — callers must fall back to the synthetic
    /// intra-fetch fingerprint (see [`crate::store::fingerprint`]).
    pub message_id: String,
    /// `Date` header as sent by the origin server, if parseable.
    pub envelope_date: Option<DateTime<Utc>>,
    /// Date the message was received locally (by this fetch), used for all
    /// ledger/waiter time-window comparisons.
    pub received_date: DateTime<Utc>,
    /// `From` address(es). Usually exactly one; kept as a list for
    /// consistency with `To`/`Cc`/`Bcc`.
    pub from: Vec<Address>,
    /// `To` recipients.
    pub to: Vec<Address>,
    /// `Cc` recipients.
    pub cc: Vec<Address>,
    /// `Bcc` recipients, when present in the fetched headers.
    pub bcc: Vec<Address>,
    /// `Subject` header, decoded from any MIME encoded-word form.
    pub subject: String,
    /// IMAP flags on the message at fetch time.
    pub flags: Vec<Flag>,
    /// Decoded `text/plain` body, if the message had one.
    pub plain_body: Option<String>,
    /// Decoded `text/html` body, if the message had one.
    pub html_body: Option<String>,
    /// Size in bytes as reported by the server.
    pub size: u32,
    /// Attachments found while decoding MIME parts.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// `true` if any flag matches [`Flag::Seen`].
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags.contains(&Flag::Seen)
    }

    /// `true` if the message carries at least one attachment.
    #[must_use]
    pub fn has_attachment(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// The dedup key used by [`crate::store::MessageStore`]: `message_id`
    /// when present, otherwise a composite fingerprint computed from
    /// `(subject, from, date, size)` as an intra-fetch fallback.
    #[must_use]
    pub fn dedup_key(&self) -> std::borrow::Cow<'_, str> {
        if self.message_id.is_empty() {
            std::borrow::Cow::Owned(crate::store::fingerprint(self))
        } else {
            std::borrow::Cow::Borrowed(&self.message_id)
        }
    }

    /// Concatenates `From`/`To`/`Cc`/`Subject`/body the way the `ALL`
    /// extractor field does (see [`crate::extractor`]).
    #[must_use]
    pub fn all_text(&self) -> String {
        let from = self
            .from
            .iter()
            .map(Address::render)
            .collect::<Vec<_>>()
            .join(", ");
        let to = self
            .to
            .iter()
            .map(Address::render)
            .collect::<Vec<_>>()
            .join(", ");
        let cc = self
            .cc
            .iter()
            .map(Address::render)
            .collect::<Vec<_>>()
            .join(", ");
        let body = self
            .plain_body
            .as_deref()
            .or(self.html_body.as_deref())
            .unwrap_or_default();
        format!(
            "From: {from}\nTo: {to}\nCc: {cc}\nSubject: {subject}\n\n{body}",
            subject = self.subject
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message {
            id: 0,
            account_id: 1,
            folder: "INBOX".into(),
            message_id: "abc@example.com".into(),
            envelope_date: None,
            received_date: Utc::now(),
            from: vec![Address {
                name: Some("Jane".into()),
                email: "jane@example.com".into(),
            }],
            to: vec![Address::bare("me@example.com")],
            cc: vec![],
            bcc: vec![],
            subject: "Hello".into(),
            flags: vec![Flag::Seen],
            plain_body: Some("body text".into()),
            html_body: None,
            size: 100,
            attachments: vec![],
        }
    }

    #[test]
    fn dedup_key_prefers_message_id() {
        let m = sample();
        assert_eq!(m.dedup_key(), "abc@example.com");
    }

    #[test]
    fn dedup_key_falls_back_to_fingerprint_when_blank() {
        let mut m = sample();
        m.message_id.clear();
        assert_ne!(m.dedup_key(), "");
    }

    #[test]
    fn all_text_includes_every_header_field() {
        let m = sample();
        let text = m.all_text();
        assert!(text.contains("Jane <jane@example.com>"));
        assert!(text.contains("me@example.com"));
        assert!(text.contains("Hello"));
        assert!(text.contains("body text"));
    }

    #[test]
    fn is_seen_reflects_flags() {
        let m = sample();
        assert!(m.is_seen());
        assert!(!m.has_attachment());
    }
}
