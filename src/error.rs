//! Error types, one enum per component, composed into [`CoreError`].
//!
//! Every enum follows the same shape as the others: `#[non_exhaustive]`,
//! an `is_retryable()` classification, and a `category()` for metrics/logging.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while connecting to and reading from an upstream IMAP server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// Invalid DNS name for TLS SNI.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to connect via SOCKS5 proxy.
    #[error("failed to connect via SOCKS5 proxy {proxy_host} to {target}")]
    Socks5Connect {
        /// The SOCKS5 proxy hostname.
        proxy_host: String,
        /// The target address.
        target: String,
        /// The underlying SOCKS5 error.
        #[source]
        source: tokio_socks::Error,
    },

    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {email} after {timeout:?}")]
    AuthTimeout {
        /// The account email address.
        email: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// IMAP login (password auth) failed.
    #[error("IMAP login failed for {email}")]
    ImapLogin {
        /// The account email address.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP XOAUTH2 (bearer auth) failed.
    #[error("IMAP XOAUTH2 authentication failed for {email}")]
    ImapBearerAuth {
        /// The account email address.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Mailbox selection timeout.
    #[error("mailbox selection timeout for '{mailbox}' after {timeout:?}")]
    SelectTimeout {
        /// The mailbox name.
        mailbox: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Failed to select mailbox (folder missing, permission denied, etc).
    #[error("failed to select mailbox '{mailbox}'")]
    SelectMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP search timeout.
    #[error("search timeout after {timeout:?}")]
    SearchTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// IMAP search failed.
    #[error("IMAP search failed")]
    ImapSearch {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Message fetch timeout.
    #[error("message fetch timeout for UID range {uid_range} after {timeout:?}")]
    FetchTimeout {
        /// The UID range being fetched.
        uid_range: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for UID range {uid_range}")]
    ImapFetch {
        /// The UID range that failed.
        uid_range: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to read a message out of the fetch stream.
    #[error("failed to read message from fetch stream")]
    FetchMessage {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP logout failed. Not considered fatal by callers.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to parse a fetched message.
    #[error("failed to parse email")]
    ParseEmail {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    /// Cancelled via the caller's [`tokio_util::sync::CancellationToken`].
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// `true` if this error represents a transient failure that might
    /// succeed on the scheduler's next tick.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::InvalidDnsName { .. }
                | FetchError::ParseEmail { .. }
                | FetchError::ImapLogout { .. }
                | FetchError::Cancelled
        )
    }

    /// Error category for metrics/logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            FetchError::InvalidDnsName { .. } => ErrorCategory::Configuration,
            FetchError::TcpConnect { .. }
            | FetchError::TlsConnect { .. }
            | FetchError::Socks5Connect { .. } => ErrorCategory::Network,
            FetchError::ConnectTimeout { .. }
            | FetchError::AuthTimeout { .. }
            | FetchError::SelectTimeout { .. }
            | FetchError::SearchTimeout { .. }
            | FetchError::FetchTimeout { .. } => ErrorCategory::Timeout,
            FetchError::ImapLogin { .. }
            | FetchError::ImapBearerAuth { .. }
            | FetchError::SelectMailbox { .. }
            | FetchError::ImapSearch { .. }
            | FetchError::ImapFetch { .. }
            | FetchError::FetchMessage { .. }
            | FetchError::ImapLogout { .. } => ErrorCategory::Protocol,
            FetchError::ParseEmail { .. } => ErrorCategory::Parse,
            FetchError::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

/// Errors raised by account/address configuration and resolution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// A required field was missing or a combination of fields is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },
}

impl ConfigError {
    /// Configuration errors are never retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Error category for metrics/logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors raised by the [`crate::store`] module.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A batch insert could not be committed as a whole and was rolled back.
    #[error("failed to commit batch of {count} messages: {message}")]
    BatchCommit {
        /// Number of messages in the failed batch.
        count: usize,
        /// Description of the failure.
        message: String,
    },

    /// A search request used an unsupported or malformed option.
    #[error("invalid search options: {message}")]
    InvalidSearch {
        /// Description of the problem.
        message: String,
    },
}

impl StoreError {
    /// Store failures are transactional failures against local state and are
    /// not retried by the core; the enclosing operation surfaces them.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Error category for metrics/logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::BatchCommit { .. } => ErrorCategory::Store,
            StoreError::InvalidSearch { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Errors raised while evaluating a single extractor row.
///
/// These never abort a whole [`crate::extractor::evaluate`] call — a row's
/// error is carried in that row's result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExtractorError {
    /// `field` did not resolve to a known message field.
    #[error("unknown extractor field: {field}")]
    UnknownField {
        /// The unrecognized field name.
        field: String,
    },

    /// The extractor's regex failed to compile.
    #[error("invalid regex pattern")]
    InvalidRegex(
        /// The underlying regex compile error.
        #[source]
        regex::Error,
    ),

    /// The sandboxed script failed to compile or evaluate, or exceeded its
    /// operation/depth budget.
    #[error("script evaluation failed: {message}")]
    ScriptFailed {
        /// Description of the failure.
        message: String,
    },

    /// The template failed to compile or render.
    #[error("template evaluation failed: {message}")]
    TemplateFailed {
        /// Description of the failure.
        message: String,
    },
}

impl ExtractorError {
    /// Extractor failures are per-row, never transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Error category for metrics/logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Extractor
    }
}

/// Errors raised by the waiter registry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WaiterError {
    /// The waiter's deadline elapsed with no matching message.
    #[error("timeout waiting for matching email after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The waiter's owning context was cancelled (client disconnect, `stop`).
    #[error("waiter cancelled")]
    Cancelled,
}

impl WaiterError {
    /// Waiter errors reflect a terminal outcome, never retried internally.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Error category for metrics/logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            WaiterError::Timeout { .. } => ErrorCategory::Timeout,
            WaiterError::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

/// Errors raised while evaluating a trigger condition.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TriggerError {
    /// The condition tree used an operator or field outside the closed
    /// grammar the engine accepts.
    #[error("invalid trigger condition: {message}")]
    InvalidCondition {
        /// Description of the problem.
        message: String,
    },

    /// A regex leaf comparison used an invalid pattern.
    #[error("invalid regex in trigger condition")]
    InvalidRegex(
        /// The underlying regex compile error.
        #[source]
        regex::Error,
    ),
}

impl TriggerError {
    /// Trigger condition errors are rejected up front, never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Error category for metrics/logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Top-level error composing every component error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// An IMAP Fetcher ([`crate::fetcher`]) failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A configuration/account validation failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A Message Store ([`crate::store`]) failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An Extractor Engine ([`crate::extractor`]) failure.
    #[error(transparent)]
    Extractor(#[from] ExtractorError),

    /// A Waiter Registry ([`crate::waiter`]) failure.
    #[error(transparent)]
    Waiter(#[from] WaiterError),

    /// A Trigger Engine ([`crate::trigger`]) failure.
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// No matching message was found by a one-shot lookup.
    #[error("no matching email found")]
    NoMatch,
}

impl CoreError {
    /// Returns `true` if this error represents a transient failure that
    /// might succeed on retry (the scheduler's next tick, not an internal
    /// retry loop).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Fetch(e) => e.is_retryable(),
            CoreError::Config(e) => e.is_retryable(),
            CoreError::Store(e) => e.is_retryable(),
            CoreError::Extractor(e) => e.is_retryable(),
            CoreError::Waiter(e) => e.is_retryable(),
            CoreError::Trigger(e) => e.is_retryable(),
            CoreError::NoMatch => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::Fetch(e) => e.category(),
            CoreError::Config(e) => e.category(),
            CoreError::Store(e) => e.category(),
            CoreError::Extractor(e) => e.category(),
            CoreError::Waiter(e) => e.category(),
            CoreError::Trigger(e) => e.category(),
            CoreError::NoMatch => ErrorCategory::NotFound,
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// Email parsing errors.
    Parse,
    /// No matching content found.
    NotFound,
    /// Message store errors.
    Store,
    /// Extractor row errors.
    Extractor,
    /// Cooperative cancellation.
    Cancelled,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Parse => write!(f, "parse"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Extractor => write!(f, "extractor"),
            ErrorCategory::Cancelled => write!(f, "cancelled"),
        }
    }
}
