//! IMAP Fetcher (C2): connects to one account's upstream server, pages
//! messages in a time window, and decodes envelope/body/attachments.
//!
//! A per-call `Fetcher` that the scheduler, waiter, and control plane all
//! drive with different [`FetchOptions`]. Connections are short-lived per
//! fetch; no pooling guarantee is required.

use crate::account::{Account, AuthMode, ProxyConfig, TlsMode};
use crate::connection;
use crate::error::{FetchError, Result};
use crate::message::Message;
use crate::parser;
use crate::session::{self, AuthConfig, ImapSession};
use chrono::{DateTime, NaiveDate, Utc};
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Conventional folder names checked by [`Fetcher::fetch_multi_folder`] in
/// addition to the caller's requested folder.
pub const CONVENTIONAL_SPAM_FOLDERS: &[&str] = &["Spam", "Junk", "Junk E-mail", "[Gmail]/Spam"];

/// Client-side sort order applied to a fetch's result window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Newest first.
    #[default]
    DateDesc,
    /// Oldest first.
    DateAsc,
}

/// Options for [`Fetcher::fetch`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Mailbox to select.
    pub folder: String,
    /// Maximum messages to return.
    pub limit: usize,
    /// Messages to skip after sorting.
    pub offset: usize,
    /// Inclusive lower bound on envelope date, server-side `SINCE`.
    pub start_date: Option<NaiveDate>,
    /// Exclusive upper bound on envelope date, server-side `BEFORE`.
    pub end_date: Option<NaiveDate>,
    /// Whether to decode plain/HTML bodies.
    pub include_body: bool,
    /// Whether to decode attachment bytes.
    pub include_attachments: bool,
    /// Client-side sort applied to the returned window.
    pub sort: SortOrder,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            folder: "INBOX".into(),
            limit: 50,
            offset: 0,
            start_date: None,
            end_date: None,
            include_body: true,
            include_attachments: true,
            sort: SortOrder::DateDesc,
        }
    }
}

/// Connect/auth/select/fetch timeouts.
#[derive(Debug, Clone, Copy)]
pub struct FetchTimeouts {
    /// TCP+TLS connect.
    pub connect: Duration,
    /// Authentication (`LOGIN` / `XOAUTH2`).
    pub auth: Duration,
    /// Mailbox selection.
    pub select: Duration,
    /// UID search.
    pub search: Duration,
    /// Message body fetch, per page.
    pub fetch: Duration,
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            auth: Duration::from_secs(10),
            select: Duration::from_secs(10),
            search: Duration::from_secs(15),
            fetch: Duration::from_secs(30),
        }
    }
}

/// Stateless entry point for C2 operations. Holds no connection — every
/// call opens, uses, and tears down its own session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fetcher {
    timeouts: FetchTimeouts,
}

impl Fetcher {
    /// Creates a fetcher with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher with explicit timeouts.
    #[must_use]
    pub fn with_timeouts(timeouts: FetchTimeouts) -> Self {
        Self { timeouts }
    }

    /// Fetches messages for `account` in `options.folder`, respecting
    /// `cancel` between pages.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on any connect/auth/select/search/fetch
    /// failure, or [`FetchError::Cancelled`] if `cancel` fires mid-fetch.
    /// Never retries internally — retry is the scheduler's responsibility.
    #[instrument(
        name = "Fetcher::fetch",
        skip(self, account, cancel),
        fields(account_id = account.id, folder = %options.folder)
    )]
    pub async fn fetch(
        &self,
        account: &Account,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        let mut session = self.connect_and_select(account, &options.folder, false).await?;

        let result = self.fetch_with_session(&mut session, account, options, cancel).await;

        if let Err(e) = session::logout(&mut session).await {
            warn!(error = %e, "logout after fetch failed, ignoring");
        }

        result
    }

    /// Iterates `options.folder` plus the conventional spam/junk folder
    /// names, merging and re-sorting the combined result.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] only if the primary folder fetch fails;
    /// failures on conventional spam folders (commonly missing) are logged
    /// and skipped.
    #[instrument(name = "Fetcher::fetch_multi_folder", skip(self, account, cancel))]
    pub async fn fetch_multi_folder(
        &self,
        account: &Account,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        let mut combined = self.fetch(account, options, cancel).await?;

        for folder in CONVENTIONAL_SPAM_FOLDERS {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled.into());
            }
            if *folder == options.folder {
                continue;
            }

            let folder_options = FetchOptions {
                folder: (*folder).to_string(),
                ..options.clone()
            };

            match self.fetch(account, &folder_options, cancel).await {
                Ok(mut messages) => combined.append(&mut messages),
                Err(e) => debug!(folder, error = %e, "skipping unavailable conventional folder"),
            }
        }

        sort_messages(&mut combined, options.sort);
        apply_window(&mut combined, options.offset, options.limit);

        Ok(combined)
    }

    /// Opens a connection, selects INBOX read-only, and returns. Does not
    /// alter server state; used by the control plane to validate account
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if connect, auth, or select fails.
    #[instrument(name = "Fetcher::verify", skip(self, account), fields(account_id = account.id))]
    pub async fn verify(&self, account: &mut Account) -> Result<()> {
        let mut session = self.connect_and_select(account, "INBOX", true).await?;
        if let Err(e) = session::logout(&mut session).await {
            warn!(error = %e, "logout after verify failed, ignoring");
        }
        account.mark_verified(Utc::now());
        Ok(())
    }

    /// Lists mailbox names available to `account`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if connect, auth, or the `LIST` command
    /// fails.
    #[instrument(name = "Fetcher::list_folders", skip(self, account), fields(account_id = account.id))]
    pub async fn list_folders(&self, account: &Account) -> Result<Vec<String>> {
        let tls_stream = self.open_tls(account).await?;
        let mut session = self.authenticate(account, tls_stream).await?;
        let folders = session::list_folders(&mut session).await?;
        if let Err(e) = session::logout(&mut session).await {
            warn!(error = %e, "logout after list_folders failed, ignoring");
        }
        Ok(folders)
    }

    async fn connect_and_select(
        &self,
        account: &Account,
        folder: &str,
        read_only: bool,
    ) -> Result<ImapSession> {
        let tls_stream = self.open_tls(account).await?;
        let mut session = self.authenticate(account, tls_stream).await?;

        tokio::time::timeout(
            self.timeouts.select,
            session::select_mailbox(&mut session, folder, read_only),
        )
        .await
        .map_err(|_| FetchError::SelectTimeout {
            mailbox: folder.to_string(),
            timeout: self.timeouts.select,
        })??;

        Ok(session)
    }

    async fn open_tls(&self, account: &Account) -> Result<connection::TlsStream> {
        if account.provider.tls == TlsMode::StartTls {
            warn!("StartTls is not implemented by this fetcher; connecting as implicit TLS");
        }

        let target_addr = account.server_address();
        let imap_host = account.provider.host.clone();
        let proxy = match &account.proxy {
            Some(ProxyConfig::Socks5(p)) => Some(p),
            None => None,
        };

        tokio::time::timeout(
            self.timeouts.connect,
            connection::establish_tls_connection(&imap_host, &target_addr, proxy),
        )
        .await
        .map_err(|_| FetchError::ConnectTimeout {
            target: target_addr.clone(),
            timeout: self.timeouts.connect,
        })?
    }

    async fn authenticate(
        &self,
        account: &Account,
        tls_stream: connection::TlsStream,
    ) -> Result<ImapSession> {
        let email = account.address().to_string();
        let credential = account.auth.expose_credential().to_string();

        let auth_config = match &account.auth {
            AuthMode::Password(_) => AuthConfig::Password {
                email: &email,
                password: &credential,
            },
            AuthMode::Bearer(_) => AuthConfig::Bearer {
                email: &email,
                token: &credential,
            },
        };

        tokio::time::timeout(self.timeouts.auth, session::authenticate(tls_stream, &auth_config))
            .await
            .map_err(|_| FetchError::AuthTimeout {
                email: email.clone(),
                timeout: self.timeouts.auth,
            })?
    }

    async fn fetch_with_session(
        &self,
        session: &mut ImapSession,
        account: &Account,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        let default_start = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let since = options.start_date.unwrap_or(default_start);

        let uids = tokio::time::timeout(
            self.timeouts.search,
            session::search_range(session, since, options.end_date),
        )
        .await
        .map_err(|_| FetchError::SearchTimeout {
            timeout: self.timeouts.search,
        })??;

        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let ranges = page_uid_ranges(&uids, 200);
        let mut messages = Vec::new();

        for range in ranges {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled.into());
            }

            let mut stream = tokio::time::timeout(
                self.timeouts.fetch,
                session::fetch_messages_by_uid_range(session, &range),
            )
            .await
            .map_err(|_| FetchError::FetchTimeout {
                uid_range: range.clone(),
                timeout: self.timeouts.fetch,
            })??;

            while let Some(fetch_result) = stream.next().await {
                if cancel.is_cancelled() {
                    return Err(FetchError::Cancelled.into());
                }

                let fetch = fetch_result.map_err(|source| FetchError::FetchMessage { source })?;

                if let Some(mut message) =
                    parser::parse_fetched_message(&fetch, account.id, &options.folder)
                {
                    if !options.include_body {
                        message.plain_body = None;
                        message.html_body = None;
                    }
                    if !options.include_attachments {
                        message.attachments.clear();
                    }
                    messages.push(message);
                }
            }
        }

        sort_messages(&mut messages, options.sort);
        apply_window(&mut messages, options.offset, options.limit);

        Ok(messages)
    }
}

fn sort_messages(messages: &mut [Message], sort: SortOrder) {
    messages.sort_by(|a, b| match sort {
        SortOrder::DateDesc => b.received_date.cmp(&a.received_date),
        SortOrder::DateAsc => a.received_date.cmp(&b.received_date),
    });
}

fn apply_window(messages: &mut Vec<Message>, offset: usize, limit: usize) {
    if offset >= messages.len() {
        messages.clear();
        return;
    }
    let end = (offset + limit.max(1)).min(messages.len());
    *messages = messages[offset..end].to_vec();
}

/// Splits a sorted UID list into `BODY[]`-friendly `a:b` range strings of at
/// most `page_size` UIDs each.
fn page_uid_ranges(uids: &[u32], page_size: usize) -> Vec<String> {
    uids.chunks(page_size.max(1))
        .map(|chunk| {
            let first = chunk.first().copied().unwrap_or(0);
            let last = chunk.last().copied().unwrap_or(first);
            format!("{first}:{last}")
        })
        .collect()
}

/// `since(now - max_age)` convenience used by one-shot lookups; not part of
/// the IMAP protocol path itself.
#[must_use]
pub fn naive_date_from(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}
