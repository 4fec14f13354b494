//! Internal IMAP session management.
//!
//! Wraps `async-imap` operations with the crate's error taxonomy. Supports
//! both password and `XOAUTH2` bearer auth, and date-ranged search.

use crate::connection::TlsStream;
use crate::error::{FetchError, Result};
use async_imap::Session;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// How to authenticate within [`authenticate`].
pub(crate) enum AuthConfig<'a> {
    /// Plain `LOGIN`.
    Password { email: &'a str, password: &'a str },
    /// `AUTHENTICATE XOAUTH2` with a bearer token.
    Bearer { email: &'a str, token: &'a str },
}

struct XOAuth2<'a> {
    email: &'a str,
    token: &'a str,
}

impl async_imap::Authenticator for XOAuth2<'_> {
    type Response = String;

    fn process(&mut self, _data: &[u8]) -> Self::Response {
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.email, self.token
        )
    }
}

/// Authenticates to the IMAP server and returns a session.
#[instrument(name = "session::authenticate", skip_all)]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    config: &AuthConfig<'_>,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to IMAP server");

    match config {
        AuthConfig::Password { email, password } => client
            .login(*email, *password)
            .await
            .map_err(|e| FetchError::ImapLogin {
                email: (*email).to_string(),
                source: e.0,
            }.into()),
        AuthConfig::Bearer { email, token } => client
            .authenticate("XOAUTH2", &XOAuth2 { email, token })
            .await
            .map_err(|e| FetchError::ImapBearerAuth {
                email: (*email).to_string(),
                source: e.0,
            }.into()),
    }
}

/// Selects a mailbox. `read_only` selects via `EXAMINE`, matching the
/// fetcher's `verify()` contract which must not alter server state.
#[instrument(name = "session::select", skip(session), fields(mailbox = %mailbox, read_only))]
pub(crate) async fn select_mailbox(
    session: &mut ImapSession,
    mailbox: &str,
    read_only: bool,
) -> Result<()> {
    debug!("Selecting mailbox");

    let result = if read_only {
        session.examine(mailbox).await
    } else {
        session.select(mailbox).await
    };

    result.map_err(|source| FetchError::SelectMailbox {
        mailbox: mailbox.to_string(),
        source,
    })?;

    Ok(())
}

/// Gets the latest UID in the currently selected mailbox.
#[instrument(name = "session::get_latest_uid", skip(session))]
pub(crate) async fn get_latest_uid(session: &mut ImapSession) -> Result<u32> {
    session
        .noop()
        .await
        .map_err(|source| FetchError::ImapSearch { source })?;

    let uids = session
        .uid_search("ALL")
        .await
        .map_err(|source| FetchError::ImapSearch { source })?;

    let max_uid = uids.iter().max().copied().unwrap_or(0);

    debug!(max_uid, uid_count = uids.len(), "Retrieved latest UID");

    Ok(max_uid)
}

/// Searches for UIDs in `[since, until)`. `until` of `None` means "now".
#[instrument(
    name = "session::search_range",
    skip(session),
    fields(since = %since)
)]
pub(crate) async fn search_range(
    session: &mut ImapSession,
    since: NaiveDate,
    until: Option<NaiveDate>,
) -> Result<Vec<u32>> {
    session
        .noop()
        .await
        .map_err(|source| FetchError::ImapSearch { source })?;

    let mut query = format!("SINCE {}", since.format("%d-%b-%Y"));
    if let Some(until) = until {
        query.push_str(&format!(" BEFORE {}", until.format("%d-%b-%Y")));
    }

    let uids = session
        .uid_search(&query)
        .await
        .map_err(|source| FetchError::ImapSearch { source })?;

    let mut uids_vec: Vec<u32> = uids.into_iter().collect();
    uids_vec.sort_unstable();

    debug!(uid_count = uids_vec.len(), query = %query, "Found emails");

    Ok(uids_vec)
}

/// Fetches messages by UID range, returning a boxed stream of fetch results.
pub(crate) async fn fetch_messages_by_uid_range<'a>(
    session: &'a mut ImapSession,
    uid_range: &str,
) -> Result<BoxStream<'a, std::result::Result<async_imap::types::Fetch, async_imap::error::Error>>>
{
    debug!(uid_range = %uid_range, "Fetching messages");

    let stream = session
        .uid_fetch(uid_range, "BODY[]")
        .await
        .map_err(|source| FetchError::ImapFetch {
            uid_range: uid_range.to_string(),
            source,
        })?;

    Ok(stream.boxed())
}

/// Lists mailbox names available on the server.
pub(crate) async fn list_folders(session: &mut ImapSession) -> Result<Vec<String>> {
    let stream = session
        .list(Some(""), Some("*"))
        .await
        .map_err(|source| FetchError::ImapSearch { source })?;

    let names: Vec<String> = stream
        .filter_map(|item| async move { item.ok().map(|n| n.name().to_string()) })
        .collect()
        .await;

    Ok(names)
}

/// Logs out from the IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| FetchError::ImapLogout { source })?;

    Ok(())
}
