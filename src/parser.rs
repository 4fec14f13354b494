//! Internal module for turning an IMAP fetch result into a [`crate::message::Message`].

use crate::message::{Address, Attachment, Flag, Message};
use chrono::{DateTime, Utc};
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use tracing::{debug, warn};

/// Parses a raw `BODY[]` fetch result into a [`Message`]. `account_id` and
/// `folder` are stamped onto the result since the raw message carries
/// neither. Resilient: a parse failure is logged and returns `None` rather
/// than aborting the caller's batch.
pub(crate) fn parse_fetched_message(
    fetch: &async_imap::types::Fetch,
    account_id: u64,
    folder: &str,
) -> Option<Message> {
    let uid = fetch.uid;
    let body = fetch.body()?;

    let parsed = match parse_mail(body) {
        Ok(p) => p,
        Err(e) => {
            warn!(uid, error = %e, "failed to parse email, skipping");
            return None;
        }
    };

    Some(build_message(&parsed, fetch, account_id, folder))
}

fn build_message(
    parsed: &ParsedMail<'_>,
    fetch: &async_imap::types::Fetch,
    account_id: u64,
    folder: &str,
) -> Message {
    let headers = &parsed.headers;

    let message_id = headers
        .get_first_value("Message-ID")
        .map(|v| v.trim_matches(|c| c == '<' || c == '>').to_string())
        .unwrap_or_default();

    let envelope_date = headers
        .get_first_value("Date")
        .and_then(|v| mailparse::dateparse(&v).ok())
        .and_then(|ts| DateTime::from_timestamp(ts, 0));

    let subject = headers
        .get_first_value("Subject")
        .unwrap_or_default();

    let from = parse_address_list(headers, "From");
    let to = parse_address_list(headers, "To");
    let cc = parse_address_list(headers, "Cc");
    let bcc = parse_address_list(headers, "Bcc");

    let (plain_body, html_body, attachments) = extract_parts(parsed);

    let flags = fetch
        .flags()
        .map(|f| convert_flag(&f))
        .collect::<Vec<_>>();

    let size = fetch.size.unwrap_or(0);

    debug!(uid = fetch.uid, message_id = %message_id, "parsed message");

    Message {
        id: 0,
        account_id,
        folder: folder.to_string(),
        message_id,
        envelope_date,
        received_date: Utc::now(),
        from,
        to,
        cc,
        bcc,
        subject,
        flags,
        plain_body,
        html_body,
        size,
        attachments,
    }
}

fn convert_flag(flag: &async_imap::types::Flag<'_>) -> Flag {
    use async_imap::types::Flag as ImapFlag;
    match flag {
        ImapFlag::Seen => Flag::Seen,
        ImapFlag::Flagged => Flag::Flagged,
        ImapFlag::Draft => Flag::Draft,
        ImapFlag::Answered => Flag::Answered,
        ImapFlag::Deleted => Flag::Deleted,
        other => Flag::Custom(format!("{other:?}")),
    }
}

fn parse_address_list(headers: &[mailparse::MailHeader<'_>], name: &str) -> Vec<Address> {
    let Some(raw) = headers.get_first_value(name) else {
        return Vec::new();
    };

    match mailparse::addrparse(&raw) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                mailparse::MailAddr::Single(info) => vec![Address {
                    name: info.display_name.clone(),
                    email: info.addr.clone(),
                }],
                mailparse::MailAddr::Group(group) => group
                    .addrs
                    .iter()
                    .map(|info| Address {
                        name: info.display_name.clone(),
                        email: info.addr.clone(),
                    })
                    .collect(),
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Walks MIME subparts to find `text/plain`, `text/html`, and attachments.
fn extract_parts(parsed: &ParsedMail<'_>) -> (Option<String>, Option<String>, Vec<Attachment>) {
    let mut plain = None;
    let mut html = None;
    let mut attachments = Vec::new();
    walk_parts(parsed, &mut plain, &mut html, &mut attachments);
    (plain, html, attachments)
}

fn walk_parts(
    part: &ParsedMail<'_>,
    plain: &mut Option<String>,
    html: &mut Option<String>,
    attachments: &mut Vec<Attachment>,
) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            walk_parts(sub, plain, html, attachments);
        }
        return;
    }

    let content_type = part.ctype.mimetype.to_lowercase();
    let disposition = part.get_content_disposition();

    let is_attachment = matches!(
        disposition.disposition,
        mailparse::DispositionType::Attachment
    ) || (disposition.params.contains_key("filename") && content_type != "text/plain" && content_type != "text/html");

    if is_attachment {
        let filename = disposition
            .params
            .get("filename")
            .cloned()
            .unwrap_or_else(|| "unnamed".to_string());
        let data = part.get_body_raw().unwrap_or_default();
        attachments.push(Attachment {
            filename,
            mime_type: content_type,
            size: data.len(),
            data: Some(data),
        });
        return;
    }

    match content_type.as_str() {
        "text/plain" if plain.is_none() => {
            *plain = part.get_body().ok();
        }
        "text/html" if html.is_none() => {
            *html = part.get_body().ok();
        }
        _ => {}
    }
}
