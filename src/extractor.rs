//! Extractor Engine (C5): evaluates an ordered list of extractor rows
//! against one message.
//!
//! Each row is a tagged variant — regex, sandboxed script, or template —
//! behind a single `evaluate(value) -> Option<String>` capability: one
//! capability, several backends, applied per row instead of per whole
//! message.

use crate::error::{ExtractorError, Result};
use crate::message::Message;
use handlebars::Handlebars;
use regex::Regex;
use rhai::{Engine, Scope};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

/// Which message field an extractor row reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// `From: …\nTo: …\nCc: …\nSubject: …\n\n<body>` concatenation.
    All,
    /// `From` header, rendered addresses joined by `, `.
    From,
    /// `To` header, rendered addresses joined by `, `.
    To,
    /// `Cc` header, rendered addresses joined by `, `.
    Cc,
    /// `Subject` header.
    Subject,
    /// Plain-text body, empty string if absent.
    Body,
    /// HTML body, empty string if absent.
    HtmlBody,
    /// All header-derived text (currently an alias of `All`'s header lines).
    Headers,
}

impl Field {
    fn resolve(self, message: &Message) -> String {
        let join = |addrs: &[crate::message::Address]| {
            addrs
                .iter()
                .map(crate::message::Address::render)
                .collect::<Vec<_>>()
                .join(", ")
        };

        match self {
            Field::All => message.all_text(),
            Field::From => join(&message.from),
            Field::To => join(&message.to),
            Field::Cc => join(&message.cc),
            Field::Subject => message.subject.clone(),
            Field::Body => message.plain_body.clone().unwrap_or_default(),
            Field::HtmlBody => message.html_body.clone().unwrap_or_default(),
            Field::Headers => format!(
                "From: {}\nTo: {}\nCc: {}\nSubject: {}",
                join(&message.from),
                join(&message.to),
                join(&message.cc),
                message.subject
            ),
        }
    }
}

/// The backend used to evaluate an [`ExtractorRow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Regular expression; the first capture group is the result, or the
    /// whole match if there is no capture group.
    Regex {
        /// The regex pattern.
        pattern: String,
    },
    /// Sandboxed `rhai` expression, with the field value bound as `value`.
    Script {
        /// The script source.
        source: String,
    },
    /// A `handlebars` template rendered with `{{value}}` bound to the field.
    Template {
        /// The template source.
        source: String,
    },
}

/// One row of an extractor configuration: `{field, type, match?, extract}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorRow {
    /// Which message field to read.
    pub field: Field,
    /// Optional gating condition; if present and it evaluates to no match,
    /// the row is skipped without running `extract`.
    pub is_match: Option<ExtractorKind>,
    /// The extraction rule that produces this row's result string.
    pub extract: ExtractorKind,
}

/// The outcome of evaluating one [`ExtractorRow`].
#[derive(Debug)]
pub enum RowOutcome {
    /// `extract` produced a non-empty string.
    Matched(String),
    /// `is_match` was set and evaluated false; `extract` did not run.
    Skipped {
        /// Optional diagnostic reason from the gating evaluation.
        reason: Option<String>,
    },
    /// `extract` produced no result (empty/null) or the row failed.
    NoMatch,
    /// The row raised an error; isolated from the rest of the batch.
    Error(ExtractorError),
}

const MAX_SCRIPT_OPERATIONS: u64 = 10_000;
const MAX_SCRIPT_EXPR_DEPTH: usize = 64;

fn sandboxed_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(MAX_SCRIPT_OPERATIONS);
    engine.set_max_expr_depths(MAX_SCRIPT_EXPR_DEPTH, MAX_SCRIPT_EXPR_DEPTH);
    engine.set_max_string_size(1 << 16);
    engine.set_max_array_size(1024);
    engine.disable_symbol("eval");
    engine
}

fn evaluate_regex(pattern: &str, value: &str) -> std::result::Result<Option<String>, ExtractorError> {
    let re = Regex::new(pattern).map_err(ExtractorError::InvalidRegex)?;
    let Some(caps) = re.captures(value) else {
        return Ok(None);
    };
    let result = caps
        .get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string());
    Ok(result)
}

fn evaluate_script(source: &str, value: &str) -> std::result::Result<Option<String>, ExtractorError> {
    let engine = sandboxed_engine();
    let mut scope = Scope::new();
    scope.push("value", value.to_string());

    let result = engine
        .eval_with_scope::<rhai::Dynamic>(&mut scope, source)
        .map_err(|e| ExtractorError::ScriptFailed {
            message: e.to_string(),
        })?;

    if result.is_unit() {
        return Ok(None);
    }
    let rendered = result.to_string();
    Ok((!rendered.is_empty()).then_some(rendered))
}

fn evaluate_template(source: &str, value: &str) -> std::result::Result<Option<String>, ExtractorError> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);

    let rendered = handlebars
        .render_template(source, &serde_json::json!({ "value": value }))
        .map_err(|e| ExtractorError::TemplateFailed {
            message: e.to_string(),
        })?;

    Ok((!rendered.is_empty()).then_some(rendered))
}

impl ExtractorKind {
    fn evaluate(&self, value: &str) -> std::result::Result<Option<String>, ExtractorError> {
        match self {
            ExtractorKind::Regex { pattern } => evaluate_regex(pattern, value),
            ExtractorKind::Script { source } => evaluate_script(source, value),
            ExtractorKind::Template { source } => evaluate_template(source, value),
        }
    }
}

/// Runs one row against `message`, never propagating an error out —
/// failures are carried in the returned [`RowOutcome`].
#[instrument(name = "extractor::run_row", skip_all)]
pub fn run_row(row: &ExtractorRow, message: &Message) -> RowOutcome {
    let value = row.field.resolve(message);

    if let Some(gate) = &row.is_match {
        match gate.evaluate(&value) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return RowOutcome::Skipped { reason: None };
            }
            Err(e) => {
                warn!(error = %e, "extractor match gate failed");
                return RowOutcome::Skipped {
                    reason: Some(e.to_string()),
                };
            }
        }
    }

    match row.extract.evaluate(&value) {
        Ok(Some(result)) if !result.is_empty() => RowOutcome::Matched(result),
        Ok(_) => RowOutcome::NoMatch,
        Err(e) => RowOutcome::Error(e),
    }
}

/// Result of [`evaluate`]: `None` means no row produced a match.
#[derive(Debug, Clone, Default)]
pub struct ExtractResult {
    /// The matched strings, in row order, for rows that produced a result.
    pub matches: Vec<String>,
}

/// Runs every row in `rows` against `message` and collects matches. Per row
/// isolation: one row's error never aborts the rest. Returns `None` (via
/// `CoreError::NoMatch`-style absence) when no row matched, matching the
/// contract's "returns null if no extractor produced a match."
#[instrument(name = "extractor::evaluate", skip_all, fields(row_count = rows.len()))]
pub fn evaluate(message: &Message, rows: &[ExtractorRow]) -> Result<Option<ExtractResult>> {
    let mut matches = Vec::new();

    for row in rows {
        match run_row(row, message) {
            RowOutcome::Matched(value) => matches.push(value),
            RowOutcome::Skipped { .. } | RowOutcome::NoMatch => {}
            RowOutcome::Error(e) => {
                warn!(error = %e, "extractor row failed, continuing");
            }
        }
    }

    if matches.is_empty() {
        Ok(None)
    } else {
        Ok(Some(ExtractResult { matches }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Address;
    use chrono::Utc;

    fn message(subject: &str, body: &str) -> Message {
        Message {
            id: 1,
            account_id: 1,
            folder: "INBOX".into(),
            message_id: "abc@example.com".into(),
            envelope_date: None,
            received_date: Utc::now(),
            from: vec![Address::bare("sender@example.com")],
            to: vec![Address::bare("me@example.com")],
            cc: vec![],
            bcc: vec![],
            subject: subject.into(),
            flags: vec![],
            plain_body: Some(body.into()),
            html_body: None,
            size: body.len() as u32,
            attachments: vec![],
        }
    }

    #[test]
    fn seed_scenario_regex_extractor_invoice_number() {
        let msg = message("Invoice #4242", "thanks");
        let rows = vec![ExtractorRow {
            field: Field::Subject,
            is_match: None,
            extract: ExtractorKind::Regex {
                pattern: r"Invoice #(\d+)".into(),
            },
        }];

        let result = evaluate(&msg, &rows).unwrap().unwrap();
        assert_eq!(result.matches, vec!["4242"]);
    }

    #[test]
    fn regex_without_capture_group_uses_whole_match() {
        let msg = message("hello world", "");
        let rows = vec![ExtractorRow {
            field: Field::Subject,
            is_match: None,
            extract: ExtractorKind::Regex {
                pattern: "hello".into(),
            },
        }];
        let result = evaluate(&msg, &rows).unwrap().unwrap();
        assert_eq!(result.matches, vec!["hello"]);
    }

    #[test]
    fn is_match_gate_skips_extract_when_false() {
        let msg = message("no keyword here", "");
        let rows = vec![ExtractorRow {
            field: Field::Subject,
            is_match: Some(ExtractorKind::Regex {
                pattern: "urgent".into(),
            }),
            extract: ExtractorKind::Regex {
                pattern: ".*".into(),
            },
        }];
        assert!(evaluate(&msg, &rows).unwrap().is_none());
    }

    #[test]
    fn unknown_field_error_is_isolated_per_row() {
        let msg = message("s", "");
        let rows = vec![
            ExtractorRow {
                field: Field::Subject,
                is_match: None,
                extract: ExtractorKind::Regex {
                    pattern: "[".into(),
                },
            },
            ExtractorRow {
                field: Field::Subject,
                is_match: None,
                extract: ExtractorKind::Regex { pattern: "s".into() },
            },
        ];
        let result = evaluate(&msg, &rows).unwrap().unwrap();
        assert_eq!(result.matches, vec!["s"]);
    }

    #[test]
    fn script_extractor_reads_bound_value() {
        let msg = message("hello", "");
        let rows = vec![ExtractorRow {
            field: Field::Subject,
            is_match: None,
            extract: ExtractorKind::Script {
                source: "value + \"!\"".into(),
            },
        }];
        let result = evaluate(&msg, &rows).unwrap().unwrap();
        assert_eq!(result.matches, vec!["hello!"]);
    }

    #[test]
    fn script_cannot_loop_forever() {
        let msg = message("s", "");
        let row = ExtractorRow {
            field: Field::Subject,
            is_match: None,
            extract: ExtractorKind::Script {
                source: "let x = 0; loop { x += 1; }".into(),
            },
        };
        match run_row(&row, &msg) {
            RowOutcome::Error(ExtractorError::ScriptFailed { .. }) => {}
            other => panic!("expected budget-exceeded script error, got {other:?}"),
        }
    }

    #[test]
    fn template_extractor_interpolates_value() {
        let msg = message("world", "");
        let rows = vec![ExtractorRow {
            field: Field::Subject,
            is_match: None,
            extract: ExtractorKind::Template {
                source: "hello {{value}}".into(),
            },
        }];
        let result = evaluate(&msg, &rows).unwrap().unwrap();
        assert_eq!(result.matches, vec!["hello world"]);
    }

    #[test]
    fn extraction_is_deterministic() {
        let msg = message("Invoice #4242", "");
        let rows = vec![ExtractorRow {
            field: Field::Subject,
            is_match: None,
            extract: ExtractorKind::Regex {
                pattern: r"#(\d+)".into(),
            },
        }];
        let first = evaluate(&msg, &rows).unwrap();
        let second = evaluate(&msg, &rows).unwrap();
        assert_eq!(first.unwrap().matches, second.unwrap().matches);
    }

    #[test]
    fn all_field_concatenates_per_spec() {
        let msg = message("Invoice", "body text");
        let text = Field::All.resolve(&msg);
        assert!(text.contains("From:"));
        assert!(text.contains("Subject: Invoice"));
        assert!(text.contains("body text"));
    }

    #[test]
    fn no_match_returns_none() {
        let msg = message("hello", "");
        let rows = vec![ExtractorRow {
            field: Field::Subject,
            is_match: None,
            extract: ExtractorKind::Regex {
                pattern: "nomatch".into(),
            },
        }];
        assert!(evaluate(&msg, &rows).unwrap().is_none());
    }
}
