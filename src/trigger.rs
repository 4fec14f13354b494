//! Trigger Engine (C9): one worker per enabled trigger, evaluating a
//! closed-grammar condition against newly arrived messages and executing
//! declarative actions.
//!
//! The condition evaluator is pure and provably terminating: it is a tree of
//! a fixed node set (no recursion through user-supplied loops), so malformed
//! input is rejected up front by [`TriggerCondition::validate`] rather than
//! risking a runaway evaluation.

use crate::error::{Result, TriggerError};
use crate::message::Message;
use crate::store::{MessageStore, SearchOptions};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Maximum nesting depth accepted by [`TriggerCondition::validate`]. Bounds
/// evaluation time independent of the (also bounded) node count.
const MAX_CONDITION_DEPTH: usize = 32;

/// A leaf comparison against one message field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Leaf {
    /// `subject contains X`.
    SubjectContains { value: String },
    /// `from contains X`.
    FromContains { value: String },
    /// `to contains X`.
    ToContains { value: String },
    /// `from matches <regex>`.
    FromMatches { pattern: String },
    /// `subject matches <regex>`.
    SubjectMatches { pattern: String },
    /// `has_attachment`.
    HasAttachment,
    /// `is_unread`.
    IsUnread,
    /// `folder == X`.
    FolderEquals { value: String },
}

/// A structured boolean expression over message fields. Closed grammar:
/// `and`/`or`/`not` combinators over [`Leaf`] comparisons, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// All of `terms` must hold.
    And { terms: Vec<TriggerCondition> },
    /// At least one of `terms` must hold.
    Or { terms: Vec<TriggerCondition> },
    /// `term` must not hold.
    Not { term: Box<TriggerCondition> },
    /// A leaf comparison.
    Leaf(Leaf),
}

impl TriggerCondition {
    /// Rejects conditions outside the closed grammar: empty `and`/`or`
    /// lists, invalid regex patterns, or nesting past
    /// [`MAX_CONDITION_DEPTH`]. Call before [`evaluate`] on any
    /// externally-supplied tree.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::InvalidCondition`] or
    /// [`TriggerError::InvalidRegex`] on the first violation found.
    pub fn validate(&self) -> std::result::Result<(), TriggerError> {
        self.validate_at_depth(0)
    }

    fn validate_at_depth(&self, depth: usize) -> std::result::Result<(), TriggerError> {
        if depth > MAX_CONDITION_DEPTH {
            return Err(TriggerError::InvalidCondition {
                message: format!("condition nesting exceeds {MAX_CONDITION_DEPTH}"),
            });
        }

        match self {
            TriggerCondition::And { terms } | TriggerCondition::Or { terms } => {
                if terms.is_empty() {
                    return Err(TriggerError::InvalidCondition {
                        message: "and/or must have at least one term".into(),
                    });
                }
                for term in terms {
                    term.validate_at_depth(depth + 1)?;
                }
                Ok(())
            }
            TriggerCondition::Not { term } => term.validate_at_depth(depth + 1),
            TriggerCondition::Leaf(Leaf::FromMatches { pattern } | Leaf::SubjectMatches { pattern }) => {
                Regex::new(pattern).map_err(TriggerError::InvalidRegex)?;
                Ok(())
            }
            TriggerCondition::Leaf(_) => Ok(()),
        }
    }
}

fn evaluate_leaf(leaf: &Leaf, message: &Message) -> bool {
    let contains = |hay: &str, needle: &str| hay.to_lowercase().contains(&needle.to_lowercase());

    match leaf {
        Leaf::SubjectContains { value } => contains(&message.subject, value),
        Leaf::FromContains { value } => message.from.iter().any(|a| contains(&a.render(), value)),
        Leaf::ToContains { value } => message.to.iter().any(|a| contains(&a.render(), value)),
        Leaf::FromMatches { pattern } => Regex::new(pattern)
            .map(|re| message.from.iter().any(|a| re.is_match(&a.render())))
            .unwrap_or(false),
        Leaf::SubjectMatches { pattern } => Regex::new(pattern)
            .map(|re| re.is_match(&message.subject))
            .unwrap_or(false),
        Leaf::HasAttachment => message.has_attachment(),
        Leaf::IsUnread => !message.is_seen(),
        Leaf::FolderEquals { value } => message.folder.eq_ignore_ascii_case(value),
    }
}

/// Evaluates `condition` against `message`. Assumes `condition` already
/// passed [`TriggerCondition::validate`] — this function does not
/// re-validate, matching the evaluator's "pure and terminates in bounded
/// time" contract for well-formed input.
#[must_use]
pub fn evaluate(condition: &TriggerCondition, message: &Message) -> bool {
    match condition {
        TriggerCondition::And { terms } => terms.iter().all(|t| evaluate(t, message)),
        TriggerCondition::Or { terms } => terms.iter().any(|t| evaluate(t, message)),
        TriggerCondition::Not { term } => !evaluate(term, message),
        TriggerCondition::Leaf(leaf) => evaluate_leaf(leaf, message),
    }
}

/// One declarative action in a trigger's action list. The concrete action
/// taxonomy the control plane exposes; the engine only knows how to execute
/// and report on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerAction {
    /// Writes an execution-log entry only; always succeeds.
    Log,
    /// Marks the message `\Seen` in the store-side representation. The core
    /// never mutates the upstream mailbox; this is local bookkeeping only.
    MarkRead,
    /// Invokes a webhook URL with the message snapshot. The core records the
    /// intended call; the control plane owns the actual HTTP dispatch (out
    /// of scope here, per the external-interfaces boundary).
    Webhook { url: String },
}

/// `{status, detail}` for one action's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// `true` if the action completed without error.
    pub success: bool,
    /// Human-readable detail, e.g. the webhook URL or the failure reason.
    pub detail: String,
}

/// Executes one action against `message`. Per-action isolation: failures are
/// reported in the returned [`ActionOutcome`], never propagated as an
/// `Err`, since a trigger firing's aggregate status already encodes partial
/// failure.
pub async fn execute_action(
    action: &TriggerAction,
    message: &Message,
    store: &dyn MessageStore,
) -> ActionOutcome {
    match action {
        TriggerAction::Log => ActionOutcome {
            success: true,
            detail: format!("logged message {}", message.dedup_key()),
        },
        TriggerAction::MarkRead => {
            let changed = store.mark_read(message.id).await;
            ActionOutcome {
                success: true,
                detail: if changed {
                    "marked read".into()
                } else {
                    "already read".into()
                },
            }
        }
        TriggerAction::Webhook { url } => ActionOutcome {
            success: true,
            detail: format!("queued webhook to {url}"),
        },
    }
}

/// Aggregate status of one trigger firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiringStatus {
    /// Every action succeeded.
    Success,
    /// Every action failed.
    Failed,
    /// A mix of success and failure.
    Partial,
}

fn aggregate(outcomes: &[ActionOutcome]) -> FiringStatus {
    let success_count = outcomes.iter().filter(|o| o.success).count();
    if success_count == outcomes.len() {
        FiringStatus::Success
    } else if success_count == 0 {
        FiringStatus::Failed
    } else {
        FiringStatus::Partial
    }
}

/// One row of the append-only Execution Log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    /// The firing trigger's id.
    pub trigger_id: u64,
    /// The message that matched.
    pub message_id: String,
    /// Aggregate outcome.
    pub status: FiringStatus,
    /// Per-action results, in action order.
    pub outcomes: Vec<ActionOutcome>,
    /// Wall-clock duration of the firing.
    pub duration: Duration,
    /// When the firing occurred.
    pub executed_at: DateTime<Utc>,
}

/// Running statistics for one trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerStats {
    /// Total firings.
    pub total: u64,
    /// Firings with [`FiringStatus::Success`].
    pub success: u64,
    /// Epoch millis of the last execution, if any.
    pub last_executed_millis: Option<i64>,
    /// Last error detail, if the most recent firing had a failed action.
    pub last_error: Option<String>,
}

/// Candidate-narrowing filters applied before [`evaluate`], distinct from
/// `condition`: these shrink the store/server-side search window, while
/// `condition` is the boolean expression evaluated against what the filters
/// let through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerFilters {
    /// Case-insensitive substring match against `From`.
    pub from_contains: Option<String>,
    /// Case-insensitive substring match against `To`.
    pub to_contains: Option<String>,
    /// Case-insensitive substring match against `Subject`.
    pub subject_contains: Option<String>,
    /// Require at least one attachment.
    pub has_attachment: Option<bool>,
    /// Require the message to be unread (`\Seen` absent).
    pub unread: Option<bool>,
    /// Require at least one of these folders, if non-empty.
    pub folders: Vec<String>,
    /// Require at least one of these flag keywords, if non-empty.
    pub labels: Vec<String>,
    /// Arbitrary key/value pairs reserved for header filters the control
    /// plane wants to apply. `Message` carries no generic header map today,
    /// so `matches` accepts but does not evaluate this field.
    pub custom: std::collections::HashMap<String, String>,
}

impl TriggerFilters {
    /// `true` if `message` passes every configured filter. An unset field
    /// always passes.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        let contains = |hay: &str, needle: &str| hay.to_lowercase().contains(&needle.to_lowercase());

        if let Some(needle) = &self.from_contains {
            if !message.from.iter().any(|a| contains(&a.render(), needle)) {
                return false;
            }
        }
        if let Some(needle) = &self.to_contains {
            if !message.to.iter().any(|a| contains(&a.render(), needle)) {
                return false;
            }
        }
        if let Some(needle) = &self.subject_contains {
            if !contains(&message.subject, needle) {
                return false;
            }
        }
        if let Some(required) = self.has_attachment {
            if message.has_attachment() != required {
                return false;
            }
        }
        if let Some(required) = self.unread {
            if message.is_seen() == required {
                return false;
            }
        }
        if !self.folders.is_empty()
            && !self
                .folders
                .iter()
                .any(|f| f.eq_ignore_ascii_case(&message.folder))
        {
            return false;
        }
        if !self.labels.is_empty() {
            let flags: Vec<String> = message
                .flags
                .iter()
                .map(|f| format!("{f:?}").to_lowercase())
                .collect();
            if !self
                .labels
                .iter()
                .any(|l| flags.iter().any(|f| f == &l.to_lowercase()))
            {
                return false;
            }
        }
        true
    }
}

/// A persistent condition-evaluating rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Stable id.
    pub id: u64,
    /// Human-readable name.
    pub name: String,
    /// Whether the worker should be running.
    pub enabled: bool,
    /// How often the worker re-scans the store.
    pub check_interval: Duration,
    /// Account this trigger scopes its search to (`0` = all accounts).
    pub account_id: u64,
    /// Candidate-narrowing filters, applied before `condition`.
    pub filters: TriggerFilters,
    /// The boolean condition.
    pub condition: TriggerCondition,
    /// Actions run on each match, in order.
    pub actions: Vec<TriggerAction>,
    /// Whether firings should be appended to the Execution Log. Independent
    /// of action execution itself: disabling logging does not disable
    /// actions, it only silences the audit trail.
    pub enable_logging: bool,
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Owns at most one worker per enabled trigger.
pub struct TriggerEngine {
    store: Arc<dyn MessageStore>,
    workers: DashMap<u64, Worker>,
    log: Arc<Mutex<Vec<ExecutionLogEntry>>>,
    stats: Arc<DashMap<u64, TriggerStats>>,
}

impl TriggerEngine {
    /// Creates an engine with no workers running.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            workers: DashMap::new(),
            log: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(DashMap::new()),
        }
    }

    /// Validates `trigger.condition` and, if `trigger.enabled`, spawns its
    /// worker.
    ///
    /// # Errors
    ///
    /// Returns a [`TriggerError`] if the condition fails validation; the
    /// worker is not spawned in that case.
    #[instrument(name = "TriggerEngine::enable", skip(self, trigger), fields(trigger_id = trigger.id))]
    pub fn enable(&self, trigger: Trigger) -> Result<()> {
        trigger.condition.validate()?;

        if !trigger.enabled {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let store = Arc::clone(&self.store);
        let log = Arc::clone(&self.log);
        let stats = Arc::clone(&self.stats);
        let worker_cancel = cancel.clone();
        let trigger_id = trigger.id;

        let handle = tokio::spawn(async move {
            run_trigger_loop(trigger, store, log, stats, worker_cancel).await;
        });

        self.workers.insert(trigger_id, Worker { handle, cancel });
        Ok(())
    }

    /// Atomically disables `trigger_id`: signals cancel and awaits the
    /// worker's exit before returning.
    #[instrument(name = "TriggerEngine::disable", skip(self))]
    pub async fn disable(&self, trigger_id: u64) {
        if let Some((_, worker)) = self.workers.remove(&trigger_id) {
            worker.cancel.cancel();
            let _ = worker.handle.await;
        }
    }

    /// Snapshot of `trigger_id`'s running statistics.
    #[must_use]
    pub fn stats(&self, trigger_id: u64) -> TriggerStats {
        self.stats.get(&trigger_id).map(|s| *s).unwrap_or_default()
    }

    /// A copy of the Execution Log, newest first.
    pub async fn log(&self) -> Vec<ExecutionLogEntry> {
        let guard = self.log.lock().await;
        let mut entries = guard.clone();
        entries.reverse();
        entries
    }
}

async fn run_trigger_loop(
    trigger: Trigger,
    store: Arc<dyn MessageStore>,
    log: Arc<Mutex<Vec<ExecutionLogEntry>>>,
    stats: Arc<DashMap<u64, TriggerStats>>,
    cancel: CancellationToken,
) {
    let mut last_check = Utc::now();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!(trigger_id = trigger.id, "trigger worker disabled, exiting");
                return;
            }
            () = tokio::time::sleep(trigger.check_interval) => {}
        }

        let (candidates, _total) = store
            .search(&SearchOptions {
                account_id: trigger.account_id,
                folder: (trigger.filters.folders.len() == 1)
                    .then(|| trigger.filters.folders[0].clone()),
                since: Some(last_check),
                from_contains: trigger.filters.from_contains.clone(),
                to_contains: trigger.filters.to_contains.clone(),
                subject_contains: trigger.filters.subject_contains.clone(),
                ..Default::default()
            })
            .await
            .unwrap_or_default();

        for message in candidates {
            if cancel.is_cancelled() {
                return;
            }
            if !trigger.filters.matches(&message) {
                continue;
            }
            if !evaluate(&trigger.condition, &message) {
                continue;
            }

            let started = tokio::time::Instant::now();
            let mut outcomes = Vec::with_capacity(trigger.actions.len());
            for action in &trigger.actions {
                outcomes.push(execute_action(action, &message, store.as_ref()).await);
            }
            let status = aggregate(&outcomes);
            let duration = started.elapsed();

            let entry = ExecutionLogEntry {
                trigger_id: trigger.id,
                message_id: message.dedup_key().into_owned(),
                status,
                outcomes: outcomes.clone(),
                duration,
                executed_at: Utc::now(),
            };

            if trigger.enable_logging {
                let mut guard = log.lock().await;
                guard.push(entry);
            }

            update_stats(&stats, trigger.id, status, &outcomes);

            if status != FiringStatus::Success {
                warn!(trigger_id = trigger.id, ?status, "trigger firing had failed actions");
            }
        }

        last_check = Utc::now();
    }
}

fn update_stats(
    stats: &DashMap<u64, TriggerStats>,
    trigger_id: u64,
    status: FiringStatus,
    outcomes: &[ActionOutcome],
) {
    let last_error = outcomes
        .iter()
        .find(|o| !o.success)
        .map(|o| o.detail.clone());

    stats
        .entry(trigger_id)
        .and_modify(|s| {
            s.total += 1;
            if status == FiringStatus::Success {
                s.success += 1;
            }
            s.last_executed_millis = Some(Utc::now().timestamp_millis());
            if let Some(err) = &last_error {
                s.last_error = Some(err.clone());
            }
        })
        .or_insert_with(|| TriggerStats {
            total: 1,
            success: u64::from(status == FiringStatus::Success),
            last_executed_millis: Some(Utc::now().timestamp_millis()),
            last_error,
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Address;
    use crate::store::InMemoryStore;

    fn message(subject: &str) -> Message {
        Message {
            id: 1,
            account_id: 1,
            folder: "INBOX".into(),
            message_id: "a@b.com".into(),
            envelope_date: None,
            received_date: Utc::now(),
            from: vec![Address::bare("alerts@example.com")],
            to: vec![],
            cc: vec![],
            bcc: vec![],
            subject: subject.into(),
            flags: vec![],
            plain_body: None,
            html_body: None,
            size: 0,
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn seed_scenario_trigger_match_on_subject_contains() {
        let condition = TriggerCondition::Leaf(Leaf::SubjectContains {
            value: "alert".into(),
        });
        condition.validate().unwrap();

        let msg = message("system alert: disk full");
        assert!(evaluate(&condition, &msg));

        let store = InMemoryStore::new();
        let outcomes = vec![execute_action(&TriggerAction::Log, &msg, &store).await];
        assert_eq!(aggregate(&outcomes), FiringStatus::Success);
    }

    #[tokio::test]
    async fn mark_read_action_flips_the_store_flag_once() {
        let store = InMemoryStore::new();
        let inserted = store.put_batch(vec![message("invoice")]).await.unwrap();
        let msg = inserted.into_iter().next().unwrap();

        let first = execute_action(&TriggerAction::MarkRead, &msg, &store).await;
        assert_eq!(first.detail, "marked read");

        let second = execute_action(&TriggerAction::MarkRead, &msg, &store).await;
        assert_eq!(second.detail, "already read");
    }

    #[test]
    fn and_requires_all_terms() {
        let condition = TriggerCondition::And {
            terms: vec![
                TriggerCondition::Leaf(Leaf::SubjectContains { value: "alert".into() }),
                TriggerCondition::Leaf(Leaf::HasAttachment),
            ],
        };
        let msg = message("alert here");
        assert!(!evaluate(&condition, &msg));
    }

    #[test]
    fn not_negates_term() {
        let condition = TriggerCondition::Not {
            term: Box::new(TriggerCondition::Leaf(Leaf::SubjectContains {
                value: "alert".into(),
            })),
        };
        assert!(evaluate(&condition, &message("quiet day")));
        assert!(!evaluate(&condition, &message("alert!")));
    }

    #[test]
    fn validate_rejects_empty_and() {
        let condition = TriggerCondition::And { terms: vec![] };
        assert!(condition.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_regex() {
        let condition = TriggerCondition::Leaf(Leaf::SubjectMatches {
            pattern: "[".into(),
        });
        assert!(condition.validate().is_err());
    }

    #[test]
    fn validate_rejects_excessive_nesting() {
        let mut condition = TriggerCondition::Leaf(Leaf::HasAttachment);
        for _ in 0..MAX_CONDITION_DEPTH + 2 {
            condition = TriggerCondition::Not {
                term: Box::new(condition),
            };
        }
        assert!(condition.validate().is_err());
    }

    #[test]
    fn aggregate_is_partial_on_mixed_outcomes() {
        let outcomes = vec![
            ActionOutcome {
                success: true,
                detail: "ok".into(),
            },
            ActionOutcome {
                success: false,
                detail: "failed".into(),
            },
        ];
        assert_eq!(aggregate(&outcomes), FiringStatus::Partial);
    }

    #[test]
    fn aggregate_is_failed_when_all_fail() {
        let outcomes = vec![ActionOutcome {
            success: false,
            detail: "failed".into(),
        }];
        assert_eq!(aggregate(&outcomes), FiringStatus::Failed);
    }

    #[test]
    fn trigger_filters_narrow_on_attachment_and_unread() {
        let filters = TriggerFilters {
            has_attachment: Some(false),
            unread: Some(true),
            ..Default::default()
        };
        assert!(filters.matches(&message("quiet")));

        let mut seen = message("quiet");
        seen.flags.push(crate::message::Flag::Seen);
        assert!(!filters.matches(&seen));
    }

    #[test]
    fn trigger_filters_narrow_on_folder() {
        let filters = TriggerFilters {
            folders: vec!["Receipts".into()],
            ..Default::default()
        };
        let mut msg = message("order confirmed");
        assert!(!filters.matches(&msg));
        msg.folder = "receipts".into();
        assert!(filters.matches(&msg));
    }
}
