//! Status history ledger.
//!
//! Defines the intake state machine over a record's status trail:
//! `PENDING/INITIAL` on first write, then `INIT/PROCESSED` once the queue
//! has accepted the message. Downstream systems may add further states;
//! none of them originate here.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{Stage, Status, StatusEntry};

/// What `advance` does with the existing trail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// Keep every entry; the trail only grows.
    #[default]
    Append,
    /// Keep only the latest transition. Loses the PENDING entry after the
    /// first advance.
    Replace,
}

impl std::str::FromStr for HistoryPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(HistoryPolicy::Append),
            "replace" => Ok(HistoryPolicy::Replace),
            other => Err(Error::Config(format!(
                "unknown history policy {other:?}, expected \"append\" or \"replace\""
            ))),
        }
    }
}

impl std::fmt::Display for HistoryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryPolicy::Append => write!(f, "append"),
            HistoryPolicy::Replace => write!(f, "replace"),
        }
    }
}

/// The first entry of every record.
pub fn initial_entry(now: DateTime<Utc>) -> StatusEntry {
    StatusEntry {
        creation_date: now,
        status: Status::Pending,
        stage: Stage::Initial,
    }
}

/// Can the trail move from `from` to `to`?
pub fn can_advance(from: (&Status, &Stage), to: (&Status, &Stage)) -> bool {
    matches!(
        (from, to),
        ((Status::Pending, Stage::Initial), (Status::Init, Stage::Processed))
    )
}

/// Produce the trail after a transition to `status`/`stage`.
pub fn advance(
    current: &[StatusEntry],
    status: Status,
    stage: Stage,
    now: DateTime<Utc>,
    policy: HistoryPolicy,
) -> Result<Vec<StatusEntry>> {
    let last = current
        .last()
        .ok_or_else(|| Error::Other("cannot advance an empty status history".to_string()))?;

    if !can_advance((&last.status, &last.stage), (&status, &stage)) {
        return Err(Error::InvalidTransition {
            from: format!("{}/{}", last.status, last.stage),
            to: format!("{status}/{stage}"),
        });
    }

    let entry = StatusEntry {
        creation_date: now,
        status,
        stage,
    };

    Ok(match policy {
        HistoryPolicy::Append => {
            let mut next = current.to_vec();
            next.push(entry);
            next
        }
        HistoryPolicy::Replace => vec![entry],
    })
}

/// Shorthand for the one transition intake performs.
pub fn mark_processed(
    current: &[StatusEntry],
    now: DateTime<Utc>,
    policy: HistoryPolicy,
) -> Result<Vec<StatusEntry>> {
    advance(current, Status::Init, Stage::Processed, now, policy)
}
