use chrono::{Duration, Utc};
use event_intake::error::Error;
use event_intake::ledger::{self, HistoryPolicy};
use event_intake::model::{Stage, Status};

#[test]
fn initial_entry_is_pending_initial() {
    let now = Utc::now();
    let entry = ledger::initial_entry(now);
    assert_eq!(entry.status, Status::Pending);
    assert_eq!(entry.stage, Stage::Initial);
    assert_eq!(entry.creation_date, now);
}

#[test]
fn append_keeps_pending_entry_first() {
    let start = Utc::now();
    let history = vec![ledger::initial_entry(start)];

    let later = start + Duration::seconds(2);
    let next = ledger::mark_processed(&history, later, HistoryPolicy::Append).unwrap();

    assert_eq!(next.len(), 2);
    assert_eq!(next[0], history[0]);
    assert_eq!(next[1].status, Status::Init);
    assert_eq!(next[1].stage, Stage::Processed);
    assert_eq!(next[1].creation_date, later);
}

#[test]
fn replace_drops_prior_entries() {
    let history = vec![ledger::initial_entry(Utc::now())];

    let next = ledger::mark_processed(&history, Utc::now(), HistoryPolicy::Replace).unwrap();

    assert_eq!(next.len(), 1);
    assert_eq!(next[0].status, Status::Init);
}

#[test]
fn processed_records_cannot_advance_again() {
    let history = vec![ledger::initial_entry(Utc::now())];
    let processed = ledger::mark_processed(&history, Utc::now(), HistoryPolicy::Append).unwrap();

    let err = ledger::mark_processed(&processed, Utc::now(), HistoryPolicy::Append).unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }), "got {err:?}");
}

#[test]
fn only_pending_to_init_originates_here() {
    assert!(ledger::can_advance(
        (&Status::Pending, &Stage::Initial),
        (&Status::Init, &Stage::Processed)
    ));
    assert!(!ledger::can_advance(
        (&Status::Pending, &Stage::Initial),
        (&Status::Other("DONE".into()), &Stage::Processed)
    ));
    assert!(!ledger::can_advance(
        (&Status::Init, &Stage::Processed),
        (&Status::Pending, &Stage::Initial)
    ));
}

#[test]
fn empty_history_cannot_advance() {
    assert!(ledger::mark_processed(&[], Utc::now(), HistoryPolicy::Append).is_err());
}

#[test]
fn history_policy_parses_case_insensitively() {
    assert_eq!("append".parse::<HistoryPolicy>().unwrap(), HistoryPolicy::Append);
    assert_eq!("REPLACE".parse::<HistoryPolicy>().unwrap(), HistoryPolicy::Replace);
    assert!("merge".parse::<HistoryPolicy>().is_err());
    assert_eq!(HistoryPolicy::default(), HistoryPolicy::Append);
}
