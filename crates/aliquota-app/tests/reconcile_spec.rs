//! Properties of the pure history reconciliation, exercised without any
//! network dependency: a fixed sequence of parsed row lists must produce a
//! deterministic verdict.

use chrono::{NaiveDateTime, TimeDelta};
use url::Url;

use aliquota_app::portal::{
    ArtifactDescriptor, HistoryRow, PollVerdict, PortalError, Reconciler,
};

fn submitted() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2025-07-01 12:00:00", "%Y-%m-%d %H:%M:%S").expect("timestamp")
}

fn ready_named(generated_at: NaiveDateTime, file: &str) -> HistoryRow {
    let token = format!("{}000", generated_at.format("%Y%m%d%H%M%S"));
    let url = Url::parse(&format!(
        "https://portal.example/TabelaAliquota/Download/{token}/{file}"
    ))
    .expect("download url");
    HistoryRow::Ready(ArtifactDescriptor {
        download_url: url,
        generated_at,
    })
}

fn ready_at(generated_at: NaiveDateTime) -> HistoryRow {
    ready_named(generated_at, "tabela.zip")
}

#[test]
fn in_window_row_resolves_on_first_attempt() {
    let mut reconciler = Reconciler::new(submitted());
    let generated_at = submitted() - TimeDelta::hours(1);

    match reconciler.observe(&[ready_at(generated_at)]) {
        PollVerdict::Resolved(artifact) => assert_eq!(artifact.generated_at, generated_at),
        other => panic!("expected resolution on attempt 1, got {other:?}"),
    }
    assert_eq!(reconciler.attempts(), 1);
}

#[test]
fn window_boundaries_are_inclusive() {
    for delta in [TimeDelta::hours(-3), TimeDelta::hours(1)] {
        let mut reconciler = Reconciler::new(submitted());
        let verdict = reconciler.observe(&[ready_at(submitted() + delta)]);
        assert!(
            matches!(verdict, PollVerdict::Resolved(_)),
            "offset {delta} should resolve"
        );
    }

    for delta in [
        TimeDelta::hours(-3) - TimeDelta::seconds(1),
        TimeDelta::hours(1) + TimeDelta::seconds(1),
    ] {
        let mut reconciler = Reconciler::new(submitted());
        let verdict = reconciler.observe(&[ready_at(submitted() + delta)]);
        assert_eq!(
            verdict,
            PollVerdict::KeepWaiting { pending: false },
            "offset {delta} must not resolve on attempt 1"
        );
    }
}

#[test]
fn pending_only_polls_never_resolve() {
    let mut reconciler = Reconciler::new(submitted());
    for _ in 0..40 {
        assert_eq!(
            reconciler.observe(&[HistoryRow::Pending]),
            PollVerdict::KeepWaiting { pending: true }
        );
    }
    assert!(matches!(reconciler.finish(), Err(PortalError::NoHistory)));
}

#[test]
fn later_poll_still_resolves_after_pending_attempts() {
    let mut reconciler = Reconciler::new(submitted());
    for _ in 0..2 {
        reconciler.observe(&[HistoryRow::Pending]);
    }

    let generated_at = submitted() + TimeDelta::minutes(10);
    match reconciler.observe(&[ready_at(generated_at)]) {
        PollVerdict::Resolved(artifact) => assert_eq!(artifact.generated_at, generated_at),
        other => panic!("expected resolution once the artifact appeared, got {other:?}"),
    }
}

#[test]
fn stale_candidate_with_pending_rows_times_out_at_exhaustion() {
    let mut reconciler = Reconciler::new(submitted());
    let stale = submitted() - TimeDelta::hours(4);

    for _ in 0..5 {
        assert_eq!(
            reconciler.observe(&[ready_at(stale), HistoryRow::Pending]),
            PollVerdict::KeepWaiting { pending: true }
        );
    }

    match reconciler.finish() {
        Err(PortalError::Timeout { newest }) => assert_eq!(newest, Some(stale)),
        other => panic!("expected timeout for a stale candidate, got {other:?}"),
    }
}

#[test]
fn candidate_newer_than_the_skew_margin_is_returned_at_exhaustion() {
    let mut reconciler = Reconciler::new(submitted());
    // Outside the acceptance window (too far after submission) but well
    // within the exhaustion skew margin.
    let late = submitted() + TimeDelta::hours(2);

    for _ in 0..5 {
        assert_eq!(
            reconciler.observe(&[ready_at(late), HistoryRow::Pending]),
            PollVerdict::KeepWaiting { pending: true }
        );
    }

    let artifact = reconciler.finish().expect("candidate within margin");
    assert_eq!(artifact.generated_at, late);
}

#[test]
fn settled_polls_fall_back_to_the_newest_candidate_after_three_attempts() {
    let mut reconciler = Reconciler::new(submitted());
    let stale = submitted() - TimeDelta::hours(4);

    assert_eq!(
        reconciler.observe(&[ready_at(stale)]),
        PollVerdict::KeepWaiting { pending: false }
    );
    assert_eq!(
        reconciler.observe(&[ready_at(stale)]),
        PollVerdict::KeepWaiting { pending: false }
    );
    match reconciler.observe(&[ready_at(stale)]) {
        PollVerdict::Resolved(artifact) => assert_eq!(artifact.generated_at, stale),
        other => panic!("expected last-resort fallback on attempt 3, got {other:?}"),
    }
}

#[test]
fn empty_polls_do_not_trigger_the_fallback() {
    let mut reconciler = Reconciler::new(submitted());
    let stale = submitted() - TimeDelta::hours(4);

    reconciler.observe(&[ready_at(stale)]);
    assert_eq!(
        reconciler.observe(&[]),
        PollVerdict::KeepWaiting { pending: false }
    );
    assert_eq!(
        reconciler.observe(&[]),
        PollVerdict::KeepWaiting { pending: false }
    );

    // The next poll that actually sees the table may fall back.
    assert!(matches!(
        reconciler.observe(&[ready_at(stale)]),
        PollVerdict::Resolved(_)
    ));
}

#[test]
fn newest_candidate_wins_across_attempts() {
    let mut reconciler = Reconciler::new(submitted());
    let older = submitted() - TimeDelta::hours(5);
    let newer = submitted() - TimeDelta::hours(4);

    reconciler.observe(&[ready_named(older, "old.zip")]);
    reconciler.observe(&[ready_named(newer, "new.zip")]);

    match reconciler.observe(&[ready_named(older, "old.zip")]) {
        PollVerdict::Resolved(artifact) => {
            assert_eq!(artifact.generated_at, newer);
            assert!(artifact.download_url.path().ends_with("new.zip"));
        }
        other => panic!("expected fallback to the newest candidate, got {other:?}"),
    }
}

#[test]
fn equal_timestamps_keep_the_first_candidate_seen() {
    let mut reconciler = Reconciler::new(submitted());
    let stale = submitted() - TimeDelta::hours(4);
    let rows = [ready_named(stale, "first.zip"), ready_named(stale, "second.zip")];

    reconciler.observe(&rows);
    reconciler.observe(&rows);

    match reconciler.observe(&rows) {
        PollVerdict::Resolved(artifact) => {
            assert!(artifact.download_url.path().ends_with("first.zip"));
        }
        other => panic!("expected a stable tie-break, got {other:?}"),
    }
}

#[test]
fn exhaustion_without_any_candidate_reports_no_history() {
    let mut reconciler = Reconciler::new(submitted());
    for _ in 0..3 {
        reconciler.observe(&[]);
    }
    assert!(matches!(reconciler.finish(), Err(PortalError::NoHistory)));
}
