use burstlog::{
    burst::{BurstKind, BurstRecord},
    call::Call,
    config::ClusterConfig,
    core::store::LiveStore,
    engine::{
        aggregator::{self, Attach},
        classifier::{self, ClassifyOutcome},
    },
    session::Session,
    types::{CallId, RadioId, Seconds, UsageMarker},
};

fn burst(radio: RadioId, marker: UsageMarker, ts: Seconds) -> BurstRecord {
    BurstRecord {
        radio_id: radio,
        usage_marker: marker,
        timestamp: ts,
        emergency: false,
        kind: BurstKind::Speech,
    }
}

fn call_span(id: CallId, radio: RadioId, start: Seconds, end: Seconds) -> Call {
    let mut call = Call::open_from(id, &burst(radio, 0, start));
    call.end_time = end;
    call
}

fn feed(
    store: &mut LiveStore,
    config: &ClusterConfig,
    radio: RadioId,
    marker: UsageMarker,
    ts: Seconds,
) -> (CallId, Attach) {
    let id = match classifier::classify(store, &burst(radio, marker, ts), config) {
        ClassifyOutcome::Created(id) | ClassifyOutcome::Extended(id) => id,
        ClassifyOutcome::Dropped(reason) => panic!("dropped: {reason:?}"),
    };
    let attach = aggregator::attach_call(store, id, config).expect("attach");
    (id, attach)
}

#[test]
fn reply_inside_window_scores_against_the_nearest_member() {
    let session = Session::open_from(1, &call_span(1, 0x2001, 0.0, 4.0));
    let candidate = call_span(2, 0x2002, 4.5, 5.0);

    let score = session.score(&candidate, 20.0).expect("eligible");
    assert!((score - 0.975).abs() < 1e-9);
}

#[test]
fn overlapping_candidate_is_ineligible() {
    let session = Session::open_from(1, &call_span(1, 0x2001, 0.0, 5.0));
    assert_eq!(session.score(&call_span(2, 0x2002, 2.0, 3.0), 20.0), None);
    assert_eq!(session.score(&call_span(3, 0x2002, 4.9, 7.0), 20.0), None);
}

#[test]
fn candidate_preceding_every_member_scores_above_one() {
    let session = Session::open_from(1, &call_span(1, 0x2001, 10.0, 13.0));
    let score = session
        .score(&call_span(2, 0x2002, 5.0, 9.0), 20.0)
        .expect("eligible");
    assert!((score - 1.4).abs() < 1e-9);
}

#[test]
fn gap_at_separation_is_ineligible_and_just_inside_is_not() {
    let session = Session::open_from(1, &call_span(1, 0x2001, 0.0, 5.0));
    assert_eq!(session.score(&call_span(2, 0x2002, 25.0, 26.0), 20.0), None);

    let score = session
        .score(&call_span(3, 0x2002, 24.9, 26.0), 20.0)
        .expect("eligible");
    assert!(score > 0.0 && score < 0.01);
}

#[test]
fn touching_intervals_are_compatible_with_full_affinity() {
    let session = Session::open_from(1, &call_span(1, 0x2001, 0.0, 5.0));
    assert_eq!(session.score(&call_span(2, 0x2002, 5.0, 8.0), 20.0), Some(1.0));
}

#[test]
fn reply_joins_the_existing_session() {
    let mut store = LiveStore::new();
    let config = ClusterConfig::default();

    let (_, attach_a) = feed(&mut store, &config, 0x2001, 10, 0.0);
    let session_id = match attach_a {
        Attach::Opened(id) => id,
        other => panic!("unexpected attach: {other:?}"),
    };
    feed(&mut store, &config, 0x2001, 10, 4.0);

    let (_, attach_b) = feed(&mut store, &config, 0x2002, 20, 4.5);
    assert_eq!(attach_b, Attach::Joined(session_id));

    let session = store.session(session_id).expect("session");
    assert_eq!(session.call_count(), 2);
    assert_eq!(session.start_time, 0.0);
    assert_eq!(session.end_time, 4.5);
}

#[test]
fn overlapping_speaker_opens_a_second_session() {
    let mut store = LiveStore::new();
    let config = ClusterConfig::default();

    let (_, attach_a) = feed(&mut store, &config, 0x2001, 10, 0.0);
    feed(&mut store, &config, 0x2001, 10, 5.0);

    let (_, attach_b) = feed(&mut store, &config, 0x2002, 20, 2.0);
    let second = match attach_b {
        Attach::Opened(id) => id,
        other => panic!("unexpected attach: {other:?}"),
    };
    assert_ne!(attach_a, Attach::Opened(second));
    assert_eq!(store.live_sessions().len(), 2);
}

#[test]
fn tied_scores_join_the_first_created_session() {
    let mut store = LiveStore::new();
    let config = ClusterConfig::default();

    // Two sessions whose members both end at t=10, so a candidate at t=11
    // scores identically against each.
    let (_, attach_a) = feed(&mut store, &config, 0x2001, 10, 0.0);
    let first = match attach_a {
        Attach::Opened(id) => id,
        other => panic!("unexpected attach: {other:?}"),
    };
    feed(&mut store, &config, 0x2001, 10, 10.0);

    let (_, attach_b) = feed(&mut store, &config, 0x2002, 20, 1.0);
    assert!(matches!(attach_b, Attach::Opened(_)));
    feed(&mut store, &config, 0x2002, 20, 10.0);

    let (_, attach_c) = feed(&mut store, &config, 0x2003, 30, 11.0);
    assert_eq!(attach_c, Attach::Joined(first));
}

#[test]
fn candidate_joins_the_session_with_the_smaller_gap() {
    let mut store = LiveStore::new();
    let config = ClusterConfig::default();

    // First session's member spans [0, 4]; the second speaker overlaps it,
    // forcing a second session spanning [3, 9].
    let (_, attach_a) = feed(&mut store, &config, 0x2001, 10, 0.0);
    let first = match attach_a {
        Attach::Opened(id) => id,
        other => panic!("unexpected attach: {other:?}"),
    };
    feed(&mut store, &config, 0x2001, 10, 4.0);

    let (_, attach_b) = feed(&mut store, &config, 0x2002, 20, 3.0);
    let second = match attach_b {
        Attach::Opened(id) => id,
        other => panic!("unexpected attach: {other:?}"),
    };
    feed(&mut store, &config, 0x2002, 20, 9.0);

    // Gap 6 to the first session (score 0.7), gap 1 to the second (0.95).
    let (_, attach_c) = feed(&mut store, &config, 0x2003, 30, 10.0);
    assert_eq!(attach_c, Attach::Joined(second));
    assert_ne!(first, second);
}

#[test]
fn admission_extends_the_window_but_never_rewinds_its_start() {
    let mut store = LiveStore::new();
    let config = ClusterConfig::default();

    let (_, attach_a) = feed(&mut store, &config, 0x2001, 10, 5.0);
    let session_id = match attach_a {
        Attach::Opened(id) => id,
        other => panic!("unexpected attach: {other:?}"),
    };
    feed(&mut store, &config, 0x2001, 10, 8.0);

    feed(&mut store, &config, 0x2002, 20, 9.0);
    let session = store.session(session_id).expect("session");
    assert_eq!(session.end_time, 9.0);

    // A candidate preceding every member still joins; the window keeps its
    // original start.
    let (_, attach_c) = feed(&mut store, &config, 0x2003, 30, 1.0);
    assert_eq!(attach_c, Attach::Joined(session_id));
    let session = store.session(session_id).expect("session");
    assert_eq!(session.start_time, 5.0);
    assert_eq!(session.end_time, 9.0);
    assert_eq!(session.call_count(), 3);
}

#[test]
fn assigned_call_extension_tracks_member_span_and_session_end() {
    let mut store = LiveStore::new();
    let config = ClusterConfig::default();

    let (call_id, attach) = feed(&mut store, &config, 0x2001, 10, 0.0);
    let session_id = match attach {
        Attach::Opened(id) => id,
        other => panic!("unexpected attach: {other:?}"),
    };

    let (extended_id, attach) = feed(&mut store, &config, 0x2001, 10, 2.0);
    assert_eq!(extended_id, call_id);
    assert_eq!(attach, Attach::Extended(session_id));

    let session = store.session(session_id).expect("session");
    assert_eq!(session.end_time, 2.0);
    let span = session
        .members
        .iter()
        .find(|span| span.call == call_id)
        .expect("member span");
    assert_eq!(span.end, 2.0);
}
