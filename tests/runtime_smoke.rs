use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use tokio::{
    sync::broadcast,
    time::{Duration, sleep, timeout},
};

use burstlog::{
    burst::{BurstKind, BurstRecord},
    call::Call,
    core::{
        stats::StatsSnapshot,
        store::{LiveStore, StoreError},
    },
    persist::{ArchiveSink, PersistError, PersistResult, sqlite::SqliteArchive},
    runtime::{
        events::EngineEvent,
        handle::{EngineHandle, RuntimeConfig, RuntimeError, spawn_burstlog},
    },
    session::Session,
    types::{CallId, Phase, RadioId, Seconds, UsageMarker},
};
use tempfile::TempDir;

fn burst(radio: RadioId, marker: UsageMarker, ts: Seconds) -> BurstRecord {
    BurstRecord {
        radio_id: radio,
        usage_marker: marker,
        timestamp: ts,
        emergency: false,
        kind: BurstKind::Speech,
    }
}

/// Periodic sweeps pushed far out; tests drive sweeps explicitly.
fn quiet_config() -> RuntimeConfig {
    RuntimeConfig {
        sweep_interval_ms: 600_000,
        ..RuntimeConfig::default()
    }
}

async fn next_event(sub: &mut broadcast::Receiver<EngineEvent>) -> EngineEvent {
    timeout(Duration::from_secs(1), sub.recv())
        .await
        .expect("event within deadline")
        .expect("event stream open")
}

async fn wait_for(handle: &EngineHandle, pred: impl Fn(&StatsSnapshot) -> bool) -> StatsSnapshot {
    for _ in 0..200 {
        let stats = handle.stats().await.expect("stats");
        if pred(&stats) {
            return stats;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("stats condition not reached");
}

/// Archive that fails every call write while the flag is set.
struct FlakySink {
    fail: Arc<AtomicBool>,
    persisted: Arc<Mutex<Vec<CallId>>>,
}

impl ArchiveSink for FlakySink {
    fn allocate_next_id(&mut self) -> PersistResult<u64> {
        Ok(1)
    }

    fn persist_call(&mut self, call: &Call) -> PersistResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistError::Message("injected".to_string()));
        }
        self.persisted.lock().expect("lock").push(call.id);
        Ok(())
    }

    fn persist_session(&mut self, _session: &Session) -> PersistResult<()> {
        Ok(())
    }

    fn persist_radio_sighting(
        &mut self,
        _radio_id: RadioId,
        _last_seen: Seconds,
    ) -> PersistResult<()> {
        Ok(())
    }
}

/// Archive that stalls on every call write.
struct SlowSink {
    started: Arc<AtomicUsize>,
}

impl ArchiveSink for SlowSink {
    fn allocate_next_id(&mut self) -> PersistResult<u64> {
        Ok(1)
    }

    fn persist_call(&mut self, _call: &Call) -> PersistResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(750));
        Ok(())
    }

    fn persist_session(&mut self, _session: &Session) -> PersistResult<()> {
        Ok(())
    }

    fn persist_radio_sighting(
        &mut self,
        _radio_id: RadioId,
        _last_seen: Seconds,
    ) -> PersistResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn ingest_clusters_and_emits_ordered_events() {
    let handle = spawn_burstlog(LiveStore::new(), None, quiet_config());
    let mut sub = handle.subscribe();

    handle.ingest(burst(0x2001, 10, 0.0)).await.expect("ingest");
    handle.ingest(burst(0x2001, 11, 0.4)).await.expect("ingest");
    handle.sync().await.expect("sync");

    let calls = handle.live_calls().await.expect("calls");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, 1);
    assert_eq!(calls[0].start_time, 0.0);
    assert_eq!(calls[0].end_time, 0.4);

    let sessions = handle.live_sessions().await.expect("sessions");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, 2);
    assert_eq!(sessions[0].end_time, 0.4);

    assert!(handle.call(1).await.expect("call").is_some());
    assert!(handle.session(2).await.expect("session").is_some());

    let stats = handle.stats().await.expect("stats");
    assert_eq!(stats.counters.bursts_accepted, 2);
    assert_eq!(stats.counters.calls_opened, 1);
    assert_eq!(stats.counters.sessions_opened, 1);
    assert_eq!(stats.next_id, 3);

    let mut events = Vec::new();
    for _ in 0..4 {
        events.push(next_event(&mut sub).await);
    }
    assert_eq!(
        events,
        vec![
            EngineEvent::CallOpened {
                id: 1,
                radio_id: 0x2001
            },
            EngineEvent::SessionOpened { id: 2 },
            EngineEvent::CallAssigned { call: 1, session: 2 },
            EngineEvent::CallExtended { id: 1 },
        ]
    );

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn manual_sweep_without_sink_closes_idle_entities() {
    let handle = spawn_burstlog(LiveStore::new(), None, quiet_config());

    handle.ingest(burst(0x2001, 10, 0.0)).await.expect("ingest");
    // A later burst from another radio moves the engine clock forward.
    handle.ingest(burst(0x2777, 30, 10.0)).await.expect("ingest");
    handle.sync().await.expect("sync");

    let mut sub = handle.subscribe();
    handle.sweep().await.expect("sweep");

    assert_eq!(next_event(&mut sub).await, EngineEvent::CallClosed { id: 1 });
    assert_eq!(
        next_event(&mut sub).await,
        EngineEvent::SweepCompleted {
            expired_calls: 1,
            expired_sessions: 0
        }
    );

    let calls = handle.live_calls().await.expect("calls");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].radio_id, 0x2777);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn shutdown_archives_open_entities_for_restart() {
    let dir = TempDir::new().expect("tmp");
    let db_path = dir.path().join("burstlog.db");

    {
        let mut archive = SqliteArchive::open(&db_path).expect("open");
        let first_id = archive.allocate_next_id().expect("allocate");
        assert_eq!(first_id, 1);

        let store = LiveStore::with_first_id(first_id);
        let handle = spawn_burstlog(store, Some(Box::new(archive)), quiet_config());

        handle.ingest(burst(0x2001, 10, 0.0)).await.expect("ingest");
        handle.ingest(burst(0x2002, 20, 0.5)).await.expect("ingest");
        handle.sync().await.expect("sync");
        handle.shutdown().await.expect("shutdown");
    }

    let mut archive = SqliteArchive::open(&db_path).expect("reopen");
    assert_eq!(archive.call_count().expect("calls"), 2);
    assert_eq!(archive.session_count().expect("sessions"), 1);
    assert_eq!(archive.allocate_next_id().expect("allocate"), 4);

    let session = archive.load_session(2).expect("load").expect("present");
    assert_eq!(session.call_count, 2);

    let call = archive.load_call(1).expect("load").expect("present");
    assert_eq!(call.radio_id, 0x2001);
    assert_eq!(call.session_id, Some(2));
    assert_eq!(archive.radio_last_seen(0x2002).expect("seen"), Some(0.5));
}

#[tokio::test]
async fn failed_archive_keeps_entities_live_for_retry() {
    let fail = Arc::new(AtomicBool::new(false));
    let persisted = Arc::new(Mutex::new(Vec::new()));
    let sink = FlakySink {
        fail: Arc::clone(&fail),
        persisted: Arc::clone(&persisted),
    };
    let handle = spawn_burstlog(LiveStore::new(), Some(Box::new(sink)), quiet_config());

    handle.ingest(burst(0x2001, 10, 0.0)).await.expect("ingest");
    handle.ingest(burst(0x2777, 30, 10.0)).await.expect("ingest");
    handle.sync().await.expect("sync");

    fail.store(true, Ordering::SeqCst);
    handle.sweep().await.expect("sweep dispatch");
    wait_for(&handle, |stats| stats.counters.persist_failures >= 1).await;

    // The failed batch left the call closing but live.
    let call = handle.call(1).await.expect("call").expect("still live");
    assert_eq!(call.phase, Phase::Closing);

    fail.store(false, Ordering::SeqCst);
    handle.sweep().await.expect("retry sweep");
    wait_for(&handle, |stats| stats.counters.calls_closed >= 1).await;

    assert!(handle.call(1).await.expect("call").is_none());
    assert_eq!(persisted.lock().expect("lock").as_slice(), &[1]);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn archive_queue_pressure_surfaces_as_sweep_error() {
    let started = Arc::new(AtomicUsize::new(0));
    let sink = SlowSink {
        started: Arc::clone(&started),
    };
    let config = RuntimeConfig {
        persist_queue_bound: 1,
        ..quiet_config()
    };
    let handle = spawn_burstlog(LiveStore::new(), Some(Box::new(sink)), config);

    handle.ingest(burst(0x2001, 10, 0.0)).await.expect("ingest");
    handle.ingest(burst(0x2002, 20, 10.0)).await.expect("ingest");
    handle.sync().await.expect("sync");
    handle.sweep().await.expect("first sweep");

    // Once the worker is inside the first batch the queue slot is free.
    for _ in 0..200 {
        if started.load(Ordering::SeqCst) >= 1 {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert!(started.load(Ordering::SeqCst) >= 1, "worker never started");

    handle.ingest(burst(0x2003, 40, 20.0)).await.expect("ingest");
    handle.sweep().await.expect("second sweep");

    handle.ingest(burst(0x2004, 60, 30.0)).await.expect("ingest");
    let res = handle.sweep().await;
    assert!(matches!(res, Err(RuntimeError::Persist(_))));

    let stats = handle.stats().await.expect("stats");
    assert!(stats.counters.persist_failures >= 1);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn set_emergency_round_trips_and_reports_missing() {
    let handle = spawn_burstlog(LiveStore::new(), None, quiet_config());

    handle.ingest(burst(0x2001, 10, 0.0)).await.expect("ingest");
    handle.sync().await.expect("sync");

    handle.set_emergency(1, true).await.expect("set");
    let call = handle.call(1).await.expect("call").expect("live");
    assert!(call.is_emergency);

    let missing = handle.set_emergency(9999, true).await;
    assert!(matches!(
        missing,
        Err(RuntimeError::Store(StoreError::MissingCall(9999)))
    ));

    handle.set_emergency(1, false).await.expect("clear");
    let call = handle.call(1).await.expect("call").expect("live");
    assert!(!call.is_emergency);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn interval_sweeps_run_unattended() {
    let config = RuntimeConfig {
        sweep_interval_ms: 50,
        ..RuntimeConfig::default()
    };
    let handle = spawn_burstlog(LiveStore::new(), None, config);
    let mut sub = handle.subscribe();

    handle.ingest(burst(0x2001, 10, 0.0)).await.expect("ingest");
    handle.ingest(burst(0x2777, 30, 10.0)).await.expect("ingest");
    handle.sync().await.expect("sync");

    loop {
        let event = timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("idle call closed by a periodic sweep")
            .expect("event stream open");
        if matches!(event, EngineEvent::CallClosed { id: 1 }) {
            break;
        }
    }

    let stats = handle.stats().await.expect("stats");
    assert!(stats.counters.sweeps >= 1);
    assert_eq!(stats.live_calls, 1);

    handle.shutdown().await.expect("shutdown");
}
