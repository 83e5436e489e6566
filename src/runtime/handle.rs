use std::sync::Arc;

use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant, MissedTickBehavior, interval_at},
};
use tracing::{info, warn};

use crate::{
    burst::BurstRecord,
    call::Call,
    config::ClusterConfig,
    core::{
        stats::StatsSnapshot,
        store::{LiveStore, StoreError},
    },
    engine::{
        aggregator::{self, Attach},
        classifier::{self, ClassifyOutcome},
        sweeper::{SweepAck, Sweeper},
    },
    persist::{ArchiveSink, PersistError, SweepBatch},
    session::Session,
    types::{CallId, SessionId},
};

use super::events::EngineEvent;

/// Errors surfaced through the runtime handle.
#[derive(Debug)]
pub enum RuntimeError {
    /// The engine rejected the request.
    Store(StoreError),
    /// The archive gateway rejected a batch.
    Persist(PersistError),
    /// The engine loop is gone.
    ChannelClosed,
}

impl From<StoreError> for RuntimeError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<PersistError> for RuntimeError {
    fn from(value: PersistError) -> Self {
        Self::Persist(value)
    }
}

/// Tunables for the engine loop and its persistence worker.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Clustering thresholds.
    pub cluster: ClusterConfig,
    /// Milliseconds between periodic sweep passes.
    pub sweep_interval_ms: u64,
    /// Capacity of the command queue feeding the engine loop.
    pub ingest_queue_bound: usize,
    /// Capacity of the batch queue feeding the persistence worker.
    pub persist_queue_bound: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            sweep_interval_ms: 5_000,
            ingest_queue_bound: 256,
            persist_queue_bound: 64,
        }
    }
}

/// Cloneable handle to a spawned engine loop.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl Clone for EngineHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Ingest {
        record: BurstRecord,
    },
    SetEmergency {
        id: CallId,
        value: bool,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    GetCall {
        id: CallId,
        resp: oneshot::Sender<Option<Call>>,
    },
    GetSession {
        id: SessionId,
        resp: oneshot::Sender<Option<Session>>,
    },
    LiveCalls {
        resp: oneshot::Sender<Vec<Call>>,
    },
    LiveSessions {
        resp: oneshot::Sender<Vec<Session>>,
    },
    Stats {
        resp: oneshot::Sender<StatsSnapshot>,
    },
    Sync {
        resp: oneshot::Sender<()>,
    },
    Sweep {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Archive {
        batch: SweepBatch,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
}

enum LoopAction {
    Continue,
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

/// Spawns the engine loop and, when a sink is given, its persistence worker.
///
/// The loop owns the store; all access goes through the returned handle.
pub fn spawn_burstlog(
    store: LiveStore,
    sink: Option<Box<dyn ArchiveSink>>,
    config: RuntimeConfig,
) -> EngineHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.ingest_queue_bound);
    let (events_tx, _) = broadcast::channel::<EngineEvent>(1024);

    let (persist_tx_opt, mut ack_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
        let (ack_tx, ack_rx) = mpsc::unbounded_channel::<SweepAck>();
        spawn_persistence_worker(sink, persist_rx, ack_tx);
        (Some(persist_tx), Some(ack_rx))
    } else {
        (None, None)
    };

    let events_tx_loop = events_tx.clone();

    info!(
        sweep_interval_ms = config.sweep_interval_ms,
        persistent = persist_tx_opt.is_some(),
        "engine loop starting"
    );

    tokio::spawn(async move {
        let mut store = store;
        let mut sweeper = Sweeper::new();
        let period = Duration::from_millis(config.sweep_interval_ms.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let action = if let Some(rx) = ack_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        handle_command(
                            cmd,
                            &mut store,
                            &mut sweeper,
                            &events_tx_loop,
                            persist_tx_opt.as_ref(),
                            &config,
                        )
                    }
                    ack = rx.recv() => {
                        if let Some(ack) = ack {
                            apply_ack(&mut store, &mut sweeper, &events_tx_loop, ack);
                        }
                        LoopAction::Continue
                    }
                    _ = ticker.tick() => {
                        let _ = run_sweep(
                            &mut store,
                            &mut sweeper,
                            &events_tx_loop,
                            persist_tx_opt.as_ref(),
                            &config,
                            false,
                        );
                        LoopAction::Continue
                    }
                }
            } else {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        handle_command(
                            cmd,
                            &mut store,
                            &mut sweeper,
                            &events_tx_loop,
                            persist_tx_opt.as_ref(),
                            &config,
                        )
                    }
                    _ = ticker.tick() => {
                        let _ = run_sweep(
                            &mut store,
                            &mut sweeper,
                            &events_tx_loop,
                            persist_tx_opt.as_ref(),
                            &config,
                            false,
                        );
                        LoopAction::Continue
                    }
                }
            };

            if let LoopAction::Shutdown { resp } = action {
                let result = shutdown_sequence(
                    &mut store,
                    &mut sweeper,
                    &events_tx_loop,
                    persist_tx_opt.as_ref(),
                    &mut ack_rx,
                    &config,
                )
                .await;
                let _ = resp.send(result);
                break;
            }
        }
    });

    EngineHandle { cmd_tx, events_tx }
}

impl EngineHandle {
    /// Subscribes to the engine's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    /// Submits one burst record.
    ///
    /// Resolves once the record is queued, not once it is clustered; a full
    /// queue applies backpressure by suspending the caller. Use
    /// [`EngineHandle::sync`] to wait for everything queued so far.
    pub async fn ingest(&self, record: BurstRecord) -> Result<(), RuntimeError> {
        self.cmd_tx
            .send(Command::Ingest { record })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Sets or clears the emergency flag on a live call.
    pub async fn set_emergency(&self, id: CallId, value: bool) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetEmergency {
                id,
                value,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Reads one live call.
    pub async fn call(&self, id: CallId) -> Result<Option<Call>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::GetCall { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Reads one live session.
    pub async fn session(&self, id: SessionId) -> Result<Option<Session>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::GetSession { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Snapshot of every live call in creation order.
    pub async fn live_calls(&self) -> Result<Vec<Call>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::LiveCalls { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Snapshot of every live session in creation order.
    pub async fn live_sessions(&self) -> Result<Vec<Session>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::LiveSessions { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Counter and live-set snapshot.
    pub async fn stats(&self) -> Result<StatsSnapshot, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Stats { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Resolves once every command queued before it has been processed.
    pub async fn sync(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Sync { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Runs one sweep pass immediately.
    pub async fn sweep(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Sweep { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Expires every live entity, archives it, and stops the loop.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

fn handle_command(
    cmd: Command,
    store: &mut LiveStore,
    sweeper: &mut Sweeper,
    events_tx: &broadcast::Sender<EngineEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
) -> LoopAction {
    match cmd {
        Command::Ingest { record } => {
            ingest_record(store, &record, events_tx, &config.cluster);
        }
        Command::SetEmergency { id, value, resp } => {
            let _ = resp.send(store.set_emergency(id, value).map_err(RuntimeError::from));
        }
        Command::GetCall { id, resp } => {
            let _ = resp.send(store.call_cloned(id));
        }
        Command::GetSession { id, resp } => {
            let _ = resp.send(store.session_cloned(id));
        }
        Command::LiveCalls { resp } => {
            let _ = resp.send(store.live_calls());
        }
        Command::LiveSessions { resp } => {
            let _ = resp.send(store.live_sessions());
        }
        Command::Stats { resp } => {
            let _ = resp.send(store.stats());
        }
        Command::Sync { resp } => {
            let _ = resp.send(());
        }
        Command::Sweep { resp } => {
            let _ = resp.send(run_sweep(store, sweeper, events_tx, persist_tx, config, false));
        }
        Command::Shutdown { resp } => {
            return LoopAction::Shutdown { resp };
        }
    }
    LoopAction::Continue
}

fn ingest_record(
    store: &mut LiveStore,
    record: &BurstRecord,
    events_tx: &broadcast::Sender<EngineEvent>,
    config: &ClusterConfig,
) {
    let (call_id, created) = match classifier::classify(store, record, config) {
        ClassifyOutcome::Created(id) => (id, true),
        ClassifyOutcome::Extended(id) => (id, false),
        ClassifyOutcome::Dropped(_) => return,
    };

    if created {
        let _ = events_tx.send(EngineEvent::CallOpened {
            id: call_id,
            radio_id: record.radio_id,
        });
    } else {
        let _ = events_tx.send(EngineEvent::CallExtended { id: call_id });
    }

    match aggregator::attach_call(store, call_id, config) {
        Ok(Attach::Opened(session)) => {
            let _ = events_tx.send(EngineEvent::SessionOpened { id: session });
            let _ = events_tx.send(EngineEvent::CallAssigned {
                call: call_id,
                session,
            });
        }
        Ok(Attach::Joined(session)) => {
            let _ = events_tx.send(EngineEvent::CallAssigned {
                call: call_id,
                session,
            });
        }
        Ok(Attach::Extended(_)) => {}
        Err(err) => {
            warn!(call = call_id, error = ?err, "session placement failed");
        }
    }
}

fn run_sweep(
    store: &mut LiveStore,
    sweeper: &mut Sweeper,
    events_tx: &broadcast::Sender<EngineEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    force: bool,
) -> Result<(), RuntimeError> {
    let outcome = sweeper.plan(store, &config.cluster, force);
    let expired_calls = outcome.expired_calls;
    let expired_sessions = outcome.expired_sessions;

    let res = if outcome.batch.is_empty() {
        Ok(())
    } else if let Some(tx) = persist_tx {
        dispatch_batch(tx, sweeper, store, outcome.batch)
    } else {
        let ack = SweepAck::success(&outcome.batch);
        apply_ack(store, sweeper, events_tx, ack);
        Ok(())
    };

    let _ = events_tx.send(EngineEvent::SweepCompleted {
        expired_calls,
        expired_sessions,
    });
    res
}

fn dispatch_batch(
    tx: &mpsc::Sender<PersistMsg>,
    sweeper: &mut Sweeper,
    store: &mut LiveStore,
    batch: SweepBatch,
) -> Result<(), RuntimeError> {
    let calls = batch.call_ids();
    let sessions = batch.session_ids();
    if let Err(err) = tx.try_send(PersistMsg::Archive { batch }) {
        // Batch never left; clear its in-flight marks so the next pass
        // re-offers the same entities.
        sweeper.release(&calls, &sessions);
        store.counters_mut().persist_failures += 1;
        warn!(error = %err, "archive queue full; batch deferred");
        return Err(RuntimeError::Persist(PersistError::Message(format!(
            "archive queue error: {err}"
        ))));
    }
    Ok(())
}

fn apply_ack(
    store: &mut LiveStore,
    sweeper: &mut Sweeper,
    events_tx: &broadcast::Sender<EngineEvent>,
    ack: SweepAck,
) {
    if let Ok((calls, sessions)) = sweeper.acknowledge(store, ack) {
        for id in calls {
            let _ = events_tx.send(EngineEvent::CallClosed { id });
        }
        for id in sessions {
            let _ = events_tx.send(EngineEvent::SessionClosed { id });
        }
    }
}

async fn shutdown_sequence(
    store: &mut LiveStore,
    sweeper: &mut Sweeper,
    events_tx: &broadcast::Sender<EngineEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    ack_rx: &mut Option<mpsc::UnboundedReceiver<SweepAck>>,
    config: &RuntimeConfig,
) -> Result<(), RuntimeError> {
    let outcome = sweeper.plan(store, &config.cluster, true);
    let _ = events_tx.send(EngineEvent::SweepCompleted {
        expired_calls: outcome.expired_calls,
        expired_sessions: outcome.expired_sessions,
    });

    let Some(tx) = persist_tx else {
        if !outcome.batch.is_empty() {
            let ack = SweepAck::success(&outcome.batch);
            apply_ack(store, sweeper, events_tx, ack);
        }
        return Ok(());
    };

    let mut result = Ok(());

    if !outcome.batch.is_empty()
        && tx
            .send(PersistMsg::Archive {
                batch: outcome.batch,
            })
            .await
            .is_err()
    {
        result = Err(RuntimeError::ChannelClosed);
    }

    let (done_tx, done_rx) = oneshot::channel();
    if tx
        .send(PersistMsg::Shutdown { resp: done_tx })
        .await
        .is_err()
    {
        result = result.and(Err(RuntimeError::ChannelClosed));
    } else {
        match done_rx.await {
            Ok(flush) => result = result.and(flush.map_err(RuntimeError::from)),
            Err(_) => result = result.and(Err(RuntimeError::ChannelClosed)),
        }
    }

    // The worker dropped its ack sender on exit; drain what it produced so
    // every archived entity leaves the store before the loop stops.
    if let Some(rx) = ack_rx.as_mut() {
        while let Some(ack) = rx.recv().await {
            let failed = ack.result.is_err();
            apply_ack(store, sweeper, events_tx, ack);
            if failed {
                result = result.and(Err(RuntimeError::Persist(PersistError::Message(
                    "archive batch failed during shutdown".to_string(),
                ))));
            }
        }
    }

    result
}

fn spawn_persistence_worker(
    sink: Box<dyn ArchiveSink>,
    mut rx: mpsc::Receiver<PersistMsg>,
    ack_tx: mpsc::UnboundedSender<SweepAck>,
) {
    let sink = Arc::new(Mutex::new(sink));
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                PersistMsg::Archive { batch } => {
                    let calls = batch.call_ids();
                    let sessions = batch.session_ids();
                    let sink_ref = Arc::clone(&sink);
                    let result = match tokio::task::spawn_blocking(move || {
                        let mut sink = sink_ref.blocking_lock();
                        sink.archive(&batch)
                    })
                    .await
                    {
                        Ok(inner) => inner,
                        Err(e) => Err(PersistError::Message(format!("join error: {e}"))),
                    };
                    let _ = ack_tx.send(SweepAck {
                        calls,
                        sessions,
                        result,
                    });
                }
                PersistMsg::Shutdown { resp } => {
                    let sink_ref = Arc::clone(&sink);
                    let result = match tokio::task::spawn_blocking(move || {
                        let mut sink = sink_ref.blocking_lock();
                        sink.flush()
                    })
                    .await
                    {
                        Ok(inner) => inner,
                        Err(e) => Err(PersistError::Message(format!("join error: {e}"))),
                    };
                    let _ = resp.send(result);
                    break;
                }
            }
        }
    });
}
