//! Multi-stream runtime
//!
//! ```text
//!  add_stream ─► pipeline task ─┐                       ┌─► CasterEvent::Epoch
//!  add_stream ─► pipeline task ─┼─► mpsc ─► collector ──┼─► CasterEvent::Health
//!  add_stream ─► pipeline task ─┘    (owns the           └─► CasterEvent::StreamEnded
//!        │                           EpochSynchronizer)
//!        └──────────────► EphemerisStore (shared)
//! ```
//!
//! The collector is the single writer of the synchronizer, so buckets are
//! never appended to concurrently. Output goes through one bounded channel;
//! when the consumer stalls, closed epochs wait in the synchronizer, whose
//! bucket bound drops the oldest. Stream-end notices are queued apart and
//! go out before anything else, so a slow consumer never loses one.

mod pipeline;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hifitime::Epoch;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::{ChunkSource, ClientConfig, NtripClient};
use crate::ephemeris::EphemerisStore;
use crate::error::ClientError;
use crate::message::{time, MessageBuilder};
use crate::stats::{StreamStats, SyncStats};
use crate::sync::{EpochSynchronizer, HealthEvent, SyncConfig, SyncedEpoch};

use pipeline::{Pipeline, PipelineMessage, SharedStats};

/// Shortest accepted bucket check period
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Everything the caster hands to its consumer
#[derive(Debug)]
pub enum CasterEvent {
    /// All stations' observations for one time tag, in time order
    Epoch(SyncedEpoch),
    /// Stream health transition
    Health(HealthEvent),
    /// A pipeline finished; `error` is set when it failed
    StreamEnded {
        station: String,
        error: Option<String>,
    },
}

/// Outcome of [`Caster::shutdown`]
#[derive(Debug)]
pub struct ShutdownReport {
    /// Final synchronizer counters
    pub sync: SyncStats,
    /// Streams that ended with an error
    pub failures: Vec<(String, ClientError)>,
    /// Streams whose task panicked
    pub panicked: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.panicked.is_empty()
    }
}

/// Runs one pipeline per stream and the collector merging them
pub struct Caster {
    store: Arc<EphemerisStore>,
    stats: SharedStats,
    tx: mpsc::Sender<PipelineMessage>,
    stop_tx: watch::Sender<bool>,
    sync_stats: watch::Receiver<SyncStats>,
    pipelines: Vec<(String, JoinHandle<Result<(), ClientError>>)>,
    collector: JoinHandle<SyncStats>,
    cleanup: Option<JoinHandle<()>>,
}

impl Caster {
    /// Start the collector. Must be called inside a tokio runtime.
    pub fn new(config: SyncConfig) -> (Self, mpsc::Receiver<CasterEvent>) {
        let (tx, rx) = mpsc::channel(config.input_capacity.max(1));
        let (out_tx, out_rx) = mpsc::channel(config.output_capacity.max(1));
        let (stop_tx, _) = watch::channel(false);
        let (stats_tx, sync_stats) = watch::channel(SyncStats::default());

        let collector = tokio::spawn(run_collector(
            EpochSynchronizer::new(config),
            rx,
            out_tx,
            stats_tx,
        ));

        let caster = Self {
            store: Arc::new(EphemerisStore::new()),
            stats: Arc::new(RwLock::new(HashMap::new())),
            tx,
            stop_tx,
            sync_stats,
            pipelines: Vec::new(),
            collector,
            cleanup: None,
        };
        (caster, out_rx)
    }

    /// Periodically purge expired ephemerides
    pub fn with_ephemeris_cleanup(mut self, interval: Duration) -> Self {
        if let Some(old) = self.cleanup.take() {
            old.abort();
        }
        self.cleanup = Some(self.store.spawn_cleanup_task(interval));
        self
    }

    /// Add a stream whose time tags are resolved against the system clock
    pub fn add_stream<S>(&mut self, station: impl Into<String>, source: S)
    where
        S: ChunkSource + Sync + 'static,
    {
        let mut builder = MessageBuilder::new(station);
        if let Some(now) = time::now() {
            builder = builder.with_hint(now);
        }
        self.spawn_pipeline(builder, source);
    }

    /// Add a stream with an explicit reference time, e.g. for replaying a
    /// recording
    pub fn add_stream_with_hint<S>(&mut self, station: impl Into<String>, source: S, hint: Epoch)
    where
        S: ChunkSource + Sync + 'static,
    {
        self.spawn_pipeline(MessageBuilder::new(station).with_hint(hint), source);
    }

    /// Connect to a mountpoint and stream it under the mountpoint's name
    pub fn add_mountpoint(&mut self, config: ClientConfig) -> Result<(), ClientError> {
        let url = config.parse_url()?;
        let station = url.mountpoint().to_string();
        if station.is_empty() {
            return Err(ClientError::InvalidUrl(config.url.clone()));
        }

        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        let stats = Arc::clone(&self.stats);
        let stop = self.stop_tx.subscribe();
        let hint = time::now();
        let name = station.clone();

        let handle = tokio::spawn(async move {
            let client = match NtripClient::connect(config, stop.clone()).await {
                Ok(client) => client,
                Err(ClientError::Stopped) => {
                    tracing::debug!(station = %name, "Stopped while connecting");
                    let _ = tx
                        .send(PipelineMessage::Ended {
                            station: name,
                            error: None,
                        })
                        .await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(station = %name, error = %e, "Connection failed");
                    let _ = tx
                        .send(PipelineMessage::Ended {
                            station: name,
                            error: Some(e.to_string()),
                        })
                        .await;
                    return Err(e);
                }
            };
            let mut builder = MessageBuilder::new(name);
            if let Some(hint) = hint {
                builder = builder.with_hint(hint);
            }
            Pipeline::new(builder, client, store, tx, stats, stop).run().await
        });
        self.pipelines.push((station, handle));
        Ok(())
    }

    fn spawn_pipeline<S>(&mut self, builder: MessageBuilder, source: S)
    where
        S: ChunkSource + Sync + 'static,
    {
        let station = builder.station().to_string();
        let pipeline = Pipeline::new(
            builder,
            source,
            Arc::clone(&self.store),
            self.tx.clone(),
            Arc::clone(&self.stats),
            self.stop_tx.subscribe(),
        );
        self.pipelines.push((station, tokio::spawn(pipeline.run())));
    }

    /// Shared ephemeris store
    pub fn ephemerides(&self) -> Arc<EphemerisStore> {
        Arc::clone(&self.store)
    }

    pub async fn stream_stats(&self, station: &str) -> Option<StreamStats> {
        self.stats.read().await.get(station).cloned()
    }

    pub async fn all_stream_stats(&self) -> Vec<StreamStats> {
        let mut all: Vec<StreamStats> = self.stats.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.mountpoint.cmp(&b.mountpoint));
        all
    }

    /// Latest synchronizer counters
    pub fn sync_stats(&self) -> SyncStats {
        self.sync_stats.borrow().clone()
    }

    pub fn stream_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Stop every pipeline, flush the synchronizer and wait for the
    /// collector. Reports the final synchronizer counters and every stream
    /// that failed.
    pub async fn shutdown(self) -> ShutdownReport {
        let Self {
            tx,
            stop_tx,
            sync_stats,
            pipelines,
            collector,
            cleanup,
            ..
        } = self;

        tracing::info!(streams = pipelines.len(), "Shutting down");
        let _ = stop_tx.send(true);
        let mut failures = Vec::new();
        let mut panicked = Vec::new();
        for (station, handle) in pipelines {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push((station, e)),
                Err(e) => {
                    tracing::error!(station = %station, error = %e, "Pipeline task panicked");
                    panicked.push(station);
                }
            }
        }
        if let Some(cleanup) = cleanup {
            cleanup.abort();
        }

        // the collector drains once the last sender is gone
        drop(tx);
        let sync = match collector.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Collector task panicked");
                let stats = sync_stats.borrow().clone();
                stats
            }
        };
        ShutdownReport {
            sync,
            failures,
            panicked,
        }
    }
}

async fn run_collector(
    mut sync: EpochSynchronizer,
    mut rx: mpsc::Receiver<PipelineMessage>,
    out: mpsc::Sender<CasterEvent>,
    stats_tx: watch::Sender<SyncStats>,
) -> SyncStats {
    let mut ticker = tokio::time::interval(sync.config().check_interval.max(MIN_CHECK_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut notices = VecDeque::new();

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => handle_message(&mut sync, &mut notices, msg),
                None => break,
            },
            _ = ticker.tick() => sync.tick(Instant::now()),
        }
        deliver(&mut sync, &mut notices, &out);
        stats_tx.send_replace(sync.stats().clone());
    }

    sync.flush();
    deliver(&mut sync, &mut notices, &out);
    if !notices.is_empty() {
        tracing::warn!(streams = notices.len(), "Output full at shutdown, stream ends not reported");
    }
    if sync.pending() > 0 {
        tracing::warn!(epochs = sync.pending(), "Output full at shutdown, epochs discarded");
    }
    let stats = sync.stats().clone();
    stats_tx.send_replace(stats.clone());
    tracing::info!(
        epochs = stats.epochs_emitted,
        late = stats.late_observations,
        dropped = stats.overflow_dropped,
        "Collector finished"
    );
    stats
}

fn handle_message(
    sync: &mut EpochSynchronizer,
    notices: &mut VecDeque<CasterEvent>,
    msg: PipelineMessage,
) {
    let now = Instant::now();
    match msg {
        PipelineMessage::Started { station } => sync.register_station(&station, now),
        PipelineMessage::Observations { observations, .. } => {
            sync.post(observations, now);
        }
        PipelineMessage::Corrupted { station } => sync.record_corrupted(&station, now),
        PipelineMessage::Ended { station, error } => {
            notices.push_back(CasterEvent::StreamEnded { station, error });
        }
    }
}

/// Move stream-end notices, closed epochs and health events to the output
/// while it has room
fn deliver(
    sync: &mut EpochSynchronizer,
    notices: &mut VecDeque<CasterEvent>,
    out: &mpsc::Sender<CasterEvent>,
) {
    while !notices.is_empty() {
        let Ok(permit) = out.try_reserve() else { return };
        if let Some(notice) = notices.pop_front() {
            permit.send(notice);
        }
    }
    while sync.pending() > 0 {
        let Ok(permit) = out.try_reserve() else { break };
        if let Some(epoch) = sync.pop_ready() {
            permit.send(CasterEvent::Epoch(epoch));
        }
    }
    while let Ok(permit) = out.try_reserve() {
        match sync.pop_event() {
            Some(event) => permit.send(CasterEvent::Health(event)),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ReplaySource;
    use crate::ephemeris::fixtures::{gps_ephemeris, TOE_SOW, TOE_WEEK};
    use crate::ephemeris::Ephemeris;
    use crate::message::fixtures::{gps_obs, gps_sat};
    use gnss::prelude::{Constellation, SV};
    use crate::message::time::gps_epoch;

    /// One 1004 message for PRN 5 and one 1019 for PRN 5
    fn recording() -> (Vec<u8>, Ephemeris) {
        let obs = gps_obs(1004, 7, (TOE_SOW as u32 + 30) * 1000, false, &[gps_sat(5)]);
        let eph = Ephemeris::Gps(gps_ephemeris(5, TOE_SOW));
        let mut wire = obs.encode().to_vec();
        wire.extend_from_slice(&eph.encode_rtcm3().unwrap().encode());
        (wire, eph)
    }

    async fn until_ended(rx: &mut mpsc::Receiver<CasterEvent>) -> Vec<CasterEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let ended = matches!(event, CasterEvent::StreamEnded { .. });
            events.push(event);
            if ended {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_end_to_end_replay() {
        let (wire, reference) = recording();
        let (mut caster, mut rx) = Caster::new(SyncConfig::default());
        let store = caster.ephemerides();

        caster.add_stream_with_hint(
            "ALGO",
            ReplaySource::split(wire, 7),
            gps_epoch(TOE_WEEK, TOE_SOW),
        );
        let mut events = until_ended(&mut rx).await;

        let stats = caster.stream_stats("ALGO").await.unwrap();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.observations, 1);
        assert_eq!(stats.ephemerides, 1);
        assert_eq!(stats.checksum_rejects, 0);

        let report = caster.shutdown().await;
        assert!(report.is_clean());
        assert_eq!(report.sync.epochs_emitted, 1);
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let epochs: Vec<SyncedEpoch> = events
            .into_iter()
            .filter_map(|e| match e {
                CasterEvent::Epoch(epoch) => Some(epoch),
                _ => None,
            })
            .collect();
        assert_eq!(epochs.len(), 1);
        assert_eq!(epochs[0].gps_week(), TOE_WEEK);
        assert!((epochs[0].gps_seconds() - (TOE_SOW + 30.0)).abs() < 1e-9);
        let algo = &epochs[0].stations["ALGO"];
        assert_eq!(algo.len(), 1);
        assert_eq!(algo[0].sat, SV::new(Constellation::GPS, 5));
        assert_eq!(algo[0].station, "ALGO");

        let toc = reference.toc();
        let state = store.position(SV::new(Constellation::GPS, 5), toc).await.unwrap();
        let expected = reference.position(toc).unwrap();
        assert!((state.position - expected.position).norm() < 1e-6);
        assert!((state.clock_bias - expected.clock_bias).abs() < 1e-15);
    }

    #[tokio::test]
    async fn test_corrupted_frame_counted() {
        let (mut wire, _) = recording();
        // break the observation frame's payload
        wire[10] ^= 0xFF;
        // lets any false candidate inside the broken frame complete and fail
        wire.extend_from_slice(&[0u8; 1100]);
        let (mut caster, mut rx) = Caster::new(SyncConfig::default());

        caster.add_stream_with_hint("ALGO", ReplaySource::new(vec![wire]), gps_epoch(TOE_WEEK, TOE_SOW));
        until_ended(&mut rx).await;

        let stats = caster.stream_stats("ALGO").await.unwrap();
        assert_eq!(stats.frames, 1);
        assert!(stats.checksum_rejects >= 1);
        assert_eq!(stats.ephemerides, 1);
        assert_eq!(caster.ephemerides().len().await, 1);

        let report = caster.shutdown().await;
        assert_eq!(report.sync.epochs_emitted, 0);
    }

    #[tokio::test]
    async fn test_two_stations_share_epoch() {
        let (mut caster, mut rx) = Caster::new(SyncConfig::default());
        let tow_ms = (TOE_SOW as u32 + 60) * 1000;
        for (station, prn) in [("ALGO", 5u8), ("WTZR", 12u8)] {
            let frame = gps_obs(1004, 1, tow_ms, false, &[gps_sat(prn)]);
            caster.add_stream_with_hint(
                station,
                ReplaySource::new(vec![frame.encode()]),
                gps_epoch(TOE_WEEK, TOE_SOW),
            );
        }
        assert_eq!(caster.stream_count(), 2);
        until_ended(&mut rx).await;
        until_ended(&mut rx).await;

        caster.shutdown().await;
        let mut epochs = Vec::new();
        while let Some(event) = rx.recv().await {
            if let CasterEvent::Epoch(epoch) = event {
                epochs.push(epoch);
            }
        }
        assert_eq!(epochs.len(), 1);
        let stations: Vec<&str> = epochs[0].station_ids().collect();
        assert_eq!(stations, vec!["ALGO", "WTZR"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_stream() {
        let (mut caster, _rx) = Caster::new(SyncConfig::default());
        // a paced source that would take an hour to finish
        let source = ReplaySource::new(vec![vec![0u8; 4]; 3600]).pace(Duration::from_secs(1));
        caster.add_stream("IDLE", source);

        let report = caster.shutdown().await;
        assert_eq!(report.sync, SyncStats::default());
        assert!(report.is_clean());
    }

    /// Source whose reads always time out
    struct Silent;

    impl ChunkSource for Silent {
        fn next_chunk(
            &mut self,
        ) -> impl std::future::Future<Output = Result<bytes::Bytes, ClientError>> + Send {
            async { Err(ClientError::IdleTimeout(Duration::from_secs(5))) }
        }
    }

    #[tokio::test]
    async fn test_stream_ends_survive_full_output() {
        let config = SyncConfig::default()
            .output_capacity(1)
            .check_interval(Duration::from_millis(20));
        let (mut caster, mut rx) = Caster::new(config);
        caster.add_stream_with_hint("ALGO", Silent, gps_epoch(TOE_WEEK, TOE_SOW));
        caster.add_stream_with_hint("WTZR", Silent, gps_epoch(TOE_WEEK, TOE_SOW));

        // both pipelines fail before anything is read
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut ended = Vec::new();
        for _ in 0..2 {
            let events = tokio::time::timeout(Duration::from_secs(5), until_ended(&mut rx))
                .await
                .unwrap();
            match events.last() {
                Some(CasterEvent::StreamEnded { station, error }) => {
                    assert!(error.as_deref().is_some_and(|e| e.starts_with("no data")));
                    ended.push(station.clone());
                }
                other => panic!("expected a stream end, got {other:?}"),
            }
        }
        ended.sort();
        assert_eq!(ended, vec!["ALGO", "WTZR"]);

        let report = caster.shutdown().await;
        let mut failed: Vec<&str> = report.failures.iter().map(|(s, _)| s.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["ALGO", "WTZR"]);
        assert!(report
            .failures
            .iter()
            .all(|(_, e)| matches!(e, ClientError::IdleTimeout(_))));
        assert!(report.panicked.is_empty());
    }
}
