//! Per-mountpoint pipeline task
//!
//! ```text
//!   ChunkSource ──► FrameDecoder ──► MessageBuilder ──┬──► EphemerisStore
//!                                                     └──► collector (mpsc)
//! ```
//!
//! A pipeline owns its whole chain and shares nothing mutable with other
//! pipelines. Ephemerides go straight to the store; observations and
//! corruption reports are posted to the collector, which owns the
//! synchronizer.

use std::collections::HashMap;
use std::sync::Arc;

use hifitime::Epoch;
use tokio::sync::{mpsc, watch, RwLock};

use crate::client::connector::stopped;
use crate::client::source::ChunkSource;
use crate::ephemeris::EphemerisStore;
use crate::error::ClientError;
use crate::message::{Decoded, MessageBuilder, Observation};
use crate::protocol::decoder::FrameDecoder;
use crate::stats::StreamStats;

/// Pipeline to collector messages
#[derive(Debug)]
pub(crate) enum PipelineMessage {
    Started {
        station: String,
    },
    Observations {
        station: String,
        observations: Vec<Observation>,
    },
    /// Checksum or decode failure seen on the stream
    Corrupted {
        station: String,
    },
    Ended {
        station: String,
        error: Option<String>,
    },
}

pub(crate) type SharedStats = Arc<RwLock<HashMap<String, StreamStats>>>;

pub(crate) struct Pipeline<S> {
    station: String,
    source: S,
    decoder: FrameDecoder,
    builder: MessageBuilder,
    store: Arc<EphemerisStore>,
    tx: mpsc::Sender<PipelineMessage>,
    stats: SharedStats,
    stop: watch::Receiver<bool>,
    bytes_received: u64,
    last_observation: Option<Epoch>,
}

impl<S: ChunkSource> Pipeline<S> {
    pub(crate) fn new(
        builder: MessageBuilder,
        source: S,
        store: Arc<EphemerisStore>,
        tx: mpsc::Sender<PipelineMessage>,
        stats: SharedStats,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            station: builder.station().to_string(),
            source,
            decoder: FrameDecoder::new(),
            builder,
            store,
            tx,
            stats,
            stop,
            bytes_received: 0,
            last_observation: None,
        }
    }

    /// Pump the source until it ends, fails or the stop signal fires
    pub(crate) async fn run(mut self) -> Result<(), ClientError> {
        tracing::info!(station = %self.station, "Stream pipeline started");
        self.stats
            .write()
            .await
            .insert(self.station.clone(), StreamStats::new(self.station.clone()));
        let _ = self
            .tx
            .send(PipelineMessage::Started {
                station: self.station.clone(),
            })
            .await;

        let result = loop {
            let chunk = tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => break Ok(()),
                chunk = self.source.next_chunk() => chunk,
            };
            match chunk {
                Ok(bytes) => {
                    if !self.process(&bytes).await {
                        tracing::debug!(station = %self.station, "Collector gone, stopping");
                        break Ok(());
                    }
                }
                Err(ClientError::ConnectionClosed) | Err(ClientError::Stopped) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if let Some(observations) = self.builder.flush() {
            self.post(observations).await;
        }
        self.update_stats().await;

        match &result {
            Ok(()) => tracing::info!(station = %self.station, "Stream ended"),
            Err(e) => tracing::warn!(station = %self.station, error = %e, "Stream failed"),
        }
        let _ = self
            .tx
            .send(PipelineMessage::Ended {
                station: self.station.clone(),
                error: result.as_ref().err().map(ToString::to_string),
            })
            .await;
        result
    }

    /// Decode one chunk. Returns false once the collector is gone.
    async fn process(&mut self, bytes: &[u8]) -> bool {
        let rejected = self.decoder.rejected();
        let failures = self.builder.stats().decode_failures;
        self.bytes_received += bytes.len() as u64;

        self.decoder.push(bytes);
        while let Some(frame) = self.decoder.next_frame() {
            for decoded in self.builder.build(&frame) {
                match decoded {
                    Decoded::Observations(observations) => {
                        if !self.post(observations).await {
                            return false;
                        }
                    }
                    Decoded::Ephemeris(eph) => {
                        self.store.put(eph).await;
                    }
                }
            }
        }

        let corrupted = self.decoder.rejected() > rejected
            || self.builder.stats().decode_failures > failures;
        if corrupted {
            let msg = PipelineMessage::Corrupted {
                station: self.station.clone(),
            };
            if self.tx.send(msg).await.is_err() {
                return false;
            }
        }

        self.update_stats().await;
        true
    }

    async fn post(&mut self, observations: Vec<Observation>) -> bool {
        if let Some(last) = observations.last() {
            self.last_observation = Some(last.time);
            tracing::debug!(
                station = %self.station,
                sow = last.gps_seconds(),
                count = observations.len(),
                "Posting observations"
            );
        }
        let msg = PipelineMessage::Observations {
            station: self.station.clone(),
            observations,
        };
        self.tx.send(msg).await.is_ok()
    }

    async fn update_stats(&self) {
        let mut stats = self.stats.write().await;
        if let Some(entry) = stats.get_mut(&self.station) {
            entry.bytes_received = self.bytes_received;
            entry.update(&self.decoder, self.builder.stats());
            entry.last_observation = self.last_observation;
        }
    }
}
