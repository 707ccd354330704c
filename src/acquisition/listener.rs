//! UDP telemetry listener
//!
//! Receives datagrams, parses them, pushes samples into the shared ring and
//! hands each sample to an optional callback. Nothing in this path can fail
//! the process once the socket is bound: malformed input is counted, logged
//! at a bounded rate and dropped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::failure_log::{warn_parse_failure, ParseFailureLog};
use super::parser::parse_datagram;
use super::ring_buffer::SharedRing;
use crate::config::IngestConfig;
use crate::config::defaults::MAX_DATAGRAM_BYTES;
use crate::types::TelemetrySample;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address {0:?}")]
    InvalidAddr(String),

    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Invoked for every accepted sample. Must not block.
pub type SampleCallback = Arc<dyn Fn(&TelemetrySample) + Send + Sync>;

/// Ingestion counters, shared with the status endpoint.
#[derive(Debug, Default)]
pub struct IngestStats {
    datagrams: AtomicU64,
    accepted: AtomicU64,
    malformed: AtomicU64,
    raw_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IngestSnapshot {
    pub datagrams: u64,
    pub accepted: u64,
    pub malformed: u64,
    /// Samples not forwarded to the raw-update batcher because its channel
    /// was full.
    pub raw_dropped: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            raw_dropped: self.raw_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn record_raw_dropped(&self) {
        self.raw_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Callback that forwards samples into a bounded channel without waiting.
/// A full channel drops the sample and counts it.
pub fn channel_callback(
    tx: mpsc::Sender<TelemetrySample>,
    stats: Arc<IngestStats>,
) -> SampleCallback {
    Arc::new(move |sample: &TelemetrySample| {
        if tx.try_send(sample.clone()).is_err() {
            stats.record_raw_dropped();
        }
    })
}

/// Socket-independent half of the listener: parse, store, notify.
pub struct DatagramIngest {
    ring: SharedRing<TelemetrySample>,
    stats: Arc<IngestStats>,
    failures: ParseFailureLog,
    on_sample: Option<SampleCallback>,
}

impl DatagramIngest {
    pub fn new(
        ring: SharedRing<TelemetrySample>,
        stats: Arc<IngestStats>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            ring,
            stats,
            failures: ParseFailureLog::new(config.parse_log_window()),
            on_sample: None,
        }
    }

    pub fn set_callback(&mut self, callback: SampleCallback) {
        self.on_sample = Some(callback);
    }

    /// Handle one datagram. Returns whether a sample was accepted.
    pub fn handle_datagram(&mut self, bytes: &[u8], peer: SocketAddr) -> bool {
        self.stats.datagrams.fetch_add(1, Ordering::Relaxed);

        match parse_datagram(bytes, Utc::now()) {
            Ok(sample) => {
                // Stored before forwarding, so a callback sees it in the ring.
                if let Some(callback) = &self.on_sample {
                    self.ring.push(sample.clone());
                    callback(&sample);
                } else {
                    self.ring.push(sample);
                }
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                warn_parse_failure(&mut self.failures, peer, bytes.len(), &e);
                false
            }
        }
    }
}

pub struct TelemetryListener {
    socket: UdpSocket,
    buf: Vec<u8>,
    ingest: DatagramIngest,
}

impl TelemetryListener {
    /// Bind the ingress socket described by `config`.
    pub fn bind(
        config: &IngestConfig,
        ring: SharedRing<TelemetrySample>,
        stats: Arc<IngestStats>,
    ) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .udp_bind
            .parse()
            .map_err(|_| ListenerError::InvalidAddr(config.udp_bind.clone()))?;

        let std_socket = bind_socket(addr, config.recv_buffer_bytes)
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let socket =
            UdpSocket::from_std(std_socket).map_err(|source| ListenerError::Bind { addr, source })?;

        Ok(Self {
            socket,
            buf: vec![0u8; MAX_DATAGRAM_BYTES],
            ingest: DatagramIngest::new(ring, stats, config),
        })
    }

    pub fn with_callback(mut self, callback: SampleCallback) -> Self {
        self.ingest.set_callback(callback);
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive until cancelled. Socket errors are logged and skipped.
    pub async fn run(mut self, cancel: CancellationToken) {
        if let Ok(addr) = self.socket.local_addr() {
            info!(addr = %addr, "Telemetry listener receiving");
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut self.buf) => match received {
                    Ok((len, peer)) => {
                        self.ingest.handle_datagram(&self.buf[..len], peer);
                    }
                    Err(e) => {
                        // e.g. ICMP port unreachable surfaced on the next recv
                        debug!(error = %e, "UDP receive error");
                    }
                },
            }
        }

        info!("Telemetry listener stopped");
    }
}

fn bind_socket(addr: SocketAddr, recv_buffer_bytes: usize) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if let Err(e) = socket.set_recv_buffer_size(recv_buffer_bytes) {
        warn!(error = %e, requested = recv_buffer_bytes, "Could not set UDP receive buffer size");
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}
