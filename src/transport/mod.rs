//! # Transport Module
//!
//! UDP receiver that turns each datagram into a raw CSV event and hands it to
//! the pipeline.
//!
//! The receive loop never blocks the pipeline: a full queue drops the packet
//! and counts it on the processor side.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::TransportConfig;
use crate::error::{Result, TelemetryError};
use crate::telemetry::{EventPublisher, Payload, TelemetryEvent, TelemetrySource};

/// Channel carried by undecoded packets until the decode stage names them
pub const RAW_CHANNEL: &str = "transport/raw";

pub struct UdpReceiver {
    port: u16,
    max_packet_size: usize,
    pipeline: EventPublisher,
    clock: Arc<dyn Clock>,
    received: AtomicU64,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for UdpReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpReceiver")
            .field("port", &self.port)
            .field("max_packet_size", &self.max_packet_size)
            .finish_non_exhaustive()
    }
}

impl UdpReceiver {
    pub fn new(config: &TransportConfig, pipeline: EventPublisher, clock: Arc<dyn Clock>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            port: config.listen_port,
            max_packet_size: config.max_packet_size,
            pipeline,
            clock,
            received: AtomicU64::new(0),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Bind on all interfaces and spawn the receive loop.
    ///
    /// Returns the bound address, which differs from the configured port
    /// only when port 0 was requested.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Bind`] if the socket cannot be bound.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.port))
            .await
            .map_err(|source| TelemetryError::Bind {
                port: self.port,
                source,
            })?;
        let local = socket.local_addr()?;
        info!("Listening for telemetry on udp://{}", local);

        let receiver = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; receiver.max_packet_size];
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    result = socket.recv_from(&mut buf) => match result {
                        Ok((len, peer)) => receiver.handle_datagram(&buf[..len], peer),
                        Err(e) => warn!("UDP receive failed: {}", e),
                    }
                }
            }
            debug!("UDP receiver on {} stopped", local);
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        Ok(local)
    }

    fn handle_datagram(&self, data: &[u8], peer: SocketAddr) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let text = String::from_utf8_lossy(data);
        let line = text.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            debug!("Empty datagram from {}", peer);
            return;
        }

        let receive_micros = self.clock.monotonic_micros();
        match TelemetryEvent::new(
            receive_micros,
            TelemetrySource::Transport,
            RAW_CHANNEL,
            Payload::Csv(line.to_string()),
        ) {
            Ok(event) => {
                self.pipeline.publish(event);
            }
            Err(e) => debug!("Discarding datagram from {}: {}", peer, e),
        }
    }

    /// Datagrams received since start, including ones the queue dropped.
    pub fn messages_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Idempotent.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("UDP receiver task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::telemetry::{TelemetryContext, TelemetryProcessor, TelemetryStage};
    use std::time::Duration;

    /// Keeps the text of every CSV payload it sees.
    #[derive(Default)]
    struct CsvCapture {
        lines: Mutex<Vec<String>>,
    }

    impl TelemetryStage for CsvCapture {
        fn name(&self) -> &'static str {
            "csv-capture"
        }

        fn apply(&self, ctx: &mut TelemetryContext) -> Result<()> {
            if let Payload::Csv(text) = ctx.payload() {
                self.lines.lock().push(text.clone());
            }
            Ok(())
        }
    }

    fn ephemeral() -> TransportConfig {
        TransportConfig {
            listen_port: 0,
            ..TransportConfig::default()
        }
    }

    #[tokio::test]
    async fn test_datagrams_become_raw_csv_events() {
        let processor = TelemetryProcessor::new(16);
        let receiver = Arc::new(UdpReceiver::new(
            &ephemeral(),
            processor.publisher(),
            Arc::new(SystemClock::new()),
        ));
        let addr = tokio_test::assert_ok!(receiver.start().await);

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, addr.port()));
        sender.send_to(b"7,RIO/Voltage,double,12.5,V\n", target).unwrap();
        sender.send_to(b"", target).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while receiver.messages_received() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("datagrams should arrive");

        receiver.stop();
        receiver.join().await;
        assert_eq!(processor.pending(), 1);
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_port() {
        let holder = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let port = holder.local_addr().unwrap().port();

        let processor = TelemetryProcessor::new(4);
        let config = TransportConfig {
            listen_port: port,
            ..TransportConfig::default()
        };
        let receiver = Arc::new(UdpReceiver::new(
            &config,
            processor.publisher(),
            Arc::new(SystemClock::new()),
        ));

        match receiver.start().await {
            Err(TelemetryError::Bind { port: p, .. }) => assert_eq!(p, port),
            other => panic!("expected bind error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_before_start_is_harmless() {
        let processor = TelemetryProcessor::new(4);
        let receiver = UdpReceiver::new(
            &ephemeral(),
            processor.publisher(),
            Arc::new(SystemClock::new()),
        );
        receiver.stop();
        receiver.stop();
        receiver.join().await;
        assert_eq!(receiver.messages_received(), 0);
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_cut_to_max_packet_size() {
        let processor = TelemetryProcessor::new(4);
        let capture = Arc::new(CsvCapture::default());
        processor.register_stage(capture.clone());

        let config = TransportConfig {
            max_packet_size: 256,
            ..ephemeral()
        };
        let receiver = Arc::new(UdpReceiver::new(
            &config,
            processor.publisher(),
            Arc::new(SystemClock::new()),
        ));
        let addr = tokio_test::assert_ok!(receiver.start().await);

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, addr.port()));
        let packet = format!("1000,Log/Text,string,{}", "x".repeat(380));
        assert!(packet.len() > 256);
        sender.send_to(packet.as_bytes(), target).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while receiver.messages_received() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("datagram should arrive");
        receiver.stop();
        receiver.join().await;

        assert_eq!(processor.drain_pending(), 1);
        let lines = capture.lines.lock();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), 256);
        assert_eq!(lines[0], packet[..256]);
    }
}
