use crate::catalogue::Catalogue;
use crate::error::CommandError;
use crate::model::{Delivery, DeviceEndpoint, ProtocolKind, ReachabilityState};
use crate::probe::Prober;
use crate::tracker::ReachabilityCell;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Datagram sink. No reply is ever read back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_to(&self, payload: &[u8], host: &str, port: u16) -> io::Result<usize>;
}

/// Fresh ephemeral IPv4 socket per datagram.
#[derive(Debug, Clone, Default)]
pub struct UdpTransport;

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, payload: &[u8], host: &str, port: u16) -> io::Result<usize> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.send_to(payload, (host, port)).await
    }
}

/// One in-flight transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub host: String,
    pub port: u16,
    pub kind: ProtocolKind,
    pub payload: Vec<u8>,
}

pub struct Dispatcher {
    endpoint: DeviceEndpoint,
    catalogue: Arc<Catalogue>,
    prober: Arc<dyn Prober>,
    transport: Arc<dyn Transport>,
    cell: ReachabilityCell,
    presend_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        endpoint: DeviceEndpoint,
        catalogue: Arc<Catalogue>,
        prober: Arc<dyn Prober>,
        transport: Arc<dyn Transport>,
        cell: ReachabilityCell,
        presend_timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            catalogue,
            prober,
            transport,
            cell,
            presend_timeout,
        }
    }

    /// Resolves `name` against the catalogue. Rejections are logged here, once.
    pub fn prepare(&self, name: &str, param: Option<&str>) -> Result<PendingSend, CommandError> {
        let encoded = self.catalogue.encode(name, param).map_err(|err| {
            tracing::warn!(host = %self.endpoint.host, command = name, error = %err, "command rejected");
            err
        })?;
        Ok(PendingSend {
            host: self.endpoint.host.clone(),
            port: self.endpoint.port_for(encoded.kind),
            kind: encoded.kind,
            payload: encoded.payload.into_bytes(),
        })
    }

    /// Encode, re-probe, transmit. Only an unresolvable command is an error.
    pub async fn send(&self, name: &str, param: Option<&str>) -> Result<Delivery, CommandError> {
        let pending = self.prepare(name, param)?;
        Ok(self.deliver(pending).await)
    }

    pub async fn deliver(&self, pending: PendingSend) -> Delivery {
        // Independent of the tracker's cached state.
        if !self.prober.probe(&pending.host, self.presend_timeout).await {
            tracing::warn!(host = %pending.host, "device not responding, command dropped");
            self.cell.observe(ReachabilityState::Dead);
            return Delivery::Unreachable;
        }

        tracing::info!(
            host = %pending.host,
            port = pending.port,
            kind = %pending.kind,
            payload = %String::from_utf8_lossy(&pending.payload),
            "sending udp message"
        );
        match self
            .transport
            .send_to(&pending.payload, &pending.host, pending.port)
            .await
        {
            Ok(bytes) => Delivery::Sent {
                port: pending.port,
                bytes,
            },
            Err(err) => {
                tracing::error!(host = %pending.host, port = pending.port, error = %err, "udp send failed");
                Delivery::TransportFailed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tracker::tests::ScriptedProber;
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) sent: Mutex<Vec<(String, u16, String)>>,
        pub(crate) fail: bool,
    }

    impl RecordingTransport {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::default()
            })
        }

        pub(crate) fn sent(&self) -> Vec<(String, u16, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_to(&self, payload: &[u8], host: &str, port: u16) -> io::Result<usize> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::Other, "no route to host"));
            }
            self.sent.lock().unwrap().push((
                host.to_string(),
                port,
                String::from_utf8_lossy(payload).into_owned(),
            ));
            Ok(payload.len())
        }
    }

    fn dispatcher(
        prober: Arc<ScriptedProber>,
        transport: Arc<RecordingTransport>,
        cell: &ReachabilityCell,
    ) -> Dispatcher {
        Dispatcher::new(
            DeviceEndpoint::new("10.0.0.5"),
            Arc::new(Catalogue::standard()),
            prober,
            transport,
            cell.clone(),
            Duration::from_secs(4),
        )
    }

    #[tokio::test]
    async fn reachable_device_gets_one_datagram_on_simple_port() {
        let cell = ReachabilityCell::new("tv");
        let transport = RecordingTransport::new();
        let d = dispatcher(ScriptedProber::always(true), transport.clone(), &cell);

        let out = d.send("up", None).await.unwrap();
        assert_eq!(out, Delivery::Sent { port: 16735, bytes: 13 });
        assert_eq!(
            transport.sent(),
            vec![("10.0.0.5".to_string(), 16735, "KEYPRESSES:36".to_string())]
        );
    }

    #[tokio::test]
    async fn complex_commands_use_complex_port() {
        let cell = ReachabilityCell::new("tv");
        let transport = RecordingTransport::new();
        let d = dispatcher(ScriptedProber::always(true), transport.clone(), &cell);

        d.send("openApp", Some("com.xgimi.filemanager")).await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, 16750);
        assert!(sent[0].2.contains(r#""data":"com.xgimi.filemanager""#));
    }

    #[tokio::test]
    async fn unknown_command_never_probes_or_sends() {
        let cell = ReachabilityCell::new("tv");
        let prober = ScriptedProber::always(true);
        let transport = RecordingTransport::new();
        let d = dispatcher(prober.clone(), transport.clone(), &cell);

        let err = d.send("warpDrive", None).await.unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("warpDrive".to_string()));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
        assert!(transport.sent().is_empty());
    }

    /// Captures formatted log lines for assertions.
    #[derive(Clone, Default)]
    pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
            let writer = self.clone();
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish()
        }

        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn rejected_command_is_logged_once_as_warning() {
        let cell = ReachabilityCell::new("tv");
        let d = dispatcher(ScriptedProber::always(true), RecordingTransport::new(), &cell);
        let logs = LogBuffer::default();

        let result =
            tracing::subscriber::with_default(logs.subscriber(), || d.prepare("warpDrive", None));
        assert_eq!(
            result,
            Err(CommandError::UnknownCommand("warpDrive".to_string()))
        );

        let text = logs.text();
        assert_eq!(text.matches("command rejected").count(), 1, "{text}");
        assert!(text.contains("WARN"), "{text}");
        assert!(text.contains("unknown command: warpDrive"), "{text}");
    }

    #[tokio::test]
    async fn unreachable_device_marks_dead_and_skips_send() {
        let cell = ReachabilityCell::new("tv");
        cell.observe(ReachabilityState::Alive);
        let mut rx = cell.subscribe();
        let transport = RecordingTransport::new();
        let d = dispatcher(ScriptedProber::always(false), transport.clone(), &cell);

        let out = d.send("off", None).await.unwrap();
        assert_eq!(out, Delivery::Unreachable);
        assert!(transport.sent().is_empty());
        assert_eq!(cell.current(), ReachabilityState::Dead);
        assert!(!rx.try_recv().unwrap().active);
    }

    #[tokio::test]
    async fn presend_probe_ignores_cached_state() {
        let cell = ReachabilityCell::new("tv");
        cell.observe(ReachabilityState::Dead);
        let transport = RecordingTransport::new();
        let d = dispatcher(ScriptedProber::always(true), transport.clone(), &cell);

        assert!(d.send("home", None).await.unwrap().is_sent());
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed() {
        let cell = ReachabilityCell::new("tv");
        let d = dispatcher(
            ScriptedProber::always(true),
            RecordingTransport::failing(),
            &cell,
        );
        assert_eq!(d.send("menu", None).await.unwrap(), Delivery::TransportFailed);
    }

    #[tokio::test]
    async fn udp_transport_delivers_payload_bytes() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let sent = UdpTransport
            .send_to(b"KEYPRESSES:35", "127.0.0.1", port)
            .await
            .unwrap();
        assert_eq!(sent, 13);

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"KEYPRESSES:35");
    }
}
