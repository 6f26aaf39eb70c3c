use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

/// Extra time granted to the ping child on top of its own wait flag.
const PROBE_SLACK: Duration = Duration::from_millis(500);

/// Single reachability check. Implementations never fail: any error is a
/// negative result.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str, timeout: Duration) -> bool;
}

/// Runs `check` for at most `limit`; `None` means it was abandoned.
async fn bounded<F: Future>(limit: Duration, check: F) -> Option<F::Output> {
    timeout(limit, check).await.ok()
}

/// One ICMP echo through the platform `ping` binary.
#[derive(Debug, Clone, Default)]
pub struct PingProber;

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, host: &str, wait: Duration) -> bool {
        let mut cmd = Command::new("ping");
        cmd.args(ping_args(host, wait))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match bounded(wait + PROBE_SLACK, cmd.status()).await {
            Some(Ok(status)) => {
                tracing::debug!(host, alive = status.success(), "ping probe finished");
                status.success()
            }
            Some(Err(err)) => {
                tracing::debug!(host, error = %err, "ping probe could not run");
                false
            }
            None => {
                tracing::debug!(host, "ping probe timed out");
                false
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn ping_args(host: &str, wait: Duration) -> Vec<String> {
    vec![
        "-n".to_string(),
        "1".to_string(),
        "-w".to_string(),
        wait.as_millis().max(1).to_string(),
        host.to_string(),
    ]
}

#[cfg(target_os = "macos")]
fn ping_args(host: &str, wait: Duration) -> Vec<String> {
    // -W is milliseconds on macOS
    vec![
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        wait.as_millis().max(1).to_string(),
        host.to_string(),
    ]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn ping_args(host: &str, wait: Duration) -> Vec<String> {
    let secs = wait.as_millis().div_ceil(1000).max(1);
    vec![
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        secs.to_string(),
        host.to_string(),
    ]
}

/// TCP connect against a fixed port. A refused connection still proves the
/// host is up, so `port` must be one the device itself answers on: a router
/// or firewall that rejects on behalf of a powered-off device makes it look
/// alive.
#[derive(Debug, Clone)]
pub struct TcpProber {
    port: u16,
}

impl TcpProber {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &str, wait: Duration) -> bool {
        match bounded(wait, TcpStream::connect((host, self.port))).await {
            Some(Ok(_stream)) => true,
            Some(Err(err)) if err.kind() == io::ErrorKind::ConnectionRefused => true,
            Some(Err(err)) => {
                tracing::debug!(host, port = self.port, error = %err, "tcp probe failed");
                false
            }
            None => {
                tracing::debug!(host, port = self.port, "tcp probe timed out");
                false
            }
        }
    }
}
