use crate::catalogue::Catalogue;
use crate::config::{Config, ProbeConfig, ProbeMethod};
use crate::error::CommandError;
use crate::model::{Delivery, PowerEvent, VolumeDirection};
use crate::probe::{PingProber, Prober, TcpProber};
use crate::session::{DeviceSession, SessionDeps};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;

const USAGE: &str = "usage: xgimi-remote [config-init | commands | send <device> <command> [param] | key <device> <code> | power <device> on|off | volume <device> up|down | input <device> <identifier>]";

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(ref command) = std::env::args().nth(1) {
        if command == "config-init" {
            return handle_config_init();
        }
        if command == "commands" {
            return handle_commands();
        }
        if is_help(command) {
            println!("{USAGE}");
            return Ok(());
        }
    }

    let config = Config::load()?;

    if let Some(command) = std::env::args().nth(1) {
        return match command.as_str() {
            "send" => handle_send(&config).await,
            "key" => handle_key(&config).await,
            "power" => handle_power(&config).await,
            "volume" => handle_volume(&config).await,
            "input" => handle_input(&config).await,
            other => Err(format!("unknown command: {other}\n{USAGE}").into()),
        };
    }

    run_sessions(&config).await
}

async fn run_sessions(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.devices.is_empty() {
        return Err("no devices configured (see config-init)".into());
    }

    let deps = SessionDeps::standard(build_prober(&config.probe));
    let mut sessions = Vec::new();
    let mut watchers = Vec::new();
    for device in &config.devices {
        let session = DeviceSession::start(device, &config.timing, deps.clone());
        watchers.push(spawn_power_logger(session.subscribe()));
        sessions.push(session);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown: ctrl-c");

    for session in sessions.iter_mut() {
        session.shutdown().await;
    }
    for watcher in watchers {
        watcher.abort();
    }
    Ok(())
}

fn is_help(command: &str) -> bool {
    matches!(command, "help" | "--help" | "-h")
}

fn spawn_power_logger(mut rx: broadcast::Receiver<PowerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    tracing::info!(device = %event.device, active = event.active, "power state");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "power event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn build_prober(probe: &ProbeConfig) -> Arc<dyn Prober> {
    match probe.method {
        ProbeMethod::Ping => Arc::new(PingProber),
        ProbeMethod::Tcp => Arc::new(TcpProber::new(probe.tcp_port)),
    }
}

fn handle_config_init() -> Result<(), Box<dyn std::error::Error>> {
    let path = Config::default_path();
    Config::write_default(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn handle_commands() -> Result<(), Box<dyn std::error::Error>> {
    let catalogue = Catalogue::standard();
    println!("{}", serde_json::to_string_pretty(&catalogue.list())?);
    Ok(())
}

async fn handle_send(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(2);
    let device = args.next().ok_or("missing device name")?;
    let command = args.next().ok_or("missing command name")?;
    let param = args.next();
    one_shot(config, &device, |session| {
        session.run_command(&command, param.as_deref())
    })
    .await
}

async fn handle_key(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(2);
    let device = args.next().ok_or("missing device name")?;
    let code: u8 = args.next().ok_or("missing key code")?.parse()?;
    one_shot(config, &device, |session| session.set_remote_key(code)).await
}

async fn handle_power(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(2);
    let device = args.next().ok_or("missing device name")?;
    let active = match args.next().as_deref() {
        Some("on") | Some("1") => true,
        Some("off") | Some("0") => false,
        _ => return Err("expected on or off".into()),
    };
    one_shot(config, &device, |session| session.set_power(active)).await
}

async fn handle_volume(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(2);
    let device = args.next().ok_or("missing device name")?;
    let direction = match args.next().as_deref() {
        Some("up") => VolumeDirection::Increment,
        Some("down") => VolumeDirection::Decrement,
        Some(code) => code
            .parse::<u8>()
            .ok()
            .and_then(VolumeDirection::from_code)
            .ok_or("expected up or down")?,
        None => return Err("expected up or down".into()),
    };
    one_shot(config, &device, |session| session.set_volume(direction)).await
}

async fn handle_input(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(2);
    let device = args.next().ok_or("missing device name")?;
    let identifier: u32 = args.next().ok_or("missing input identifier")?.parse()?;
    one_shot(config, &device, |session| session.set_input(identifier)).await
}

/// Starts a throwaway session, lets the first liveness probe land so the
/// wake wait sees a real state, runs `op`, and prints the delivery.
async fn one_shot<F>(config: &Config, device: &str, op: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&DeviceSession) -> Result<JoinHandle<Delivery>, CommandError>,
{
    let device = config
        .device(device)
        .ok_or_else(|| format!("no device named {device}"))?;
    let deps = SessionDeps::standard(build_prober(&config.probe));
    let mut session = DeviceSession::start(device, &config.timing, deps);

    let settle_limit = config.timing.poll_timeout() + Duration::from_millis(500);
    let state = session.settled(settle_limit).await;
    tracing::debug!(device = %session.info().name, ?state, "initial reachability");

    let result: Result<Delivery, Box<dyn std::error::Error>> = match op(&session) {
        Ok(handle) => handle.await.map_err(Into::into),
        Err(err) => Err(err.into()),
    };
    session.shutdown().await;

    let delivery = result?;
    if !delivery.is_sent() && delivery != Delivery::Skipped {
        tracing::warn!(device = %device.name, ?delivery, "command was not delivered");
    }
    println!("{}", serde_json::to_string(&delivery)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_flags_are_recognised_before_config() {
        for flag in ["help", "--help", "-h"] {
            assert!(is_help(flag), "{flag}");
        }
        assert!(!is_help("send"));
        assert!(!is_help("config-init"));
    }
}
