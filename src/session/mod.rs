use crate::catalogue::{Catalogue, KeyBinding, RemoteKeyMap};
use crate::config::{DeviceConfig, DeviceInfo, InputConfig, InputType, TimingConfig};
use crate::dispatch::{Dispatcher, PendingSend, Transport, UdpTransport};
use crate::error::CommandError;
use crate::model::{Delivery, PowerEvent, ReachabilityState, VolumeDirection};
use crate::probe::Prober;
use crate::tracker::{LivenessTracker, ReachabilityCell};
use crate::wake::WakeWait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Collaborators shared by every session in the process.
#[derive(Clone)]
pub struct SessionDeps {
    pub catalogue: Arc<Catalogue>,
    pub keys: Arc<RemoteKeyMap>,
    pub prober: Arc<dyn Prober>,
    pub transport: Arc<dyn Transport>,
}

impl SessionDeps {
    pub fn standard(prober: Arc<dyn Prober>) -> Self {
        Self {
            catalogue: Arc::new(Catalogue::standard()),
            keys: Arc::new(RemoteKeyMap::standard()),
            prober,
            transport: Arc::new(UdpTransport),
        }
    }
}

/// Control session for one device. Consumer calls return as soon as the
/// request is accepted; the network work runs as a task that ends no later
/// than [`DeviceSession::shutdown`].
pub struct DeviceSession {
    info: DeviceInfo,
    inputs: Vec<InputConfig>,
    keys: Arc<RemoteKeyMap>,
    dispatcher: Arc<Dispatcher>,
    cell: ReachabilityCell,
    wake: WakeWait,
    shutdown_tx: watch::Sender<bool>,
    tracker: Option<JoinHandle<()>>,
}

impl DeviceSession {
    pub fn start(device: &DeviceConfig, timing: &TimingConfig, deps: SessionDeps) -> Self {
        let info = device.info();
        let endpoint = device.endpoint();
        let cell = ReachabilityCell::new(&info.name);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tracker = LivenessTracker::new(
            endpoint.host.clone(),
            deps.prober.clone(),
            cell.clone(),
            timing.poll_interval(),
            timing.poll_timeout(),
        )
        .spawn(shutdown_rx);

        let dispatcher = Dispatcher::new(
            endpoint,
            deps.catalogue,
            deps.prober,
            deps.transport,
            cell.clone(),
            timing.presend_timeout(),
        );

        tracing::info!(
            device = %info.name,
            host = %device.host,
            manufacturer = %info.manufacturer,
            model = %info.model,
            serial = %info.serial_number,
            firmware = %info.firmware_revision,
            "device session started"
        );

        Self {
            info,
            inputs: device.inputs.clone(),
            keys: deps.keys,
            dispatcher: Arc::new(dispatcher),
            cell,
            wake: WakeWait::new(timing.wake_grace()),
            shutdown_tx,
            tracker: Some(tracker),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn state(&self) -> ReachabilityState {
        self.cell.current()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PowerEvent> {
        self.cell.subscribe()
    }

    /// Waits up to `limit` for the first liveness outcome.
    pub async fn settled(&self, limit: Duration) -> ReachabilityState {
        let mut rx = self.cell.watch();
        let _ = tokio::time::timeout(
            limit,
            rx.wait_for(|state| *state != ReachabilityState::Unknown),
        )
        .await;
        self.cell.current()
    }

    /// Publishes the requested state right away, then sends `on`/`off`.
    pub fn set_power(&self, active: bool) -> Result<JoinHandle<Delivery>, CommandError> {
        let name = if active { "on" } else { "off" };
        let pending = self.dispatcher.prepare(name, None)?;
        self.cell.observe(ReachabilityState::from_outcome(active));
        tracing::info!(device = %self.info.name, active, "power requested");
        Ok(self.launch(pending, None))
    }

    pub fn set_remote_key(&self, code: u8) -> Result<JoinHandle<Delivery>, CommandError> {
        let binding = self.keys.resolve(code).map_err(|err| {
            tracing::warn!(device = %self.info.name, error = %err, "remote key ignored");
            err
        })?;
        match binding {
            KeyBinding::NoOp => {
                tracing::debug!(device = %self.info.name, code, "remote key has no binding");
                Ok(tokio::spawn(async { Delivery::Skipped }))
            }
            KeyBinding::Command(name) => {
                let pending = self.dispatcher.prepare(name, None)?;
                tracing::info!(device = %self.info.name, code, command = name, "remote key");
                Ok(self.launch(pending, Some(self.cell.current())))
            }
        }
    }

    pub fn set_volume(
        &self,
        direction: VolumeDirection,
    ) -> Result<JoinHandle<Delivery>, CommandError> {
        let name = match direction {
            VolumeDirection::Increment => "volumeUp",
            VolumeDirection::Decrement => "volumeDown",
        };
        let pending = self.dispatcher.prepare(name, None)?;
        tracing::info!(device = %self.info.name, command = name, "volume");
        Ok(self.launch(pending, Some(self.cell.current())))
    }

    /// Identifier 0 is the home screen; configured inputs follow from 1.
    pub fn set_input(&self, identifier: u32) -> Result<JoinHandle<Delivery>, CommandError> {
        let (name, param) = self.input_command(identifier).map_err(|err| {
            tracing::warn!(device = %self.info.name, error = %err, "input selection ignored");
            err
        })?;
        let pending = self.dispatcher.prepare(name, param)?;
        tracing::info!(device = %self.info.name, identifier, command = name, "input selected");
        Ok(self.launch(pending, Some(self.cell.current())))
    }

    /// Any catalogue command, gated only by the pre-send probe.
    pub fn run_command(
        &self,
        name: &str,
        param: Option<&str>,
    ) -> Result<JoinHandle<Delivery>, CommandError> {
        let pending = self.dispatcher.prepare(name, param)?;
        tracing::info!(device = %self.info.name, command = name, "command requested");
        Ok(self.launch(pending, None))
    }

    fn input_command(&self, identifier: u32) -> Result<(&'static str, Option<&str>), CommandError> {
        if identifier == 0 {
            return Ok(("home", None));
        }
        let input = self
            .inputs
            .get(identifier as usize - 1)
            .ok_or(CommandError::UnknownInput(identifier))?;
        match input.input_type {
            InputType::HomeScreen => Ok(("home", None)),
            InputType::Application => match input.package.as_deref() {
                Some(package) => Ok(("openApp", Some(package))),
                None => Err(CommandError::MissingParameter("openApp")),
            },
            InputType::Hdmi => match input.source.as_deref() {
                Some("HDMI1") => Ok(("hdmi1", None)),
                Some("HDMI2") => Ok(("hdmi2", None)),
                _ => Err(CommandError::UnknownInput(identifier)),
            },
        }
    }

    /// `wake_from` is the last-known state read at request time; `None`
    /// skips the wake wait.
    fn launch(
        &self,
        pending: PendingSend,
        wake_from: Option<ReachabilityState>,
    ) -> JoinHandle<Delivery> {
        let dispatcher = self.dispatcher.clone();
        let wake = self.wake;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let work = async {
                if let Some(last_known) = wake_from {
                    wake.settle(last_known).await;
                }
                dispatcher.deliver(pending).await
            };
            tokio::select! {
                delivery = work => delivery,
                _ = shutdown_signalled(&mut shutdown_rx) => Delivery::Cancelled,
            }
        })
    }

    /// Stops the liveness loop and cancels in-flight sends.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.tracker.take() {
            if let Err(err) = handle.await {
                tracing::warn!(device = %self.info.name, error = %err, "liveness task ended abnormally");
            }
        }
        tracing::info!(device = %self.info.name, "device session stopped");
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
