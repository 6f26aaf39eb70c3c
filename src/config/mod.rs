use crate::model::{DeviceEndpoint, COMPLEX_PORT, SIMPLE_PORT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "XGIMI_";
const DEFAULT_MANUFACTURER: &str = "XGimi";
const DEFAULT_MODEL: &str = "XGimiRemoteHomeBridgePlugin";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub timing: TimingConfig,
    pub probe: ProbeConfig,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub presend_timeout_ms: u64,
    pub wake_grace_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            poll_timeout_ms: 3_000,
            presend_timeout_ms: 4_000,
            wake_grace_ms: 2_000,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn presend_timeout(&self) -> Duration {
        Duration::from_millis(self.presend_timeout_ms)
    }

    pub fn wake_grace(&self) -> Duration {
        Duration::from_millis(self.wake_grace_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    Ping,
    Tcp,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub method: ProbeMethod,
    pub tcp_port: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            method: ProbeMethod::Ping,
            tcp_port: 80,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub host: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub simple_port: u16,
    pub complex_port: u16,
    pub inputs: Vec<InputConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "XGimi TV".to_string(),
            host: String::new(),
            manufacturer: None,
            model: None,
            serial_number: None,
            simple_port: SIMPLE_PORT,
            complex_port: COMPLEX_PORT,
            inputs: Vec::new(),
        }
    }
}

impl DeviceConfig {
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new(self.host.clone()).with_ports(self.simple_port, self.complex_port)
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.name.clone(),
            manufacturer: self
                .manufacturer
                .clone()
                .unwrap_or_else(|| DEFAULT_MANUFACTURER.to_string()),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            serial_number: self
                .serial_number
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputType {
    Application,
    Hdmi,
    HomeScreen,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct InputConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// HDMI1 or HDMI2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = active_config_path();
        let mut config = match fs::read_to_string(&config_path) {
            Ok(raw) => toml::from_str::<Config>(&raw)?,
            Err(_) => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var(format!("{}HOST", ENV_PREFIX)) {
            match self.devices.first_mut() {
                Some(device) => device.host = val,
                None => self.devices.push(DeviceConfig {
                    host: val,
                    ..DeviceConfig::default()
                }),
            }
        }
        if let Ok(val) = env::var(format!("{}POLL_INTERVAL_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.timing.poll_interval_ms = ms;
            }
        }
        if let Ok(val) = env::var(format!("{}PRESEND_TIMEOUT_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.timing.presend_timeout_ms = ms;
            }
        }
        if let Ok(val) = env::var(format!("{}WAKE_GRACE_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.timing.wake_grace_ms = ms;
            }
        }
        if let Ok(val) = env::var(format!("{}PROBE_METHOD", ENV_PREFIX)) {
            match val.to_ascii_lowercase().as_str() {
                "ping" => self.probe.method = ProbeMethod::Ping,
                "tcp" => self.probe.method = ProbeMethod::Tcp,
                other => tracing::warn!(method = other, "ignoring unknown probe method override"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.timing.poll_interval_ms < 500 {
            return Err("timing.poll_interval_ms must be >= 500".into());
        }
        if self.timing.poll_timeout_ms == 0 || self.timing.presend_timeout_ms == 0 {
            return Err("probe timeouts must be non-zero".into());
        }
        if self.probe.method == ProbeMethod::Tcp && self.probe.tcp_port == 0 {
            return Err("probe.tcp_port must be non-zero".into());
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err("devices[].name must be set".into());
            }
            if !names.insert(device.name.as_str()) {
                return Err(format!("duplicate device name: {}", device.name).into());
            }
            if device.host.trim().is_empty() {
                return Err(format!("device {} has no host", device.name).into());
            }
            if device.simple_port == 0 || device.complex_port == 0 {
                return Err(format!("device {} ports must be non-zero", device.name).into());
            }
            for input in &device.inputs {
                validate_input(&device.name, input)?;
            }
        }
        Ok(())
    }

    pub fn device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            return Err("config.toml already exists".into());
        }
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = toml::to_string_pretty(&Config::sample())?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        managed_config_path()
    }

    fn sample() -> Self {
        Self {
            devices: vec![DeviceConfig {
                host: "10.10.10.10".to_string(),
                inputs: vec![InputConfig {
                    name: "File Manager".to_string(),
                    input_type: InputType::Application,
                    package: Some("com.xgimi.filemanager".to_string()),
                    source: None,
                }],
                ..DeviceConfig::default()
            }],
            ..Self::default()
        }
    }
}

fn validate_input(device: &str, input: &InputConfig) -> Result<(), Box<dyn std::error::Error>> {
    match input.input_type {
        InputType::Application => {
            if input.package.as_deref().unwrap_or("").trim().is_empty() {
                return Err(format!(
                    "device {device} input {} needs a package",
                    input.name
                )
                .into());
            }
        }
        InputType::Hdmi => match input.source.as_deref() {
            Some("HDMI1") | Some("HDMI2") => {}
            _ => {
                return Err(format!(
                    "device {device} input {} needs source HDMI1 or HDMI2",
                    input.name
                )
                .into())
            }
        },
        InputType::HomeScreen => {}
    }
    Ok(())
}

fn managed_config_path() -> PathBuf {
    if let Ok(path) = env::var(format!("{}CONFIG_PATH", ENV_PREFIX)) {
        return PathBuf::from(path);
    }
    let base = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|home| Path::new(&home).join(".config")))
        .unwrap_or_else(|_| PathBuf::from("."));
    base.join("xgimi-remote").join(CONFIG_FILE)
}

fn active_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        local
    } else {
        managed_config_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_round_trips_and_validates() {
        let cfg = Config::sample();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.devices[0].inputs, cfg.devices[0].inputs);
    }

    #[test]
    fn defaults_match_device_firmware_timing() {
        let cfg = Config::default();
        assert_eq!(cfg.timing.poll_interval(), Duration::from_secs(10));
        assert_eq!(cfg.timing.poll_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.timing.presend_timeout(), Duration::from_secs(4));
        assert_eq!(cfg.timing.wake_grace(), Duration::from_millis(2000));
        assert_eq!(cfg.probe.method, ProbeMethod::Ping);
    }

    #[test]
    fn parses_device_with_inputs() {
        let raw = r#"
            [[devices]]
            name = "Living Room"
            host = "192.168.1.40"
            model = "H3"

            [[devices.inputs]]
            name = "Console"
            type = "HDMI"
            source = "HDMI2"

            [[devices.inputs]]
            name = "Home"
            type = "HOME_SCREEN"
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        cfg.validate().unwrap();
        let device = cfg.device("Living Room").unwrap();
        assert_eq!(device.endpoint(), DeviceEndpoint::new("192.168.1.40"));
        assert_eq!(device.inputs[0].input_type, InputType::Hdmi);
        assert_eq!(device.inputs[1].input_type, InputType::HomeScreen);

        let info = device.info();
        assert_eq!(info.manufacturer, "XGimi");
        assert_eq!(info.model, "H3");
        assert_eq!(info.serial_number, "XGimiRemoteHomeBridgePlugin");
    }

    #[test]
    fn validate_rejects_bad_devices() {
        let mut cfg = Config::sample();
        cfg.devices[0].host = String::new();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::sample();
        cfg.devices.push(cfg.devices[0].clone());
        assert!(cfg.validate().is_err());

        let mut cfg = Config::sample();
        cfg.devices[0].complex_port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_checks_input_requirements() {
        let mut cfg = Config::sample();
        cfg.devices[0].inputs[0].package = None;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::sample();
        cfg.devices[0].inputs.push(InputConfig {
            name: "Console".to_string(),
            input_type: InputType::Hdmi,
            package: None,
            source: Some("HDMI3".to_string()),
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_too_fast_polling() {
        let mut cfg = Config::default();
        cfg.timing.poll_interval_ms = 100;
        assert!(cfg.validate().is_err());
    }
}
