use serde::Serialize;
use std::fmt;

pub const SIMPLE_PORT: u16 = 16735;
pub const COMPLEX_PORT: u16 = 16750;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// `KEYPRESSES:` / `KEYSSTATUS:` key-press strings.
    Simple,
    /// JSON control objects.
    Complex,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    pub host: String,
    pub simple_port: u16,
    pub complex_port: u16,
}

impl DeviceEndpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            simple_port: SIMPLE_PORT,
            complex_port: COMPLEX_PORT,
        }
    }

    pub fn with_ports(mut self, simple_port: u16, complex_port: u16) -> Self {
        self.simple_port = simple_port;
        self.complex_port = complex_port;
        self
    }

    pub fn port_for(&self, kind: ProtocolKind) -> u16 {
        match kind {
            ProtocolKind::Simple => self.simple_port,
            ProtocolKind::Complex => self.complex_port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReachabilityState {
    #[default]
    Unknown,
    Alive,
    Dead,
}

impl ReachabilityState {
    pub fn from_outcome(alive: bool) -> Self {
        if alive {
            Self::Alive
        } else {
            Self::Dead
        }
    }

    /// Unknown counts as off: nothing has answered yet.
    pub fn is_on(self) -> bool {
        matches!(self, Self::Alive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerEvent {
    pub device: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDirection {
    Increment,
    Decrement,
}

impl VolumeDirection {
    /// HomeKit VolumeSelector values.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Increment),
            1 => Some(Self::Decrement),
            _ => None,
        }
    }
}

/// Outcome of one dispatch attempt. None of these are errors from the
/// caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Delivery {
    Sent { port: u16, bytes: usize },
    Unreachable,
    TransportFailed,
    /// Key intentionally mapped to nothing.
    Skipped,
    /// Session torn down before the send happened.
    Cancelled,
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_defaults_to_firmware_ports() {
        let ep = DeviceEndpoint::new("10.0.0.5");
        assert_eq!(ep.port_for(ProtocolKind::Simple), 16735);
        assert_eq!(ep.port_for(ProtocolKind::Complex), 16750);
    }

    #[test]
    fn unknown_state_is_not_on() {
        assert!(!ReachabilityState::Unknown.is_on());
        assert!(!ReachabilityState::Dead.is_on());
        assert!(ReachabilityState::from_outcome(true).is_on());
    }

    #[test]
    fn volume_codes_follow_homekit_selector() {
        assert_eq!(VolumeDirection::from_code(0), Some(VolumeDirection::Increment));
        assert_eq!(VolumeDirection::from_code(1), Some(VolumeDirection::Decrement));
        assert_eq!(VolumeDirection::from_code(2), None);
    }

    #[test]
    fn delivery_serializes_with_outcome_tag() {
        let json = serde_json::to_string(&Delivery::Sent { port: 16735, bytes: 13 }).unwrap();
        assert_eq!(json, r#"{"outcome":"sent","port":16735,"bytes":13}"#);
    }
}
