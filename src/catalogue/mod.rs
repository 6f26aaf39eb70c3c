use crate::error::CommandError;
use crate::model::ProtocolKind;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy)]
pub enum Template {
    Literal(&'static str),
    /// Single string argument, substituted verbatim.
    Param(fn(&str) -> String),
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(payload) => f.debug_tuple("Literal").field(payload).finish(),
            Self::Param(_) => f.write_str("Param(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub kind: ProtocolKind,
    pub template: Template,
}

impl CommandSpec {
    const fn simple(name: &'static str, payload: &'static str) -> Self {
        Self {
            name,
            kind: ProtocolKind::Simple,
            template: Template::Literal(payload),
        }
    }

    const fn complex(name: &'static str, payload: &'static str) -> Self {
        Self {
            name,
            kind: ProtocolKind::Complex,
            template: Template::Literal(payload),
        }
    }

    const fn complex_with(name: &'static str, build: fn(&str) -> String) -> Self {
        Self {
            name,
            kind: ProtocolKind::Complex,
            template: Template::Param(build),
        }
    }

    pub fn takes_param(&self) -> bool {
        matches!(self.template, Template::Param(_))
    }

    pub fn render(&self, param: Option<&str>) -> Result<String, CommandError> {
        match (self.template, param) {
            (Template::Literal(payload), None) => Ok(payload.to_string()),
            (Template::Literal(_), Some(_)) => Err(CommandError::UnexpectedParameter(self.name)),
            (Template::Param(build), Some(value)) => Ok(build(value)),
            (Template::Param(_), None) => Err(CommandError::MissingParameter(self.name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub name: &'static str,
    pub kind: ProtocolKind,
    pub payload: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandInfo {
    pub name: &'static str,
    pub kind: ProtocolKind,
    pub takes_param: bool,
}

fn open_app(package: &str) -> String {
    format!(
        r#"{{"action":20000,"controlCmd":{{"data":"{package}","delayTime":0,"mode":7,"time":0,"type":1}},"msgid":"2"}}"#
    )
}

fn cast_media(url: &str) -> String {
    format!(
        r#"{{"action":30200,"customPlay":{{"mediatype":2,"mode":0,"playlist":[{{"num":0,"url":"{url}","vips":[]}}],"pos":0,"position":0,"songId":0,"songsList":[],"type":0}},"msgid":"2","packageName":"com.xgimi.zhushou","version":"4.0.6"}}"#
    )
}

const STANDARD_COMMANDS: &[CommandSpec] = &[
    CommandSpec::simple("play", "KEYPRESSES:49"),
    CommandSpec::simple("pause", "KEYPRESSES:49"),
    CommandSpec::simple("power", "KEYPRESSES:116"),
    CommandSpec::simple("back", "KEYPRESSES:48"),
    CommandSpec::simple("home", "KEYPRESSES:35"),
    CommandSpec::simple("menu", "KEYPRESSES:139"),
    CommandSpec::simple("right", "KEYPRESSES:37"),
    CommandSpec::simple("left", "KEYPRESSES:50"),
    CommandSpec::simple("up", "KEYPRESSES:36"),
    CommandSpec::simple("down", "KEYPRESSES:38"),
    CommandSpec::simple("volumeMute", "KEYPRESSES:113"),
    CommandSpec::simple("volumeDown", "KEYPRESSES:114"),
    CommandSpec::simple("volumeUp", "KEYPRESSES:115"),
    CommandSpec::simple("powerOff", "KEYPRESSES:30"),
    CommandSpec::simple("setting", "KEYPRESSES:251"),
    CommandSpec::simple("focusLeftStart", "KEYSSTATUS:253+1"),
    CommandSpec::simple("focusLeftEnd", "KEYSSTATUS:253+0"),
    CommandSpec::simple("focusRightStart", "KEYSSTATUS:254+1"),
    CommandSpec::simple("focusRightEnd", "KEYSSTATUS:254+0"),
    CommandSpec::complex(
        "off",
        r#"{"action":20000,"controlCmd":{"delayTime":0,"mode":6,"time":0,"type":2},"msgid":"2"}"#,
    ),
    CommandSpec::complex(
        "on",
        r#"{"action":20000,"controlCmd":{"delayTime":0,"mode":6,"time":0,"type":4},"msgid":"2"}"#,
    ),
    CommandSpec::complex(
        "reboot",
        r#"{"action":20000,"controlCmd":{"delayTime":0,"mode":6,"time":0,"type":1},"msgid":"2"}"#,
    ),
    CommandSpec::complex(
        "cancelOff",
        r#"{"action":20000,"controlCmd":{"delayTime":0,"mode":6,"time":0,"type":3},"msgid":"2"}"#,
    ),
    CommandSpec::complex(
        "off15",
        r#"{"action":20000,"controlCmd":{"delayTime":0,"mode":6,"time":1,"type":3},"msgid":"2"}"#,
    ),
    CommandSpec::complex(
        "off30",
        r#"{"action":20000,"controlCmd":{"delayTime":0,"mode":6,"time":2,"type":3},"msgid":"2"}"#,
    ),
    CommandSpec::complex(
        "off60",
        r#"{"action":20000,"controlCmd":{"delayTime":0,"mode":6,"time":3,"type":3},"msgid":"2"}"#,
    ),
    CommandSpec::complex(
        "off120",
        r#"{"action":20000,"controlCmd":{"delayTime":0,"mode":6,"time":4,"type":3},"msgid":"2"}"#,
    ),
    CommandSpec::complex_with("openApp", open_app),
    CommandSpec::complex(
        "voiceSearch",
        r#"{"action":20000,"controlCmd":{"data":"语音搜索","delayTime":0,"mode":5,"time":0,"type":0},"msgid":"2"}"#,
    ),
    CommandSpec::complex_with("forScreen", cast_media),
    CommandSpec::complex(
        "cleanMemory",
        r#"{"action":20000,"controlCmd":{"delayTime":0,"mode":9,"time":0,"type":2},"msgid":"2"}"#,
    ),
    CommandSpec::complex(
        "hdmi1",
        r#"{"action":20000,"controlCmd":{"data":"HDMI1","delayTime":0,"mode":5,"time":0,"type":0},"msgid":"2"}"#,
    ),
    CommandSpec::complex(
        "hdmi2",
        r#"{"action":20000,"controlCmd":{"data":"HDMI2","delayTime":0,"mode":5,"time":0,"type":0},"msgid":"2"}"#,
    ),
];

/// Symbolic command name to wire payload. Immutable once built.
#[derive(Debug, Clone)]
pub struct Catalogue {
    entries: HashMap<&'static str, CommandSpec>,
}

impl Catalogue {
    pub fn standard() -> Self {
        Self::from_specs(STANDARD_COMMANDS.iter().copied())
    }

    pub fn from_specs(specs: impl IntoIterator<Item = CommandSpec>) -> Self {
        Self {
            entries: specs.into_iter().map(|spec| (spec.name, spec)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.entries.get(name)
    }

    pub fn encode(&self, name: &str, param: Option<&str>) -> Result<Encoded, CommandError> {
        let spec = self
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        Ok(Encoded {
            name: spec.name,
            kind: spec.kind,
            payload: spec.render(param)?,
        })
    }

    pub fn list(&self) -> Vec<CommandInfo> {
        let mut out: Vec<CommandInfo> = self
            .entries
            .values()
            .map(|spec| CommandInfo {
                name: spec.name,
                kind: spec.kind,
                takes_param: spec.takes_param(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(b.name));
        out
    }
}

/// What a remote key code resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBinding {
    Command(&'static str),
    /// Known key with nothing to send.
    NoOp,
}

// HomeKit RemoteKey codes.
const STANDARD_KEYS: &[(u8, Option<&str>)] = &[
    (0, None),          // REWIND
    (1, None),          // FAST_FORWARD
    (2, None),          // NEXT_TRACK
    (3, None),          // PREVIOUS_TRACK
    (4, Some("up")),    // ARROW_UP
    (5, Some("down")),  // ARROW_DOWN
    (6, Some("left")),  // ARROW_LEFT
    (7, Some("right")), // ARROW_RIGHT
    (8, Some("play")),  // SELECT
    (9, Some("back")),  // BACK
    (10, Some("home")), // EXIT
    (11, Some("pause")), // PLAY_PAUSE
    (15, Some("menu")), // INFORMATION
];

#[derive(Debug, Clone)]
pub struct RemoteKeyMap {
    keys: HashMap<u8, Option<&'static str>>,
}

impl RemoteKeyMap {
    pub fn standard() -> Self {
        Self {
            keys: STANDARD_KEYS.iter().copied().collect(),
        }
    }

    pub fn resolve(&self, code: u8) -> Result<KeyBinding, CommandError> {
        match self.keys.get(&code) {
            Some(Some(name)) => Ok(KeyBinding::Command(name)),
            Some(None) => Ok(KeyBinding::NoOp),
            None => Err(CommandError::UnknownKey(code)),
        }
    }
}
