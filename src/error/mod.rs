use std::fmt;

/// Caller-visible command failures. Reachability and transport problems are
/// not errors; they surface as [`crate::model::Delivery`] outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    UnknownCommand(String),
    UnknownKey(u8),
    UnknownInput(u32),
    MissingParameter(&'static str),
    UnexpectedParameter(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand(name) => write!(f, "unknown command: {name}"),
            Self::UnknownKey(code) => write!(f, "unknown remote key code: {code}"),
            Self::UnknownInput(id) => write!(f, "unknown input identifier: {id}"),
            Self::MissingParameter(name) => write!(f, "command {name} requires a parameter"),
            Self::UnexpectedParameter(name) => {
                write!(f, "command {name} does not take a parameter")
            }
        }
    }
}

impl std::error::Error for CommandError {}
