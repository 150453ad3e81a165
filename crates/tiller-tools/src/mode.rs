use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

/// Operating policy controlling which capabilities a session exposes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    #[default]
    Default,
    /// Read-only exploration: mutating tools are withheld.
    Plan,
    /// Unattended runs, historically spelled `async`.
    #[serde(alias = "async")]
    Autonomous,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    pub fn is_plan(self) -> bool {
        matches!(self, Mode::Plan)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode '{0}' (expected one of: default, plan, autonomous)")]
pub struct ParseModeError(pub String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Mode::Default),
            "plan" => Ok(Mode::Plan),
            "autonomous" | "async" => Ok(Mode::Autonomous),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}
