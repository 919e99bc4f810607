//! On-disk format of a line definition.
//!
//! A line file holds the line-level parameters and the machines in physical
//! order. It is deserialized from RON, JSON, or TOML and validated by core
//! when the line is built.

use lineflow_core::config::{validate_line, ConfigError, LineConfig, MachineConfig};
use serde::{Deserialize, Serialize};

/// A complete line definition.
///
/// `line` may be omitted entirely; every line parameter has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFile {
    #[serde(default)]
    pub line: LineConfig,
    /// Machines from head to tail.
    #[serde(default)]
    pub machines: Vec<MachineConfig>,
}

impl LineFile {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_line(&self.line, &self.machines)
    }
}
