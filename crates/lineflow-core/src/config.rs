//! Construction-time parameters for machines and the line.
//!
//! Both structs deserialize with defaults for every optional knob, so data
//! files only need to name what differs. Validation is fail-fast: a line is
//! never built from parameters that would produce nonsensical behaviour.

use crate::fixed::{f64_to_fixed64, Fixed64, Millis};
use crate::id::MachineId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Errors raised when validating configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("machine at position {index} has an empty id")]
    EmptyMachineId { index: usize },

    #[error("duplicate machine id '{id}'")]
    DuplicateMachineId { id: MachineId },

    #[error("machine '{id}': failure rate {rate} must be finite and >= 0")]
    InvalidFailureRate { id: MachineId, rate: f64 },

    #[error("tick interval must be > 0 ms")]
    ZeroTickInterval,

    #[error("injection probability {value} must be within [0, 1]")]
    InvalidInjectionProbability { value: f64 },

    #[error("history capacity must be > 0")]
    ZeroHistoryCapacity,

    #[error("history sample interval must be > 0 ticks")]
    ZeroSampleInterval,
}

// ---------------------------------------------------------------------------
// Machine configuration
// ---------------------------------------------------------------------------

/// Static parameters of one machine. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub id: MachineId,
    pub name: String,
    pub process_time_base_ms: Millis,
    #[serde(default)]
    pub process_time_variance_ms: Millis,
    /// Expected breakdowns per second of processing.
    #[serde(default)]
    pub failure_rate_per_second: f64,
    #[serde(default)]
    pub repair_time_base_ms: Millis,
    #[serde(default)]
    pub repair_time_variance_ms: Millis,
    /// Input buffer slots. Zero is valid: the machine never accepts input.
    pub buffer_capacity: usize,
}

impl MachineConfig {
    /// A never-failing machine with a constant process time.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        process_time_base_ms: Millis,
        buffer_capacity: usize,
    ) -> Self {
        Self {
            id: MachineId::new(id),
            name: name.into(),
            process_time_base_ms,
            process_time_variance_ms: 0,
            failure_rate_per_second: 0.0,
            repair_time_base_ms: 0,
            repair_time_variance_ms: 0,
            buffer_capacity,
        }
    }

    pub fn with_process_variance(mut self, variance_ms: Millis) -> Self {
        self.process_time_variance_ms = variance_ms;
        self
    }

    pub fn with_failures(
        mut self,
        failure_rate_per_second: f64,
        repair_time_base_ms: Millis,
        repair_time_variance_ms: Millis,
    ) -> Self {
        self.failure_rate_per_second = failure_rate_per_second;
        self.repair_time_base_ms = repair_time_base_ms;
        self.repair_time_variance_ms = repair_time_variance_ms;
        self
    }

    /// Check the per-machine contract.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.id.as_str().is_empty() {
            return Err(ConfigError::EmptyMachineId { index });
        }
        let rate = self.failure_rate_per_second;
        if !rate.is_finite() || rate < 0.0 {
            return Err(ConfigError::InvalidFailureRate {
                id: self.id.clone(),
                rate,
            });
        }
        Ok(())
    }

    /// Breakdown probability for one processing tick of `tick_interval_ms`.
    ///
    /// Clamped to 1, so rates far beyond the fixed-point range still mean a
    /// certain breakdown.
    pub fn failure_probability_per_tick(&self, tick_interval_ms: Millis) -> Fixed64 {
        let p = self.failure_rate_per_second * tick_interval_ms as f64 / 1000.0;
        Fixed64::saturating_from_num(p).min(Fixed64::ONE)
    }
}

// ---------------------------------------------------------------------------
// Line configuration
// ---------------------------------------------------------------------------

/// Line-level parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Nominal tick length. Only used to turn per-second failure rates into
    /// per-tick probabilities.
    pub tick_interval_ms: Millis,
    /// Chance per tick that a new item is offered to the head machine.
    pub injection_probability: f64,
    /// Sample cumulative finished goods every this many ticks.
    pub history_sample_interval: u64,
    /// Maximum retained production history samples.
    pub history_capacity: usize,
    /// Seed for the default random source.
    pub seed: u64,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            injection_probability: 0.3,
            history_sample_interval: 10,
            history_capacity: 100,
            seed: 0,
        }
    }
}

impl LineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        let p = self.injection_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidInjectionProbability { value: p });
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        if self.history_sample_interval == 0 {
            return Err(ConfigError::ZeroSampleInterval);
        }
        Ok(())
    }

    pub(crate) fn injection_chance(&self) -> Fixed64 {
        f64_to_fixed64(self.injection_probability)
    }
}

/// Validate a whole line definition: line parameters, every machine, and id
/// uniqueness.
pub fn validate_line(config: &LineConfig, machines: &[MachineConfig]) -> Result<(), ConfigError> {
    config.validate()?;
    let mut seen = HashSet::new();
    for (index, machine) in machines.iter().enumerate() {
        machine.validate(index)?;
        if !seen.insert(&machine.id) {
            return Err(ConfigError::DuplicateMachineId {
                id: machine.id.clone(),
            });
        }
    }
    Ok(())
}
