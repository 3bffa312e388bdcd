use camino::Utf8Path;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::clock::SimTime;
use crate::error::HarnessError;

/// Knobs of the reference device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Falling edges the ALU needs before its output is valid again after
    /// an input change.
    pub alu_latency_cycles: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            alu_latency_cycles: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Full clock period; 10 ns is 100 MHz.
    pub clock_period_ns: SimTime,
    /// Rising edges to wait whenever a signal has to propagate.
    pub settle_cycles: u32,
    pub alu_timeout_ns: SimTime,
    /// Fixed seed for stimulus generation; random when unset.
    pub seed: Option<u64>,
    pub device: DeviceConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            clock_period_ns: 10,
            settle_cycles: 10,
            alu_timeout_ns: 200,
            seed: None,
            device: DeviceConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config {path}"))?;
        let config: Self = serde_json::from_str(&text)
            .wrap_err_with(|| format!("Failed to parse config {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Checked again whenever a harness starts its clock, so a config built
    /// in code gets the same treatment as one read from a file.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.clock_period_ns == 0 || self.clock_period_ns % 2 != 0 {
            return Err(HarnessError::InvalidConfig {
                reason: format!(
                    "clock period must be a non-zero even number of ns, got {}",
                    self.clock_period_ns
                ),
            });
        }
        if self.settle_cycles == 0 {
            return Err(HarnessError::InvalidConfig {
                reason: "settle margin must be at least one cycle".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.clock_period_ns, 10);
        assert_eq!(config.settle_cycles, 10);
        assert_eq!(config.alu_timeout_ns, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{ "settle_cycles": 3, "device": { "alu_latency_cycles": 5 } }"#)
                .unwrap();
        assert_eq!(config.settle_cycles, 3);
        assert_eq!(config.device.alu_latency_cycles, 5);
        assert_eq!(config.clock_period_ns, 10);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_rejects_odd_period() {
        let config = HarnessConfig {
            clock_period_ns: 7,
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());

        for period in [0, 1] {
            let config = HarnessConfig {
                clock_period_ns: period,
                ..HarnessConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(HarnessError::InvalidConfig { .. })),
                "period {period} accepted"
            );
        }
    }

    #[test]
    fn test_rejects_zero_settle() {
        let config = HarnessConfig {
            settle_cycles: 0,
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(HarnessConfig::load(Utf8Path::new("does/not/exist.json")).is_err());
    }
}
