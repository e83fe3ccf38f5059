use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};

/// Configuration for the [`EventBus`](crate::EventBus).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of each subscriber's queue.
    pub capacity: usize,
    /// How many out-of-order events may wait for a missing sequence before
    /// the bus gives up on it.
    pub reorder_window: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            reorder_window: 64,
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(BusError::InvalidConfig("capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(BusConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = BusConfig {
            capacity: 0,
            ..BusConfig::default()
        };
        assert!(matches!(config.validate(), Err(BusError::InvalidConfig(_))));
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: BusConfig = serde_json::from_str(r#"{"capacity": 8}"#).unwrap();
        assert_eq!(config.capacity, 8);
        assert_eq!(config.reorder_window, 64);
    }
}
