//! Subscription delivery configuration.
//!
//! Flow control is credit based: a subscription stops handing events to its
//! handler once unacknowledged bytes exceed `high_water_bytes` and resumes
//! when acknowledgements bring them back to `low_water_bytes` or below.

use serde::Deserialize;

use super::ConfigError;

/// Default high-water mark for unacknowledged bytes (1 MiB).
pub const DEFAULT_HIGH_WATER_BYTES: u64 = 1024 * 1024;

/// Default low-water mark for unacknowledged bytes (512 KiB).
pub const DEFAULT_LOW_WATER_BYTES: u64 = 512 * 1024;

/// What a subscription does when its buffer reaches `buffer_limit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered event to make room.
    #[default]
    DropOldest,
    /// Unsubscribe the consumer.
    Disconnect,
}

/// Delivery pipeline configuration shared by all subscriptions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Pause delivery once outstanding bytes exceed this.
    pub high_water_bytes: u64,
    /// Resume delivery once outstanding bytes fall to this.
    pub low_water_bytes: u64,
    /// Maximum buffered events per subscription. `None` is unbounded.
    pub buffer_limit: Option<usize>,
    /// Applied when `buffer_limit` is reached.
    pub overflow: OverflowPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            high_water_bytes: DEFAULT_HIGH_WATER_BYTES,
            low_water_bytes: DEFAULT_LOW_WATER_BYTES,
            buffer_limit: None,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl DeliveryConfig {
    /// Set explicit watermarks.
    pub fn with_watermarks(mut self, high_water_bytes: u64, low_water_bytes: u64) -> Self {
        self.high_water_bytes = high_water_bytes;
        self.low_water_bytes = low_water_bytes;
        self
    }

    /// Bound the per-subscription buffer.
    pub fn with_buffer_limit(mut self, limit: usize, overflow: OverflowPolicy) -> Self {
        self.buffer_limit = Some(limit);
        self.overflow = overflow;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.low_water_bytes > self.high_water_bytes {
            return Err(ConfigError::WatermarkOrder {
                low: self.low_water_bytes,
                high: self.high_water_bytes,
            });
        }
        if self.buffer_limit == Some(0) {
            return Err(ConfigError::ZeroBufferLimit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_config_default() {
        let config = DeliveryConfig::default();
        assert_eq!(config.high_water_bytes, DEFAULT_HIGH_WATER_BYTES);
        assert_eq!(config.low_water_bytes, DEFAULT_LOW_WATER_BYTES);
        assert_eq!(config.overflow, OverflowPolicy::DropOldest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_buffer_limit_rejected() {
        let config = DeliveryConfig::default().with_buffer_limit(0, OverflowPolicy::Disconnect);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBufferLimit)));
    }
}
