//! Engine configuration.
//!
//! Timing constants for previews, warnings, confirmations and extensions. Loaded
//! from JSON by the auctioneer; every field has a default.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::item::MAX_DURATION_MINUTES;

/// Accepted preview lengths, in seconds.
pub const PREVIEW_RANGE: RangeInclusive<u64> = 20..=30;
/// Upper bound on every `*_secs` setting.
pub const MAX_DELAY_SECS: u64 = 24 * 3600;

/// Configuration for the auction engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between announcing an item and opening it for bids
    pub preview_secs: u64,
    /// Delay between the end of one item and the announcement of the next
    pub item_wait_secs: u64,
    /// Delay between the last item of a session and the first of the next
    pub session_wait_secs: u64,
    /// How long a member has to confirm a proposed bid
    pub confirm_timeout_secs: u64,
    /// Minimum spacing between two bid submissions of one member
    pub rate_limit_secs: u64,
    /// Maximum number of bid-triggered extensions per item
    pub max_extensions: u32,
    /// Time added per extension
    pub extension_secs: u64,
    /// A confirmed bid extends the item when less than this remains
    pub extension_window_secs: u64,
    /// Minimum raise over the current bid
    pub min_increment: u64,
    /// Duration used for catalog rows without one
    pub default_duration_minutes: u64,
    /// Offset of the community's local time from UTC
    pub utc_offset_hours: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preview_secs: 20,
            item_wait_secs: 20,
            session_wait_secs: 10,
            confirm_timeout_secs: 10,
            rate_limit_secs: 3,
            max_extensions: 15,
            extension_secs: 60,
            extension_window_secs: 60,
            min_increment: 1,
            default_duration_minutes: 30,
            utc_offset_hours: 8,
        }
    }
}

impl EngineConfig {
    pub fn preview(&self) -> Duration {
        Duration::from_secs(self.preview_secs)
    }

    pub fn item_wait(&self) -> Duration {
        Duration::from_secs(self.item_wait_secs)
    }

    pub fn session_wait(&self) -> Duration {
        Duration::from_secs(self.session_wait_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.rate_limit_secs)
    }

    pub fn extension(&self) -> Duration {
        Duration::from_secs(self.extension_secs)
    }

    pub fn extension_window(&self) -> Duration {
        Duration::from_secs(self.extension_window_secs)
    }

    /// Local time zone of the community.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !PREVIEW_RANGE.contains(&self.preview_secs) {
            return Err(ConfigValidationError::PreviewOutOfRange(self.preview_secs));
        }
        if self.item_wait_secs == 0 {
            return Err(ConfigValidationError::ZeroDuration("item_wait_secs"));
        }
        if self.confirm_timeout_secs == 0 {
            return Err(ConfigValidationError::ZeroDuration("confirm_timeout_secs"));
        }
        if self.extension_secs == 0 {
            return Err(ConfigValidationError::ZeroDuration("extension_secs"));
        }
        if self.default_duration_minutes == 0 {
            return Err(ConfigValidationError::ZeroDuration(
                "default_duration_minutes",
            ));
        }
        if self.default_duration_minutes > MAX_DURATION_MINUTES {
            return Err(ConfigValidationError::TooLong("default_duration_minutes"));
        }
        for (field, secs) in [
            ("session_wait_secs", self.session_wait_secs),
            ("item_wait_secs", self.item_wait_secs),
            ("confirm_timeout_secs", self.confirm_timeout_secs),
            ("rate_limit_secs", self.rate_limit_secs),
            ("extension_secs", self.extension_secs),
            ("extension_window_secs", self.extension_window_secs),
        ] {
            if secs > MAX_DELAY_SECS {
                return Err(ConfigValidationError::TooLong(field));
            }
        }
        if self.min_increment == 0 {
            return Err(ConfigValidationError::ZeroIncrement);
        }
        if !(-14..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigValidationError::InvalidOffset(self.utc_offset_hours));
        }
        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("preview_secs must be between 20 and 30, got {0}")]
    PreviewOutOfRange(u64),

    #[error("{0} cannot be zero")]
    ZeroDuration(&'static str),

    #[error("{0} is too long")]
    TooLong(&'static str),

    #[error("min_increment cannot be zero")]
    ZeroIncrement,

    #[error("UTC offset out of range: {0}h")]
    InvalidOffset(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_extensions, 15);
        assert_eq!(config.confirm_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_confirm_timeout() {
        let config = EngineConfig {
            confirm_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::ZeroDuration("confirm_timeout_secs"))
        ));
    }

    #[test]
    fn test_preview_and_wait_bounds() {
        for preview_secs in [20, 25, 30] {
            let config = EngineConfig {
                preview_secs,
                ..Default::default()
            };
            assert!(config.validate().is_ok());
        }
        for preview_secs in [0, 19, 31] {
            let config = EngineConfig {
                preview_secs,
                ..Default::default()
            };
            assert_eq!(
                config.validate(),
                Err(ConfigValidationError::PreviewOutOfRange(preview_secs))
            );
        }

        let config = EngineConfig {
            item_wait_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::ZeroDuration("item_wait_secs"))
        );

        let config = EngineConfig {
            default_duration_minutes: u64::MAX,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::TooLong("default_duration_minutes"))
        );

        let config = EngineConfig {
            confirm_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::TooLong("confirm_timeout_secs"))
        );
    }

    #[test]
    fn test_invalid_offset() {
        let config = EngineConfig {
            utc_offset_hours: 20,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidOffset(20))
        ));
    }

    #[test]
    fn test_partial_json() {
        let config: EngineConfig = serde_json::from_str(r#"{"preview_secs": 25}"#).unwrap();
        assert_eq!(config.preview_secs, 25);
        assert_eq!(config.item_wait_secs, 20);
    }
}
