//! Tuning values for parsing, expansion and refresh.
//!
//! Every field has a default, so an empty TOML file is a valid configuration:
//!
//! ```toml
//! default_timezone = "Europe/Berlin"
//! max_occurrences = 1000
//! forward_window_days = 730
//! lookback_days = 7
//! max_feed_bytes = 4194304
//! refresh_interval_secs = 300
//! feeds = ["calendars/team.ics"]
//! ```

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;
use crate::error::{EngineError, Result};
use crate::expander::ExpansionWindow;
use crate::timezone::TimeZoneResolver;

pub const DEFAULT_MAX_OCCURRENCES: usize = 1000;
pub const DEFAULT_FORWARD_WINDOW_DAYS: i64 = 730;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;
pub const DEFAULT_MAX_FEED_BYTES: usize = 4 * 1024 * 1024;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

const MAX_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Zone for floating and all-day values.
    pub default_timezone: String,
    /// Hard cap on occurrences produced per series.
    pub max_occurrences: usize,
    /// How far past "now" recurring series are expanded.
    pub forward_window_days: i64,
    /// How far before "now" occurrences are kept, so long-running events
    /// that started earlier still count as current.
    pub lookback_days: i64,
    /// Documents larger than this are rejected before parsing.
    pub max_feed_bytes: usize,
    pub refresh_interval_secs: u64,
    /// Feed locations handed to the fetcher, concatenated in this order.
    pub feeds: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timezone: "UTC".to_string(),
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
            forward_window_days: DEFAULT_FORWARD_WINDOW_DAYS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_feed_bytes: DEFAULT_MAX_FEED_BYTES,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            feeds: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_occurrences == 0 {
            return Err(EngineError::Config("max_occurrences must be positive".into()));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.forward_window_days) {
            return Err(EngineError::Config(format!(
                "forward_window_days must be between 1 and {MAX_WINDOW_DAYS}"
            )));
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&self.lookback_days) {
            return Err(EngineError::Config(format!(
                "lookback_days must be between 0 and {MAX_WINDOW_DAYS}"
            )));
        }
        if self.refresh_interval_secs == 0 {
            return Err(EngineError::Config("refresh_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// The expansion window for a refresh happening at `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> ExpansionWindow {
        ExpansionWindow {
            start: now - Duration::days(self.lookback_days),
            end: now + Duration::days(self.forward_window_days),
            max_occurrences: self.max_occurrences,
        }
    }

    pub fn resolver(&self, diag: &mut Diagnostics) -> TimeZoneResolver {
        TimeZoneResolver::with_default_name(&self.default_timezone, diag)
    }

    pub fn refresh_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.refresh_interval_secs)
    }
}
