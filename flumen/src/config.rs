//! Configuration for a flumen dataset.
//!
//! A [`FlumenConfig`] names the root directory of the dataset and the
//! exchanges whose trading calendars market frequencies expand against. It is
//! usually loaded from a JSON file:
//!
//! ```json
//! {
//!   "root": "/var/lib/flumen",
//!   "exchanges": [
//!     {
//!       "code": "SSE",
//!       "timezone": "Asia/Shanghai",
//!       "sessions": [
//!         { "open": "09:30:00", "close": "11:30:00" },
//!         { "open": "13:00:00", "close": "15:00:00" }
//!       ],
//!       "holidays": ["2020-01-01", "2020-01-24"]
//!     }
//!   ]
//! }
//! ```
//!
//! `weekend` defaults to Saturday and Sunday. Configured exchanges replace
//! the built-in presets of the same code.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::trading::SessionCalendar;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlumenConfig {
    /// Root directory of the dataset.
    pub root: PathBuf,
    /// Exchange calendars, in addition to the built-in presets.
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
}

impl FlumenConfig {
    /// A configuration rooted at `root` with only the preset exchanges.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            exchanges: Vec::new(),
        }
    }

    /// Reads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid JSON of the expected shape,
    /// or [`ConfigError::InvalidExchange`] if an exchange fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            root = %config.root.display(),
            exchanges = config.exchanges.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Validates every exchange definition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExchange`] for the first invalid
    /// exchange.
    pub fn validate(&self) -> Result<()> {
        for exchange in &self.exchanges {
            exchange.validate()?;
        }
        Ok(())
    }

    /// Builds the trading calendar: presets overlaid with configured
    /// exchanges.
    pub fn trading_calendar(&self) -> SessionCalendar {
        SessionCalendar::new(
            [ExchangeConfig::sse(), ExchangeConfig::hkex()]
                .into_iter()
                .chain(self.exchanges.iter().cloned()),
        )
    }
}

/// One continuous trading interval in exchange-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHours {
    /// Local open time.
    pub open: NaiveTime,
    /// Local close time.
    pub close: NaiveTime,
}

impl SessionHours {
    /// Creates an interval from `(hour, minute)` pairs.
    ///
    /// Returns `None` if either pair is not a valid time of day.
    pub fn from_hm(open: (u32, u32), close: (u32, u32)) -> Option<Self> {
        Some(Self {
            open: NaiveTime::from_hms_opt(open.0, open.1, 0)?,
            close: NaiveTime::from_hms_opt(close.0, close.1, 0)?,
        })
    }
}

/// An exchange's trading calendar definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Exchange code as it appears in market frequency units (`"SSE"`).
    pub code: String,
    /// IANA timezone the sessions are expressed in.
    pub timezone: Tz,
    /// One interval, or two around a midday break.
    pub sessions: Vec<SessionHours>,
    /// Local dates on which the exchange is closed.
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    /// Weekdays on which the exchange is closed.
    #[serde(default = "default_weekend")]
    pub weekend: Vec<Weekday>,
}

fn default_weekend() -> Vec<Weekday> {
    vec![Weekday::Sat, Weekday::Sun]
}

impl ExchangeConfig {
    /// Shanghai Stock Exchange session hours. No holidays.
    pub fn sse() -> Self {
        Self::preset(
            "SSE",
            chrono_tz::Asia::Shanghai,
            [((9, 30), (11, 30)), ((13, 0), (15, 0))],
        )
    }

    /// Hong Kong Exchange session hours. No holidays.
    pub fn hkex() -> Self {
        Self::preset(
            "HKEX",
            chrono_tz::Asia::Hong_Kong,
            [((9, 30), (12, 0)), ((13, 0), (16, 0))],
        )
    }

    fn preset(code: &str, timezone: Tz, hours: [((u32, u32), (u32, u32)); 2]) -> Self {
        Self {
            code: code.to_string(),
            timezone,
            sessions: hours
                .into_iter()
                .filter_map(|(open, close)| SessionHours::from_hm(open, close))
                .collect(),
            holidays: Vec::new(),
            weekend: default_weekend(),
        }
    }

    /// Checks the session layout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExchange`] if the code is empty, there
    /// are no sessions or more than two, a session does not open before it
    /// closes, or the sessions overlap or are out of order.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ConfigError::InvalidExchange {
            code: self.code.clone(),
            reason: reason.to_string(),
        };

        if self.code.is_empty() || !self.code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(invalid("code must be uppercase ASCII letters").into());
        }
        if self.sessions.is_empty() {
            return Err(invalid("at least one session is required").into());
        }
        if self.sessions.len() > 2 {
            return Err(invalid("at most two sessions (one break) are supported").into());
        }
        if self.sessions.iter().any(|s| s.open >= s.close) {
            return Err(invalid("session must open before it closes").into());
        }
        if self.sessions.windows(2).any(|w| w[0].close > w[1].open) {
            return Err(invalid("sessions must be ordered and non-overlapping").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlumenError;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "root": "/tmp/flumen",
        "exchanges": [{
            "code": "SSE",
            "timezone": "Asia/Shanghai",
            "sessions": [
                { "open": "09:30:00", "close": "11:30:00" },
                { "open": "13:00:00", "close": "15:00:00" }
            ],
            "holidays": ["2020-01-01"]
        }]
    }"#;

    #[test]
    fn test_load_applies_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flumen.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = FlumenConfig::load(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/flumen"));
        let sse = &config.exchanges[0];
        assert_eq!(sse.weekend, vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(sse.timezone, chrono_tz::Asia::Shanghai);
        assert_eq!(sse.sessions, ExchangeConfig::sse().sessions);
    }

    #[test]
    fn test_configured_exchange_replaces_preset() {
        let config: FlumenConfig = serde_json::from_str(SAMPLE).unwrap();
        let calendar = config.trading_calendar();
        let sse = calendar.exchange("SSE").unwrap();
        assert_eq!(sse.holidays.len(), 1);
        assert!(calendar.exchange("HKEX").is_ok());
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        let dir = tempdir().unwrap();
        let err = FlumenConfig::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, FlumenError::Config(ConfigError::Read { .. })));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ root: ").unwrap();
        let err = FlumenConfig::load(&path).unwrap_err();
        assert!(matches!(err, FlumenError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_presets_are_valid() {
        ExchangeConfig::sse().validate().unwrap();
        ExchangeConfig::hkex().validate().unwrap();
        assert_eq!(ExchangeConfig::hkex().sessions.len(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_sessions() {
        let mut exchange = ExchangeConfig::sse();
        exchange.sessions.reverse();
        assert!(exchange.validate().is_err());

        let mut exchange = ExchangeConfig::sse();
        exchange.sessions.clear();
        assert!(exchange.validate().is_err());

        let mut exchange = ExchangeConfig::sse();
        exchange.sessions = vec![SessionHours::from_hm((15, 0), (9, 30)).unwrap()];
        let err = exchange.validate().unwrap_err();
        assert!(err.to_string().contains("open before it closes"));

        let mut exchange = ExchangeConfig::sse();
        exchange.code = "sse".to_string();
        assert!(exchange.validate().is_err());
    }
}
