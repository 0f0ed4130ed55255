//! The frequency grammar.
//!
//! A frequency string is an optional step count followed by a unit token:
//! `"D"`, `"15T"`, `"2SSED"`. Parsing is case-insensitive and the uppercased
//! input becomes the frequency's identity. It names calendar files, keys the
//! calendar catalogue and decides equality, so `"D"` and `"1D"` describe the
//! same cadence but are different frequencies.
//!
//! Units come in two families:
//!
//! - **Arithmetic** units (`S`, `T`, `H`, `D`, `W`, `M`, `Q`, `Y`) are
//!   generated by calendar arithmetic alone.
//! - **Market** units are an exchange code followed by an arithmetic sub-unit
//!   (`SSED` is SSE daily, `SSET` is SSE minutely, `HKEXD` is HKEX daily) and
//!   need a trading calendar to expand.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::FrequencyError;

/// Which generator a [`FrequencyUnit`] needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitFamily {
    /// Fixed calendar arithmetic.
    Arithmetic,
    /// A named exchange's trading calendar.
    Market,
}

/// A known frequency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrequencyUnit {
    /// `S`: one second.
    Second,
    /// `T`: one minute.
    Minute,
    /// `H`: one hour.
    Hour,
    /// `D`: one calendar day.
    Day,
    /// `W`: one week, anchored on Sunday.
    Week,
    /// `M`: one month, anchored on the month end.
    Month,
    /// `Q`: one quarter, anchored on the quarter end.
    Quarter,
    /// `Y`: one year, anchored on December 31.
    Year,
    /// `SSED`: Shanghai Stock Exchange trading days.
    SseDaily,
    /// `SSET`: Shanghai Stock Exchange trading minutes.
    SseMinutely,
    /// `HKEXD`: Hong Kong Exchange trading days.
    HkexDaily,
}

impl FrequencyUnit {
    /// Every unit, arithmetic first.
    pub const ALL: [FrequencyUnit; 11] = [
        FrequencyUnit::Second,
        FrequencyUnit::Minute,
        FrequencyUnit::Hour,
        FrequencyUnit::Day,
        FrequencyUnit::Week,
        FrequencyUnit::Month,
        FrequencyUnit::Quarter,
        FrequencyUnit::Year,
        FrequencyUnit::SseDaily,
        FrequencyUnit::SseMinutely,
        FrequencyUnit::HkexDaily,
    ];

    /// Returns the unit's token as it appears in frequency strings.
    pub fn token(self) -> &'static str {
        match self {
            FrequencyUnit::Second => "S",
            FrequencyUnit::Minute => "T",
            FrequencyUnit::Hour => "H",
            FrequencyUnit::Day => "D",
            FrequencyUnit::Week => "W",
            FrequencyUnit::Month => "M",
            FrequencyUnit::Quarter => "Q",
            FrequencyUnit::Year => "Y",
            FrequencyUnit::SseDaily => "SSED",
            FrequencyUnit::SseMinutely => "SSET",
            FrequencyUnit::HkexDaily => "HKEXD",
        }
    }

    /// Returns every unit token.
    pub fn tokens() -> impl Iterator<Item = &'static str> {
        Self::ALL.iter().map(|u| u.token())
    }

    /// Looks a unit up by its (uppercase) token.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.token() == token)
    }

    /// Returns a short human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            FrequencyUnit::Second => "Secondly frequency",
            FrequencyUnit::Minute => "Minutely frequency",
            FrequencyUnit::Hour => "Hourly frequency",
            FrequencyUnit::Day => "Daily frequency",
            FrequencyUnit::Week => "Weekly frequency",
            FrequencyUnit::Month => "Monthly frequency",
            FrequencyUnit::Quarter => "Quarterly frequency",
            FrequencyUnit::Year => "Yearly frequency",
            FrequencyUnit::SseDaily => "SSE Daily frequency",
            FrequencyUnit::SseMinutely => "SSE Minutely frequency",
            FrequencyUnit::HkexDaily => "HKEX Daily frequency",
        }
    }

    /// Returns the generator family of this unit.
    pub fn family(self) -> UnitFamily {
        match self {
            FrequencyUnit::SseDaily | FrequencyUnit::SseMinutely | FrequencyUnit::HkexDaily => {
                UnitFamily::Market
            }
            _ => UnitFamily::Arithmetic,
        }
    }

    /// Returns `true` for market units.
    pub fn is_market(self) -> bool {
        self.family() == UnitFamily::Market
    }

    /// Returns the exchange code of a market unit (`"SSE"` for `SSED`).
    ///
    /// # Errors
    ///
    /// Returns [`FrequencyError::NotMarketUnit`] for arithmetic units.
    pub fn market_exchange(self) -> Result<&'static str, FrequencyError> {
        let token = self.market_token()?;
        Ok(&token[..token.len() - 1])
    }

    /// Returns the arithmetic sub-unit of a market unit (`Day` for `SSED`).
    ///
    /// # Errors
    ///
    /// Returns [`FrequencyError::NotMarketUnit`] for arithmetic units.
    pub fn market_unit(self) -> Result<FrequencyUnit, FrequencyError> {
        let token = self.market_token()?;
        let sub = &token[token.len() - 1..];
        Self::from_token(sub).ok_or_else(|| FrequencyError::InvalidUnit {
            unit: sub.to_string(),
        })
    }

    /// Returns the fixed length of one unit, if it has one.
    ///
    /// Month, quarter and year vary in length and return `None`. Market units
    /// report the length of their sub-unit.
    pub fn duration(self) -> Option<TimeDelta> {
        match self {
            FrequencyUnit::Second => Some(TimeDelta::seconds(1)),
            FrequencyUnit::Minute => Some(TimeDelta::minutes(1)),
            FrequencyUnit::Hour => Some(TimeDelta::hours(1)),
            FrequencyUnit::Day => Some(TimeDelta::days(1)),
            FrequencyUnit::Week => Some(TimeDelta::weeks(1)),
            FrequencyUnit::Month | FrequencyUnit::Quarter | FrequencyUnit::Year => None,
            market => market.market_unit().ok().and_then(Self::duration),
        }
    }

    fn market_token(self) -> Result<&'static str, FrequencyError> {
        if self.is_market() {
            Ok(self.token())
        } else {
            Err(FrequencyError::NotMarketUnit {
                unit: self.token().to_string(),
            })
        }
    }
}

impl fmt::Display for FrequencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A parsed frequency: a step count and a unit.
///
/// Equality, ordering and hashing use only the raw (uppercased) string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Frequency {
    raw: String,
    step: u32,
    unit: FrequencyUnit,
}

impl Frequency {
    /// Parses a frequency string.
    ///
    /// # Errors
    ///
    /// Returns [`FrequencyError::InvalidFrequency`] if the input is not an
    /// optional positive step followed by letters, or
    /// [`FrequencyError::InvalidUnit`] if the letters are not a known unit.
    pub fn parse(input: &str) -> Result<Self, FrequencyError> {
        let raw = input.to_ascii_uppercase();
        let invalid = || FrequencyError::InvalidFrequency { input: raw.clone() };

        let unit_start = raw.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        let (step_str, unit_str) = raw.split_at(unit_start);
        if !unit_str.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(invalid());
        }

        let step = if step_str.is_empty() {
            1
        } else {
            step_str.parse::<u32>().map_err(|_| invalid())?
        };
        if step == 0 {
            return Err(invalid());
        }

        let unit = FrequencyUnit::from_token(unit_str).ok_or_else(|| {
            FrequencyError::InvalidUnit {
                unit: unit_str.to_string(),
            }
        })?;

        Ok(Self { raw, step, unit })
    }

    /// Returns the uppercased source string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the step count.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Returns the unit.
    pub fn unit(&self) -> FrequencyUnit {
        self.unit
    }

    /// Returns `true` if the unit is a market unit.
    pub fn is_market(&self) -> bool {
        self.unit.is_market()
    }

    /// Returns the cadence as a unit string without any exchange prefix.
    ///
    /// Arithmetic frequencies return their raw string; market frequencies
    /// return `{step}{sub_unit}`, so `"SSET"` becomes `"1T"`.
    pub fn canonical_unit_string(&self) -> String {
        match self.unit.market_unit() {
            Ok(sub) => format!("{}{}", self.step, sub.token()),
            Err(_) => self.raw.clone(),
        }
    }

    /// Returns `step × unit` if the unit has a fixed length.
    pub fn cadence(&self) -> Option<TimeDelta> {
        self.unit
            .duration()
            .and_then(|d| d.checked_mul(i32::try_from(self.step).ok()?))
    }
}

impl PartialEq for Frequency {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Frequency {}

impl Hash for Frequency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for Frequency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frequency {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Frequency {
    type Err = FrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Frequency {
    type Error = FrequencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Frequency> for String {
    fn from(freq: Frequency) -> Self {
        freq.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let mut tokens: Vec<_> = FrequencyUnit::tokens().collect();
        let total = tokens.len();
        tokens.sort_unstable();
        tokens.dedup();
        assert_eq!(tokens.len(), total);
        assert_eq!(total, FrequencyUnit::ALL.len());
    }

    #[test]
    fn test_market_exchange_and_unit() {
        assert_eq!(FrequencyUnit::SseDaily.market_exchange().unwrap(), "SSE");
        assert_eq!(FrequencyUnit::SseMinutely.market_exchange().unwrap(), "SSE");
        assert_eq!(FrequencyUnit::HkexDaily.market_exchange().unwrap(), "HKEX");
        assert_eq!(FrequencyUnit::SseDaily.market_unit().unwrap(), FrequencyUnit::Day);
        assert_eq!(FrequencyUnit::SseMinutely.market_unit().unwrap(), FrequencyUnit::Minute);
        assert_eq!(FrequencyUnit::HkexDaily.market_unit().unwrap(), FrequencyUnit::Day);

        assert!(matches!(
            FrequencyUnit::Day.market_exchange(),
            Err(FrequencyError::NotMarketUnit { .. })
        ));
        assert!(FrequencyUnit::Day.market_unit().is_err());
    }

    #[test]
    fn test_parse_defaults_step_to_one() {
        for token in FrequencyUnit::tokens() {
            let freq = Frequency::parse(token).unwrap();
            assert_eq!(freq.step(), 1);
            assert_eq!(freq.unit().token(), token);
            assert_eq!(freq.raw(), token);
        }
    }

    #[test]
    fn test_parse_with_step_and_case() {
        let freq = Frequency::parse("2s").unwrap();
        assert_eq!(freq.raw(), "2S");
        assert_eq!(freq.step(), 2);
        assert_eq!(freq.unit(), FrequencyUnit::Second);

        let freq = Frequency::parse("2SSED").unwrap();
        assert_eq!(freq.step(), 2);
        assert_eq!(freq.unit(), FrequencyUnit::SseDaily);
    }

    #[test]
    fn test_parse_errors() {
        let err = Frequency::parse("INVALID").unwrap_err();
        assert_eq!(err.to_string(), "invalid frequency unit: INVALID");

        let err = Frequency::parse("2").unwrap_err();
        assert_eq!(err.to_string(), "invalid frequency: 2");

        for bad in ["", "0D", "2D3", "D-", "-1D"] {
            assert!(
                matches!(
                    Frequency::parse(bad),
                    Err(FrequencyError::InvalidFrequency { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_rejects_surrounding_whitespace() {
        for bad in [" D", "D ", " D ", "1 D", "\tD"] {
            assert!(
                matches!(
                    Frequency::parse(bad),
                    Err(FrequencyError::InvalidFrequency { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["S", "15T", "1H", "D", "2W", "M", "Q", "Y", "SSED", "5SSET", "HKEXD"] {
            let freq: Frequency = s.parse().unwrap();
            assert_eq!(freq.to_string(), s);
            assert_eq!(Frequency::parse(&freq.to_string()).unwrap(), freq);
        }
    }

    #[test]
    fn test_equality_is_by_raw_string() {
        let d = Frequency::parse("D").unwrap();
        let one_d = Frequency::parse("1D").unwrap();
        assert_ne!(d, one_d);
        assert_eq!(d, Frequency::parse("d").unwrap());
        assert_eq!(d.cadence(), one_d.cadence());
    }

    #[test]
    fn test_canonical_unit_string() {
        assert_eq!(Frequency::parse("2H").unwrap().canonical_unit_string(), "2H");
        assert_eq!(Frequency::parse("SSET").unwrap().canonical_unit_string(), "1T");
        assert_eq!(Frequency::parse("5SSET").unwrap().canonical_unit_string(), "5T");
        assert_eq!(Frequency::parse("HKEXD").unwrap().canonical_unit_string(), "1D");
    }

    #[test]
    fn test_cadence() {
        assert_eq!(Frequency::parse("15T").unwrap().cadence(), Some(TimeDelta::minutes(15)));
        assert_eq!(Frequency::parse("SSED").unwrap().cadence(), Some(TimeDelta::days(1)));
        assert_eq!(Frequency::parse("M").unwrap().cadence(), None);
    }

    #[test]
    fn test_serde_as_string() {
        let freq = Frequency::parse("5sset").unwrap();
        let json = serde_json::to_string(&freq).unwrap();
        assert_eq!(json, "\"5SSET\"");
        let back: Frequency = serde_json::from_str(&json).unwrap();
        assert_eq!(back, freq);
        assert!(serde_json::from_str::<Frequency>("\"XYZ\"").is_err());
    }
}
