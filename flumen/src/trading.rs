//! Trading calendars: which days an exchange trades and when.
//!
//! Market frequencies (`SSED`, `SSET`, ...) cannot be generated by calendar
//! arithmetic. They are expanded against a [`TradingCalendar`], which answers
//! two questions for an exchange over an inclusive date window:
//!
//! - [`valid_days`](TradingCalendar::valid_days): the trading days, each as
//!   local midnight in the exchange's timezone converted to UTC.
//! - [`schedule`](TradingCalendar::schedule): one [`Session`] per trading day
//!   with its open, close and optional midday break, in UTC.
//!
//! [`SessionCalendar`] is the built-in implementation, driven by
//! [`ExchangeConfig`] entries: weekday sessions at fixed local hours, minus a
//! configured holiday list.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::ExchangeConfig;
use crate::error::TradingCalendarError;

/// One trading day's session, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// The exchange-local trading date.
    pub date: NaiveDate,
    /// Market open.
    pub open: DateTime<Utc>,
    /// Market close.
    pub close: DateTime<Utc>,
    /// Start of the midday break, if the exchange has one.
    pub break_start: Option<DateTime<Utc>>,
    /// End of the midday break, if the exchange has one.
    pub break_end: Option<DateTime<Utc>>,
}

impl Session {
    /// Returns the trading intervals of the session: one, or two around a
    /// break.
    pub fn intervals(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.break_start, self.break_end) {
            (Some(bs), Some(be)) => vec![(self.open, bs), (be, self.close)],
            _ => vec![(self.open, self.close)],
        }
    }

    /// Expands the session into bar timestamps at `cadence`.
    ///
    /// Each interval is right-closed: the first timestamp is
    /// `open + cadence` and nothing is emitted at the open itself. When the
    /// cadence does not divide the interval, the close is emitted as a final
    /// short bar. Nothing is emitted inside the break.
    pub fn expand(&self, cadence: TimeDelta) -> Vec<DateTime<Utc>> {
        let mut out = Vec::new();
        if cadence <= TimeDelta::zero() {
            return out;
        }
        for (open, close) in self.intervals() {
            let mut t = open + cadence;
            while t <= close {
                out.push(t);
                t += cadence;
            }
            if out.last().is_none_or(|last| *last < close) && open < close {
                out.push(close);
            }
        }
        out
    }
}

/// A source of exchange trading days and sessions.
pub trait TradingCalendar {
    /// Returns the trading days in `[start, end]` as local midnight in the
    /// exchange timezone, converted to UTC.
    ///
    /// # Errors
    ///
    /// Returns [`TradingCalendarError::UnknownExchange`] if the exchange is
    /// not known to this calendar.
    fn valid_days(
        &self,
        exchange: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateTime<Utc>>, TradingCalendarError>;

    /// Returns the session of every trading day in `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`TradingCalendarError::UnknownExchange`] if the exchange is
    /// not known to this calendar.
    fn schedule(
        &self,
        exchange: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Session>, TradingCalendarError>;
}

/// A [`TradingCalendar`] built from exchange configurations.
#[derive(Debug, Clone, Default)]
pub struct SessionCalendar {
    exchanges: BTreeMap<String, ExchangeConfig>,
}

impl SessionCalendar {
    /// Builds a calendar over the given exchanges. Later entries replace
    /// earlier ones with the same code.
    pub fn new(exchanges: impl IntoIterator<Item = ExchangeConfig>) -> Self {
        Self {
            exchanges: exchanges
                .into_iter()
                .map(|e| (e.code.clone(), e))
                .collect(),
        }
    }

    /// A calendar with the built-in SSE and HKEX session hours and no
    /// holidays.
    pub fn with_presets() -> Self {
        Self::new([ExchangeConfig::sse(), ExchangeConfig::hkex()])
    }

    /// Returns the configuration for `code`.
    ///
    /// # Errors
    ///
    /// Returns [`TradingCalendarError::UnknownExchange`] if it is not
    /// configured.
    pub fn exchange(&self, code: &str) -> Result<&ExchangeConfig, TradingCalendarError> {
        self.exchanges
            .get(code)
            .ok_or_else(|| TradingCalendarError::UnknownExchange {
                exchange: code.to_string(),
            })
    }

    fn trading_days<'a>(
        &'a self,
        exchange: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(&'a ExchangeConfig, Vec<NaiveDate>), TradingCalendarError> {
        let config = self.exchange(exchange)?;
        let days = start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| config.is_trading_day(*d))
            .collect();
        Ok((config, days))
    }
}

impl TradingCalendar for SessionCalendar {
    fn valid_days(
        &self,
        exchange: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateTime<Utc>>, TradingCalendarError> {
        let (config, days) = self.trading_days(exchange, start, end)?;
        Ok(days
            .into_iter()
            .filter_map(|d| localize(&config.timezone, d.and_time(NaiveTime::MIN)))
            .collect())
    }

    fn schedule(
        &self,
        exchange: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Session>, TradingCalendarError> {
        let (config, days) = self.trading_days(exchange, start, end)?;
        let mut sessions = Vec::with_capacity(days.len());
        for date in days {
            match config.session_on(date) {
                Some(session) => sessions.push(session),
                None => tracing::warn!(
                    exchange,
                    %date,
                    "session hours do not exist in the exchange timezone; skipping day"
                ),
            }
        }
        Ok(sessions)
    }
}

impl ExchangeConfig {
    /// Returns `true` if `date` is neither a weekend day nor a holiday.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !self.weekend.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// Builds the UTC session for a local trading `date`.
    ///
    /// Returns `None` if any session boundary does not exist on that date in
    /// the exchange timezone.
    pub fn session_on(&self, date: NaiveDate) -> Option<Session> {
        let at = |t: NaiveTime| localize(&self.timezone, date.and_time(t));
        let first = self.sessions.first()?;
        let last = self.sessions.last()?;
        let (break_start, break_end) = if self.sessions.len() > 1 {
            (Some(at(first.close)?), Some(at(last.open)?))
        } else {
            (None, None)
        };
        Some(Session {
            date,
            open: at(first.open)?,
            close: at(last.close)?,
            break_start,
            break_end,
        })
    }
}

/// Interprets a wall-clock time in `tz`, picking the earlier instant when it
/// is ambiguous. Returns `None` for times skipped by a transition.
pub(crate) fn localize(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn sse_with_new_year() -> SessionCalendar {
        let mut sse = ExchangeConfig::sse();
        sse.holidays = vec![date(2020, 1, 1)];
        SessionCalendar::new([sse])
    }

    #[test]
    fn test_valid_days_skip_weekends_and_holidays() {
        let calendar = sse_with_new_year();
        let days = calendar
            .valid_days("SSE", date(2020, 1, 1), date(2020, 1, 10))
            .unwrap();

        // Jan 2, 3, 6, 7, 8, 9, 10 at Shanghai midnight.
        assert_eq!(days.len(), 7);
        assert_eq!(days[0], utc(2020, 1, 1, 16, 0));
        assert_eq!(days[2], utc(2020, 1, 5, 16, 0));
    }

    #[test]
    fn test_unknown_exchange() {
        let calendar = SessionCalendar::with_presets();
        let err = calendar
            .valid_days("NYSE", date(2020, 1, 1), date(2020, 1, 2))
            .unwrap_err();
        assert_eq!(
            err,
            TradingCalendarError::UnknownExchange {
                exchange: "NYSE".to_string()
            }
        );
    }

    #[test]
    fn test_schedule_has_lunch_break() {
        let calendar = SessionCalendar::with_presets();
        let sessions = calendar
            .schedule("HKEX", date(2020, 1, 2), date(2020, 1, 2))
            .unwrap();

        assert_eq!(sessions.len(), 1);
        let s = sessions[0];
        assert_eq!(s.open, utc(2020, 1, 2, 1, 30));
        assert_eq!(s.break_start, Some(utc(2020, 1, 2, 4, 0)));
        assert_eq!(s.break_end, Some(utc(2020, 1, 2, 5, 0)));
        assert_eq!(s.close, utc(2020, 1, 2, 8, 0));
    }

    #[test]
    fn test_expand_is_right_closed_around_break() {
        let calendar = SessionCalendar::with_presets();
        let session = calendar
            .schedule("SSE", date(2020, 1, 2), date(2020, 1, 2))
            .unwrap()[0];

        let bars = session.expand(TimeDelta::minutes(1));
        assert_eq!(bars.len(), 240);
        assert_eq!(bars[0], utc(2020, 1, 2, 1, 31));
        assert_eq!(bars[119], utc(2020, 1, 2, 3, 30));
        assert_eq!(bars[120], utc(2020, 1, 2, 5, 1));
        assert_eq!(bars[239], utc(2020, 1, 2, 7, 0));
    }

    #[test]
    fn test_expand_forces_close() {
        let session = Session {
            date: date(2020, 1, 2),
            open: utc(2020, 1, 2, 1, 30),
            close: utc(2020, 1, 2, 2, 0),
            break_start: None,
            break_end: None,
        };
        let bars = session.expand(TimeDelta::minutes(7));
        assert_eq!(
            bars,
            vec![
                utc(2020, 1, 2, 1, 37),
                utc(2020, 1, 2, 1, 44),
                utc(2020, 1, 2, 1, 51),
                utc(2020, 1, 2, 1, 58),
                utc(2020, 1, 2, 2, 0),
            ]
        );
    }
}
