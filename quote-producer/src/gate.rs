use std::fmt;

use chrono::NaiveTime;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum WindowError {
    /// окно через полночь не поддерживается
    #[error("trading window must open before it closes: {open} - {close}")]
    OpenNotBeforeClose { open: NaiveTime, close: NaiveTime },

    #[error("invalid time of day {0:?}, expected HH:MM or HH:MM:SS")]
    BadTime(String),
}

/// Торговое окно в UTC, обе границы включительно.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TradingWindow {
    open: NaiveTime,
    close: NaiveTime,
}

impl TradingWindow {
    pub(crate) fn new(open: NaiveTime, close: NaiveTime) -> Result<Self, WindowError> {
        if open >= close {
            return Err(WindowError::OpenNotBeforeClose { open, close });
        }
        Ok(Self { open, close })
    }

    /// Окно из строк вида "14:30" / "21:00:00"
    pub(crate) fn parse(open: &str, close: &str) -> Result<Self, WindowError> {
        Self::new(parse_time_of_day(open)?, parse_time_of_day(close)?)
    }

    pub(crate) fn is_open(&self, now: NaiveTime) -> bool {
        is_open(now, self.open, self.close)
    }
}

impl fmt::Display for TradingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} UTC", self.open, self.close)
    }
}

/// `now ∈ [open, close]`
pub(crate) fn is_open(now: NaiveTime, open: NaiveTime, close: NaiveTime) -> bool {
    open <= now && now <= close
}

pub(crate) fn parse_time_of_day(raw: &str) -> Result<NaiveTime, WindowError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| WindowError::BadTime(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn nyse() -> TradingWindow {
        TradingWindow::new(t(14, 30, 0), t(21, 0, 0)).unwrap()
    }

    #[test]
    fn bounds_are_inclusive() {
        let w = nyse();
        assert!(w.is_open(t(14, 30, 0)));
        assert!(w.is_open(t(21, 0, 0)));
    }

    #[test]
    fn just_outside_bounds_is_closed() {
        let w = nyse();
        assert!(!w.is_open(t(14, 29, 59)));
        assert!(!w.is_open(t(21, 0, 1)));
    }

    #[test]
    fn inside_and_far_outside() {
        let w = nyse();
        assert!(w.is_open(t(17, 45, 12)));
        assert!(!w.is_open(t(0, 0, 0)));
        assert!(!w.is_open(t(23, 59, 59)));
    }

    #[test]
    fn wrap_around_window_is_rejected() {
        assert_eq!(
            TradingWindow::new(t(22, 0, 0), t(2, 0, 0)).unwrap_err(),
            WindowError::OpenNotBeforeClose {
                open: t(22, 0, 0),
                close: t(2, 0, 0)
            }
        );
        assert!(TradingWindow::new(t(9, 0, 0), t(9, 0, 0)).is_err());
    }

    #[test]
    fn parse_accepts_minutes_and_seconds() {
        let w = TradingWindow::parse("14:30", " 21:00:00 ").unwrap();
        assert_eq!(w, nyse());
        assert!(matches!(
            TradingWindow::parse("25:00", "26:00").unwrap_err(),
            WindowError::BadTime(_)
        ));
    }
}
