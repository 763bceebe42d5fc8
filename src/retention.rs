//! Retention windows for cache pruning.
//!
//! A window is written `<integer><unit>` with unit `d` (days) or `w`
//! (weeks), e.g. `14d` or `2w`. Entries last used within the window are
//! always kept; entries at or beyond it may be removed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors from parsing a retention expression
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetentionError {
    #[error("empty retention expression")]
    Empty,

    #[error("invalid retention '{0}': expected <integer><d|w>, e.g. 2w")]
    Invalid(String),

    #[error("retention must be at least one day, got '{0}'")]
    Zero(String),
}

/// Unit of a retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionUnit {
    Days,
    Weeks,
}

impl RetentionUnit {
    fn suffix(self) -> char {
        match self {
            Self::Days => 'd',
            Self::Weeks => 'w',
        }
    }
}

/// Minimum age below which cache entries must be preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    amount: u32,
    unit: RetentionUnit,
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self::weeks(2)
    }
}

impl RetentionWindow {
    pub fn days(amount: u32) -> Self {
        Self {
            amount,
            unit: RetentionUnit::Days,
        }
    }

    pub fn weeks(amount: u32) -> Self {
        Self {
            amount,
            unit: RetentionUnit::Weeks,
        }
    }

    /// Total length of the window in days.
    pub fn total_days(&self) -> i64 {
        match self.unit {
            RetentionUnit::Days => i64::from(self.amount),
            RetentionUnit::Weeks => i64::from(self.amount) * 7,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::days(self.total_days())
    }

    /// Whole weeks covering the window, rounded up.
    ///
    /// Tools that only accept weeks get a window at least as long as ours,
    /// so nothing used within the window is removed.
    pub fn whole_weeks(&self) -> u32 {
        match self.unit {
            RetentionUnit::Weeks => self.amount,
            RetentionUnit::Days => self.amount.div_ceil(7),
        }
    }

    /// Whether an entry last used at `last_used` has aged out of the window.
    pub fn is_expired(&self, last_used: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_used) >= self.duration()
    }
}

impl fmt::Display for RetentionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for RetentionWindow {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RetentionError::Empty);
        }

        let suffix = s.chars().last().ok_or(RetentionError::Empty)?;
        let digits = &s[..s.len() - suffix.len_utf8()];
        let unit = match suffix {
            'd' | 'D' => RetentionUnit::Days,
            'w' | 'W' => RetentionUnit::Weeks,
            _ => return Err(RetentionError::Invalid(s.to_string())),
        };
        let amount: u32 = digits
            .parse()
            .map_err(|_| RetentionError::Invalid(s.to_string()))?;
        if amount == 0 {
            return Err(RetentionError::Zero(s.to_string()));
        }

        Ok(Self { amount, unit })
    }
}

impl Serialize for RetentionWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RetentionWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
