//! Operating days of a service, from calendar.txt and calendar_dates.txt.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::identifiers::ServiceIdentifier;

/// Weekday bitmask, bit 0 is Monday
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatingDays(u8);

impl OperatingDays {
    pub const NONE: Self = Self(0);

    /// Days in calendar.txt column order, `monday` through `sunday`
    pub fn from_columns(columns: [bool; 7]) -> Self {
        columns
            .iter()
            .enumerate()
            .filter(|(_, runs)| **runs)
            .fold(Self::NONE, |days, (bit, _)| Self(days.0 | 1 << bit))
    }

    pub fn includes(self, weekday: Weekday) -> bool {
        self.0 & (1 << weekday.num_days_from_monday()) != 0
    }
}

/// Weekly pattern bounded by an inclusive date range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPattern {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: OperatingDays,
}

impl WeeklyPattern {
    fn covers(&self, date: NaiveDate) -> bool {
        (self.start..=self.end).contains(&date) && self.days.includes(date.weekday())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCalendar {
    pub service_id: ServiceIdentifier,
    /// `None` when the service only appears in calendar_dates.txt
    pub pattern: Option<WeeklyPattern>,
    pub added_dates: BTreeSet<NaiveDate>,
    pub removed_dates: BTreeSet<NaiveDate>,
}

impl ServiceCalendar {
    pub fn new(service_id: ServiceIdentifier, pattern: Option<WeeklyPattern>) -> Self {
        Self {
            service_id,
            pattern,
            added_dates: BTreeSet::new(),
            removed_dates: BTreeSet::new(),
        }
    }

    /// Exception dates override the weekly pattern; additions win over removals.
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        if self.added_dates.contains(&date) {
            true
        } else if self.removed_dates.contains(&date) {
            false
        } else {
            self.pattern.is_some_and(|p| p.covers(date))
        }
    }
}
