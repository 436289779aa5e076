//! Period resolution: turns a totalisation unit + period count + reference
//! date into a concrete date window.
//!
//! Day windows roll: `periodCount` days ending at the reference date
//! inclusive. Month windows are calendar-aligned: day 1 of the earliest
//! included month through the last day of the reference date's month.
//! All-time windows come from the data bounds the answer source reports.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::{AverageDefinition, Response, TotalisationPeriodUnit};
use crate::errors::{EngineError, EngineResult};

/// An inclusive date range. The empty window (start after end) is a
/// legitimate value: downstream aggregation over it yields "no data"
/// rather than failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateWindow { start, end }
    }

    pub fn empty() -> Self {
        DateWindow {
            start: NaiveDate::MAX,
            end: NaiveDate::MIN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Resolves the calculation window for a definition.
///
/// `data_bounds` is the min/max span of data present in the target subset,
/// as reported by the answer source; it is required to resolve `All` and to
/// detect a reference date that predates the subset entirely.
pub fn resolve_window(
    definition: &AverageDefinition,
    reference_date: NaiveDate,
    data_bounds: Option<DateWindow>,
) -> EngineResult<DateWindow> {
    definition.validate()?;

    if let Some(bounds) = data_bounds {
        if !bounds.is_empty() && reference_date < bounds.start {
            return Ok(DateWindow::empty());
        }
    }

    let periods = definition.number_of_periods;
    match definition.totalisation_period_unit {
        TotalisationPeriodUnit::Day => {
            let start = reference_date
                .checked_sub_days(Days::new(u64::from(periods - 1)))
                .unwrap_or(NaiveDate::MIN);
            Ok(DateWindow::new(start, reference_date))
        }
        TotalisationPeriodUnit::Month => {
            let start = first_of_month_back(reference_date, periods - 1)?;
            let end = last_of_month(reference_date)?;
            Ok(DateWindow::new(start, end))
        }
        TotalisationPeriodUnit::All => Ok(data_bounds.unwrap_or_else(DateWindow::empty)),
    }
}

/// Day 1 of the month `back` whole months before `date`'s month.
fn first_of_month_back(date: NaiveDate, back: u32) -> EngineResult<NaiveDate> {
    let months = date.year() * 12 + date.month0() as i32 - back as i32;
    let year = months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        EngineError::invalid_config(format!(
            "month window reaching back {back} months from {date} is out of range"
        ))
    })
}

fn last_of_month(date: NaiveDate) -> EngineResult<NaiveDate> {
    let next_month = first_of_month_back(date, 0)?
        .checked_add_months(chrono::Months::new(1))
        .ok_or_else(|| {
            EngineError::invalid_config(format!("month window ending at {date} is out of range"))
        })?;
    Ok(next_month.pred_opt().unwrap_or(NaiveDate::MAX))
}

/// Stable index of the period a date falls in, used to group responses for
/// single-period weighting and to count window coverage. `All` collapses to
/// one period.
pub fn period_index(date: NaiveDate, unit: TotalisationPeriodUnit) -> i64 {
    match unit {
        TotalisationPeriodUnit::Day => i64::from(date.num_days_from_ce()),
        TotalisationPeriodUnit::Month => i64::from(date.year()) * 12 + i64::from(date.month0()),
        TotalisationPeriodUnit::All => 0,
    }
}

/// Number of distinct periods with at least one valued response in the
/// window. Drives the MakeUpTo partial-window decision.
pub fn periods_present(
    responses: &[Response],
    window: DateWindow,
    unit: TotalisationPeriodUnit,
) -> u32 {
    let mut seen: Vec<i64> = responses
        .iter()
        .filter(|r| window.contains(r.recorded_on) && r.value.is_some())
        .map(|r| period_index(r.recorded_on, unit))
        .collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len() as u32
}
