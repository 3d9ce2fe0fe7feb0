//! Order statistics aggregation.
//!
//! A snapshot is four period totals (all time, today, trailing 7 and 30
//! days) plus a count per status. The five queries run concurrently; if
//! any of them fails the whole snapshot fails, so a partial composite is
//! never returned or cached.
//!
//! Periods start at midnight: "trailing 7 days" covers today and the seven
//! calendar days before it. Soft-deleted orders are not counted.

use adtime_types::OrderStatistics;
use chrono::{DateTime, Days, Utc};

use crate::error::DbError;
use crate::repository::Repository;

/// A reporting period over `orders.created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsWindow {
    /// Every order ever saved.
    AllTime,
    /// Orders created since midnight.
    Today,
    /// Orders created since midnight seven days ago.
    Trailing7Days,
    /// Orders created since midnight thirty days ago.
    Trailing30Days,
}

impl StatsWindow {
    /// SQL predicate over `orders.created_at` selecting this period.
    pub const fn sql_predicate(self) -> &'static str {
        match self {
            Self::AllTime => "TRUE",
            Self::Today => "created_at >= CURRENT_DATE",
            Self::Trailing7Days => "created_at >= CURRENT_DATE - INTERVAL '7 days'",
            Self::Trailing30Days => "created_at >= CURRENT_DATE - INTERVAL '30 days'",
        }
    }

    /// Earliest creation time inside the period, relative to `now`.
    ///
    /// `None` means unbounded.
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days_back = match self {
            Self::AllTime => return None,
            Self::Today => 0,
            Self::Trailing7Days => 7,
            Self::Trailing30Days => 30,
        };
        now.date_naive()
            .checked_sub_days(Days::new(days_back))
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight.and_utc())
    }

    /// Operation name used in error context.
    pub const fn operation(self) -> &'static str {
        match self {
            Self::AllTime => "get total stats",
            Self::Today => "get today's stats",
            Self::Trailing7Days => "get week stats",
            Self::Trailing30Days => "get month stats",
        }
    }
}

/// Run every aggregate query against `repo` and assemble a snapshot.
///
/// # Errors
///
/// Returns the first failing query's error, wrapped in
/// [`DbError::Operation`] naming the period.
pub async fn compute(repo: &Repository) -> Result<OrderStatistics, DbError> {
    let totals = |window: StatsWindow| async move {
        repo.period_totals(window)
            .await
            .map_err(|e| e.context(window.operation(), "orders"))
    };

    let (total, today, week, month, status_counts) = tokio::try_join!(
        totals(StatsWindow::AllTime),
        totals(StatsWindow::Today),
        totals(StatsWindow::Trailing7Days),
        totals(StatsWindow::Trailing30Days),
        async {
            repo.status_counts()
                .await
                .map_err(|e| e.context("get status stats", "orders"))
        },
    )?;

    Ok(OrderStatistics {
        total,
        today,
        week,
        month,
        status_counts,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn cutoffs_start_at_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 17, 42, 5).single();
        let now = now.unwrap_or_default();

        assert_eq!(StatsWindow::AllTime.cutoff(now), None);
        assert_eq!(
            StatsWindow::Today.cutoff(now),
            Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).single()
        );
        assert_eq!(
            StatsWindow::Trailing7Days.cutoff(now),
            Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).single()
        );
        assert_eq!(
            StatsWindow::Trailing30Days.cutoff(now),
            Utc.with_ymd_and_hms(2026, 2, 13, 0, 0, 0).single()
        );
    }

    #[test]
    fn every_bounded_window_filters_on_creation_time() {
        for window in [
            StatsWindow::Today,
            StatsWindow::Trailing7Days,
            StatsWindow::Trailing30Days,
        ] {
            assert!(window.sql_predicate().starts_with("created_at >="));
        }
    }
}
