//! Read-only analytics over live employee rows.
//!
//! # Responsibility
//! - Summarize headcounts, visa expiry risk, nationality and company mix.
//! - Expose the audit log and salary/age statistics for reporting.
//!
//! # Invariants
//! - Soft-deleted rows never contribute to any figure.
//! - "Active" uses the same per-category predicate as `ListQuery::active()`.
//! - Nothing here writes to the store.

use crate::db::schema::{COL_DELETED_AT, COL_ID};
use crate::model::category::{
    quote_column, Category, COL_AGE, COL_BILLING_RATE, COL_COMPANY, COL_EMPLOYEE_NO,
    COL_HOURLY_RATE, COL_NAME, COL_NATIONALITY, COL_PROFIT, COL_VISA_EXPIRY, COL_VISA_TYPE,
};
use crate::model::record::{AuditEntry, AuditFilter, RecordId};
use crate::normalize::parse_iso_date;
use crate::repo::audit_repo::list_audit;
use crate::repo::employee_repo::{SqliteEmployeeStore, StoreResult};
use chrono::{Datelike, Duration, Local, NaiveDate};
use log::debug;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

/// Employer-side burden (social insurance and similar) as a share of the
/// hourly wage.
pub const COMPANY_BURDEN_RATE: f64 = 0.1576;

const LAST_ISO_DATE: &str = "9999-12-31";

const AGE_BUCKETS: &[(&str, u32, u32)] = &[
    ("<20", 1, 19),
    ("20-29", 20, 29),
    ("30-39", 30, 39),
    ("40-49", 40, 49),
    ("50-59", 50, 59),
    ("60+", 60, 100),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub total: u64,
    pub active: u64,
    pub retired: u64,
}

impl CategoryCounts {
    fn add(&mut self, other: CategoryCounts) {
        self.total += other.total;
        self.active += other.active;
        self.retired += other.retired;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryStats {
    pub categories: BTreeMap<Category, CategoryCounts>,
    /// Sum over all categories.
    pub total: CategoryCounts,
}

/// Visa alert severity, from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Expired,
    Urgent,
    Warning,
    Upcoming,
}

impl Severity {
    /// Classifies signed days remaining until expiry.
    pub fn classify(days_left: i64) -> Self {
        if days_left <= 0 {
            Self::Expired
        } else if days_left <= 30 {
            Self::Urgent
        } else if days_left <= 60 {
            Self::Warning
        } else {
            Self::Upcoming
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Expired => "EXPIRED",
            Self::Urgent => "URGENT",
            Self::Warning => "WARNING",
            Self::Upcoming => "UPCOMING",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisaAlert {
    pub category: Category,
    pub record_id: RecordId,
    /// Company-assigned employee number (社員№).
    pub employee_no: Option<String>,
    pub name: Option<String>,
    pub visa_type: Option<String>,
    /// ISO `YYYY-MM-DD`.
    pub expiry_date: String,
    /// Negative once the visa has expired.
    pub days_left: i64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NationalityCount {
    pub nationality: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyShare {
    pub company: String,
    pub count: u64,
    /// Percent of all live dispatched rows, one decimal place.
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeriesStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
    pub count: usize,
}

impl SeriesStats {
    /// Computes stats over `values`; all zero when empty.
    pub fn from_values(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        values.sort_by(f64::total_cmp);
        let count = values.len();
        let sum: f64 = values.iter().sum();
        let median = if count % 2 == 1 {
            values[count / 2]
        } else {
            (values[count / 2 - 1] + values[count / 2]) / 2.0
        };
        Self {
            min: values[0],
            max: values[count - 1],
            avg: sum / count as f64,
            median,
            count,
        }
    }
}

/// Wage statistics over dispatched employees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SalaryStats {
    pub hourly_rate: SeriesStats,
    pub billing_rate: SeriesStats,
    pub profit: SeriesStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeBucket {
    pub label: &'static str,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfitMargin {
    pub billing_rate: f64,
    pub hourly_rate: f64,
    pub gross_profit: f64,
    pub company_burden: f64,
    pub net_profit: f64,
    /// Gross profit as a percentage of the billing rate.
    pub margin_rate: f64,
}

/// Computes the margin of one dispatch placement.
///
/// Purely derived; the store never writes the result back.
pub fn profit_margin(billing_rate: f64, hourly_rate: f64) -> ProfitMargin {
    let company_burden = hourly_rate * COMPANY_BURDEN_RATE;
    let gross_profit = billing_rate - hourly_rate;
    let margin_rate = if billing_rate > 0.0 {
        gross_profit / billing_rate * 100.0
    } else {
        0.0
    };
    ProfitMargin {
        billing_rate: billing_rate.round(),
        hourly_rate: hourly_rate.round(),
        gross_profit: gross_profit.round(),
        company_burden: company_burden.round(),
        net_profit: (gross_profit - company_burden).round(),
        margin_rate: round1(margin_rate),
    }
}

/// Analytics use-case service over a record store.
pub struct AnalyticsService<'a> {
    store: &'a SqliteEmployeeStore,
}

impl<'a> AnalyticsService<'a> {
    pub fn new(store: &'a SqliteEmployeeStore) -> Self {
        Self { store }
    }

    /// Live headcounts per category plus their sum.
    pub fn summary_stats(&self) -> StoreResult<SummaryStats> {
        let conn = self.store.connect()?;
        let mut stats = SummaryStats::default();
        for category in Category::ALL {
            let (total, active): (i64, i64) = conn.query_row(
                &format!(
                    "SELECT COUNT(*), COUNT(*) FILTER (WHERE {})
                     FROM {}
                     WHERE {COL_DELETED_AT} IS NULL;",
                    category.active_predicate_sql(),
                    category.table()
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let counts = CategoryCounts {
                total: total as u64,
                active: active as u64,
                retired: (total - active) as u64,
            };
            stats.total.add(counts);
            stats.categories.insert(category, counts);
        }
        Ok(stats)
    }

    /// Visas expiring on or before today + `days`, most urgent first.
    ///
    /// A negative `days` keeps only visas expired at least that long ago.
    pub fn visa_alerts(&self, days: i64, active_only: bool) -> StoreResult<Vec<VisaAlert>> {
        self.visa_alerts_at(Local::now().date_naive(), days, active_only)
    }

    /// Same as [`Self::visa_alerts`] with an explicit reference date.
    pub fn visa_alerts_at(
        &self,
        today: NaiveDate,
        days: i64,
        active_only: bool,
    ) -> StoreResult<Vec<VisaAlert>> {
        let Some(cutoff) = visa_cutoff(today, days) else {
            return Ok(Vec::new());
        };

        let conn = self.store.connect()?;
        let mut alerts = Vec::new();
        for category in Category::ALL {
            let mut sql = format!(
                "SELECT {COL_ID}, {}, {}, {}, {} FROM {}
                 WHERE {COL_DELETED_AT} IS NULL
                   AND {expiry} IS NOT NULL
                   AND {expiry} <= ?1",
                quote_column(COL_EMPLOYEE_NO),
                quote_column(COL_NAME),
                quote_column(COL_VISA_TYPE),
                quote_column(COL_VISA_EXPIRY),
                category.table(),
                expiry = quote_column(COL_VISA_EXPIRY),
            );
            if active_only {
                sql.push_str(&format!(" AND {}", category.active_predicate_sql()));
            }
            sql.push_str(&format!(" ORDER BY {} ASC, {COL_ID} ASC", quote_column(COL_VISA_EXPIRY)));

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([cutoff.as_str()])?;
            while let Some(row) = rows.next()? {
                let record_id: RecordId = row.get(0)?;
                let expiry_text: String = row.get(4)?;
                let Some(expiry) = parse_iso_date(&expiry_text) else {
                    debug!(
                        "event=visa_alert module=analytics status=skipped category={} id={} reason=unparseable_expiry",
                        category.table(),
                        record_id
                    );
                    continue;
                };
                let days_left = (expiry - today).num_days();
                alerts.push(VisaAlert {
                    category,
                    record_id,
                    employee_no: row.get(1)?,
                    name: row.get(2)?,
                    visa_type: row.get(3)?,
                    expiry_date: expiry.format("%Y-%m-%d").to_string(),
                    days_left,
                    severity: Severity::classify(days_left),
                });
            }
        }

        alerts.sort_by_key(|alert| alert.days_left);
        Ok(alerts)
    }

    /// Nationality counts per category, largest first.
    pub fn nationality_breakdown(&self) -> StoreResult<BTreeMap<Category, Vec<NationalityCount>>> {
        let conn = self.store.connect()?;
        let mut breakdown = BTreeMap::new();
        for category in Category::ALL {
            let counts = grouped_counts(&conn, category, COL_NATIONALITY, None)?
                .into_iter()
                .map(|(nationality, count)| NationalityCount { nationality, count })
                .collect();
            breakdown.insert(category, counts);
        }
        Ok(breakdown)
    }

    /// Top `top_n` dispatch companies by live dispatched headcount.
    pub fn company_breakdown(&self, top_n: u32) -> StoreResult<Vec<CompanyShare>> {
        let conn = self.store.connect()?;
        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {COL_DELETED_AT} IS NULL;",
                Category::Dispatched.table()
            ),
            [],
            |row| row.get(0),
        )?;
        let denominator = total.max(1) as f64;

        Ok(
            grouped_counts(&conn, Category::Dispatched, COL_COMPANY, Some(top_n))?
                .into_iter()
                .map(|(company, count)| CompanyShare {
                    company,
                    count,
                    percentage: round1(count as f64 / denominator * 100.0),
                })
                .collect(),
        )
    }

    /// Most recent `limit` audit entries, newest first.
    pub fn audit_log(&self, filter: AuditFilter, limit: u32) -> StoreResult<Vec<AuditEntry>> {
        let conn = self.store.connect()?;
        list_audit(&conn, filter, limit)
    }

    /// Hourly, billing and margin statistics for dispatched employees.
    pub fn salary_stats(&self, active_only: bool) -> StoreResult<SalaryStats> {
        let conn = self.store.connect()?;
        let category = Category::Dispatched;
        let mut sql = format!(
            "SELECT {}, {}, {} FROM {} WHERE {COL_DELETED_AT} IS NULL",
            quote_column(COL_HOURLY_RATE),
            quote_column(COL_BILLING_RATE),
            quote_column(COL_PROFIT),
            category.table()
        );
        if active_only {
            sql.push_str(&format!(" AND {}", category.active_predicate_sql()));
        }

        let mut hourly = Vec::new();
        let mut billing = Vec::new();
        let mut profit = Vec::new();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (index, series) in [&mut hourly, &mut billing, &mut profit].into_iter().enumerate() {
                if let Some(value) = parse_number(row.get::<_, Option<String>>(index)?) {
                    series.push(value);
                }
            }
        }

        Ok(SalaryStats {
            hourly_rate: SeriesStats::from_values(hourly),
            billing_rate: SeriesStats::from_values(billing),
            profit: SeriesStats::from_values(profit),
        })
    }

    /// Headcount per age band for each category.
    pub fn age_breakdown(&self) -> StoreResult<BTreeMap<Category, Vec<AgeBucket>>> {
        let conn = self.store.connect()?;
        let mut breakdown = BTreeMap::new();
        for category in Category::ALL {
            let mut buckets: Vec<AgeBucket> = AGE_BUCKETS
                .iter()
                .map(|&(label, _, _)| AgeBucket { label, count: 0 })
                .collect();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {} WHERE {COL_DELETED_AT} IS NULL;",
                quote_column(COL_AGE),
                category.table()
            ))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let Some(age) = parse_number(row.get::<_, Option<String>>(0)?) else {
                    continue;
                };
                let age = age.floor();
                if let Some(bucket) = AGE_BUCKETS
                    .iter()
                    .position(|(_, low, high)| age >= f64::from(*low) && age <= f64::from(*high))
                {
                    buckets[bucket].count += 1;
                }
            }
            breakdown.insert(category, buckets);
        }
        Ok(breakdown)
    }
}

/// Upper bound for stored `YYYY-MM-DD` expiry dates, `None` when no stored
/// date can be that early.
fn visa_cutoff(today: NaiveDate, days: i64) -> Option<String> {
    let bound = Duration::try_days(days).and_then(|window| today.checked_add_signed(window));
    match bound {
        Some(date) if date.year() > 9999 => Some(LAST_ISO_DATE.to_string()),
        Some(date) if date.year() < 1 => None,
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None if days > 0 => Some(LAST_ISO_DATE.to_string()),
        None => None,
    }
}

/// Counts live rows per non-null `column` value, largest first, ties by value.
fn grouped_counts(
    conn: &Connection,
    category: Category,
    column: &str,
    limit: Option<u32>,
) -> StoreResult<Vec<(String, u64)>> {
    let quoted = quote_column(column);
    let mut sql = format!(
        "SELECT {quoted}, COUNT(*) AS cnt FROM {}
         WHERE {COL_DELETED_AT} IS NULL AND {quoted} IS NOT NULL
         GROUP BY {quoted}
         ORDER BY cnt DESC, {quoted} ASC",
        category.table()
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut counts = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        counts.push((value, count as u64));
    }
    Ok(counts)
}

fn parse_number(value: Option<String>) -> Option<f64> {
    value?.trim().parse::<f64>().ok().filter(|number| number.is_finite())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::{profit_margin, visa_cutoff, SeriesStats, Severity};
    use chrono::NaiveDate;

    #[test]
    fn severity_thresholds_are_inclusive() {
        assert_eq!(Severity::classify(-3), Severity::Expired);
        assert_eq!(Severity::classify(0), Severity::Expired);
        assert_eq!(Severity::classify(1), Severity::Urgent);
        assert_eq!(Severity::classify(30), Severity::Urgent);
        assert_eq!(Severity::classify(31), Severity::Warning);
        assert_eq!(Severity::classify(60), Severity::Warning);
        assert_eq!(Severity::classify(61), Severity::Upcoming);
    }

    #[test]
    fn visa_cutoff_stays_within_four_digit_years() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert_eq!(visa_cutoff(today, 30).as_deref(), Some("2026-01-31"));
        assert_eq!(visa_cutoff(today, -10).as_deref(), Some("2025-12-22"));
        assert_eq!(visa_cutoff(today, 3_000_000).as_deref(), Some("9999-12-31"));
        assert_eq!(visa_cutoff(today, i64::MAX).as_deref(), Some("9999-12-31"));
        assert_eq!(visa_cutoff(today, -800_000), None);
        assert_eq!(visa_cutoff(today, i64::MIN), None);
    }

    #[test]
    fn series_stats_handles_even_and_empty_series() {
        let stats = SeriesStats::from_values(vec![1300.0, 1100.0, 1200.0, 1000.0]);
        assert_eq!(stats.min, 1000.0);
        assert_eq!(stats.max, 1300.0);
        assert_eq!(stats.avg, 1150.0);
        assert_eq!(stats.median, 1150.0);
        assert_eq!(stats.count, 4);

        assert_eq!(SeriesStats::from_values(Vec::new()), SeriesStats::default());
    }

    #[test]
    fn profit_margin_applies_company_burden() {
        let margin = profit_margin(1800.0, 1200.0);
        assert_eq!(margin.gross_profit, 600.0);
        assert_eq!(margin.company_burden, 189.0);
        assert_eq!(margin.net_profit, 411.0);
        assert_eq!(margin.margin_rate, 33.3);

        assert_eq!(profit_margin(0.0, 1000.0).margin_rate, 0.0);
    }
}
