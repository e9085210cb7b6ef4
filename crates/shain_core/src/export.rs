//! Report export helpers.
//!
//! CSV output starts with a UTF-8 BOM so spreadsheet tools detect the
//! encoding of the Japanese headers.

use crate::model::category::Category;
use crate::model::record::EmployeeRecord;
use crate::repo::employee_repo::{SqliteEmployeeStore, StoreResult};
use crate::service::analytics_service::AnalyticsService;
use chrono::Utc;
use serde_json::{json, Value};
use std::io::Write;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const SUMMARY_TOP_COMPANIES: u32 = 10;

/// Writes `records` of `category` as CSV: `id` then every canonical column.
///
/// Records of another category are skipped.
pub fn write_csv<W: Write>(
    category: Category,
    records: &[EmployeeRecord],
    mut writer: W,
) -> csv::Result<()> {
    writer.write_all(UTF8_BOM)?;
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(category.columns().len() + 1);
    header.push("id");
    header.extend_from_slice(category.columns());
    csv_writer.write_record(&header)?;

    for record in records.iter().filter(|record| record.category == category) {
        let mut row = Vec::with_capacity(header.len());
        row.push(record.id.to_string());
        row.extend(
            record
                .values
                .iter()
                .map(|value| value.clone().unwrap_or_default()),
        );
        csv_writer.write_record(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Builds a JSON summary report of the whole store.
pub fn summary_document(store: &SqliteEmployeeStore) -> StoreResult<Value> {
    let analytics = AnalyticsService::new(store);
    Ok(json!({
        "generated_at": Utc::now().to_rfc3339(),
        "summary": analytics.summary_stats()?,
        "nationalities": analytics.nationality_breakdown()?,
        "companies": analytics.company_breakdown(SUMMARY_TOP_COMPANIES)?,
        "salary": analytics.salary_stats(true)?,
        "database": store.db_info()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::write_csv;
    use crate::model::category::Category;
    use crate::model::record::EmployeeRecord;

    fn record(id: i64, name: &str) -> EmployeeRecord {
        let mut values = vec![None; Category::Staff.columns().len()];
        let name_index = Category::Staff
            .columns()
            .iter()
            .position(|column| *column == "氏名")
            .expect("staff has a name column");
        values[name_index] = Some(name.to_string());
        EmployeeRecord {
            id,
            category: Category::Staff,
            values,
            updated_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn csv_has_bom_id_column_and_one_row_per_record() {
        let mut out = Vec::new();
        write_csv(Category::Staff, &[record(7, "山田"), record(9, "Nguyen, A")], &mut out)
            .expect("csv written");

        assert!(out.starts_with(b"\xEF\xBB\xBF"));
        let text = String::from_utf8(out[3..].to_vec()).expect("utf-8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,"));
        assert!(lines[0].contains("氏名"));
        assert!(lines[1].starts_with("7,"));
        assert!(lines[1].contains("山田"));
        assert!(lines[2].contains("\"Nguyen, A\""));
    }

    #[test]
    fn csv_skips_records_of_other_categories() {
        let mut out = Vec::new();
        write_csv(Category::Dispatched, &[record(1, "山田")], &mut out).expect("csv written");
        let text = String::from_utf8(out[3..].to_vec()).expect("utf-8");
        assert_eq!(text.lines().count(), 1);
    }
}
