//! Employee categories and their fixed column sets.
//!
//! # Responsibility
//! - Define the three closed employee categories and their storage names.
//! - Provide the static column list and field-role lookup per category.
//!
//! # Invariants
//! - A category's column order never changes between releases; new columns are
//!   appended and picked up by additive migration.
//! - Column names are the workbook header names and are only ever interpolated
//!   into SQL through [`quote_column`].

use serde::{Deserialize, Serialize};

/// Employment status column shared by dispatched and contracted sheets.
pub const COL_STATUS: &str = "現在";
pub const COL_EMPLOYEE_NO: &str = "社員№";
pub const COL_NAME: &str = "氏名";
pub const COL_KANA: &str = "カナ";
pub const COL_NATIONALITY: &str = "国籍";
pub const COL_AGE: &str = "年齢";
pub const COL_COMPANY: &str = "派遣先";
pub const COL_HOURLY_RATE: &str = "時給";
pub const COL_BILLING_RATE: &str = "請求単価";
pub const COL_PROFIT: &str = "差額利益";
pub const COL_VISA_EXPIRY: &str = "ビザ期限";
pub const COL_VISA_TYPE: &str = "ビザ種類";
pub const COL_START_DATE: &str = "入社日";
pub const COL_END_DATE: &str = "退社日";

/// Status literal marking an in-service employee.
pub const ACTIVE_STATUS: &str = "在職中";

const DISPATCHED_COLUMNS: &[&str] = &[
    "現在", "社員№", "派遣先ID", "派遣先", "配属先", "配属ライン", "仕事内容",
    "氏名", "カナ", "性別", "国籍", "生年月日", "年齢", "時給", "時給改定",
    "請求単価", "請求改定", "差額利益", "標準報酬", "健康保険", "介護保険", "厚生年金",
    "ビザ期限", "ビザ種類", "〒", "住所", "ｱﾊﾟｰﾄ", "入居", "入社日", "退社日",
    "退去", "社保加入", "入社依頼", "備考", "現入社", "免許種類", "免許期限",
    "通勤方法", "任意保険期限", "日本語検定", "キャリアアップ5年目",
];

const CONTRACTED_COLUMNS: &[&str] = &[
    "現在", "社員№", "請負業務", "氏名", "カナ", "性別", "国籍", "生年月日", "年齢",
    "時給", "時給改定", "標準報酬", "健康保険", "介護保険", "厚生年金", "通勤距離",
    "交通費", "差額利益", "ビザ期限", "ビザ種類", "〒", "住所", "ｱﾊﾟｰﾄ", "入居",
    "入社日", "退社日", "退去", "社保加入", "口座名義", "銀行名", "支店番号",
    "支店名", "口座番号", "入社依頼", "備考",
];

const STAFF_COLUMNS: &[&str] = &[
    "現在", "社員№", "事務所", "氏名", "カナ", "性別", "国籍", "生年月日", "年齢",
    "ビザ期限", "ビザ種類", "配偶者", "〒", "住所", "建物名", "入社日", "退社日",
    "社保加入", "雇用保険", "携帯電話", "携帯代行", "銀行", "支店", "口座番号", "名義",
];

const DATE_COLUMNS: &[&str] = &[
    "生年月日", "ビザ期限", "入居", "入社日", "退社日", "退去", "免許期限", "任意保険期限",
];

const NUMERIC_COLUMNS: &[&str] = &[
    "社員№", "年齢", "時給", "時給改定", "請求単価", "請求改定", "差額利益",
    "標準報酬", "健康保険", "介護保険", "厚生年金", "通勤距離", "交通費",
    "派遣先ID", "支店番号",
];

/// Storage role of a column, deciding how raw cells are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Stored as ISO `YYYY-MM-DD`.
    Date,
    /// Stored as the shortest exact decimal string.
    Numeric,
    /// Stored as trimmed text.
    Text,
}

impl FieldRole {
    /// Returns the static role for a canonical column name.
    pub fn of(column: &str) -> Self {
        if DATE_COLUMNS.contains(&column) {
            Self::Date
        } else if NUMERIC_COLUMNS.contains(&column) {
            Self::Numeric
        } else {
            Self::Text
        }
    }
}

/// Employee classification. Fixed for a record's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// 派遣社員, workers placed at client companies.
    Dispatched,
    /// 請負社員, workers on contracted work.
    Contracted,
    /// Internal staff.
    Staff,
}

impl Category {
    /// All categories in import and reporting order.
    pub const ALL: [Category; 3] = [Self::Dispatched, Self::Contracted, Self::Staff];

    /// Backing SQLite table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::Dispatched => "genzai",
            Self::Contracted => "ukeoi",
            Self::Staff => "staff",
        }
    }

    /// Workbook sheet name this category imports from.
    pub fn sheet_name(self) -> &'static str {
        match self {
            Self::Dispatched => "DBGenzaiX",
            Self::Contracted => "DBUkeoiX",
            Self::Staff => "DBStaffX",
        }
    }

    /// Human-readable label used in progress messages and previews.
    pub fn label(self) -> &'static str {
        match self {
            Self::Dispatched => "派遣社員",
            Self::Contracted => "請負社員",
            Self::Staff => "スタッフ",
        }
    }

    /// Ordered canonical data columns, excluding system columns.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Dispatched => DISPATCHED_COLUMNS,
            Self::Contracted => CONTRACTED_COLUMNS,
            Self::Staff => STAFF_COLUMNS,
        }
    }

    /// Returns the canonical `&'static` name when `column` belongs to this category.
    pub fn column(self, column: &str) -> Option<&'static str> {
        self.columns()
            .iter()
            .copied()
            .find(|candidate| *candidate == column)
    }

    /// Columns a workbook sheet must carry to be a usable import.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Self::Dispatched => &[COL_EMPLOYEE_NO, COL_NAME, COL_STATUS, COL_COMPANY],
            Self::Contracted => &[COL_EMPLOYEE_NO, COL_NAME, COL_STATUS],
            Self::Staff => &[COL_EMPLOYEE_NO, COL_NAME],
        }
    }

    pub fn has_column(self, column: &str) -> bool {
        self.column(column).is_some()
    }

    /// Looks a category up by its table name.
    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.table() == table)
    }

    /// SQL predicate selecting in-service rows.
    ///
    /// Dispatched/contracted rows carry an explicit status; staff rows are
    /// active while they have a start date and no end date.
    pub fn active_predicate_sql(self) -> String {
        match self {
            Self::Dispatched | Self::Contracted => {
                format!("{} = '{ACTIVE_STATUS}'", quote_column(COL_STATUS))
            }
            Self::Staff => format!(
                "{} IS NOT NULL AND {} IS NULL",
                quote_column(COL_START_DATE),
                quote_column(COL_END_DATE)
            ),
        }
    }
}

/// Quotes a column identifier for SQLite.
pub fn quote_column(column: &str) -> String {
    format!("\"{}\"", column.replace('"', "\"\""))
}
