//! Cleaning pipeline for the CSV export.
//!
//! Stages always run in the order of [`Stage::ORDERED`]. Every stage works
//! column by column and a column is only written back once all of its cells
//! converted, so a failing stage never leaves a half-converted column behind.
//! What happens after a failure is decided by [`FailurePolicy`].

use crate::common::constants::{INVALID_DATE_SENTINEL, OUTPUT_DATE_FORMAT};
use crate::common::error::{IntegratorError, Result};
use crate::config::{FailurePolicy, TransformConfig};
use crate::pipeline::table::{Cell, Table};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

static PHONE_MASK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[()\-\s]").expect("valid regex"));
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static INTEGER_PART: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d*$").expect("valid regex"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DropColumns,
    NormalizeDates,
    UnmaskPhones,
    PercentageToDecimal,
    TruncateDuration,
    FillEmpties,
}

impl Stage {
    pub const ORDERED: [Stage; 6] = [
        Stage::DropColumns,
        Stage::NormalizeDates,
        Stage::UnmaskPhones,
        Stage::PercentageToDecimal,
        Stage::TruncateDuration,
        Stage::FillEmpties,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::DropColumns => "drop_columns",
            Stage::NormalizeDates => "normalize_dates",
            Stage::UnmaskPhones => "unmask_phones",
            Stage::PercentageToDecimal => "percentage_to_decimal",
            Stage::TruncateDuration => "truncate_duration",
            Stage::FillEmpties => "fill_empties",
        }
    }
}

/// Outcome of a transform run.
#[derive(Debug, Default)]
pub struct TransformReport {
    /// Column failures skipped under [`FailurePolicy::BestEffort`].
    pub failures: Vec<IntegratorError>,
    pub timings: Vec<(Stage, Duration)>,
}

impl TransformReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct TableTransformer {
    config: TransformConfig,
}

impl TableTransformer {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    /// Run every stage over `table`, in place.
    #[instrument(skip(self, table), fields(rows = table.len(), policy = ?self.config.policy))]
    pub fn run(&self, table: &mut Table) -> Result<TransformReport> {
        let mut report = TransformReport::default();

        for stage in Stage::ORDERED {
            let started = Instant::now();
            let failures = self.apply_stage(stage, table);
            let elapsed = started.elapsed();
            info!(stage = stage.name(), secs = elapsed.as_secs_f64(), "Stage finished");
            crate::observability::metrics::transform::stage_duration(stage.name(), elapsed.as_secs_f64());
            report.timings.push((stage, elapsed));

            for failure in failures {
                crate::observability::metrics::transform::stage_failed(stage.name());
                match self.config.policy {
                    FailurePolicy::FailFast => return Err(failure),
                    FailurePolicy::BestEffort => {
                        warn!(stage = stage.name(), "Column left unconverted: {}", failure);
                        report.failures.push(failure);
                    }
                }
            }
        }

        crate::observability::metrics::transform::rows_processed(table.len());
        Ok(report)
    }

    /// Apply one stage, returning one error per column that failed.
    fn apply_stage(&self, stage: Stage, table: &mut Table) -> Vec<IntegratorError> {
        let cfg = &self.config;
        match stage {
            Stage::DropColumns => cfg
                .drop_columns
                .iter()
                .filter(|column| !table.drop_column(column))
                .map(|column| missing_column(stage, column))
                .collect(),
            Stage::NormalizeDates => transform_columns(table, stage, &cfg.date_columns, date_cell),
            Stage::UnmaskPhones => transform_columns(table, stage, &cfg.phone_columns, |cell| {
                phone_cell(cell, &cfg.country_code)
            }),
            Stage::PercentageToDecimal => {
                transform_columns(table, stage, &cfg.percentage_columns, percentage_cell)
            }
            Stage::TruncateDuration => {
                transform_columns(table, stage, &cfg.duration_columns, duration_cell)
            }
            Stage::FillEmpties => {
                fill_empties(table);
                Vec::new()
            }
        }
    }
}

fn missing_column(stage: Stage, column: &str) -> IntegratorError {
    IntegratorError::Transform {
        stage: stage.name(),
        column: column.to_string(),
        row: None,
        value: None,
        reason: "column not found".to_string(),
    }
}

fn transform_columns<F>(table: &mut Table, stage: Stage, columns: &[String], f: F) -> Vec<IntegratorError>
where
    F: Fn(&Cell) -> std::result::Result<Cell, String>,
{
    columns
        .iter()
        .filter_map(|column| transform_column(table, stage, column, &f).err())
        .collect()
}

/// Convert every cell of `column`; the column is only replaced if all succeed.
fn transform_column<F>(table: &mut Table, stage: Stage, column: &str, f: &F) -> Result<()>
where
    F: Fn(&Cell) -> std::result::Result<Cell, String>,
{
    let idx = table
        .column_index(column)
        .ok_or_else(|| missing_column(stage, column))?;

    let converted = table
        .column_cells(idx)
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            f(cell).map_err(|reason| IntegratorError::Transform {
                stage: stage.name(),
                column: column.to_string(),
                row: Some(row),
                value: Some(cell.to_string()),
                reason,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    table.set_column_cells(idx, converted);
    Ok(())
}

fn date_cell(cell: &Cell) -> std::result::Result<Cell, String> {
    match cell {
        Cell::Null => Ok(Cell::Null),
        Cell::Text(raw) => Ok(normalize_date(raw)?.map(Cell::Text).unwrap_or(Cell::Null)),
        Cell::Decimal(d) => Err(format!("{d} is not a date")),
    }
}

fn phone_cell(cell: &Cell, country_code: &str) -> std::result::Result<Cell, String> {
    match cell {
        Cell::Null => Ok(Cell::Null),
        Cell::Text(raw) => unmask_phone(raw, country_code).map(Cell::Text),
        Cell::Decimal(d) => Err(format!("{d} is not a phone number")),
    }
}

fn percentage_cell(cell: &Cell) -> std::result::Result<Cell, String> {
    match cell {
        Cell::Text(raw) => percentage_to_decimal(raw).map(Cell::Decimal),
        other => Ok(other.clone()),
    }
}

fn duration_cell(cell: &Cell) -> std::result::Result<Cell, String> {
    match cell {
        Cell::Null => Ok(Cell::Null),
        Cell::Text(raw) => truncate_to_hours(raw).map(Cell::Text),
        Cell::Decimal(d) => Ok(Cell::Text(format!("{}h", d.trunc() as i64))),
    }
}

fn fill_empties(table: &mut Table) {
    for cell in table.cells_mut() {
        if cell.is_null() {
            *cell = Cell::text("");
        }
    }
}

/// Reformat a timestamp as `DD/MM/YYYY`. The IPED "no date" sentinel maps to
/// `None`. Already formatted dates pass through unchanged.
pub fn normalize_date(raw: &str) -> std::result::Result<Option<String>, String> {
    let value = raw.trim();
    if value == INVALID_DATE_SENTINEL || value == "0000-00-00" {
        return Ok(None);
    }

    let date = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        })
        .ok_or_else(|| format!("unrecognized date '{value}'"))?;

    Ok(Some(date.format(OUTPUT_DATE_FORMAT).to_string()))
}

/// Strip the phone mask and prefix the country code.
pub fn unmask_phone(raw: &str, country_code: &str) -> std::result::Result<String, String> {
    let digits = PHONE_MASK.replace_all(raw, "");
    if !DIGITS.is_match(&digits) {
        return Err(format!("'{raw}' is not a phone number"));
    }
    Ok(format!("{country_code}{digits}"))
}

/// `"80%"` → `0.8`. A decimal comma is accepted.
pub fn percentage_to_decimal(raw: &str) -> std::result::Result<f64, String> {
    let value = raw.trim();
    let number = value.strip_suffix('%').unwrap_or(value).trim().replace(',', ".");
    let parsed: f64 = number
        .parse()
        .map_err(|_| format!("'{raw}' is not a percentage"))?;
    if !parsed.is_finite() {
        return Err(format!("'{raw}' is not a percentage"));
    }
    Ok(parsed / 100.0)
}

/// `"2.35"` → `"2h"`: the integer part, never rounded, with an hour suffix.
pub fn truncate_to_hours(raw: &str) -> std::result::Result<String, String> {
    let value = raw.trim();
    if let Some(hours) = value.strip_suffix('h') {
        if !hours.is_empty() && INTEGER_PART.is_match(hours) {
            return Ok(value.to_string());
        }
    }

    let normalized = value.replace(',', ".");
    let (integer, fraction) = normalized.split_once('.').unwrap_or((normalized.as_str(), ""));
    let fraction_ok = fraction.chars().all(|c| c.is_ascii_digit());
    if !INTEGER_PART.is_match(integer) || !fraction_ok || (integer.is_empty() && fraction.is_empty()) {
        return Err(format!("'{raw}' is not a duration"));
    }

    let integer = match integer {
        "" => "0",
        "-" => "-0",
        other => other,
    };
    Ok(format!("{integer}h"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(policy: FailurePolicy) -> TransformConfig {
        TransformConfig {
            policy,
            drop_columns: vec!["Depoimento".into()],
            date_columns: vec!["Data".into()],
            phone_columns: vec!["Telefone".into()],
            percentage_columns: vec!["Progresso".into()],
            duration_columns: vec!["Horas".into()],
            country_code: "55".into(),
        }
    }

    fn table(rows: &[[&str; 6]]) -> Table {
        let text = std::iter::once("Nome;Depoimento;Data;Telefone;Progresso;Horas".to_string())
            .chain(rows.iter().map(|r| r.join(";")))
            .collect::<Vec<_>>()
            .join("\n");
        Table::from_csv_str(&text, b';').unwrap()
    }

    #[test]
    fn test_percentage_to_decimal() {
        assert_eq!(percentage_to_decimal("80%").unwrap(), 0.8);
        assert_eq!(percentage_to_decimal("25%").unwrap(), 0.25);
        assert_eq!(percentage_to_decimal("100%").unwrap(), 1.0);
        assert_eq!(percentage_to_decimal("50%").unwrap(), 0.5);
        assert_eq!(percentage_to_decimal("12,5 %").unwrap(), 0.125);
        assert!(percentage_to_decimal("abc%").is_err());
    }

    #[test]
    fn test_truncate_to_hours() {
        assert_eq!(truncate_to_hours("2.35").unwrap(), "2h");
        assert_eq!(truncate_to_hours("0.004").unwrap(), "0h");
        assert_eq!(truncate_to_hours("50,0").unwrap(), "50h");
        assert_eq!(truncate_to_hours("1.0").unwrap(), "1h");
        assert_eq!(truncate_to_hours("50.0").unwrap(), "50h");
        assert_eq!(truncate_to_hours("0.32").unwrap(), "0h");
        assert_eq!(truncate_to_hours("12").unwrap(), "12h");
        assert_eq!(truncate_to_hours(".5").unwrap(), "0h");
        assert_eq!(truncate_to_hours("7h").unwrap(), "7h");
        assert!(truncate_to_hours("duas horas").is_err());
        assert!(truncate_to_hours("1.2.3").is_err());
    }

    #[test]
    fn test_unmask_phone() {
        assert_eq!(unmask_phone("(11) 1234-5678", "55").unwrap(), "551112345678");
        assert_eq!(unmask_phone("11987654321", "55").unwrap(), "5511987654321");
        assert_eq!(unmask_phone("11-98765-4321", "55").unwrap(), "5511987654321");
        assert!(unmask_phone("+55 11 1234", "55").is_err());
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2020-01-02 00:00").unwrap().as_deref(), Some("02/01/2020"));
        assert_eq!(
            normalize_date("2023-05-17 14:03:59").unwrap().as_deref(),
            Some("17/05/2023")
        );
        assert_eq!(normalize_date("05/05/2023 00:00").unwrap().as_deref(), Some("05/05/2023"));
        assert_eq!(normalize_date(INVALID_DATE_SENTINEL).unwrap(), None);
        assert!(normalize_date("yesterday").is_err());
    }

    #[test]
    fn test_normalize_date_is_idempotent() {
        let once = normalize_date("2023-05-17 14:03:59").unwrap().unwrap();
        let twice = normalize_date(&once).unwrap().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_full_run_produces_clean_table() {
        let mut t = table(&[
            ["Ana", "Ótimo curso", "2023-05-17 14:03:59", "(11) 1234-5678", "80%", "2.35"],
            ["Bruno", "", "0000-00-00 00:00:00", "", "", "0,004"],
        ]);
        let report = TableTransformer::new(config(FailurePolicy::FailFast))
            .run(&mut t)
            .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.timings.len(), Stage::ORDERED.len());
        assert!(t.column_index("Depoimento").is_none());
        assert_eq!(t.cell(0, "Data"), Some(&Cell::text("17/05/2023")));
        assert_eq!(t.cell(0, "Telefone"), Some(&Cell::text("551112345678")));
        assert_eq!(t.cell(0, "Progresso"), Some(&Cell::Decimal(0.8)));
        assert_eq!(t.cell(0, "Horas"), Some(&Cell::text("2h")));
        assert_eq!(t.cell(1, "Data"), Some(&Cell::text("")));
        assert_eq!(t.cell(1, "Horas"), Some(&Cell::text("0h")));
        assert!(t.cells().all(|c| !c.is_null()));
        assert!(t.cells().all(|c| c.as_text() != Some(INVALID_DATE_SENTINEL)));
    }

    #[test]
    fn test_fail_fast_stops_at_first_bad_column() {
        let mut t = table(&[["Ana", "", "not a date", "(11) 1234-5678", "80%", "2.35"]]);
        let err = TableTransformer::new(config(FailurePolicy::FailFast))
            .run(&mut t)
            .unwrap_err();
        match err {
            IntegratorError::Transform { stage, column, row, value, .. } => {
                assert_eq!(stage, "normalize_dates");
                assert_eq!(column, "Data");
                assert_eq!(row, Some(0));
                assert_eq!(value.as_deref(), Some("not a date"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        // later stages never ran
        assert_eq!(t.cell(0, "Telefone"), Some(&Cell::text("(11) 1234-5678")));
    }

    #[test]
    fn test_best_effort_leaves_failed_column_untouched() {
        let mut t = table(&[
            ["Ana", "", "2023-05-17 14:03:59", "(11) 1234-5678", "80%", "2.35"],
            ["Bruno", "", "not a date", "11987654321", "25%", "1"],
        ]);
        let report = TableTransformer::new(config(FailurePolicy::BestEffort))
            .run(&mut t)
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        // first row's date was valid, but the whole column is rolled back
        assert_eq!(t.cell(0, "Data"), Some(&Cell::text("2023-05-17 14:03:59")));
        assert_eq!(t.cell(1, "Data"), Some(&Cell::text("not a date")));
        assert_eq!(t.cell(1, "Telefone"), Some(&Cell::text("5511987654321")));
        assert_eq!(t.cell(1, "Progresso"), Some(&Cell::Decimal(0.25)));
    }

    #[test]
    fn test_missing_column_is_a_stage_failure() {
        let mut t = Table::from_csv_str("Nome;Progresso\nAna;80%\n", b';').unwrap();
        let mut cfg = config(FailurePolicy::BestEffort);
        cfg.drop_columns.clear();
        cfg.date_columns.clear();
        cfg.phone_columns = vec!["Celular".into()];
        cfg.duration_columns.clear();
        let report = TableTransformer::new(cfg).run(&mut t).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].to_string().contains("Celular"));
        assert_eq!(t.cell(0, "Progresso"), Some(&Cell::Decimal(0.8)));
    }
}
