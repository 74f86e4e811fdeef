//! Spreadsheet encoders for report exports.

use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Deserialize;
use strum_macros::EnumString;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Empty,
}

impl Cell {
    fn as_text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Empty => String::new(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<Option<String>> for Cell {
    fn from(s: Option<String>) -> Self {
        s.map(Cell::Text).unwrap_or(Cell::Empty)
    }
}

impl From<u64> for Cell {
    fn from(n: u64) -> Self {
        Cell::Number(n as f64)
    }
}

impl From<u32> for Cell {
    fn from(n: u32) -> Self {
        Cell::Number(f64::from(n))
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<NaiveDate> for Cell {
    fn from(d: NaiveDate) -> Self {
        Cell::Date(d)
    }
}

macro_rules! optional_cell {
    ($($t:ty),*) => {
        $(
            impl From<Option<$t>> for Cell {
                fn from(v: Option<$t>) -> Self {
                    v.map(Cell::from).unwrap_or(Cell::Empty)
                }
            }
        )*
    };
}

optional_cell!(u64, u32, f64, NaiveDate);

/// A header row plus data rows; every row should have `headers.len()` cells.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<&'static str>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }
}

pub fn to_xlsx(sheet_name: &str, table: &Table) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col, header) in table.headers.iter().enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, *header, &header_format)?;
        worksheet.set_column_width(col, 18)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let row_num = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            let col = c as u16;
            match cell {
                Cell::Number(n) => {
                    worksheet.write_number(row_num, col, *n)?;
                }
                Cell::Empty => {}
                other => {
                    worksheet.write_string(row_num, col, other.as_text())?;
                }
            }
        }
    }

    workbook.save_to_buffer()
}

pub fn to_csv(table: &Table) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(Cell::as_text))?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// `attendance_20260302.xlsx`
pub fn file_name(kind: &str, date: NaiveDate, format: ExportFormat) -> String {
    format!("{}_{}.{}", kind, date.format("%Y%m%d"), format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(vec!["Name", "Date", "Minutes", "Note"]);
        table.push(vec![
            "Ann".into(),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().into(),
            480u32.into(),
            Cell::Empty,
        ]);
        table.push(vec![
            "Bob, Jr.".into(),
            NaiveDate::from_ymd_opt(2026, 3, 3).unwrap().into(),
            Some(12.5f64).into(),
            Some("late bus".to_string()).into(),
        ]);
        table
    }

    #[test]
    fn csv_has_header_and_quotes_commas() {
        let bytes = to_csv(&sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Name,Date,Minutes,Note");
        assert_eq!(lines[1], "Ann,2026-03-02,480,");
        assert_eq!(lines[2], "\"Bob, Jr.\",2026-03-03,12.5,late bus");
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = to_xlsx("Attendance", &sample()).unwrap();
        assert!(bytes.len() > 100);
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn file_names_carry_date_and_extension() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(file_name("attendance", date, ExportFormat::Xlsx), "attendance_20260302.xlsx");
        assert_eq!(file_name("tasks", date, ExportFormat::Csv), "tasks_20260302.csv");
    }

    #[test]
    fn format_parses_from_query_value() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::default(), ExportFormat::Xlsx);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }
}
