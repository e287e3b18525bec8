//! Spreadsheet reading and writing.
//!
//! The first row is the header. The first column holds the questions; all
//! other columns pass through untouched. Excel and OpenDocument workbooks
//! are read with calamine, `.xlsx` is written with rust_xlsxwriter, and
//! `.csv` goes through the csv crate in both directions.

use crate::error::{Result, SheetQaError};
use calamine::{Data, Reader, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rust_xlsxwriter::{Format, Workbook};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// File formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Comma-separated values.
    Csv,
    /// Office Open XML workbook (read and write).
    Xlsx,
    /// Legacy Excel or OpenDocument workbook (read only).
    LegacyWorkbook,
}

impl TableFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("xlsx" | "xlsm") => Ok(Self::Xlsx),
            Some("xls" | "xlsb" | "ods") => Ok(Self::LegacyWorkbook),
            _ => Err(SheetQaError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Detect the format and make sure it can be written.
    pub fn writable(path: &Path) -> Result<Self> {
        match Self::from_path(path)? {
            Self::LegacyWorkbook => Err(SheetQaError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
            format => Ok(format),
        }
    }
}

/// Excel serial day zero (1900 date system).
fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
const SECONDS_FORMAT: &str = "0.000";

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// No value.
    Empty,
    /// Text.
    Text(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// Date or date-time as an Excel serial number.
    DateTime(f64),
    /// A duration in seconds, shown with millisecond precision.
    Seconds(f64),
}

impl Cell {
    fn is_whole_day(serial: f64) -> bool {
        serial.fract() == 0.0
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::DateTime(serial) => {
                let millis = (serial * 86_400_000.0).round() as i64;
                let at = excel_epoch() + TimeDelta::milliseconds(millis);
                if Self::is_whole_day(*serial) {
                    write!(f, "{}", at.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", at.format("%Y-%m-%d %H:%M:%S"))
                }
            }
            Self::Seconds(s) => write!(f, "{s:.3}"),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            Data::String(s) => Self::Text(s.clone()),
            Data::Float(f) => Self::Number(*f),
            Data::Int(i) => Self::Number(*i as f64),
            Data::Bool(b) => Self::Bool(*b),
            Data::DateTime(dt) if dt.is_duration() => Self::Number(dt.as_f64()),
            Data::DateTime(dt) => Self::DateTime(dt.as_f64()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s.to_string())
        }
    }
}

/// One input row, ready for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRow {
    /// Zero-based position among the data rows.
    pub index: usize,
    /// First-column value coerced to a string; empty cells become "".
    pub question: String,
    /// Every cell of the row, padded to the header width.
    pub cells: Vec<Cell>,
}

/// A header row plus data rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// Column names.
    pub headers: Vec<String>,
    /// Data rows. Each row has exactly `headers.len()` cells or more.
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create a table; short rows are padded with empty cells.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, Cell::Empty);
                }
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Read a table from a CSV or workbook file.
    pub fn read(path: &Path) -> Result<Self> {
        std::fs::metadata(path).map_err(|e| SheetQaError::InputFileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let table = match TableFormat::from_path(path)? {
            TableFormat::Csv => Self::read_csv(path)?,
            TableFormat::Xlsx | TableFormat::LegacyWorkbook => Self::read_workbook(path)?,
        };

        if table.headers.is_empty() {
            return Err(SheetQaError::NoColumns {
                path: path.to_path_buf(),
            });
        }

        debug!(
            path = %path.display(),
            columns = table.headers.len(),
            rows = table.rows.len(),
            "Loaded table"
        );
        Ok(table)
    }

    fn read_csv(path: &Path) -> Result<Self> {
        let csv_err = |source| SheetQaError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            rows.push(record.iter().map(Cell::from).collect());
        }

        Ok(Self::new(headers, rows))
    }

    fn read_workbook(path: &Path) -> Result<Self> {
        let parse_err = |message: String| SheetQaError::SpreadsheetParse {
            path: path.to_path_buf(),
            message,
        };

        let mut workbook = open_workbook_auto(path).map_err(|e| parse_err(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| parse_err("workbook has no worksheets".to_string()))?
            .map_err(|e| parse_err(e.to_string()))?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(|d| d.to_string()).collect(),
            None => Vec::new(),
        };
        let rows = rows.map(|row| row.iter().map(Cell::from).collect()).collect();

        Ok(Self::new(headers, rows))
    }

    /// Data rows as pipeline input.
    pub fn question_rows(&self) -> Vec<QuestionRow> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, cells)| QuestionRow {
                index,
                question: cells.first().map(Cell::to_string).unwrap_or_default(),
                cells: cells.clone(),
            })
            .collect()
    }

    /// Write the table; the format follows the path's extension.
    pub fn write(&self, path: &Path) -> Result<()> {
        match TableFormat::writable(path)? {
            TableFormat::Csv => self.write_csv(path),
            _ => self.write_xlsx(path),
        }
    }

    /// Render as CSV bytes.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        self.write_records(&mut writer)
            .map_err(|source| SheetQaError::Csv {
                path: "<memory>".into(),
                source,
            })?;
        writer
            .into_inner()
            .map_err(|e| SheetQaError::SpreadsheetWrite {
                path: "<memory>".into(),
                message: e.to_string(),
            })
    }

    fn write_records<W: std::io::Write>(
        &self,
        writer: &mut csv::Writer<W>,
    ) -> std::result::Result<(), csv::Error> {
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Cell::to_string))?;
        }
        Ok(())
    }

    fn write_csv(&self, path: &Path) -> Result<()> {
        let csv_err = |source| SheetQaError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        self.write_records(&mut writer).map_err(csv_err)?;
        writer.flush().map_err(|e| SheetQaError::OutputFileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn write_xlsx(&self, path: &Path) -> Result<()> {
        let write_err = |message: String| SheetQaError::SpreadsheetWrite {
            path: path.to_path_buf(),
            message,
        };

        let date = Format::new().set_num_format(DATE_FORMAT);
        let datetime = Format::new().set_num_format(DATETIME_FORMAT);
        let seconds = Format::new().set_num_format(SECONDS_FORMAT);

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        for (col, header) in self.headers.iter().enumerate() {
            let col = u16::try_from(col).map_err(|_| write_err("too many columns".to_string()))?;
            worksheet
                .write_string(0, col, header)
                .map_err(|e| write_err(e.to_string()))?;
        }

        for (r, row) in self.rows.iter().enumerate() {
            let r = u32::try_from(r + 1).map_err(|_| write_err("too many rows".to_string()))?;
            for (col, cell) in row.iter().enumerate() {
                let col =
                    u16::try_from(col).map_err(|_| write_err("too many columns".to_string()))?;
                let written = match cell {
                    Cell::Empty => continue,
                    Cell::Text(s) => worksheet.write_string(r, col, s),
                    Cell::Number(n) => worksheet.write_number(r, col, *n),
                    Cell::Bool(b) => worksheet.write_boolean(r, col, *b),
                    Cell::DateTime(serial) if Cell::is_whole_day(*serial) => {
                        worksheet.write_number_with_format(r, col, *serial, &date)
                    }
                    Cell::DateTime(serial) => {
                        worksheet.write_number_with_format(r, col, *serial, &datetime)
                    }
                    Cell::Seconds(s) => worksheet.write_number_with_format(r, col, *s, &seconds),
                };
                written.map_err(|e| write_err(e.to_string()))?;
            }
        }

        workbook.save(path).map_err(|e| write_err(e.to_string()))
    }
}
