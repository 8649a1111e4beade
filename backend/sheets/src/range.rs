//! # A1 Notation
//!
//! Just enough of the spreadsheet range grammar for the voucher sheet.
//!
//! - `Sheet!A:E` whole columns, rows start at 1
//! - `Sheet!A2:E` open ended below row 2
//! - `'Sheet name'!D5:E5` quoted names, `''` escapes a quote
use std::fmt;

use crate::SheetsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: Option<String>,
    /// 0-based column index.
    pub start_col: usize,
    /// 1-based row number.
    pub start_row: usize,
    pub end_col: Option<usize>,
    pub end_row: Option<usize>,
}

impl A1Range {
    pub fn parse(input: &str) -> Result<Self, SheetsError> {
        let invalid = || SheetsError::InvalidRange(input.to_string());
        let input = input.trim();

        let (sheet, cells) = match input.rsplit_once('!') {
            Some((sheet, cells)) => (Some(unquote_sheet(sheet)), cells),
            None => (None, input),
        };

        let (start, end) = match cells.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (cells, None),
        };

        let (start_col, start_row) = parse_cell(start).ok_or_else(invalid)?;
        let (end_col, end_row) = match end {
            Some(end) => {
                let (col, row) = parse_cell(end).ok_or_else(invalid)?;
                (Some(col), row)
            }
            None => (Some(start_col), start_row),
        };

        if end_col.is_some_and(|col| col < start_col) {
            return Err(invalid());
        }

        Ok(Self {
            sheet: sheet.filter(|s| !s.is_empty()),
            start_col,
            start_row: start_row.unwrap_or(1),
            end_col,
            end_row,
        })
    }

    /// Single row on the same sheet covering `first_col..=last_col`.
    pub fn row_span(&self, row: usize, first_col: usize, last_col: usize) -> Self {
        Self {
            sheet: self.sheet.clone(),
            start_col: first_col,
            start_row: row,
            end_col: Some(last_col),
            end_row: Some(row),
        }
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                write!(f, "{sheet}!")?;
            } else {
                write!(f, "'{}'!", sheet.replace('\'', "''"))?;
            }
        }

        write!(f, "{}{}", column_letters(self.start_col), self.start_row)?;

        if let Some(end_col) = self.end_col {
            write!(f, ":{}", column_letters(end_col))?;
            if let Some(end_row) = self.end_row {
                write!(f, "{end_row}")?;
            }
        }

        Ok(())
    }
}

fn unquote_sheet(sheet: &str) -> String {
    match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => sheet.to_string(),
    }
}

fn parse_cell(cell: &str) -> Option<(usize, Option<usize>)> {
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);

    let col = column_index(letters)?;
    let row = match digits {
        "" => None,
        digits => Some(digits.parse().ok().filter(|&row| row > 0)?),
    };

    Some((col, row))
}

pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }

    letters.chars().try_fold(0usize, |acc, c| {
        let c = c.to_ascii_uppercase();
        c.is_ascii_uppercase()
            .then(|| acc * 26 + (c as usize - 'A' as usize + 1))
    })
    .map(|n| n - 1)
}

pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();

    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }

    letters.iter().rev().collect()
}
