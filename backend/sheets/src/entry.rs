//! # Voucher Rows
//!
//! One row per registered phone number.
//!
//! | Col | Field |
//! |---|---|
//! | A | name |
//! | B | phone, written as `'0901234567` so the sheet keeps the leading zero |
//! | C | code |
//! | D | spins remaining, 1 until the spin is logged |
//! | E | voucher value, empty until claimed |
//! | F | message (audit mode) |
//! | G | spend timestamp (audit mode) |
//!
//! Columns are relative to the first column of the configured range.
use crate::{Rows, range::A1Range};

pub const NAME: usize = 0;
pub const PHONE: usize = 1;
pub const CODE: usize = 2;
pub const SPINS: usize = 3;
pub const VOUCHER: usize = 4;
/// Audit mode writes the voucher message before the timestamp.
pub const TIMESTAMP: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherEntry {
    pub name: String,
    pub phone: String,
    pub code: String,
    pub spins_remaining: u32,
    pub voucher_value: String,
}

impl VoucherEntry {
    /// Fresh registration holding a single spin.
    pub fn issue(name: &str, phone: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            phone: phone.to_string(),
            code: code.to_string(),
            spins_remaining: 1,
            voucher_value: String::new(),
        }
    }

    pub fn from_row(row: &[String]) -> Self {
        let cell = |index: usize| row.get(index).map(|s| s.trim()).unwrap_or_default();

        Self {
            name: cell(NAME).to_string(),
            phone: unescape_phone(cell(PHONE)),
            code: cell(CODE).to_uppercase(),
            spins_remaining: cell(SPINS).parse().unwrap_or(0),
            voucher_value: cell(VOUCHER).to_string(),
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            format!("'{}", self.phone),
            self.code.clone(),
            self.spins_remaining.to_string(),
            self.voucher_value.clone(),
        ]
    }

    pub fn has_spins(&self) -> bool {
        self.spins_remaining > 0
    }

    pub fn matches_code(&self, code: &str) -> bool {
        !self.code.is_empty() && self.code.eq_ignore_ascii_case(code.trim())
    }
}

/// Reads a phone cell back into its 10 digit form.
///
/// A cell typed in as a number loses its leading zero, so 9 digits get it back.
pub fn unescape_phone(cell: &str) -> String {
    let digits: String = cell.chars().filter(char::is_ascii_digit).collect();

    match digits.len() {
        9 => format!("0{digits}"),
        _ => digits,
    }
}

/// Voucher row with its 1-based row number in the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub row: usize,
    pub entry: VoucherEntry,
}

#[derive(Debug, Clone)]
pub struct SheetLayout {
    pub range: A1Range,
    pub header_rows: usize,
}

impl SheetLayout {
    pub fn new(range: A1Range, header_rows: usize) -> Self {
        Self { range, header_rows }
    }

    /// Data rows of a read of [`SheetLayout::range`], blank rows skipped.
    pub fn entries(&self, rows: &Rows) -> Vec<Located> {
        rows.iter()
            .enumerate()
            .skip(self.header_rows)
            .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|(index, row)| Located {
                row: self.range.start_row + index,
                entry: VoucherEntry::from_row(row),
            })
            .collect()
    }

    pub fn find_code<'a>(&self, entries: &'a [Located], code: &str) -> Option<&'a Located> {
        entries.iter().find(|located| located.entry.matches_code(code))
    }

    pub fn find_phone<'a>(&self, entries: &'a [Located], phone: &str) -> Option<&'a Located> {
        entries.iter().find(|located| located.entry.phone == phone)
    }

    /// Spin count and voucher value cells of a row, plus message and timestamp with `audit`.
    pub fn spend_range(&self, row: usize, audit: bool) -> A1Range {
        let last = if audit { TIMESTAMP } else { VOUCHER };

        self.range
            .row_span(row, self.range.start_col + SPINS, self.range.start_col + last)
    }
}
