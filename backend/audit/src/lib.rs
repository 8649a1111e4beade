//! # Campaign Audit
//!
//! Reads the voucher sheet and reports where the campaign stands.
//!
//! - Registered rows, spins still open, spins used
//! - Vouchers handed out per amount and in total
//! - Codes or phones that appear on more than one row (lookups only ever see the first)
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use sheets::Located;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub rows: usize,
    pub unspent: usize,
    pub spent: usize,
    /// Voucher value cell to number of rows holding it.
    pub awarded: BTreeMap<String, usize>,
    pub total_awarded: u64,
    pub duplicate_codes: Vec<String>,
    pub duplicate_phones: Vec<String>,
}

pub fn summarize(entries: &[Located]) -> Summary {
    let mut summary = Summary {
        rows: entries.len(),
        ..Summary::default()
    };

    let mut codes: HashMap<&str, usize> = HashMap::new();
    let mut phones: HashMap<&str, usize> = HashMap::new();

    for Located { entry, .. } in entries {
        if entry.has_spins() {
            summary.unspent += 1;
        } else {
            summary.spent += 1;
        }

        let value = entry.voucher_value.trim();
        if !value.is_empty() {
            *summary.awarded.entry(value.to_string()).or_default() += 1;
            summary.total_awarded += voucher_amount(value);
        }

        *codes.entry(entry.code.as_str()).or_default() += 1;
        *phones.entry(entry.phone.as_str()).or_default() += 1;
    }

    summary.duplicate_codes = duplicates(codes);
    summary.duplicate_phones = duplicates(phones);

    summary
}

/// Sheets may render the amount with separators or a currency sign (`100.000`, `100,000đ`).
fn voucher_amount(cell: &str) -> u64 {
    cell.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

fn duplicates(counts: HashMap<&str, usize>) -> Vec<String> {
    let mut duplicates: Vec<String> = counts
        .into_iter()
        .filter(|(key, count)| !key.is_empty() && *count > 1)
        .map(|(key, _)| key.to_string())
        .collect();

    duplicates.sort();
    duplicates
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Registered: {}", self.rows)?;
        writeln!(f, "Spins Open: {}", self.unspent)?;
        writeln!(f, "Spins Used: {}\n", self.spent)?;

        for (amount, count) in &self.awarded {
            writeln!(f, "Voucher {amount}: {count}")?;
        }
        writeln!(f, "Total Awarded: {}", self.total_awarded)?;

        if !self.duplicate_codes.is_empty() {
            writeln!(f, "\nDuplicate Codes: {}", self.duplicate_codes.join(", "))?;
        }
        if !self.duplicate_phones.is_empty() {
            writeln!(f, "\nDuplicate Phones: {}", self.duplicate_phones.join(", "))?;
        }

        Ok(())
    }
}
