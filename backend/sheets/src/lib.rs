//! # Google Sheets
//!
//! The spreadsheet is the system of record for the campaign: codes, spin counts and vouchers.
//!
//! ## Operations
//!
//! - Read a rectangular range
//! - Append rows below the last filled row
//! - Overwrite a specific range
//!
//! All three go through [`RowStore`] so the campaign logic never knows whether it talks to
//! the live sheet ([`SheetsClient`]) or a grid in memory ([`MemoryStore`]).
//!
//! ## Auth
//!
//! Writes need a service account (email + PEM private key) shared as editor on the sheet.
//! The public read endpoint only needs an API key.
use std::{future::Future, sync::Arc};

pub mod auth;
pub mod client;
pub mod entry;
pub mod error;
pub mod memory;
pub mod range;

pub use auth::ServiceAccount;
pub use client::{SheetsClient, SheetsSettings};
pub use entry::{Located, SheetLayout, VoucherEntry};
pub use error::SheetsError;
pub use memory::MemoryStore;
pub use range::A1Range;

/// Cell values, row-major, as the values endpoint returns them.
pub type Rows = Vec<Vec<String>>;

pub trait RowStore: Send + Sync + 'static {
    fn read(&self, range: &str) -> impl Future<Output = Result<Rows, SheetsError>> + Send;

    fn append(
        &self,
        range: &str,
        rows: Rows,
    ) -> impl Future<Output = Result<(), SheetsError>> + Send;

    fn update(
        &self,
        range: &str,
        rows: Rows,
    ) -> impl Future<Output = Result<(), SheetsError>> + Send;
}

impl<S: RowStore> RowStore for Arc<S> {
    fn read(&self, range: &str) -> impl Future<Output = Result<Rows, SheetsError>> + Send {
        (**self).read(range)
    }

    fn append(
        &self,
        range: &str,
        rows: Rows,
    ) -> impl Future<Output = Result<(), SheetsError>> + Send {
        (**self).append(range, rows)
    }

    fn update(
        &self,
        range: &str,
        rows: Rows,
    ) -> impl Future<Output = Result<(), SheetsError>> + Send {
        (**self).update(range, rows)
    }
}
