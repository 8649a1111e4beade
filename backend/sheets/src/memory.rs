//! In-memory stand-in for a single sheet.
//!
//! Sheet names in ranges are ignored. Reads behave like the values endpoint: rows start at the
//! range's first row and trailing empty cells/rows are dropped.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{Rows, RowStore, SheetsError, range::A1Range};

#[derive(Default)]
pub struct MemoryStore {
    grid: Mutex<Rows>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Rows) -> Self {
        Self {
            grid: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Every call fails with a 503 while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Rows {
        self.grid.lock().clone()
    }

    /// Successful appends and updates so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn check(&self) -> Result<(), SheetsError> {
        // Let concurrent callers interleave the way network calls would.
        tokio::task::yield_now().await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(SheetsError::upstream(Some(503), "Sheets unavailable"));
        }

        Ok(())
    }
}

impl RowStore for MemoryStore {
    async fn read(&self, range: &str) -> Result<Rows, SheetsError> {
        let range = A1Range::parse(range)?;
        self.check().await?;

        let grid = self.grid.lock();
        let first = range.start_row - 1;
        let last = range.end_row.unwrap_or(grid.len()).min(grid.len());

        let mut rows: Rows = grid
            .get(first..last.max(first))
            .unwrap_or_default()
            .iter()
            .map(|row| {
                let end = range.end_col.map_or(row.len(), |col| (col + 1).min(row.len()));
                let mut cells = row
                    .get(range.start_col..end.max(range.start_col))
                    .unwrap_or_default()
                    .to_vec();

                while cells.last().is_some_and(|cell| cell.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();

        while rows.last().is_some_and(|row| row.is_empty()) {
            rows.pop();
        }

        Ok(rows)
    }

    async fn append(&self, range: &str, rows: Rows) -> Result<(), SheetsError> {
        let range = A1Range::parse(range)?;
        self.check().await?;

        let mut grid = self.grid.lock();
        while grid.last().is_some_and(|row| row.iter().all(String::is_empty)) {
            grid.pop();
        }

        for row in rows {
            let mut padded = vec![String::new(); range.start_col];
            padded.extend(row);
            grid.push(padded);
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, range: &str, rows: Rows) -> Result<(), SheetsError> {
        let range = A1Range::parse(range)?;
        self.check().await?;

        let mut grid = self.grid.lock();
        for (offset, row) in rows.into_iter().enumerate() {
            let index = range.start_row - 1 + offset;
            if grid.len() <= index {
                grid.resize(index + 1, Vec::new());
            }

            let target = &mut grid[index];
            for (col_offset, cell) in row.into_iter().enumerate() {
                let col = range.start_col + col_offset;
                if target.len() <= col {
                    target.resize(col + 1, String::new());
                }
                target[col] = cell;
            }
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
