//! Emulated streaming source serving ordered batches from a loaded table.

use std::path::Path;

use tracing::debug;

use crate::common::error::{CoreError, CoreResult};

use super::domain::{Cursor, Frame};
use super::repo_fs;

/// Anything that can deliver record batches in order.
pub trait BatchSource {
    /// Next batch; an empty frame signals end of data.
    fn next_batch(&mut self) -> CoreResult<Frame>;
    fn cursor(&self) -> Cursor;
    fn seek(&mut self, cursor: Cursor);
}

/// How rows are grouped into batches.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BatchMode {
    /// Fixed number of rows per batch; the last one may be shorter.
    Fixed(usize),
    /// Every consecutive row sharing the timestamp of the next unread row.
    ByTimestamp,
}

/// Batch source over a table held in memory.
pub struct TableSource {
    data: Frame,
    timestamp: String,
    mode: BatchMode,
    position: usize,
}

impl TableSource {
    /// Source over `data`, which must contain the `timestamp` column.
    pub fn new(data: Frame, timestamp: impl Into<String>, mode: BatchMode) -> CoreResult<Self> {
        let timestamp = timestamp.into();
        data.require_columns(&[timestamp.as_str()])?;
        if mode == BatchMode::Fixed(0) {
            return Err(CoreError::invalid("batch size must be positive"));
        }
        Ok(Self {
            data,
            timestamp,
            mode,
            position: 0,
        })
    }

    /// Load a CSV file and serve it as a stream.
    pub fn from_csv(path: &Path, timestamp: &str, mode: BatchMode) -> CoreResult<Self> {
        Self::new(repo_fs::read_csv(path, None)?, timestamp, mode)
    }

    /// The whole underlying table.
    pub fn data(&self) -> &Frame {
        &self.data
    }

    /// Rows not served yet.
    pub fn remaining(&self) -> usize {
        self.data.n_rows().saturating_sub(self.position)
    }

    fn batch_end(&self) -> usize {
        let n = self.data.n_rows();
        match self.mode {
            BatchMode::Fixed(size) => (self.position + size).min(n),
            BatchMode::ByTimestamp => {
                let stamps = self.data.column(&self.timestamp).unwrap_or(&[]);
                let Some(first) = stamps.get(self.position) else {
                    return n;
                };
                let run = stamps[self.position..]
                    .iter()
                    .take_while(|v| *v == first)
                    .count();
                self.position + run
            }
        }
    }
}

impl BatchSource for TableSource {
    fn next_batch(&mut self) -> CoreResult<Frame> {
        let start = self.position;
        let end = self.batch_end();
        self.position = end;
        debug!(start, end, "serving batch");
        Ok(self.data.slice(start, end))
    }

    fn cursor(&self) -> Cursor {
        Cursor {
            position: self.position,
        }
    }

    fn seek(&mut self, cursor: Cursor) {
        self.position = cursor.position.min(self.data.n_rows());
    }
}
