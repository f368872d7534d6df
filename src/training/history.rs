//! Grow-only store of every feature and target batch seen so far.
//!
//! Nothing is ever evicted: every full fit replays the entire history, so
//! memory grows with the stream.

use serde::{Deserialize, Serialize};

use crate::common::error::{CoreError, CoreResult};
use crate::data::domain::Frame;

/// Every labelled row seen so far, grow-only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    features: Option<Frame>,
    target: Option<Frame>,
}

impl History {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch at the end, preserving row order.
    pub fn add(&mut self, features: &Frame, target: &Frame) -> CoreResult<()> {
        if features.n_rows() != target.n_rows() {
            return Err(CoreError::schema(format!(
                "{} feature rows but {} target rows",
                features.n_rows(),
                target.n_rows()
            )));
        }
        match (&mut self.features, &mut self.target) {
            (Some(all_x), Some(all_y)) => {
                if all_x.schema() != features.schema() || all_y.schema() != target.schema() {
                    return Err(CoreError::schema("batch layout differs from history"));
                }
                all_x.append(features)?;
                all_y.append(target)?;
            }
            _ => {
                self.features = Some(features.clone());
                self.target = Some(target.clone());
            }
        }
        Ok(())
    }

    /// Full concatenation so far, or `None` before the first add.
    pub fn get(&self) -> Option<(&Frame, &Frame)> {
        self.features.as_ref().zip(self.target.as_ref())
    }

    /// Rows accumulated so far.
    pub fn n_rows(&self) -> usize {
        self.features.as_ref().map_or(0, Frame::n_rows)
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_none()
    }
}
