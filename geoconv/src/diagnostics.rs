//! Non-fatal problems found while decoding.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Record of one entity or row that was not converted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySkipped {
    /// Entity type (`SPLINE`, `track`, `row 12`, ...).
    pub entity: String,
    /// Why the entity was skipped.
    pub reason: String,
}

impl Display for EntitySkipped {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "skipped {}: {}", self.entity, self.reason)
    }
}

/// Non-fatal problems accumulated by a decoder next to the decoded collection.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Entities or rows that were dropped.
    pub skipped: Vec<EntitySkipped>,
    /// Tabular rows whose elevation was not a number and was replaced by `0`.
    pub coerced_elevations: usize,
    /// Other remarks, e.g. the drawing units of a DXF file.
    pub notes: Vec<String>,
}

impl Diagnostics {
    /// Creates empty diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a skipped entity and logs it.
    pub fn skip(&mut self, entity: impl Into<String>, reason: impl Into<String>) {
        let skipped = EntitySkipped {
            entity: entity.into(),
            reason: reason.into(),
        };
        log::warn!("{skipped}");
        self.skipped.push(skipped);
    }

    /// Records a remark and logs it.
    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        log::debug!("{note}");
        self.notes.push(note);
    }

    /// Number of skipped entities of the given type.
    pub fn skipped_count(&self, entity: &str) -> usize {
        self.skipped.iter().filter(|s| s.entity == entity).count()
    }

    /// Returns `true` if nothing was skipped, coerced or noted.
    pub fn is_empty(&self) -> bool {
        self.skipped.is_empty() && self.coerced_elevations == 0 && self.notes.is_empty()
    }

    /// Appends the records of `other`.
    pub fn merge(&mut self, other: Diagnostics) {
        self.skipped.extend(other.skipped);
        self.coerced_elevations += other.coerced_elevations;
        self.notes.extend(other.notes);
    }
}
