//! Entity and period identity types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::GraphError;

/// Dense identifier for an entity in the [`EntityIndex`](crate::EntityIndex).
///
/// Ids are 1-based and assigned in strict first-seen order, so `a < b`
/// implies `a` was observed no later than `b`. Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct EntityId(u32);

impl EntityId {
    /// Create an id from its raw 1-based value. Returns `None` for zero.
    pub fn new(raw: u32) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    /// Create an id from a 0-based row index.
    pub fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    /// Raw 1-based value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// 0-based row index.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for EntityId {
    type Error = GraphError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(GraphError::InvalidEntityId(raw))
    }
}

impl From<EntityId> for u32 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// A dated registry period, `YYYY-MM` or `YYYY-MM-DD`.
///
/// Ordering is chronological: the normalized text form sorts the same way
/// the dates do.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodKey(String);

impl PeriodKey {
    /// Parse and validate a period key.
    pub fn parse(s: &str) -> Result<Self, GraphError> {
        let trimmed = s.trim();
        let valid = match trimmed.len() {
            7 => NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d").is_ok(),
            10 => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok(),
            _ => false,
        };
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(GraphError::InvalidPeriod(s.to_string()))
        }
    }

    /// Get the normalized text form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First calendar day covered by this period.
    pub fn start_date(&self) -> Option<NaiveDate> {
        match self.0.len() {
            7 => NaiveDate::parse_from_str(&format!("{}-01", self.0), "%Y-%m-%d").ok(),
            _ => NaiveDate::parse_from_str(&self.0, "%Y-%m-%d").ok(),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeriodKey {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PeriodKey {
    type Error = GraphError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PeriodKey> for String {
    fn from(p: PeriodKey) -> Self {
        p.0
    }
}

/// Label of the raw source a period's records came from (e.g. `general`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTag(String);

impl SourceTag {
    /// Create a source tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
