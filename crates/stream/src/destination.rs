//! Destination table identity

use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;

/// A warehouse table addressed as `project.dataset.table`
///
/// Keys the processor registry. Immutable once a processor exists for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    project: String,
    dataset: String,
    table: String,
}

impl Destination {
    /// Create a destination from its three parts
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

impl FromStr for Destination {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(d), Some(t), None)
                if !p.is_empty() && !d.is_empty() && !t.is_empty() =>
            {
                Ok(Self::new(p, d, t))
            }
            _ => Err(StreamError::InvalidDestination(s.to_string())),
        }
    }
}
