//! Field references.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pseudo-table that holds calculated fields.
pub const CALCULATED_TABLE: &str = "__calc";

/// Reference to a schema field (`Table.name`) or a calculated field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    pub table: String,
    pub name: String,
}

impl FieldRef {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Reference to a calculated field by name.
    pub fn calculated(name: impl Into<String>) -> Self {
        Self::new(CALCULATED_TABLE, name)
    }

    pub fn is_calculated(&self) -> bool {
        self.table == CALCULATED_TABLE
    }

    /// `Table.name`, or the bare name for calculated fields.
    pub fn qualified(&self) -> String {
        if self.is_calculated() {
            self.name.clone()
        } else {
            format!("{}.{}", self.table, self.name)
        }
    }

    /// Parse a qualified name. A name without a dot refers to a calculated field.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        match s.split_once('.') {
            Some((table, name)) if !table.is_empty() && !name.is_empty() => {
                Some(Self::new(table, name))
            }
            Some(_) => None,
            None => Some(Self::calculated(s)),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_calculated() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.table, self.name)
        }
    }
}
