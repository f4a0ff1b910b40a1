//! Query sources (tables and views).

use std::fmt;

use crate::query::{quote_identifier, validate_identifier, validate_relation};
use crate::{FinderError, Result};

/// A developer-controlled table or view identifier.
///
/// A source may declare its columns. When it does, every filter key and
/// order column is checked against that list before a query is issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    name: String,
    columns: Option<Vec<String>>,
}

impl Source {
    /// Creates a source without a declared column list.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_relation(&name)?;
        Ok(Self { name, columns: None })
    }

    /// Creates a source restricted to the given columns.
    pub fn with_columns<I, S>(name: impl Into<String>, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut source = Self::new(name)?;
        let columns = columns
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>();
        for column in &columns {
            validate_identifier(column)?;
        }
        source.columns = Some(columns);
        Ok(source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Quoted form for interpolation into SQL.
    pub fn quoted(&self) -> String {
        quote_identifier(&self.name)
    }

    /// Validates a column reference against this source.
    pub fn check_column(&self, column: &str) -> Result<()> {
        validate_identifier(column)?;
        match &self.columns {
            Some(columns) if !columns.iter().any(|c| c == column) => {
                Err(FinderError::invalid(format!(
                    "Unknown column '{}' for source '{}'",
                    column, self.name
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
