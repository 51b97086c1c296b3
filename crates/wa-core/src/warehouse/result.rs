//! Tabular query results

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rows returned by a read query, already capped by the data source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// More rows matched than were returned
    pub truncated: bool,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Drop rows beyond `max_rows`.
    pub fn cap(&mut self, max_rows: usize) {
        if self.rows.len() > max_rows {
            self.rows.truncate(max_rows);
            self.truncated = true;
        }
    }
}

/// Pipe-separated table: a header line, then one line per row.
impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.columns.join(" | "))?;
        for row in &self.rows {
            write!(f, "\n{}", row.join(" | "))?;
        }
        if self.rows.is_empty() {
            write!(f, "\n(no rows)")?;
        } else if self.truncated {
            write!(f, "\n(showing first {} rows)", self.rows.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let result = QueryResult {
            columns: vec!["customer".into(), "total".into()],
            rows: vec![
                vec!["alice".into(), "120.5".into()],
                vec!["bob".into(), "NULL".into()],
            ],
            truncated: false,
        };
        assert_eq!(result.to_string(), "customer | total\nalice | 120.5\nbob | NULL");
    }

    #[test]
    fn test_empty_and_capped() {
        let empty = QueryResult {
            columns: vec!["id".into()],
            ..Default::default()
        };
        assert_eq!(empty.to_string(), "id\n(no rows)");

        let mut result = QueryResult {
            columns: vec!["id".into()],
            rows: (0..5).map(|i| vec![i.to_string()]).collect(),
            truncated: false,
        };
        result.cap(2);
        assert_eq!(result.row_count(), 2);
        assert!(result.truncated);
        assert_eq!(result.to_string(), "id\n0\n1\n(showing first 2 rows)");
    }
}
