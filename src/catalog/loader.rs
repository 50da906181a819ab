//! Read-only access to the SQLite tool catalog.

use crate::catalog::types::ToolRecord;
use crate::error::{AppError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};

/// Records without a description are never indexed; ties on `name` keep
/// SQLite's rowid order.
const LOAD_QUERY: &str = "SELECT name, url, description, category, popularity, pricing, tags \
     FROM ai_tools \
     WHERE description IS NOT NULL AND description != '' \
     ORDER BY name, rowid";

/// The external catalog store, opened read-only on every load.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
}

impl SqliteCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the corpus, ordered by name.
    ///
    /// # Errors
    /// - `DataSourceError` if the database cannot be opened or queried
    /// - `EmptyCorpusError` if no record has a description
    pub fn load(&self) -> Result<Vec<ToolRecord>> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            AppError::DataSourceError(format!(
                "Failed to open catalog {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let tools = load_from_connection(&conn)?;

        tracing::info!(
            path = %self.path.display(),
            num_tools = tools.len(),
            "Catalog loaded"
        );

        Ok(tools)
    }
}

/// Run the load query against an open connection.
pub fn load_from_connection(conn: &Connection) -> Result<Vec<ToolRecord>> {
    let mut stmt = conn.prepare(LOAD_QUERY)?;
    let tools = stmt
        .query_map([], row_to_tool)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if tools.is_empty() {
        return Err(AppError::EmptyCorpusError);
    }

    Ok(tools)
}

fn row_to_tool(row: &Row<'_>) -> rusqlite::Result<ToolRecord> {
    Ok(ToolRecord {
        name: column_text(row, 0)?,
        url: column_text(row, 1)?,
        description: column_text(row, 2)?,
        category: column_text(row, 3)?,
        popularity: column_text(row, 4)?,
        pricing: column_text(row, 5)?,
        tags: column_text(row, 6)?,
    })
}

/// Read any column as text. SQLite is dynamically typed, so a popularity
/// stored as INTEGER is rendered the same way a TEXT value would be.
fn column_text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    })
}
