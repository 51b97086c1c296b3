//! SQLite data source

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::warehouse::{DataSource, QueryResult};
use crate::{Error, Result};

/// One shared SQLite connection, reused sequentially across turns
///
/// File databases are opened read-only. Work runs on the blocking pool.
pub struct SqliteDataSource {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteDataSource {
    /// Open a database file read-only
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| Error::Connection(format!("{}: {}", path.display(), e)))?;

        info!("Opened SQLite warehouse at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Create an empty in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection (seeded fixtures, tests)
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        }
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::Connection("connection lock poisoned".to_string()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| Error::Connection("data source is closed".to_string()))?;
            f(conn)
        })
        .await
        .map_err(|e| Error::Other(format!("query task failed: {}", e)))?
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn fetch(conn: &Connection, sql: &str, max_rows: usize) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(Error::QueryGeneration(
            "only read-only statements are allowed".to_string(),
        ));
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let mut result = QueryResult {
        columns,
        ..Default::default()
    };

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if result.rows.len() == max_rows {
            result.truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(render_value(row.get_ref(i)?));
        }
        result.rows.push(values);
    }

    Ok(result)
}

fn describe_tables(conn: &Connection, sample_rows: usize) -> Result<String> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let tables = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut sections = Vec::with_capacity(tables.len());
    for (name, create_sql) in tables {
        let mut section = create_sql.unwrap_or_default();
        if sample_rows > 0 {
            let sample = fetch(
                conn,
                &format!("SELECT * FROM {}", quote_ident(&name)),
                sample_rows,
            )?;
            let lines: Vec<String> = sample.rows.iter().map(|r| r.join("\t")).collect();
            section.push_str(&format!(
                "\n\n/*\n{} rows from {} table:\n{}\n{}\n*/",
                sample.row_count(),
                name,
                sample.columns.join("\t"),
                lines.join("\n")
            ));
        }
        sections.push(section);
    }

    Ok(sections.join("\n\n"))
}

#[async_trait]
impl DataSource for SqliteDataSource {
    fn dialect(&self) -> &str {
        "sqlite"
    }

    async fn table_info(&self, sample_rows: usize) -> Result<String> {
        self.with_connection(move |conn| describe_tables(conn, sample_rows))
            .await
    }

    async fn run_query(&self, sql: &str, max_rows: usize) -> Result<QueryResult> {
        debug!("Running query (max {} rows): {}", max_rows, sql);
        let sql = sql.to_string();
        self.with_connection(move |conn| fetch(conn, &sql, max_rows))
            .await
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::Connection("connection lock poisoned".to_string()))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| Error::Database(e))?;
            info!("Closed SQLite warehouse connection");
        }
        Ok(())
    }
}
