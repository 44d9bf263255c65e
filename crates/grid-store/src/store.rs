use std::path::Path;

use grid_core::{ErrorInfo, FieldMap, GridError, ParamValue};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension};

/// Table holding one audit row per submitted job, regardless of outcome.
pub const AUDIT_TABLE: &str = "jobs";

/// Placeholder written into a fresh audit row's error column. Replaced at
/// finalization; a row still carrying it marks a worker that never finished.
pub const AUDIT_PENDING_MARKER: &str = "x";

/// Sqlite-backed store for experiment results and the job audit trail.
///
/// Tables grow columns on demand as records with new field names arrive.
/// Growth is strictly additive and safe to issue from concurrent workers:
/// a lost ADD COLUMN race is treated as success.
pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    /// Opens (creating if necessary) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, GridError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    GridError::Store(
                        ErrorInfo::new("store-create-dir", "failed to create store directory")
                            .with_context("path", parent.display().to_string())
                            .with_hint(err.to_string()),
                    )
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|err| {
            GridError::Store(
                ErrorInfo::new("store-open", "failed to open sqlite store")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        // Concurrent workers block on each other instead of failing fast.
        conn.busy_timeout(std::time::Duration::from_secs(30))
            .map_err(|err| wrap("store-busy-timeout", err))?;
        Ok(Self { conn })
    }

    /// In-memory store, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, GridError> {
        let conn = Connection::open_in_memory().map_err(|err| wrap("store-open", err))?;
        Ok(Self { conn })
    }

    /// True when `table` exists in the store.
    pub fn table_exists(&self, table: &str) -> Result<bool, GridError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| wrap("store-table-exists", err))?;
        Ok(found.is_some())
    }

    /// Column names of `table`, in creation order. Empty if the table is missing.
    pub fn columns(&self, table: &str) -> Result<Vec<String>, GridError> {
        if !self.table_exists(table)? {
            return Ok(Vec::new());
        }
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| wrap("store-columns", err))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|err| wrap("store-columns", err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| wrap("store-columns", err))?;
        Ok(names)
    }

    /// Dedup check: true iff `table` exists, every candidate key is an
    /// existing column, and a row matches all candidate fields by equality.
    ///
    /// A missing table or missing column means "never ran" rather than an
    /// error, so a first-ever sweep proceeds without prior schema.
    pub fn dedup_exists(&self, table: &str, candidate: &FieldMap) -> Result<bool, GridError> {
        if !self.table_exists(table)? {
            return Ok(false);
        }
        let columns = self.columns(table)?;
        if candidate.keys().any(|key| !columns.contains(key)) {
            return Ok(false);
        }
        if candidate.is_empty() {
            return Ok(false);
        }
        let clauses: Vec<String> = candidate
            .keys()
            .enumerate()
            .map(|(idx, key)| format!("{} = ?{}", quote_ident(key), idx + 1))
            .collect();
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_ident(table),
            clauses.join(" AND ")
        );
        let values: Vec<SqlValue> = candidate.values().map(to_sql).collect();
        let count: i64 = self
            .conn
            .query_row(&sql, rusqlite::params_from_iter(values), |row| row.get(0))
            .map_err(|err| wrap("store-dedup-query", err))?;
        Ok(count > 0)
    }

    /// Inserts `record` into `table`, creating the table and any missing
    /// columns first. Returns the new row's id.
    pub fn insert(&self, table: &str, record: &FieldMap) -> Result<i64, GridError> {
        self.ensure_table(table)?;
        self.ensure_columns(table, record)?;
        let column_list: Vec<String> = record.keys().map(|key| quote_ident(key)).collect();
        let placeholders: Vec<String> =
            (1..=record.len()).map(|idx| format!("?{idx}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<SqlValue> = record.values().map(to_sql).collect();
        self.conn
            .execute(&sql, rusqlite::params_from_iter(values))
            .map_err(|err| wrap("store-insert", err))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Creates the audit row for a submitted job and returns its key.
    ///
    /// The row starts with a placeholder error marker and empty results; it
    /// is finalized exactly once by [`ResultStore::update_audit`].
    pub fn create_audit(&self, record: &FieldMap) -> Result<i64, GridError> {
        let mut row = record.clone();
        row.insert("error".to_string(), AUDIT_PENDING_MARKER.into());
        row.insert("results".to_string(), "".into());
        self.insert(AUDIT_TABLE, &row)
    }

    /// In-place update of a previously created audit row, growing columns
    /// for unseen field names first.
    ///
    /// Updating a key with no row is a logic bug, not a runtime condition,
    /// and surfaces as an error rather than a silent no-op.
    pub fn update_audit(&self, key: i64, fields: &FieldMap) -> Result<(), GridError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.ensure_columns(AUDIT_TABLE, fields)?;
        let assignments: Vec<String> = fields
            .keys()
            .enumerate()
            .map(|(idx, name)| format!("{} = ?{}", quote_ident(name), idx + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            quote_ident(AUDIT_TABLE),
            assignments.join(", "),
            fields.len() + 1
        );
        let mut values: Vec<SqlValue> = fields.values().map(to_sql).collect();
        values.push(SqlValue::Integer(key));
        let changed = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(values))
            .map_err(|err| wrap("store-audit-update", err))?;
        if changed == 0 {
            return Err(GridError::Store(
                ErrorInfo::new("store-audit-missing", "no audit row for key")
                    .with_context("key", key.to_string()),
            ));
        }
        Ok(())
    }

    /// Rows of `table` matching all `filter` fields by equality, each as an
    /// ordered field map. Null columns are omitted from the map.
    pub fn rows(&self, table: &str, filter: &FieldMap) -> Result<Vec<FieldMap>, GridError> {
        if !self.table_exists(table)? {
            return Ok(Vec::new());
        }
        let mut sql = format!("SELECT * FROM {}", quote_ident(table));
        if !filter.is_empty() {
            let clauses: Vec<String> = filter
                .keys()
                .enumerate()
                .map(|(idx, key)| format!("{} = ?{}", quote_ident(key), idx + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| wrap("store-rows", err))?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();
        let values: Vec<SqlValue> = filter.values().map(to_sql).collect();
        let mut raw = stmt
            .query(rusqlite::params_from_iter(values))
            .map_err(|err| wrap("store-rows", err))?;
        let mut out = Vec::new();
        while let Some(row) = raw.next().map_err(|err| wrap("store-rows", err))? {
            let mut map = FieldMap::new();
            for (idx, name) in column_names.iter().enumerate() {
                let value = row.get_ref(idx).map_err(|err| wrap("store-rows", err))?;
                if let Some(value) = from_sql(value) {
                    map.insert(name.clone(), value);
                }
            }
            out.push(map);
        }
        Ok(out)
    }

    fn ensure_table(&self, table: &str) -> Result<(), GridError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT)",
            quote_ident(table)
        );
        self.conn
            .execute_batch(&sql)
            .map_err(|err| wrap("store-create-table", err))?;
        Ok(())
    }

    /// Adds any columns in `record` missing from `table`.
    ///
    /// A concurrent writer may add the same column between our PRAGMA and the
    /// ALTER; sqlite reports "duplicate column name" and we treat it as done.
    fn ensure_columns(&self, table: &str, record: &FieldMap) -> Result<(), GridError> {
        let existing = self.columns(table)?;
        for (name, value) in record {
            if existing.contains(name) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_ident(table),
                quote_ident(name),
                value.storage_class()
            );
            match self.conn.execute_batch(&sql) {
                Ok(()) => {}
                Err(err) if err.to_string().contains("duplicate column name") => {}
                Err(err) => {
                    return Err(GridError::Store(
                        ErrorInfo::new("store-add-column", "failed to add column")
                            .with_context("table", table.to_string())
                            .with_context("column", name.clone())
                            .with_hint(err.to_string()),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn to_sql(value: &ParamValue) -> SqlValue {
    match value {
        ParamValue::Int(v) => SqlValue::Integer(*v),
        ParamValue::Real(v) => SqlValue::Real(*v),
        ParamValue::Text(v) => SqlValue::Text(v.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Option<ParamValue> {
    match value {
        ValueRef::Integer(v) => Some(ParamValue::Int(v)),
        ValueRef::Real(v) => Some(ParamValue::Real(v)),
        ValueRef::Text(bytes) => Some(ParamValue::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        ValueRef::Blob(_) | ValueRef::Null => None,
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn wrap(code: &str, err: rusqlite::Error) -> GridError {
    GridError::Store(ErrorInfo::new(code, "sqlite operation failed").with_hint(err.to_string()))
}
