//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing the blocking
//! [`DriverConnection`] contract from sqlbridge-core.

// FFI code needs to match C types exactly
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::types;
use sqlbridge_core::error::{
    ConnectionError, ConnectionErrorKind, ExecutionError, ExecutionErrorKind,
};
use sqlbridge_core::{ColumnInfo, DriverConnection, Error, Execution, Result, Row, Rows, Value};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::Arc;

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub read_only: bool,
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Multi-thread mode (connections not shared between threads).
    pub no_mutex: bool,
    /// Serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Read-write access; the database must exist.
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Read-write access, creating the database if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// A connection to a SQLite database.
///
/// The handle is owned exclusively; callers that share a connection
/// between threads wrap it in their own lock.
pub struct SqliteConnection {
    db: *mut ffi::sqlite3,
    path: String,
}

// SAFETY: the handle is only reached through `&mut self` (or `&self` for
// read-only accessors), so it is never used from two threads at once.
unsafe impl Send for SqliteConnection {}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("open", &!self.db.is_null())
            .finish()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError::new(
                ConnectionErrorKind::Connect,
                "Invalid path: contains null byte",
            ))
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid until closed below
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError::new(
                ConnectionErrorKind::Connect,
                format!("Failed to open database {}: {msg}", config.path),
            )));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, ms);
            }
        }

        tracing::debug!(path = %config.path, "opened sqlite database");

        Ok(Self {
            db,
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.db.is_null()
    }

    fn handle(&self) -> Result<*mut ffi::sqlite3> {
        if self.db.is_null() {
            Err(Error::Connection(ConnectionError::new(
                ConnectionErrorKind::Closed,
                format!("connection to {} is closed", self.path),
            )))
        } else {
            Ok(self.db)
        }
    }

    /// Execute SQL directly without preparing (for DDL, multi-statement
    /// scripts, etc.)
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let db = self.handle()?;
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is a valid C string allocated by SQLite
                let msg = unsafe { CStr::from_ptr(errmsg).to_string_lossy().into_owned() };
                unsafe { ffi::sqlite3_free(errmsg.cast()) };
                msg
            };

            return Err(ExecutionError::new(error_kind(rc, &msg), msg)
                .with_sql(sql)
                .into());
        }

        Ok(())
    }

    /// Rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> i64 {
        if self.db.is_null() {
            return 0;
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    /// Number of rows changed by the last statement.
    pub fn changes(&self) -> i32 {
        if self.db.is_null() {
            return 0;
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(self.db) }
    }

    /// Whether a transaction is open on this connection.
    pub fn in_transaction(&self) -> bool {
        if self.db.is_null() {
            return false;
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_get_autocommit(self.db) == 0 }
    }

    /// Prepare, bind and step a statement to completion.
    fn run(&self, sql: &str, params: &[Value]) -> Result<Execution> {
        let db = self.handle()?;
        let stmt = prepare_stmt(db, sql)?;
        let result = step_all(db, stmt, sql, params);
        // SAFETY: stmt is valid and finalized exactly once
        unsafe { ffi::sqlite3_finalize(stmt) };
        result
    }
}

fn step_all(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    sql: &str,
    params: &[Value],
) -> Result<Execution> {
    // SAFETY: stmt is valid
    let expected = unsafe { ffi::sqlite3_bind_parameter_count(stmt) };
    let expected = usize::try_from(expected).unwrap_or(0);
    if expected != params.len() {
        return Err(ExecutionError::new(
            ExecutionErrorKind::Database,
            format!(
                "Incorrect number of bindings supplied: statement uses {expected}, {} supplied",
                params.len()
            ),
        )
        .with_sql(sql)
        .into());
    }

    for (i, param) in (1..).zip(params) {
        // SAFETY: stmt is valid, index is 1-based and within bounds
        let rc = unsafe { types::bind_value(stmt, i, param) };
        if rc != ffi::SQLITE_OK {
            return Err(bind_error(db, sql, i));
        }
    }

    // SAFETY: stmt is valid
    let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
    let columns = (col_count > 0).then(|| {
        let names = (0..col_count)
            // SAFETY: stmt is valid, i is within bounds
            .map(|i| unsafe { types::column_name(stmt, i) }.unwrap_or_else(|| format!("col{i}")))
            .collect();
        Arc::new(ColumnInfo::new(names))
    });

    let mut rows = Vec::new();
    loop {
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                if let Some(columns) = &columns {
                    let values = (0..col_count)
                        // SAFETY: stmt just returned SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(columns), values));
                }
            }
            ffi::SQLITE_DONE => break,
            _ => return Err(step_error(db, sql)),
        }
    }

    match columns {
        Some(columns) => Ok(Execution::rows(Rows::new(columns, rows))),
        None => {
            // SAFETY: db is valid
            let changes = unsafe { ffi::sqlite3_changes(db) };
            Ok(Execution::affected(u64::try_from(changes).unwrap_or(0)))
        }
    }
}

impl DriverConnection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Execution> {
        self.run(sql, params)
    }

    fn begin(&mut self) -> Result<()> {
        self.execute_raw("BEGIN")
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.execute_raw("COMMIT")
        } else {
            self.handle().map(|_| ())
        }
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.execute_raw("ROLLBACK")
        } else {
            self.handle().map(|_| ())
        }
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.execute_raw(&format!("SAVEPOINT {name}"))
    }

    fn release(&mut self, name: &str) -> Result<()> {
        self.execute_raw(&format!("RELEASE SAVEPOINT {name}"))
    }

    fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.execute_raw(&format!("ROLLBACK TO SAVEPOINT {name}"))
    }

    fn close(&mut self) -> Result<()> {
        if self.db.is_null() {
            return Ok(());
        }
        // SAFETY: db is valid and nulled right after
        let rc = unsafe { ffi::sqlite3_close_v2(self.db) };
        self.db = ptr::null_mut();
        if rc == ffi::SQLITE_OK {
            tracing::debug!(path = %self.path, "closed sqlite database");
            Ok(())
        } else {
            Err(Error::Connection(ConnectionError::new(
                ConnectionErrorKind::Disconnected,
                format!("close failed: {}", ffi::error_string(rc)),
            )))
        }
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_close_v2(self.db);
            }
            self.db = ptr::null_mut();
        }
    }
}

// Helper functions

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: guaranteed by the caller; errmsg never returns null for a valid handle
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        if ptr.is_null() {
            String::new()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

fn nul_in_sql(sql: &str) -> Error {
    ExecutionError::new(ExecutionErrorKind::Syntax, "SQL contains null byte")
        .with_sql(sql)
        .into()
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
    let (stmt, rest) = prepare_first(db, &c_sql).map_err(|_| last_error(db, sql))?;

    if stmt.is_null() {
        // Whitespace or comment only
        return Err(ExecutionError::new(ExecutionErrorKind::Syntax, "empty statement")
            .with_sql(sql)
            .into());
    }
    if has_statement(db, rest) {
        // SAFETY: stmt was just prepared and is not shared
        unsafe { ffi::sqlite3_finalize(stmt) };
        return Err(ExecutionError::new(
            ExecutionErrorKind::Syntax,
            "more than one statement; execute them one at a time",
        )
        .with_sql(sql)
        .into());
    }

    Ok(stmt)
}

/// Prepare the first statement of `sql`; returns it (null when `sql` holds
/// none) and the unparsed remainder, or the result code on failure.
fn prepare_first(
    db: *mut ffi::sqlite3,
    sql: &CStr,
) -> std::result::Result<(*mut ffi::sqlite3_stmt, &[u8]), c_int> {
    let bytes = sql.to_bytes();
    let len = c_int::try_from(bytes.len()).unwrap_or(c_int::MAX);
    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
    let mut tail: *const std::ffi::c_char = ptr::null();

    // SAFETY: All pointers are valid; tail points into `sql` when set
    let rc = unsafe { ffi::sqlite3_prepare_v2(db, sql.as_ptr(), len, &mut stmt, &mut tail) };
    if rc != ffi::SQLITE_OK {
        return Err(rc);
    }

    let consumed = if tail.is_null() {
        bytes.len()
    } else {
        // SAFETY: tail lies within the same allocation as sql
        let offset = unsafe { tail.offset_from(sql.as_ptr()) };
        usize::try_from(offset).map_or(bytes.len(), |o| o.min(bytes.len()))
    };
    Ok((stmt, &bytes[consumed..]))
}

/// Whether `rest` holds anything beyond whitespace, comments and `;`.
fn has_statement(db: *mut ffi::sqlite3, rest: &[u8]) -> bool {
    if rest.iter().all(|b| b.is_ascii_whitespace() || *b == b';') {
        return false;
    }
    let Ok(rest) = CString::new(rest) else {
        return true;
    };
    match prepare_first(db, &rest) {
        Ok((stmt, _)) if stmt.is_null() => false,
        Ok((stmt, _)) => {
            // SAFETY: stmt was just prepared and is not shared
            unsafe { ffi::sqlite3_finalize(stmt) };
            true
        }
        Err(_) => true,
    }
}

fn last_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (errmsg(db), ffi::sqlite3_errcode(db)) };
    ExecutionError::new(error_kind(code, &msg), msg)
        .with_sql(sql)
        .into()
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: c_int) -> Error {
    // SAFETY: db is valid
    let msg = unsafe { errmsg(db) };
    ExecutionError::new(
        ExecutionErrorKind::Database,
        format!("Failed to bind parameter {param_index}: {msg}"),
    )
    .with_sql(sql)
    .into()
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    last_error(db, sql)
}

fn error_kind(code: c_int, message: &str) -> ExecutionErrorKind {
    // Extended result codes carry the primary code in the low byte
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => ExecutionErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => ExecutionErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => ExecutionErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => ExecutionErrorKind::NotFound,
        ffi::SQLITE_INTERRUPT => ExecutionErrorKind::Interrupted,
        ffi::SQLITE_ERROR if message.contains("syntax error") => ExecutionErrorKind::Syntax,
        ffi::SQLITE_ERROR if message.starts_with("no such") => ExecutionErrorKind::NotFound,
        _ => ExecutionErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(err: &Error) -> ExecutionErrorKind {
        match err {
            Error::Execution(e) => e.kind,
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_execute_raw() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        conn.execute_raw("INSERT INTO test (name) VALUES ('Alice')")
            .unwrap();
        assert_eq!(conn.changes(), 1);
        assert_eq!(conn.last_insert_rowid(), 1);
    }

    #[test]
    fn test_query_rows() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        conn.execute_raw("INSERT INTO test (name) VALUES ('Alice'), ('Bob')")
            .unwrap();

        let exec = conn
            .execute("SELECT * FROM test ORDER BY id", &[])
            .unwrap();
        let rows = exec.result_set.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_named::<i32>("id").unwrap(), 1);
        assert_eq!(rows[0].get_named::<String>("name").unwrap(), "Alice");
        assert_eq!(rows[1].get_named::<String>("name").unwrap(), "Bob");
    }

    #[test]
    fn test_parameterized_statements() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .unwrap();

        let exec = conn
            .execute(
                "INSERT INTO test (name, score) VALUES (?, ?)",
                &[Value::Text("O'Brien".into()), Value::Double(9.5)],
            )
            .unwrap();
        assert!(exec.result_set.is_none());
        assert_eq!(exec.rows_affected, 1);

        let rows = conn
            .execute("SELECT name, score FROM test WHERE name = ?", &[Value::Text("O'Brien".into())])
            .unwrap()
            .result_set
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(1), Some(&Value::Double(9.5)));
    }

    #[test]
    fn test_select_without_rows_keeps_columns() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE test (a INTEGER)").unwrap();
        let rows = conn
            .execute("SELECT a FROM test", &[])
            .unwrap()
            .result_set
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(rows.columns().unwrap().names(), ["a".to_string()]);
    }

    #[test]
    fn test_binding_count_mismatch() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let err = conn.execute("SELECT ?", &[]).unwrap_err();
        assert_eq!(err.sql(), Some("SELECT ?"));
    }

    #[test]
    fn test_trailing_statements_are_rejected() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();

        let err = conn
            .execute("INSERT INTO test (name) VALUES ('x'); DROP TABLE test", &[])
            .unwrap_err();
        assert_eq!(kind(&err), ExecutionErrorKind::Syntax);
        let rows = conn
            .execute("SELECT COUNT(*) AS n FROM test", &[])
            .unwrap()
            .result_set
            .unwrap();
        assert_eq!(rows[0].get_named::<i64>("n").unwrap(), 0);

        conn.execute("SELECT 1;", &[]).unwrap();
        conn.execute("SELECT 1; ;\n", &[]).unwrap();
        conn.execute("SELECT 1; -- trailing note", &[]).unwrap();
    }

    #[test]
    fn test_error_kinds() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE u (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")
            .unwrap();
        conn.execute("INSERT INTO u (name) VALUES ('a')", &[]).unwrap();

        let dup = conn.execute("INSERT INTO u (name) VALUES ('a')", &[]).unwrap_err();
        assert_eq!(kind(&dup), ExecutionErrorKind::Constraint);

        let missing = conn.execute("SELECT * FROM nope", &[]).unwrap_err();
        assert_eq!(kind(&missing), ExecutionErrorKind::NotFound);

        let syntax = conn.execute("SELEC 1", &[]).unwrap_err();
        assert_eq!(kind(&syntax), ExecutionErrorKind::Syntax);
    }

    #[test]
    fn test_transaction_and_savepoints() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE t (v INTEGER)").unwrap();

        conn.begin().unwrap();
        assert!(conn.in_transaction());
        conn.execute("INSERT INTO t VALUES (1)", &[]).unwrap();
        conn.savepoint("sp_1").unwrap();
        conn.execute("INSERT INTO t VALUES (2)", &[]).unwrap();
        conn.rollback_to("sp_1").unwrap();
        conn.release("sp_1").unwrap();
        conn.commit().unwrap();
        assert!(!conn.in_transaction());

        let rows = conn.execute("SELECT v FROM t", &[]).unwrap().result_set.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), Some(&Value::Int(1)));
    }

    #[test]
    fn test_commit_outside_transaction_is_noop() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.commit().unwrap();
        conn.rollback().unwrap();
    }

    #[test]
    fn test_closed_connection_rejects_statements() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        conn.close().unwrap();
        assert!(conn.is_closed());
        conn.close().unwrap();
        let err = conn.execute("SELECT 1", &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                ..
            })
        ));
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let path = path.to_str().unwrap();

        let mut conn = SqliteConnection::open_file(path).unwrap();
        conn.execute_raw("CREATE TABLE t (v TEXT)").unwrap();
        conn.execute("INSERT INTO t VALUES (?)", &[Value::Text("kept".into())])
            .unwrap();
        conn.close().unwrap();

        let mut conn = SqliteConnection::open_file(path).unwrap();
        let rows = conn.execute("SELECT v FROM t", &[]).unwrap().result_set.unwrap();
        assert_eq!(rows[0].get_named::<String>("v").unwrap(), "kept");
    }

    #[test]
    fn test_types_round_trip_through_storage() {
        let mut conn = SqliteConnection::open_memory().unwrap();
        let rows = conn
            .execute(
                "SELECT ?, ?, ?, ?, ?",
                &[
                    Value::Null,
                    Value::Bool(true),
                    Value::BigInt(1 << 40),
                    Value::Bytes(vec![1, 2, 3]),
                    Value::Array(vec![Value::Int(1), Value::Int(2)]),
                ],
            )
            .unwrap()
            .result_set
            .unwrap();
        let row = &rows[0];
        assert_eq!(row.get(0), Some(&Value::Null));
        assert_eq!(row.get(1), Some(&Value::Int(1)));
        assert_eq!(row.get(2), Some(&Value::BigInt(1 << 40)));
        assert_eq!(row.get(3), Some(&Value::Bytes(vec![1, 2, 3])));
        assert_eq!(row.get(4), Some(&Value::Text("[1,2]".into())));
    }
}
