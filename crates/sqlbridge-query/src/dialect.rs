//! Dialect capabilities consulted by the statement builders.

/// Where a SELECT puts its row cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClauseOrder {
    /// `... ORDER BY o LIMIT n OFFSET m`
    #[default]
    Standard,
    /// `SELECT TOP n ...`; `OFFSET m ROWS FETCH NEXT n ROWS ONLY` once an
    /// offset is involved
    Top,
    /// `WHERE (w) AND ROWNUM <= n`
    RowNum,
    /// `SELECT FIRST n SKIP m ...`
    FirstSkip,
}

/// How a dialect renders a multi-row insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkInsert {
    /// `INSERT INTO t (a, b) VALUES (..), (..)`
    #[default]
    Tuples,
    /// `INSERT ALL INTO t (a, b) VALUES (..) INTO t (a, b) VALUES (..) SELECT 1 FROM DUAL`
    InsertAll,
    /// Rows are inserted one statement at a time unless the caller forces
    /// bulk mode, in which case the tuple form is used.
    Unsupported,
}

/// SQL syntax capabilities of one backend.
pub trait SqlDialect {
    /// Canonical dialect name.
    fn name(&self) -> &str;

    fn clause_order(&self) -> ClauseOrder {
        ClauseOrder::Standard
    }

    /// Statement inserting a row made only of column defaults.
    fn default_values_insert(&self, table: &str) -> String {
        format!("INSERT INTO {table} DEFAULT VALUES")
    }

    fn bulk_insert(&self) -> BulkInsert {
        BulkInsert::Tuples
    }

    /// Whether `DELETE ... USING` is accepted.
    fn supports_delete_using(&self) -> bool {
        false
    }
}

/// Plain SQL with every default capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl SqlDialect for GenericDialect {
    fn name(&self) -> &str {
        "generic"
    }

    fn supports_delete_using(&self) -> bool {
        true
    }
}
