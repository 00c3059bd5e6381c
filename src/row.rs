//! Result rows and typed extraction.
//!
//! Extraction is keyed by the lower-cased qualified column name, looked up
//! in an index built once per row set from the result metadata. Queries
//! built with [`Table::select_list`](crate::Table::select_list) alias each
//! column as `table.column`, which is exactly the key a [`Column`] resolves
//! to; a query that discards that identity fails the lookup.
//!
//! Rows are transported out of the driver when the statement is fetched
//! and decoded lazily per column access. The sequence is single-pass and
//! forward-only, and refuses to yield rows once the owning transaction
//! scope has ended.

use crate::column::Column;
use crate::error::{Error, Result};
use crate::transaction::TransactionScope;
use crate::value::{SqlType, decode_column};
use sqlx::sqlite::SqliteRow;
use std::collections::HashMap;
use std::sync::Arc;

/// Single-pass, forward-only sequence of result rows.
pub struct Rows {
    rows: std::vec::IntoIter<SqliteRow>,
    index: Arc<HashMap<String, usize>>,
    scope: TransactionScope,
}

impl Rows {
    pub(crate) fn new(rows: Vec<SqliteRow>, scope: TransactionScope) -> Rows {
        let index = Arc::new(build_index(rows.first()));
        Rows {
            rows: rows.into_iter(),
            index,
            scope,
        }
    }

    /// Advance to the next row. Fails with [`Error::ScopeClosed`] when the
    /// owning transaction scope has already committed or rolled back.
    pub fn next(&mut self) -> Result<Option<Row>> {
        if self.scope.is_closed() {
            return Err(Error::ScopeClosed);
        }
        Ok(self.rows.next().map(|inner| Row {
            inner,
            index: self.index.clone(),
        }))
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Explicitly discard the rest of the sequence.
    pub fn close(self) {}
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("remaining", &self.rows.len())
            .finish_non_exhaustive()
    }
}

/// Qualified name to ordinal, from the row set's own metadata. Lower-cased
/// keys; on duplicate names the first occurrence wins.
fn build_index(first: Option<&SqliteRow>) -> HashMap<String, usize> {
    use sqlx::{Column as _, Row as _};

    let mut index = HashMap::new();
    if let Some(row) = first {
        for column in row.columns() {
            index
                .entry(column.name().to_lowercase())
                .or_insert(column.ordinal());
        }
    }
    index
}

/// One result row plus the shared name index of its row set.
pub struct Row {
    inner: SqliteRow,
    index: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Extract a column's value.
    ///
    /// Looks up the column's qualified name in the row metadata, decodes by
    /// the column's kind, and enforces nullability: SQL NULL in a non-null
    /// column is a [`Error::NullValue`], an absent name is a
    /// [`Error::ColumnNotInRow`], never a default value.
    pub fn get<T: SqlType>(&self, column: &Column<T>) -> Result<T> {
        let key = column.qualified_name();
        let ordinal = *self
            .index
            .get(&key)
            .ok_or_else(|| Error::column_not_in_row(key.clone()))?;

        let value = decode_column(&self.inner, ordinal, T::KIND)?;
        if value.is_null() && !T::NULLABLE {
            return Err(Error::null_value(column.table_name(), column.name()));
        }
        let actual = value.kind_name();
        T::from_value(value).ok_or_else(|| Error::type_mismatch(key, T::KIND.name(), actual))
    }

    /// Whether the row set carries a column under this qualified name.
    pub fn contains<T: SqlType>(&self, column: &Column<T>) -> bool {
        self.index.contains_key(&column.qualified_name())
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row")
            .field("columns", &self.index.len())
            .finish_non_exhaustive()
    }
}
