//! Table descriptors.
//!
//! A [`Table`] is a named, ordered registry of column descriptors. The name
//! is fixed at construction; the column list is mutable so a nullable
//! column can be promoted to its non-null variant in place. A table with an
//! empty name is "ephemeral": it never maps to storage and exists only to
//! label computed result columns.
//!
//! The projection helpers are pure string formatting over the registered
//! columns. They do no escaping or dialect work beyond double-quoting
//! identifiers in the select list; whatever the caller embeds in a column
//! modifier is passed through verbatim.

use crate::column::{Column, ColumnDef};
use crate::error::{Error, Result};
use crate::value::{SqlKind, SqlType};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared table state. Columns keep a weak back-reference to this.
pub(crate) struct TableCore {
    pub(crate) name: Arc<str>,
    columns: RwLock<Vec<Arc<ColumnDef>>>,
}

impl TableCore {
    fn register(&self, def: Arc<ColumnDef>) {
        self.columns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(def);
    }

    pub(crate) fn unregister(&self, id: u64) -> bool {
        let mut columns = self.columns.write().unwrap_or_else(PoisonError::into_inner);
        match columns.iter().position(|def| def.id == id) {
            Some(index) => {
                columns.remove(index);
                true
            }
            None => false,
        }
    }

    /// Swap a replacement descriptor into the original's position, or
    /// append if the original is no longer registered.
    pub(crate) fn replace(&self, old_id: u64, replacement: Arc<ColumnDef>) {
        let mut columns = self.columns.write().unwrap_or_else(PoisonError::into_inner);
        match columns.iter().position(|def| def.id == old_id) {
            Some(index) => columns[index] = replacement,
            None => columns.push(replacement),
        }
    }

    pub(crate) fn defs(&self) -> Vec<Arc<ColumnDef>> {
        self.columns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Named, ordered collection of columns. Cheap to clone; clones share the
/// same registry.
#[derive(Clone)]
pub struct Table {
    core: Arc<TableCore>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.core.name)
            .field("columns", &self.column_names())
            .finish()
    }
}

impl Table {
    pub fn new(name: &str) -> Table {
        Table {
            core: Arc::new(TableCore {
                name: Arc::from(name),
                columns: RwLock::new(Vec::new()),
            }),
        }
    }

    /// An unnamed table used purely to label computed result columns, such
    /// as aggregates. It has no DDL and its columns key on their bare name
    /// during extraction.
    pub fn ephemeral() -> Table {
        Table::new("")
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn is_ephemeral(&self) -> bool {
        self.core.name.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.core.defs().len()
    }

    /// Column names in registration order.
    pub fn column_names(&self) -> Vec<String> {
        self.core.defs().iter().map(|def| def.name.clone()).collect()
    }

    fn add<T: SqlType>(&self, name: &str, sql_type: String) -> Column<T> {
        let def = ColumnDef::new(&self.core, name, sql_type, T::KIND, !T::NULLABLE, None);
        self.core.register(def.clone());
        Column::from_def(def)
    }

    /// Register an integer column. Columns start nullable; promote with
    /// [`Column::not_null`]. No duplicate-name check is performed.
    pub fn integer(&self, name: &str) -> Column<Option<i64>> {
        self.add(name, SqlKind::Integer.default_sql_type().to_string())
    }

    pub fn real(&self, name: &str) -> Column<Option<f64>> {
        self.add(name, SqlKind::Real.default_sql_type().to_string())
    }

    pub fn boolean(&self, name: &str) -> Column<Option<bool>> {
        self.add(name, SqlKind::Boolean.default_sql_type().to_string())
    }

    pub fn text(&self, name: &str) -> Column<Option<String>> {
        self.add(name, SqlKind::Text.default_sql_type().to_string())
    }

    /// Register a length-bounded text column.
    pub fn varchar(&self, name: &str, length: u32) -> Column<Option<String>> {
        self.add(name, format!("VARCHAR({length})"))
    }

    pub fn blob(&self, name: &str) -> Column<Option<Vec<u8>>> {
        self.add(name, SqlKind::Blob.default_sql_type().to_string())
    }

    pub fn timestamp(&self, name: &str) -> Column<Option<DateTime<Utc>>> {
        self.add(name, SqlKind::Timestamp.default_sql_type().to_string())
    }

    /// Register a JSON column, stored as text.
    pub fn json(&self, name: &str) -> Column<Option<JsonValue>> {
        self.add(name, SqlKind::Json.default_sql_type().to_string())
    }

    /// Unregister a column. Part of the promotion idiom together with the
    /// typed constructors; returns false when the column was not (or is no
    /// longer) registered here.
    pub fn remove<T: SqlType>(&self, column: &Column<T>) -> bool {
        self.core.unregister(column.def.id)
    }

    /// Comma-joined column names in registration order.
    pub fn column_list(&self) -> String {
        self.join(|def| def.name.clone())
    }

    /// Comma-joined default placeholder tokens in registration order.
    pub fn placeholder_list(&self) -> String {
        self.join(|def| def.placeholder_for(""))
    }

    /// Comma-joined `name = placeholder` pairs, for UPDATE set lists.
    pub fn assignment_list(&self) -> String {
        self.join(|def| format!("{} = {}", def.name, def.placeholder_for("")))
    }

    /// Comma-joined DDL column definitions.
    pub fn definition_list(&self) -> String {
        self.join(|def| def.definition())
    }

    /// Comma-joined select expressions that preserve table identity:
    /// `"t"."c" AS "t.c"` per column, so result metadata carries the
    /// qualified names the row extractor looks up. Ephemeral columns are
    /// selected bare.
    pub fn select_list(&self) -> String {
        self.join(|def| {
            if def.table_name.is_empty() {
                format!("\"{}\"", def.name)
            } else {
                format!(
                    "\"{}\".\"{}\" AS \"{}\"",
                    def.table_name,
                    def.name,
                    def.qualified_name()
                )
            }
        })
    }

    /// `CREATE TABLE` statement for this table's current definition.
    pub fn ddl(&self) -> Result<String> {
        if self.is_ephemeral() {
            return Err(Error::invalid_input("ephemeral table has no DDL"));
        }
        Ok(format!(
            "CREATE TABLE {} ({})",
            self.core.name,
            self.definition_list()
        ))
    }

    pub(crate) fn core(&self) -> &Arc<TableCore> {
        &self.core
    }

    fn join(&self, render: impl Fn(&Arc<ColumnDef>) -> String) -> String {
        self.core
            .defs()
            .iter()
            .map(render)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
