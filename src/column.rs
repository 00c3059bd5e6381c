//! Column descriptors and the placeholder registry.
//!
//! A [`Column<T>`] is a typed handle over an erased descriptor owned by its
//! table. The descriptor carries everything the template compiler and the
//! row extractor need: the column's identity, storage kind, nullability,
//! and the placeholder tokens it has issued.
//!
//! Placeholder tokens come from a process-wide counter rendered at a fixed
//! width. Two distinct tokens therefore never collide, are never substrings
//! of one another, and can never start at the same text offset.

use crate::table::TableCore;
use crate::value::{SqlKind, SqlType};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

static NEXT_COLUMN_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_column_id() -> u64 {
    NEXT_COLUMN_ID.fetch_add(1, Ordering::Relaxed)
}

fn next_token() -> String {
    format!("{{?:{:016x}}}", NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
}

/// Erased column descriptor. Shared between the owning table, typed column
/// handles, and any templates compiled while it was registered.
#[derive(Debug)]
pub(crate) struct ColumnDef {
    pub(crate) id: u64,
    pub(crate) table: Weak<TableCore>,
    pub(crate) table_name: Arc<str>,
    pub(crate) name: String,
    pub(crate) sql_type: String,
    pub(crate) modifier: Option<String>,
    pub(crate) kind: SqlKind,
    pub(crate) required: bool,
    /// Parameter name to issued placeholder token, memoized per pair.
    placeholders: Mutex<HashMap<String, String>>,
}

impl ColumnDef {
    pub(crate) fn new(
        core: &Arc<TableCore>,
        name: &str,
        sql_type: String,
        kind: SqlKind,
        required: bool,
        modifier: Option<String>,
    ) -> Arc<ColumnDef> {
        Arc::new(ColumnDef {
            id: next_column_id(),
            table: Arc::downgrade(core),
            table_name: core.name.clone(),
            name: name.to_string(),
            sql_type,
            modifier,
            kind,
            required,
            placeholders: Mutex::new(HashMap::new()),
        })
    }

    /// Stable placeholder token for a logical parameter name, generated on
    /// first access and memoized for the life of this descriptor.
    pub(crate) fn placeholder_for(&self, parameter: &str) -> String {
        let mut issued = self
            .placeholders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        issued
            .entry(parameter.to_string())
            .or_insert_with(next_token)
            .clone()
    }

    /// Snapshot of every (parameter name, token) pair this descriptor has
    /// issued so far.
    pub(crate) fn issued_placeholders(&self) -> Vec<(String, String)> {
        let issued = self
            .placeholders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        issued
            .iter()
            .map(|(parameter, token)| (parameter.clone(), token.clone()))
            .collect()
    }

    /// Lower-cased lookup key in result-row metadata: `table.column`, or
    /// the bare column name for columns of an ephemeral table.
    pub(crate) fn qualified_name(&self) -> String {
        if self.table_name.is_empty() {
            self.name.to_lowercase()
        } else {
            format!("{}.{}", self.table_name, self.name).to_lowercase()
        }
    }

    /// DDL fragment: `name type [NOT NULL] [modifier]`.
    pub(crate) fn definition(&self) -> String {
        let mut definition = format!("{} {}", self.name, self.sql_type);
        if self.required {
            definition.push_str(" NOT NULL");
        }
        if let Some(modifier) = &self.modifier {
            definition.push(' ');
            definition.push_str(modifier);
        }
        definition
    }
}

/// Create a replacement descriptor and swap it into the owning table at the
/// original's position. The original keeps its identity and its issued
/// tokens, so templates already compiled against it are unaffected.
fn reregister(def: &Arc<ColumnDef>, required: bool, modifier: Option<String>) -> Arc<ColumnDef> {
    let replacement = Arc::new(ColumnDef {
        id: next_column_id(),
        table: def.table.clone(),
        table_name: def.table_name.clone(),
        name: def.name.clone(),
        sql_type: def.sql_type.clone(),
        modifier,
        kind: def.kind,
        required,
        placeholders: Mutex::new(HashMap::new()),
    });
    if let Some(table) = def.table.upgrade() {
        table.replace(def.id, replacement.clone());
    }
    replacement
}

/// Typed accessor for one table column.
///
/// `T` is the Rust type stored in the column: `Option<U>` for nullable
/// columns, bare `U` once promoted with [`Column::not_null`].
pub struct Column<T: SqlType> {
    pub(crate) def: Arc<ColumnDef>,
    marker: PhantomData<fn() -> T>,
}

impl<T: SqlType> Clone for Column<T> {
    fn clone(&self) -> Self {
        Column {
            def: self.def.clone(),
            marker: PhantomData,
        }
    }
}

impl<T: SqlType> std::fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("table", &self.def.table_name)
            .field("name", &self.def.name)
            .field("sql_type", &self.def.sql_type)
            .field("required", &self.def.required)
            .finish()
    }
}

impl<T: SqlType> Column<T> {
    pub(crate) fn from_def(def: Arc<ColumnDef>) -> Self {
        Column {
            def,
            marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn table_name(&self) -> &str {
        &self.def.table_name
    }

    pub fn sql_type(&self) -> &str {
        &self.def.sql_type
    }

    pub fn modifier(&self) -> Option<&str> {
        self.def.modifier.as_deref()
    }

    pub fn is_nullable(&self) -> bool {
        !self.def.required
    }

    /// Lower-cased `table.column` key used for result extraction.
    pub fn qualified_name(&self) -> String {
        self.def.qualified_name()
    }

    /// DDL fragment for this column.
    pub fn definition(&self) -> String {
        self.def.definition()
    }

    /// Placeholder token for the default (unnamed) parameter. The token is
    /// opaque text meant to be embedded into raw SQL handed to
    /// [`Template::compile`](crate::Template::compile).
    pub fn placeholder(&self) -> String {
        self.def.placeholder_for("")
    }

    /// Placeholder token for a named parameter. Distinct parameter names
    /// yield distinct tokens and distinct binding slots.
    pub fn named_placeholder(&self, parameter: &str) -> String {
        self.def.placeholder_for(parameter)
    }

    /// Replace this column's registration with one carrying the given DDL
    /// modifier text. Returns the replacement handle; the consumed handle's
    /// descriptor is no longer registered with the table.
    pub fn with_modifier(self, modifier: impl Into<String>) -> Column<T> {
        let def = reregister(&self.def, self.def.required, Some(modifier.into()));
        Column::from_def(def)
    }
}

impl<U: SqlType> Column<Option<U>> {
    /// Promote this nullable column to its non-null variant.
    ///
    /// The nullable descriptor is removed from the owning table and exactly
    /// one replacement is registered at the same position. Placeholders
    /// already issued for the nullable descriptor stay valid for templates
    /// compiled before the promotion and match nothing afterwards.
    pub fn not_null(self) -> Column<U> {
        let def = reregister(&self.def, true, self.def.modifier.clone());
        Column::from_def(def)
    }
}
