//! SQL template compilation.
//!
//! A template starts as raw SQL with embedded placeholder tokens. Compiling
//! it against the tables involved finds every token occurrence in source
//! order, replaces each with the driver's positional marker, and records
//! the ordered binding list: position `i` in the list is positional
//! parameter `i + 1` in the compiled SQL.
//!
//! A token that does not occur in the text contributes nothing; unused
//! columns are fine. A token occurring several times produces one binding
//! entry per occurrence, all bound to the same value at execution time.
//! Raw SQL is not otherwise inspected or validated.

use crate::column::ColumnDef;
use crate::error::{Error, Result};
use crate::statement::Statement;
use crate::table::Table;
use std::sync::Arc;
use tracing::debug;

/// One placeholder occurrence: the column it stands for and the logical
/// parameter name it was issued under (empty string for the default).
pub struct Binding {
    pub(crate) column: Arc<ColumnDef>,
    pub(crate) parameter: String,
}

impl Binding {
    pub fn column_name(&self) -> &str {
        &self.column.name
    }

    pub fn table_name(&self) -> &str {
        &self.column.table_name
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("column", &self.column.qualified_name())
            .field("parameter", &self.parameter)
            .finish()
    }
}

/// Immutable compiled template: positional-marker SQL plus the ordered
/// binding list.
#[derive(Debug)]
pub struct Template {
    sql: Arc<str>,
    bindings: Arc<[Binding]>,
}

struct Occurrence {
    offset: usize,
    len: usize,
    column: Arc<ColumnDef>,
    parameter: String,
}

impl Template {
    /// Compile raw SQL against the set of tables whose columns may appear
    /// in it.
    ///
    /// Occurrence offsets must be strictly increasing and non-overlapping.
    /// With fixed-width tokens this holds by construction; the check stays
    /// as an invariant guard and fails with a usage error if violated.
    pub fn compile(sql: &str, tables: &[&Table]) -> Result<Template> {
        let mut occurrences: Vec<Occurrence> = Vec::new();
        for table in tables {
            for column in table.core().defs() {
                for (parameter, token) in column.issued_placeholders() {
                    for (offset, matched) in sql.match_indices(token.as_str()) {
                        occurrences.push(Occurrence {
                            offset,
                            len: matched.len(),
                            column: column.clone(),
                            parameter: parameter.clone(),
                        });
                    }
                }
            }
        }
        occurrences.sort_by_key(|occurrence| occurrence.offset);

        for pair in occurrences.windows(2) {
            if pair[1].offset < pair[0].offset + pair[0].len {
                return Err(Error::invalid_input(format!(
                    "placeholder occurrences overlap at offset {}",
                    pair[1].offset
                )));
            }
        }

        let mut compiled = String::with_capacity(sql.len());
        let mut bindings = Vec::with_capacity(occurrences.len());
        let mut cursor = 0;
        for occurrence in &occurrences {
            compiled.push_str(&sql[cursor..occurrence.offset]);
            compiled.push('?');
            cursor = occurrence.offset + occurrence.len;
            bindings.push(Binding {
                column: occurrence.column.clone(),
                parameter: occurrence.parameter.clone(),
            });
        }
        compiled.push_str(&sql[cursor..]);

        debug!(
            parameters = bindings.len(),
            tables = tables.len(),
            "compiled SQL template"
        );

        Ok(Template {
            sql: Arc::from(compiled),
            bindings: bindings.into(),
        })
    }

    /// The compiled SQL with positional markers.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bindings in positional order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn parameter_count(&self) -> usize {
        self.bindings.len()
    }

    /// Create an executable statement over this template.
    pub fn statement(&self) -> Statement {
        Statement::new(self.sql.clone(), self.bindings.clone())
    }
}
