//! Bound statements and value maps.
//!
//! A [`Statement`] composes a compiled template with the positional values
//! currently bound to it. It exposes only the operations this layer needs
//! from the native statement: execute for update counts, execute with a
//! generated key, and the fetch family for result rows. Everything else
//! about statement preparation and caching is the driver's business.

use crate::column::Column;
use crate::error::{Error, Result};
use crate::row::{Row, Rows};
use crate::template::Binding;
use crate::transaction::TransactionScope;
use crate::value::{SqlType, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Caller-supplied mapping from (column, parameter name) to value.
///
/// The typed setters are checked at compile time; [`Values::set_value`]
/// takes an already-erased [`Value`] and defers the kind check to bind
/// time.
#[derive(Debug, Default)]
pub struct Values {
    entries: HashMap<(u64, String), Value>,
}

impl Values {
    pub fn new() -> Values {
        Values::default()
    }

    /// Set the value for a column's default parameter.
    pub fn set<T: SqlType>(self, column: &Column<T>, value: T) -> Values {
        self.insert(column.def.id, "", value.into_value())
    }

    /// Set the value for a named parameter of a column.
    pub fn set_named<T: SqlType>(self, column: &Column<T>, parameter: &str, value: T) -> Values {
        self.insert(column.def.id, parameter, value.into_value())
    }

    /// Set an erased value for a column's default parameter. A value of the
    /// wrong kind surfaces as a type mismatch when the statement is bound.
    pub fn set_value<T: SqlType>(self, column: &Column<T>, value: Value) -> Values {
        self.insert(column.def.id, "", value)
    }

    /// Erased variant of [`Values::set_named`].
    pub fn set_value_named<T: SqlType>(
        self,
        column: &Column<T>,
        parameter: &str,
        value: Value,
    ) -> Values {
        self.insert(column.def.id, parameter, value)
    }

    fn insert(mut self, column_id: u64, parameter: &str, value: Value) -> Values {
        self.entries
            .insert((column_id, parameter.to_string()), value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, column_id: u64, parameter: &str) -> Option<&Value> {
        self.entries.get(&(column_id, parameter.to_string()))
    }
}

/// An executable statement: compiled SQL, the template's binding list, and
/// the currently bound positional arguments.
#[derive(Debug)]
pub struct Statement {
    sql: Arc<str>,
    bindings: Arc<[Binding]>,
    arguments: Vec<Value>,
}

impl Statement {
    pub(crate) fn new(sql: Arc<str>, bindings: Arc<[Binding]>) -> Statement {
        let arguments = vec![Value::Null; bindings.len()];
        Statement {
            sql,
            bindings,
            arguments,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_count(&self) -> usize {
        self.bindings.len()
    }

    /// Re-apply the whole binding list in positional order from a value
    /// map, dropping anything bound before. A missing entry binds SQL NULL;
    /// a value of the wrong kind is a type mismatch. Returns the statement
    /// for chaining.
    pub fn bind(&mut self, values: &Values) -> Result<&mut Statement> {
        let mut arguments = Vec::with_capacity(self.bindings.len());
        for binding in self.bindings.iter() {
            let value = values
                .lookup(binding.column.id, &binding.parameter)
                .cloned()
                .unwrap_or(Value::Null);
            if let Some(kind) = value.kind() {
                if kind != binding.column.kind {
                    return Err(Error::type_mismatch(
                        binding.column.qualified_name(),
                        binding.column.kind.name(),
                        value.kind_name(),
                    ));
                }
            }
            arguments.push(value);
        }
        self.arguments = arguments;
        Ok(self)
    }

    /// Reset every positional argument to SQL NULL.
    pub fn clear(&mut self) {
        for argument in &mut self.arguments {
            *argument = Value::Null;
        }
    }

    /// Execute as an update and return the affected row count.
    pub async fn execute(&self, scope: &TransactionScope) -> Result<u64> {
        scope.execute(&self.sql, &self.arguments).await
    }

    /// Execute as an insert and return the auto-generated row id.
    pub async fn execute_returning_id(&self, scope: &TransactionScope) -> Result<i64> {
        scope.execute_returning_id(&self.sql, &self.arguments).await
    }

    /// Execute as a query and return the single-pass row sequence. The
    /// sequence must be consumed before the owning scope ends.
    pub async fn fetch(&self, scope: &TransactionScope) -> Result<Rows> {
        let rows = scope.fetch_rows(&self.sql, &self.arguments).await?;
        Ok(Rows::new(rows, scope.clone()))
    }

    /// Execute as a query and collect every row.
    pub async fn fetch_all(&self, scope: &TransactionScope) -> Result<Vec<Row>> {
        let mut rows = self.fetch(scope).await?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            collected.push(row);
        }
        Ok(collected)
    }

    /// Execute as a query expected to return at most one row.
    pub async fn fetch_optional(&self, scope: &TransactionScope) -> Result<Option<Row>> {
        let mut rows = self.fetch(scope).await?;
        rows.next()
    }

    /// Execute as a query expected to return exactly one row.
    pub async fn fetch_one(&self, scope: &TransactionScope) -> Result<Row> {
        self.fetch_optional(scope)
            .await?
            .ok_or(Error::Driver(sqlx::Error::RowNotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use crate::template::Template;

    fn insert_statement(table: &Table) -> (Statement, Column<i64>, Column<String>) {
        let id = table.integer("id").not_null();
        let name = table.text("name").not_null();
        let sql = format!(
            "INSERT INTO users (id, name) VALUES ({}, {})",
            id.placeholder(),
            name.placeholder()
        );
        let template = Template::compile(&sql, &[table]).unwrap();
        (template.statement(), id, name)
    }

    #[test]
    fn test_bind_in_positional_order() {
        let table = Table::new("users");
        let (mut statement, id, name) = insert_statement(&table);

        statement
            .bind(&Values::new().set(&id, 7).set(&name, "ada".to_string()))
            .unwrap();
        assert_eq!(
            statement.arguments,
            vec![Value::Integer(7), Value::Text("ada".to_string())]
        );
    }

    #[test]
    fn test_missing_entry_binds_null() {
        let table = Table::new("users");
        let (mut statement, id, _name) = insert_statement(&table);

        statement.bind(&Values::new().set(&id, 7)).unwrap();
        assert_eq!(statement.arguments, vec![Value::Integer(7), Value::Null]);
    }

    #[test]
    fn test_rebind_replaces_previous_values() {
        let table = Table::new("users");
        let (mut statement, id, name) = insert_statement(&table);

        statement
            .bind(&Values::new().set(&id, 1).set(&name, "A".to_string()))
            .unwrap();
        statement.clear();
        assert_eq!(statement.arguments, vec![Value::Null, Value::Null]);

        statement
            .bind(&Values::new().set(&id, 2).set(&name, "B".to_string()))
            .unwrap();
        assert_eq!(
            statement.arguments,
            vec![Value::Integer(2), Value::Text("B".to_string())]
        );
    }

    #[test]
    fn test_erased_value_kind_checked_at_bind() {
        let table = Table::new("users");
        let (mut statement, id, _name) = insert_statement(&table);

        let result = statement.bind(&Values::new().set_value(&id, Value::Text("7".into())));
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_erased_null_is_accepted() {
        let table = Table::new("users");
        let (mut statement, id, _name) = insert_statement(&table);

        statement
            .bind(&Values::new().set_value(&id, Value::Null))
            .unwrap();
        assert_eq!(statement.arguments[0], Value::Null);
    }

    #[test]
    fn test_same_value_applied_to_each_occurrence() {
        let table = Table::new("users");
        let id = table.integer("id").not_null();
        let sql = format!(
            "SELECT * FROM users WHERE id = {} OR parent = {}",
            id.placeholder(),
            id.placeholder()
        );
        let template = Template::compile(&sql, &[&table]).unwrap();
        let mut statement = template.statement();

        statement.bind(&Values::new().set(&id, 9)).unwrap();
        assert_eq!(
            statement.arguments,
            vec![Value::Integer(9), Value::Integer(9)]
        );
    }

    #[test]
    fn test_values_len() {
        let table = Table::new("users");
        let id = table.integer("id");
        let values = Values::new().set(&id, Some(1)).set_named(&id, "hi", Some(2));
        assert_eq!(values.len(), 2);
        assert!(!values.is_empty());
    }
}
