//! Compile-time-typed SQL templating and task-scoped transactions over
//! sqlx/SQLite.
//!
//! Declare tables as typed column collections, embed the columns'
//! placeholder tokens in raw SQL, and compile that into positional-marker
//! SQL with an ordered binding list. Statements bind values per column with
//! kind checking, and result rows decode back into typed values through the
//! same column declarations. Transactions are logical scopes: nested scopes
//! against the same database share one pooled connection, and the outermost
//! scope alone decides commit or rollback.
//!
//! ```no_run
//! use sqlbind::{Database, Table, Template, Values};
//!
//! # async fn demo() -> sqlbind::Result<()> {
//! let users = Table::new("users");
//! let id = users.integer("id").not_null();
//! let name = users.varchar("name", 100).not_null();
//!
//! let insert = Template::compile(
//!     &format!(
//!         "INSERT INTO users ({}) VALUES ({})",
//!         users.column_list(),
//!         users.placeholder_list(),
//!     ),
//!     &[&users],
//! )?;
//!
//! let db = Database::connect("sqlite:app.db?writable=true").await?;
//! db.transaction(|tx| async move {
//!     let mut stmt = insert.statement();
//!     stmt.bind(&Values::new().set(&id, 1).set(&name, "ada".to_string()))?;
//!     stmt.execute(&tx).await?;
//!     Ok(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod column;
pub mod config;
pub mod error;
pub mod row;
pub mod statement;
pub mod table;
pub mod template;
pub mod transaction;
pub mod value;

pub use column::Column;
pub use config::{DatabaseConfig, PoolOptions};
pub use error::{Error, Result};
pub use row::{Row, Rows};
pub use statement::{Statement, Values};
pub use table::Table;
pub use template::{Binding, Template};
pub use transaction::{Database, TransactionScope};
pub use value::{SqlKind, SqlType, Value};
