//! Integration tests for transaction scoping: nesting, rollback, scope
//! preconditions, and task isolation.

use sqlbind::{Database, Error, Table, Template, Values};

async fn memory_db() -> Database {
    Database::connect("sqlite::memory:?writable=true")
        .await
        .expect("in-memory database")
}

async fn exec(db: &Database, sql: &str) {
    let template = Template::compile(sql, &[]).expect("compile");
    db.transaction(|tx| async move {
        template.statement().execute(&tx).await?;
        Ok(())
    })
    .await
    .expect("execute");
}

struct Fixture {
    table: Table,
    id: sqlbind::Column<i64>,
}

impl Fixture {
    fn new() -> Fixture {
        let table = Table::new("entries");
        let id = table.integer("id").not_null();
        Fixture { table, id }
    }

    fn insert(&self, value: i64) -> sqlbind::Statement {
        let template = Template::compile(
            &format!("INSERT INTO entries (id) VALUES ({})", self.id.placeholder()),
            &[&self.table],
        )
        .expect("compile insert");
        let mut statement = template.statement();
        statement
            .bind(&Values::new().set(&self.id, value))
            .expect("bind");
        statement
    }

    async fn count_rows(&self, db: &Database) -> i64 {
        let totals = Table::ephemeral();
        let total = totals.integer("total").not_null();
        let template =
            Template::compile("SELECT COUNT(*) AS total FROM entries", &[]).expect("compile count");
        db.transaction(|tx| async move {
            let row = template.statement().fetch_one(&tx).await?;
            row.get(&total)
        })
        .await
        .expect("count")
    }
}

#[tokio::test]
async fn test_nested_scopes_commit_once() {
    let db = memory_db().await;
    let fixture = Fixture::new();
    exec(&db, "CREATE TABLE entries (id INTEGER NOT NULL)").await;

    let inner_db = db.clone();
    let outer_insert = fixture.insert(1);
    let inner_insert = fixture.insert(2);

    db.transaction(|outer| async move {
        outer_insert.execute(&outer).await?;
        inner_db
            .transaction(|inner| async move {
                // the nested entry reuses the outer connection
                assert!(outer.same_connection(&inner));
                inner_insert.execute(&inner).await?;
                Ok(())
            })
            .await?;
        Ok(())
    })
    .await
    .expect("nested transaction");

    // both inserts are visible after the single outermost commit
    assert_eq!(fixture.count_rows(&db).await, 2);
}

#[tokio::test]
async fn test_failure_rolls_back_and_rethrows() {
    let db = memory_db().await;
    let fixture = Fixture::new();
    exec(&db, "CREATE TABLE entries (id INTEGER NOT NULL)").await;

    let insert = fixture.insert(1);
    let result: Result<(), Error> = db
        .transaction(|tx| async move {
            insert.execute(&tx).await?;
            Err(Error::invalid_input("boom"))
        })
        .await;

    match result {
        Err(Error::InvalidInput { message }) => assert_eq!(message, "boom"),
        other => panic!("expected the body error unchanged, got {other:?}"),
    }
    assert_eq!(fixture.count_rows(&db).await, 0);
}

#[tokio::test]
async fn test_inner_failure_rolls_back_outer_work() {
    let db = memory_db().await;
    let fixture = Fixture::new();
    exec(&db, "CREATE TABLE entries (id INTEGER NOT NULL)").await;

    let inner_db = db.clone();
    let outer_insert = fixture.insert(1);

    let result: Result<(), Error> = db
        .transaction(|tx| async move {
            outer_insert.execute(&tx).await?;
            inner_db
                .transaction(|_inner| async move { Err(Error::invalid_input("inner boom")) })
                .await
        })
        .await;

    assert!(result.is_err());
    // the inner scope owned no commit decision; the outer rollback undoes
    // everything
    assert_eq!(fixture.count_rows(&db).await, 0);
}

#[tokio::test]
async fn test_require_transaction_joins_active_scope() {
    let db = memory_db().await;
    let fixture = Fixture::new();
    exec(&db, "CREATE TABLE entries (id INTEGER NOT NULL)").await;

    let inner_db = db.clone();
    let insert = fixture.insert(7);

    db.transaction(|outer| async move {
        inner_db
            .require_transaction(|joined| async move {
                assert!(outer.same_connection(&joined));
                insert.execute(&joined).await?;
                Ok(())
            })
            .await
    })
    .await
    .expect("require inside scope");

    assert_eq!(fixture.count_rows(&db).await, 1);
}

#[tokio::test]
async fn test_require_transaction_without_scope_is_precondition_error() {
    let db = memory_db().await;
    let result = db
        .require_transaction(|_tx| async move { Ok(()) })
        .await;
    assert!(matches!(result, Err(Error::NoActiveTransaction)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sibling_tasks_get_distinct_connections() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scopes.db");
    let url = format!("sqlite:{}?writable=true&max_connections=4", path.display());
    let db = Database::connect(&url).await.expect("file database");

    let fixture = Fixture::new();
    exec(&db, "CREATE TABLE entries (id INTEGER NOT NULL)").await;

    let db_a = db.clone();
    let db_b = db.clone();
    let insert_a = fixture.insert(1);
    let insert_b = fixture.insert(2);

    let task_a = tokio::spawn(async move {
        db_a.transaction(|tx| async move {
            insert_a.execute(&tx).await?;
            Ok(tx)
        })
        .await
    });
    let task_b = tokio::spawn(async move {
        db_b.transaction(|tx| async move {
            insert_b.execute(&tx).await?;
            Ok(tx)
        })
        .await
    });

    let scope_a = task_a.await.expect("join a").expect("transaction a");
    let scope_b = task_b.await.expect("join b").expect("transaction b");

    // sibling tasks never share a connection, and each committed its own
    // work independently
    assert!(!scope_a.same_connection(&scope_b));
    assert_eq!(fixture.count_rows(&db).await, 2);
}

#[tokio::test]
async fn test_rows_cannot_be_consumed_after_scope_ends() {
    let db = memory_db().await;
    let fixture = Fixture::new();
    exec(&db, "CREATE TABLE entries (id INTEGER NOT NULL)").await;

    db.transaction(|tx| async move {
        fixture.insert(1).execute(&tx).await?;
        fixture.insert(2).execute(&tx).await?;
        Ok(())
    })
    .await
    .expect("seed rows");

    let select = Template::compile("SELECT id FROM entries", &[]).expect("compile select");
    let mut rows = db
        .transaction(|tx| async move {
            let mut rows = select.statement().fetch(&tx).await?;
            // consuming inside the scope is fine
            assert!(rows.next()?.is_some());
            Ok(rows)
        })
        .await
        .expect("fetch rows");

    // the scope has committed; the leftover sequence is dead
    assert!(matches!(rows.next(), Err(Error::ScopeClosed)));
}

#[tokio::test]
async fn test_scope_not_visible_outside_transaction() {
    let db = memory_db().await;
    assert!(!db.in_transaction());
    let db2 = db.clone();
    db.transaction(|_tx| async move {
        assert!(db2.in_transaction());
        Ok(())
    })
    .await
    .expect("transaction");
    assert!(!db.in_transaction());
}
