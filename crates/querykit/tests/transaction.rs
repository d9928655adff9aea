//! Transaction scenarios against a live PostgreSQL.
//!
//! Set `DATABASE_URL` (or put it in `.env`) to run them.

use querykit::prelude::*;
use querykit::{Transaction, TransactionState};

type Conn = Connection<tokio_postgres::Client>;

async fn setup(test: &str) -> DbResult<Option<Conn>> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping {test}");
            return Ok(None);
        }
    };
    let conn = querykit::connect(&database_url, ConnectionConfig::new()).await?;
    conn.batch_execute(
        "CREATE TEMP TABLE customers (
            id VARCHAR(100) PRIMARY KEY,
            name VARCHAR(100) NOT NULL,
            email VARCHAR(200) NOT NULL UNIQUE
        )",
    )
    .await?;
    Ok(Some(conn))
}

async fn insert_customer<C: GenericClient>(conn: &C, id: &str, email: &str) -> DbResult<u64> {
    query("INSERT INTO customers (id, name, email) VALUES (?, ?, ?)")
        .bind(id)
        .bind("Eko")
        .bind(email)
        .execute(conn)
        .await
}

async fn customer_count(conn: &Conn) -> DbResult<i64> {
    table("customers").count(conn).await
}

#[tokio::test]
async fn closure_transaction_commits() -> DbResult<()> {
    let Some(conn) = setup("closure_transaction_commits").await? else {
        return Ok(());
    };
    conn.transaction(async |tx| {
        insert_customer(tx, "eko", "eko@example.com").await?;
        insert_customer(tx, "budi", "budi@example.com").await?;
        Ok(())
    })
    .await?;

    assert_eq!(customer_count(&conn).await?, 2);
    assert_eq!(conn.transaction_depth(), 0);
    Ok(())
}

#[tokio::test]
async fn closure_transaction_rolls_back_on_unique_violation() -> DbResult<()> {
    let Some(conn) = setup("closure_transaction_rolls_back_on_unique_violation").await? else {
        return Ok(());
    };
    let err = conn
        .transaction(async |tx| {
            insert_customer(tx, "eko", "eko@example.com").await?;
            insert_customer(tx, "eko", "eko@example.com").await?;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(err.is_unique_violation(), "{err}");
    assert_eq!(customer_count(&conn).await?, 0);
    Ok(())
}

#[tokio::test]
async fn macro_transaction_commits_and_rolls_back() -> DbResult<()> {
    let Some(conn) = setup("macro_transaction_commits_and_rolls_back").await? else {
        return Ok(());
    };
    querykit::transaction!(&conn, tx, {
        insert_customer(&tx, "eko", "eko@example.com").await?;
        Ok(())
    })?;

    let failed: DbResult<()> = querykit::transaction!(&conn, tx, {
        insert_customer(&tx, "budi", "budi@example.com").await?;
        insert_customer(&tx, "joko", "eko@example.com").await?;
        Ok(())
    });
    assert!(failed.unwrap_err().is_unique_violation());
    assert_eq!(customer_count(&conn).await?, 1);
    Ok(())
}

#[tokio::test]
async fn manual_begin_commit() -> DbResult<()> {
    let Some(conn) = setup("manual_begin_commit").await? else {
        return Ok(());
    };
    conn.begin().await?;
    assert!(conn.in_transaction());
    insert_customer(&conn, "eko", "eko@example.com").await?;
    insert_customer(&conn, "budi", "budi@example.com").await?;
    conn.commit().await?;

    assert!(!conn.in_transaction());
    assert_eq!(customer_count(&conn).await?, 2);
    Ok(())
}

#[tokio::test]
async fn manual_begin_rollback() -> DbResult<()> {
    let Some(conn) = setup("manual_begin_rollback").await? else {
        return Ok(());
    };
    conn.begin().await?;
    insert_customer(&conn, "eko", "eko@example.com").await?;
    insert_customer(&conn, "budi", "budi@example.com").await?;
    conn.rollback().await?;

    assert_eq!(customer_count(&conn).await?, 0);
    Ok(())
}

#[tokio::test]
async fn savepoint_rollback_keeps_outer_work() -> DbResult<()> {
    let Some(conn) = setup("savepoint_rollback_keeps_outer_work").await? else {
        return Ok(());
    };
    let outer: Transaction<'_, _> = conn.begin_transaction().await?;
    insert_customer(&outer, "eko", "eko@example.com").await?;

    let inner = outer.begin_nested().await?;
    assert_eq!(inner.level(), 2);
    insert_customer(&inner, "budi", "budi@example.com").await?;
    inner.rollback().await?;

    outer.commit().await?;
    let ids: Vec<String> = table("customers").pluck(&conn, "id").await?;
    assert_eq!(ids, ["eko"]);
    Ok(())
}

#[tokio::test]
async fn dropped_transaction_is_rolled_back() -> DbResult<()> {
    let Some(conn) = setup("dropped_transaction_is_rolled_back").await? else {
        return Ok(());
    };
    {
        let tx = conn.begin_transaction().await?;
        assert_eq!(tx.state(), TransactionState::Active);
        insert_customer(&tx, "eko", "eko@example.com").await?;
    }

    assert_eq!(customer_count(&conn).await?, 0);
    assert_eq!(conn.transaction_depth(), 0);
    Ok(())
}
