use std::ops::ControlFlow;

use rust_decimal::Decimal;

use super::*;
use crate::compile::BoundStatement;
use crate::config::{ConnectionConfig, DangerousDmlPolicy, LockPolicy};
use crate::dialect::Dialect;
use crate::record::Record;
use crate::testing::{MockClient, Reply, window};
use crate::value::Value;

fn pg(builder: &QueryBuilder) -> BoundStatement {
    builder.to_statement(Dialect::Postgres).unwrap()
}

fn placeholders(sql: &str) -> usize {
    sql.matches('$').count()
}

fn single(column: &str, value: Value) -> Reply {
    Reply::Rows(vec![Record::from_pairs([(column, value)])])
}

// ==================== Compilation ====================

#[test]
fn same_plan_compiles_identically() {
    let builder = table("products")
        .select(&["id", "name"])
        .where_cmp("price", Op::Gt, 10_000)
        .or_where_group(|g| g.where_eq("category_id", "FOOD").where_null("deleted_at"))
        .order_by("id", Direction::Asc)
        .limit(5);
    let a = pg(&builder);
    let b = pg(&builder);
    assert_eq!(a.sql(), b.sql());
    assert_eq!(a.bindings(), b.bindings());
}

#[test]
fn placeholders_line_up_with_bindings() {
    let builder = table("products")
        .where_between("price", 1, 2)
        .where_in("category_id", ["A", "B", "C"])
        .where_raw("price * ? > ?", vec![Value::Int(2), Value::Int(100)])
        .where_group(|g| g.where_eq("a", 1).or_where_date("created_at", Op::Eq, "2024-01-01"))
        .having_raw("count(*) > ?", vec![Value::Int(1)])
        .group_by("category_id");
    let stmt = pg(&builder);
    assert_eq!(placeholders(stmt.sql()), stmt.bindings().len());
    assert_eq!(stmt.bindings().len(), 10);
    assert_eq!(
        stmt.bindings()[5..7],
        [Value::Int(2), Value::Int(100)],
        "raw bindings land in their textual slot"
    );
}

#[test]
fn nested_group_attaches_with_parent_combinator() {
    let stmt = pg(&table("categories")
        .where_group(|g| g.where_eq("id", "SMARTPHONE").or_where_eq("id", "LAPTOP"))
        .or_where_group(|g| g.where_eq("name", "Food").where_not_null("description")));
    assert_eq!(
        stmt.sql(),
        r#"SELECT * FROM "categories" WHERE ("id" = $1 OR "id" = $2) OR ("name" = $3 AND "description" IS NOT NULL)"#
    );
}

#[test]
fn empty_group_adds_nothing() {
    let stmt = pg(&table("categories").where_group(|g| g).where_eq("id", 1));
    assert_eq!(stmt.sql(), r#"SELECT * FROM "categories" WHERE "id" = $1"#);
}

#[test]
fn empty_in_is_always_false() {
    let stmt = pg(&table("categories").where_in("id", Vec::<i64>::new()));
    assert_eq!(stmt.sql(), r#"SELECT * FROM "categories" WHERE 1 = 0"#);
    assert!(stmt.bindings().is_empty());

    let stmt = pg(&table("categories").where_not_in("id", Vec::<i64>::new()));
    assert_eq!(stmt.sql(), r#"SELECT * FROM "categories" WHERE 1 = 1"#);
}

#[test]
fn eq_null_becomes_is_null() {
    let stmt = pg(&table("categories")
        .where_eq("description", Value::Null)
        .where_cmp("name", Op::Ne, Option::<String>::None));
    assert_eq!(
        stmt.sql(),
        r#"SELECT * FROM "categories" WHERE "description" IS NULL AND "name" IS NOT NULL"#
    );
}

#[test]
fn join_keeps_qualified_columns() {
    let stmt = pg(&table("products")
        .join("categories", "products.category_id", Op::Eq, "categories.id")
        .select(&["products.id", "products.name", "categories.name as category_name"]));
    assert_eq!(
        stmt.sql(),
        r#"SELECT "products"."id", "products"."name", "categories"."name" as "category_name" FROM "products" INNER JOIN "categories" ON "products"."category_id" = "categories"."id""#
    );
}

#[test]
fn join_with_value_condition() {
    let stmt = pg(&table("products").join_with(JoinKind::Left, "categories", |on| {
        on.on("products.category_id", Op::Eq, "categories.id")
            .where_eq("categories.name", "Food")
    }));
    assert_eq!(
        stmt.sql(),
        r#"SELECT * FROM "products" LEFT JOIN "categories" ON "products"."category_id" = "categories"."id" AND "categories"."name" = $1"#
    );
}

#[test]
fn group_by_having_and_raw_select() {
    let stmt = pg(&table("products")
        .select(&["category_id"])
        .select_raw("count(id) as total_product", vec![])
        .group_by("category_id")
        .having("count(id)", Op::Gt, 1)
        .order_by("category_id", Direction::Desc));
    assert_eq!(
        stmt.sql(),
        r#"SELECT "category_id", count(id) as total_product FROM "products" GROUP BY "category_id" HAVING count(id) > $1 ORDER BY "category_id" DESC"#
    );
}

#[test]
fn clause_order_with_lock() {
    let stmt = pg(&table("products")
        .where_eq("id", "P1")
        .order_by("id", Direction::Asc)
        .skip(10)
        .take(5)
        .lock_for_update());
    assert_eq!(
        stmt.sql(),
        r#"SELECT * FROM "products" WHERE "id" = $1 ORDER BY "id" ASC LIMIT 5 OFFSET 10 FOR UPDATE"#
    );
}

#[test]
fn for_page_treats_zero_as_first() {
    let plan = table("t").for_page(0, 10).into_plan();
    assert_eq!((plan.limit, plan.offset), (Some(10), Some(0)));
    let plan = table("t").for_page(3, 10).into_plan();
    assert_eq!((plan.limit, plan.offset), (Some(10), Some(20)));
}

#[test]
fn reorder_clears_orders() {
    let plan = table("t").order_by_desc("a").order_by_raw("b nulls last", vec![]).reorder().into_plan();
    assert!(plan.orders.is_empty());
}

// ==================== Reads ====================

#[tokio::test]
async fn get_and_first() {
    let client = MockClient::new(|stmt| {
        if stmt.sql().ends_with("LIMIT 1") {
            Ok(single("id", Value::from("GADGET")))
        } else {
            Ok(Reply::Rows(vec![
                Record::from_pairs([("id", "GADGET")]),
                Record::from_pairs([("id", "FOOD")]),
            ]))
        }
    });
    let all = table("categories").get(&client).await.unwrap();
    assert_eq!(all.len(), 2);
    let first = table("categories").first(&client).await.unwrap().unwrap();
    assert_eq!(first.try_get::<String>("id").unwrap(), "GADGET");
    let ids: Vec<String> = table("categories").pluck(&client, "id").await.unwrap();
    assert_eq!(ids, ["GADGET", "FOOD"]);
    assert_eq!(
        client.sql_log()[2],
        r#"SELECT "id" FROM "categories""#
    );
}

#[tokio::test]
async fn exists_reads_boolean() {
    let client = MockClient::new(|_| Ok(single("exists", Value::Bool(true))));
    assert!(table("categories").where_eq("id", "X").exists(&client).await.unwrap());
    assert_eq!(
        client.sql_log()[0],
        r#"SELECT EXISTS(SELECT * FROM "categories" WHERE "id" = $1) AS "exists""#
    );
}

#[tokio::test]
async fn count_of_two_categories() {
    let client = MockClient::new(|_| Ok(single("aggregate", Value::Int(2))));
    let total = table("categories").count_column(&client, "id").await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(
        client.sql_log()[0],
        r#"SELECT count("id") AS aggregate FROM "categories""#
    );
}

#[tokio::test]
async fn aggregates_over_smartphones() {
    let client = MockClient::new(|stmt| {
        let value = match stmt.sql().split('(').next().unwrap_or_default() {
            "SELECT min" => Value::Int(10_000),
            "SELECT max" => Value::Int(20_000),
            "SELECT avg" => Value::Decimal(Decimal::new(15_000, 0)),
            "SELECT sum" => Value::Decimal(Decimal::new(30_000, 0)),
            other => panic!("unexpected aggregate {other}"),
        };
        Ok(single("aggregate", value))
    });
    let q = table("products").where_eq("category_id", "SMARTPHONE");
    assert_eq!(q.min::<i64>(&client, "price").await.unwrap(), Some(10_000));
    assert_eq!(q.max::<i64>(&client, "price").await.unwrap(), Some(20_000));
    assert_eq!(q.avg(&client, "price").await.unwrap(), Some(Decimal::new(15_000, 0)));
    assert_eq!(q.sum::<i64>(&client, "price").await.unwrap(), 30_000);
}

#[tokio::test]
async fn empty_aggregates() {
    let client = MockClient::new(|_| Ok(single("aggregate", Value::Null)));
    let q = table("products");
    assert_eq!(q.sum::<i64>(&client, "price").await.unwrap(), 0);
    assert_eq!(q.max::<i64>(&client, "price").await.unwrap(), None);
    assert_eq!(q.avg(&client, "price").await.unwrap(), None);
}

#[tokio::test]
async fn grouped_count_uses_subquery() {
    let client = MockClient::new(|_| Ok(single("aggregate", Value::Int(2))));
    let groups = table("products").group_by("category_id").count(&client).await.unwrap();
    assert_eq!(groups, 2);
    assert_eq!(
        client.sql_log()[0],
        r#"SELECT count(*) AS aggregate FROM (SELECT * FROM "products" GROUP BY "category_id") AS aggregate_table"#
    );
}

#[tokio::test]
async fn group_by_rows_map_to_tuples() {
    let client = MockClient::new(|_| {
        Ok(Reply::Rows(vec![
            Record::from_pairs([("category_id", Value::from("SMARTPHONE")), ("total_product", Value::Int(2))]),
            Record::from_pairs([("category_id", Value::from("FOOD")), ("total_product", Value::Int(2))]),
        ]))
    });
    let rows: Vec<(String, i64)> = table("products")
        .select(&["category_id"])
        .select_raw("count(id) as total_product", vec![])
        .group_by("category_id")
        .order_by_desc("category_id")
        .get_as(&client)
        .await
        .unwrap();
    assert_eq!(rows, [("SMARTPHONE".to_string(), 2), ("FOOD".to_string(), 2)]);
}

#[tokio::test]
async fn chunk_stops_on_short_chunk_and_numbers_pages() {
    let client = MockClient::new(|stmt| {
        let (limit, offset) = window(stmt.sql());
        let total = 250;
        let end = limit.map_or(total, |l| (offset + l).min(total));
        Ok(Reply::Rows(
            (offset.min(total)..end)
                .map(|i| Record::from_pairs([("id", Value::Int(i as i64))]))
                .collect(),
        ))
    });
    let mut pages = Vec::new();
    let done = table("categories")
        .order_by("id", Direction::Asc)
        .chunk(&client, 100, |rows, page| {
            pages.push((page, rows.len()));
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
    assert!(done);
    assert_eq!(pages, [(1, 100), (2, 100), (3, 50)]);
    assert_eq!(client.statements().len(), 3);
}

#[tokio::test]
async fn chunk_can_break_early() {
    let client = MockClient::new(|_| Ok(Reply::Rows(vec![Record::from_pairs([("id", 1)])])));
    let done = table("t")
        .order_by("id", Direction::Asc)
        .chunk(&client, 1, |_, _| ControlFlow::Break(()))
        .await
        .unwrap();
    assert!(!done);
    assert_eq!(client.statements().len(), 1);
}

#[tokio::test]
async fn chunk_needs_order() {
    let client = MockClient::empty();
    let err = table("t").chunk(&client, 10, |_, _| ControlFlow::Continue(())).await.unwrap_err();
    assert!(err.is_syntax());
    assert!(client.statements().is_empty());
}

#[tokio::test]
async fn cursor_unsupported_on_sqlite() {
    let client = MockClient::empty().with_config(ConnectionConfig::new().dialect(Dialect::Sqlite));
    let err = table("t").cursor(&client).await.err().unwrap();
    assert!(err.is_unsupported());
}

// ==================== Locking ====================

#[tokio::test]
async fn lock_outside_transaction_per_policy() {
    let run = |policy: LockPolicy| async move {
        let client = MockClient::empty()
            .with_config(ConnectionConfig::new().lock_outside_transaction(policy));
        let result = table("products").where_eq("id", "P1").lock_for_update().get(&client).await;
        (result.map(|_| ()), client.sql_log())
    };

    let (ok, log) = run(LockPolicy::Warn).await;
    assert!(ok.is_ok());
    assert!(log[0].ends_with("FOR UPDATE"));

    let (ok, log) = run(LockPolicy::Strip).await;
    assert!(ok.is_ok());
    assert!(!log[0].contains("FOR UPDATE"));

    let (err, log) = run(LockPolicy::Reject).await;
    assert!(err.unwrap_err().is_transaction_state());
    assert!(log.is_empty());
}

#[tokio::test]
async fn lock_inside_transaction_is_kept() {
    let client = MockClient::empty()
        .inside_transaction()
        .with_config(ConnectionConfig::new().lock_outside_transaction(LockPolicy::Reject));
    table("products").lock_for_share().get(&client).await.unwrap();
    assert!(client.sql_log()[0].ends_with("FOR SHARE"));
}

// ==================== Writes ====================

#[tokio::test]
async fn insert_update_delete() {
    let client = MockClient::new(|_| Ok(Reply::Affected(1)));
    let n = table("categories")
        .insert(&client, [("id", Value::from("GADGET")), ("name", Value::from("Gadget"))])
        .await
        .unwrap();
    assert_eq!(n, 1);
    table("categories")
        .where_eq("id", "GADGET")
        .update(&client, [("name", "Gadget Updated")])
        .await
        .unwrap();
    table("categories").where_eq("id", "GADGET").delete(&client).await.unwrap();

    let log = client.sql_log();
    assert_eq!(log[0], r#"INSERT INTO "categories" ("id", "name") VALUES ($1, $2)"#);
    assert_eq!(log[1], r#"UPDATE "categories" SET "name" = $1 WHERE "id" = $2"#);
    assert_eq!(log[2], r#"DELETE FROM "categories" WHERE "id" = $1"#);
}

#[tokio::test]
async fn insert_many_without_rows_is_noop() {
    let client = MockClient::empty();
    assert_eq!(table("t").insert_many(&client, Vec::new()).await.unwrap(), 0);
    assert!(client.statements().is_empty());
}

#[tokio::test]
async fn insert_get_id_uses_returning() {
    let client = MockClient::new(|_| Ok(single("id", Value::Int(42))));
    let id: i64 = table("counters").insert_get_id(&client, [("name", "x")], "id").await.unwrap();
    assert_eq!(id, 42);
    assert_eq!(
        client.sql_log()[0],
        r#"INSERT INTO "counters" ("name") VALUES ($1) RETURNING "id""#
    );
}

#[tokio::test]
async fn update_or_insert_inserts_then_updates() {
    use std::sync::Mutex;
    use std::sync::Arc;

    let store: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&store);
    let client = MockClient::new(move |stmt| {
        let sql = stmt.sql();
        let mut row = seen.lock().unwrap();
        if sql.starts_with("SELECT EXISTS") {
            Ok(single("exists", Value::Bool(row.is_some())))
        } else if sql.starts_with("INSERT") {
            *row = stmt.bindings()[1].as_str().map(str::to_string);
            Ok(Reply::Affected(1))
        } else {
            *row = stmt.bindings()[0].as_str().map(str::to_string);
            Ok(Reply::Affected(1))
        }
    });

    let q = table("categories");
    q.update_or_insert(&client, [("id", "SAMPLE")], [("name", "Sample")])
        .await
        .unwrap();
    q.update_or_insert(&client, [("id", "SAMPLE")], [("name", "Sample Updated")])
        .await
        .unwrap();

    assert_eq!(store.lock().unwrap().as_deref(), Some("Sample Updated"));
    let log = client.sql_log();
    assert_eq!(log[1], r#"INSERT INTO "categories" ("id", "name") VALUES ($1, $2)"#);
    assert_eq!(log[3], r#"UPDATE "categories" SET "name" = $1 WHERE "id" = $2"#);
}

#[tokio::test]
async fn increment_and_decrement() {
    let client = MockClient::new(|_| Ok(Reply::Affected(1)));
    let q = table("counters").where_eq("id", "sample");
    q.increment(&client, "counter", 1).await.unwrap();
    q.decrement(&client, "counter", 2).await.unwrap();
    q.increment_with(&client, "counter", 1, [("name", "bumped")]).await.unwrap();
    let log = client.sql_log();
    assert_eq!(log[0], r#"UPDATE "counters" SET "counter" = "counter" + $1 WHERE "id" = $2"#);
    assert_eq!(log[1], r#"UPDATE "counters" SET "counter" = "counter" - $1 WHERE "id" = $2"#);
    assert_eq!(
        log[2],
        r#"UPDATE "counters" SET "counter" = "counter" + $1, "name" = $2 WHERE "id" = $3"#
    );
}

#[tokio::test]
async fn unscoped_delete_per_policy() {
    let client = MockClient::new(|_| Ok(Reply::Affected(3)))
        .with_config(ConnectionConfig::new().delete_without_where(DangerousDmlPolicy::Error));
    let err = table("categories").delete(&client).await.unwrap_err();
    assert!(err.is_syntax());
    assert!(client.statements().is_empty());

    let client = MockClient::new(|_| Ok(Reply::Affected(3)));
    assert_eq!(table("categories").delete(&client).await.unwrap(), 3);
}
