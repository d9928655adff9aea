use super::*;
use crate::dialect::LockMode;
use crate::qb::{Direction, Filter, Op, table};

fn plan_of(builder: crate::qb::QueryBuilder) -> QueryPlan {
    builder.into_plan()
}

#[test]
fn select_clause_order() {
    let plan = plan_of(
        table("products")
            .distinct()
            .select(&["category_id"])
            .join("categories", "products.category_id", Op::Eq, "categories.id")
            .where_cmp("price", Op::Ge, 100)
            .group_by("category_id")
            .having("count(*)", Op::Gt, 1)
            .order_by("category_id", Direction::Asc)
            .limit(10)
            .offset(20)
            .lock_for_share(),
    );
    let stmt = compile(&plan, Dialect::Postgres).unwrap();
    assert_eq!(
        stmt.sql(),
        r#"SELECT DISTINCT "category_id" FROM "products" INNER JOIN "categories" ON "products"."category_id" = "categories"."id" WHERE "price" >= $1 GROUP BY "category_id" HAVING count(*) > $2 ORDER BY "category_id" ASC LIMIT 10 OFFSET 20 FOR SHARE"#
    );
    assert_eq!(stmt.bindings(), &[Value::Int(100), Value::Int(1)]);
}

#[test]
fn mysql_and_sqlite_spellings() {
    let plan = plan_of(
        table("products")
            .where_eq("id", "P1")
            .where_date("created_at", Op::Eq, "2024-01-01")
            .lock_for_share(),
    );
    let mysql = compile(&plan, Dialect::MySql).unwrap();
    assert_eq!(
        mysql.sql(),
        "SELECT * FROM `products` WHERE `id` = ? AND date(`created_at`) = ? LOCK IN SHARE MODE"
    );

    let err = compile(&plan, Dialect::Sqlite).unwrap_err();
    assert!(err.is_unsupported());

    let mut unlocked = plan.clone();
    unlocked.lock = LockMode::None;
    let sqlite = compile(&unlocked, Dialect::Sqlite).unwrap();
    assert_eq!(
        sqlite.sql(),
        r#"SELECT * FROM "products" WHERE "id" = ? AND date("created_at") = ?"#
    );
}

#[test]
fn postgres_date_cast() {
    let plan = plan_of(table("t").where_date("created_at", Op::Lt, "2024-01-01"));
    let stmt = compile(&plan, Dialect::Postgres).unwrap();
    assert_eq!(stmt.sql(), r#"SELECT * FROM "t" WHERE "created_at"::date < $1"#);
}

#[test]
fn raw_fragments_bind_in_textual_position() {
    let plan = plan_of(
        table("t")
            .select_raw("coalesce(a, ?) as a", vec![Value::Int(0)])
            .where_eq("b", 1)
            .where_raw("c ?? 'k' AND d = ?", vec![Value::Int(2)]),
    );
    let stmt = compile(&plan, Dialect::Postgres).unwrap();
    assert_eq!(
        stmt.sql(),
        r#"SELECT coalesce(a, $1) as a FROM "t" WHERE "b" = $2 AND c ? 'k' AND d = $3"#
    );
    assert_eq!(stmt.bindings(), &[Value::Int(0), Value::Int(1), Value::Int(2)]);
}

#[test]
fn raw_binding_mismatch_is_syntax_error() {
    let too_few = plan_of(table("t").where_raw("a = ? AND b = ?", vec![Value::Int(1)]));
    assert!(compile(&too_few, Dialect::Postgres).unwrap_err().is_syntax());

    let too_many = plan_of(table("t").where_raw("a = ?", vec![Value::Int(1), Value::Int(2)]));
    assert!(compile(&too_many, Dialect::Postgres).unwrap_err().is_syntax());
}

#[test]
fn having_needs_group_by() {
    let plan = plan_of(table("t").having("count(*)", Op::Gt, 1));
    assert!(compile(&plan, Dialect::Postgres).unwrap_err().is_syntax());
}

#[test]
fn empty_table_is_syntax_error() {
    let plan = plan_of(table(" "));
    assert!(compile(&plan, Dialect::Postgres).unwrap_err().is_syntax());
}

#[test]
fn aggregate_of_windowed_plan_uses_subquery() {
    let plan = plan_of(table("t").order_by("id", Direction::Asc).limit(5));
    let stmt = compile_aggregate(&plan, Dialect::Postgres, Aggregate::Sum, "t.price").unwrap();
    assert_eq!(
        stmt.sql(),
        r#"SELECT sum("price") AS aggregate FROM (SELECT * FROM "t" ORDER BY "id" ASC LIMIT 5) AS aggregate_table"#
    );
}

#[test]
fn aggregate_drops_lock_and_order() {
    let plan = plan_of(table("t").order_by("id", Direction::Asc).lock_for_update());
    let stmt = compile_aggregate(&plan.without_window(), Dialect::Postgres, Aggregate::Count, "*")
        .unwrap();
    assert_eq!(stmt.sql(), r#"SELECT count(*) AS aggregate FROM "t""#);
}

#[test]
fn multi_row_insert() {
    let rows = vec![
        vec![("id".to_string(), Value::from("A")), ("name".to_string(), Value::from("a"))],
        vec![("name".to_string(), Value::from("b")), ("id".to_string(), Value::from("B"))],
    ];
    let stmt = compile_insert("categories", &rows, None, Dialect::Postgres).unwrap();
    assert_eq!(
        stmt.sql(),
        r#"INSERT INTO "categories" ("id", "name") VALUES ($1, $2), ($3, $4)"#
    );
    assert_eq!(
        stmt.bindings(),
        &[Value::from("A"), Value::from("a"), Value::from("B"), Value::from("b")]
    );
}

#[test]
fn insert_edge_cases() {
    let stmt = compile_insert("t", &[Vec::new()], None, Dialect::Postgres).unwrap();
    assert_eq!(stmt.sql(), r#"INSERT INTO "t" DEFAULT VALUES"#);

    let ragged = vec![
        vec![("a".to_string(), Value::Int(1))],
        vec![("b".to_string(), Value::Int(2))],
    ];
    assert!(compile_insert("t", &ragged, None, Dialect::Postgres).unwrap_err().is_syntax());

    let row = vec![vec![("a".to_string(), Value::Int(1))]];
    assert!(
        compile_insert("t", &row, Some("id"), Dialect::MySql)
            .unwrap_err()
            .is_unsupported()
    );
}

#[test]
fn update_strips_qualifier_from_targets() {
    let plan = plan_of(table("products").where_eq("products.id", "P1"));
    let sets = vec![
        ("products.name".to_string(), SetValue::Value(Value::from("x"))),
        (
            "updated_at".to_string(),
            SetValue::Raw(Raw::new("now()")),
        ),
    ];
    let stmt = compile_update(&plan, &sets, Dialect::Postgres).unwrap();
    assert_eq!(
        stmt.sql(),
        r#"UPDATE "products" SET "name" = $1, "updated_at" = now() WHERE "products"."id" = $2"#
    );
}

#[test]
fn mutation_restrictions() {
    let joined = plan_of(table("a").join("b", "a.id", Op::Eq, "b.a_id"));
    assert!(compile_delete(&joined, Dialect::Postgres).unwrap_err().is_unsupported());

    let limited = plan_of(table("a").where_eq("x", 1).order_by("id", Direction::Asc).limit(1));
    assert!(compile_delete(&limited, Dialect::Postgres).unwrap_err().is_unsupported());
    let mysql = compile_delete(&limited, Dialect::MySql).unwrap();
    assert_eq!(
        mysql.sql(),
        "DELETE FROM `a` WHERE `x` = ? ORDER BY `id` ASC LIMIT 1"
    );

    let offset = plan_of(table("a").offset(3));
    assert!(compile_delete(&offset, Dialect::MySql).unwrap_err().is_syntax());

    let empty_set: Vec<(String, SetValue)> = Vec::new();
    assert!(compile_update(&plan_of(table("a")), &empty_set, Dialect::Postgres)
        .unwrap_err()
        .is_syntax());
}

#[test]
fn exists_wraps_select() {
    let plan = plan_of(table("t").where_null("deleted_at").lock_for_update());
    let stmt = compile_exists(&plan, Dialect::MySql).unwrap();
    assert_eq!(
        stmt.sql(),
        "SELECT EXISTS(SELECT * FROM `t` WHERE `deleted_at` IS NULL) AS `exists`"
    );
}

#[test]
fn question_marks_inside_quotes_are_literal() {
    let plan = plan_of(table("t").where_raw(
        r#"name <> 'why?' AND "odd?col" = 'it''s ?' AND id = ?"#,
        vec![Value::Int(1)],
    ));
    let stmt = compile(&plan, Dialect::Postgres).unwrap();
    assert_eq!(
        stmt.sql(),
        r#"SELECT * FROM "t" WHERE name <> 'why?' AND "odd?col" = 'it''s ?' AND id = $1"#
    );
    assert_eq!(stmt.bindings(), &[Value::Int(1)]);

    let mysql = compile(
        &plan_of(table("t").where_raw("`a?` = ?", vec![Value::Int(2)])),
        Dialect::MySql,
    )
    .unwrap();
    assert_eq!(mysql.sql(), "SELECT * FROM `t` WHERE `a?` = ?");
    assert_eq!(mysql.bindings(), &[Value::Int(2)]);
}

#[test]
fn ilike_is_postgres_only() {
    let plan = plan_of(
        table("t")
            .where_cmp("name", Op::ILike, "%a%")
            .or_where_cmp("name", Op::NotILike, "%b%"),
    );
    let stmt = compile(&plan, Dialect::Postgres).unwrap();
    assert_eq!(
        stmt.sql(),
        r#"SELECT * FROM "t" WHERE "name" ILIKE $1 OR "name" NOT ILIKE $2"#
    );

    for dialect in [Dialect::MySql, Dialect::Sqlite] {
        let err = compile(&plan, dialect).unwrap_err();
        assert!(err.is_unsupported(), "{dialect}: {err}");
    }

    let dated = plan_of(table("t").where_date("created_at", Op::ILike, "2024%"));
    assert!(compile(&dated, Dialect::Sqlite).unwrap_err().is_unsupported());
}
