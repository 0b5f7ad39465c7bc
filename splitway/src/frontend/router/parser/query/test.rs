use std::sync::Arc;

use super::*;
use crate::frontend::router::sharding::{topology::test::users, LogicDatabase, LogicTable, RouteRule};

fn topology() -> Topology {
    let users = users();
    // Split across databases only.
    let accounts = LogicTable::new(
        "accounts",
        Arc::new(users.database().clone()),
        None,
        vec![],
    )
    .unwrap();

    Topology::new([users, accounts])
}

macro_rules! plan {
    ($query:expr) => {
        plan!($query, vec![])
    };

    ($query:expr, $params:expr) => {{
        let topology = topology();
        let params: Vec<Value> = $params;
        QueryParser::new(&topology, &params)
            .default_database(Some("main"))
            .parse($query)
    }};
}

macro_rules! routes {
    ($($args:expr),+) => {{
        plan!($($args),+).unwrap().routes.into_iter().collect::<Vec<_>>()
    }};
}

#[test]
fn test_select_direct() {
    let plan = plan!(
        "SELECT * FROM users WHERE user_id = ? AND name = 'bob'",
        vec![Value::Integer(7)]
    )
    .unwrap();
    assert!(plan.read);

    let routes = plan.routes.into_iter().collect::<Vec<_>>();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].database, "user_db_1");
    assert_eq!(routes[0].table.as_deref(), Some("users_3"));
    assert_eq!(
        routes[0].sql,
        "SELECT * FROM users_3 WHERE user_id = $1 AND name = 'bob'"
    );
    assert_eq!(routes[0].params, vec![Value::Integer(7)]);
}

#[test]
fn test_select_in_deduplicates() {
    let routes = routes!("SELECT * FROM accounts WHERE user_id IN (1, 2, 3)");
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].database, "user_db_1");
    assert_eq!(routes[1].database, "user_db_0");
    assert!(routes.iter().all(|r| r.table.as_deref() == Some("accounts")));
}

#[test]
fn test_select_cross_product() {
    let routes = routes!(
        "SELECT * FROM users u WHERE u.user_id IN ($1, $2) AND u.user_id = 9",
        vec![Value::Integer(4), Value::Integer(5)]
    );
    // First comparison on the column wins.
    assert_eq!(
        routes
            .iter()
            .map(|r| r.table.clone().unwrap())
            .collect::<Vec<_>>(),
        vec!["users_0", "users_1"]
    );
}

#[test]
fn test_select_broadcast() {
    let routes = routes!("SELECT count(*) FROM users WHERE name = 'bob' OR user_id = 1");
    assert_eq!(routes.len(), 4);
    assert_eq!(
        routes[3].sql,
        "SELECT count(*) FROM users_3 WHERE name = 'bob' OR user_id = 1"
    );

    let topology = topology();
    let plan = QueryParser::new(&topology, &[])
        .all_shards(true)
        .parse("SELECT * FROM users WHERE user_id = 1")
        .unwrap();
    assert_eq!(plan.routes.len(), 4);
}

#[test]
fn test_select_for_update_is_write() {
    let plan = plan!("SELECT * FROM users WHERE user_id = 1 FOR UPDATE").unwrap();
    assert!(!plan.read);
}

#[test]
fn test_multiple_sharded_tables() {
    let err = plan!("SELECT * FROM users JOIN accounts ON accounts.user_id = users.user_id WHERE users.user_id = 1")
        .unwrap_err();
    assert!(matches!(err, Error::Rewrite(_)));

    let err = plan!("DELETE FROM users USING accounts WHERE users.user_id = accounts.user_id AND users.user_id = 1")
        .unwrap_err();
    assert!(matches!(err, Error::Rewrite(_)));
}

#[test]
fn test_join_with_unsharded_table() {
    let routes = routes!(
        "SELECT * FROM users u JOIN countries c ON c.id = u.country_id WHERE u.user_id = 2"
    );
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].table.as_deref(), Some("users_2"));
    assert!(routes[0].sql.contains("FROM users_2 u JOIN countries c"));
}

#[test]
fn test_update_case_placeholders() {
    let routes = routes!(
        "UPDATE users SET name = CASE WHEN ? THEN ? ELSE ? END WHERE user_id = ?",
        vec![
            Value::Bool(true),
            Value::from("a"),
            Value::from("b"),
            Value::Integer(6),
        ]
    );
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].database, "user_db_0");
    assert_eq!(routes[0].table.as_deref(), Some("users_2"));
    assert_eq!(
        routes[0].sql,
        "UPDATE users_2 SET name = CASE WHEN $1 THEN $2 ELSE $3 END WHERE user_id = $4"
    );
    assert_eq!(routes[0].params.len(), 4);
}

#[test]
fn test_write_without_where() {
    for query in [
        "UPDATE users SET name = 'bob'",
        "DELETE FROM users",
        "UPDATE countries SET name = 'bob'",
        "DELETE FROM countries",
    ] {
        assert!(
            matches!(plan!(query), Err(Error::Rewrite(_))),
            "{} should be rejected",
            query
        );
    }
}

#[test]
fn test_write_without_shard_predicate() {
    let err = plan!("DELETE FROM users WHERE name = 'bob'").unwrap_err();
    assert!(matches!(
        err,
        Error::Sharding(sharding::Error::NoRouteRule { .. })
    ));
}

#[test]
fn test_update_shard_column() {
    let err = plan!("UPDATE users SET user_id = 5 WHERE user_id = 1").unwrap_err();
    assert!(matches!(err, Error::Rewrite(_)));
}

#[test]
fn test_delete_in() {
    let plan = plan!("DELETE FROM users WHERE user_id IN (1, 5, 2)").unwrap();
    assert!(!plan.read);
    let tables = plan
        .routes
        .iter()
        .map(|r| r.table.clone().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(tables, vec!["users_1", "users_2"]);
}

#[test]
fn test_insert_split() {
    let routes = routes!(
        "INSERT INTO users (user_id, name) VALUES (1, 'a'), (?, 'b'), (5, 'c')",
        vec![Value::Integer(2)]
    );
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].database, "user_db_1");
    assert_eq!(
        routes[0].sql,
        "INSERT INTO users_1 (user_id, name) VALUES (1, 'a'), (5, 'c')"
    );
    assert_eq!(routes[1].database, "user_db_0");
    assert_eq!(
        routes[1].sql,
        "INSERT INTO users_2 (user_id, name) VALUES ($1, 'b')"
    );
}

#[test]
fn test_insert_single_target() {
    let routes = routes!("INSERT INTO users (user_id, name) VALUES (3, 'a'), (7, 'b')");
    assert_eq!(routes.len(), 1);
    assert_eq!(
        routes[0].sql,
        "INSERT INTO users_3 (user_id, name) VALUES (3, 'a'), (7, 'b')"
    );
}

#[test]
fn test_insert_errors() {
    assert!(matches!(
        plan!("INSERT INTO users VALUES (1, 'a')"),
        Err(Error::Rewrite(_))
    ));
    assert!(matches!(
        plan!("INSERT INTO users (user_id) SELECT id FROM countries"),
        Err(Error::Rewrite(_))
    ));
    assert!(matches!(
        plan!("INSERT INTO users (name) VALUES ('a')"),
        Err(Error::Sharding(sharding::Error::NoRouteRule { .. }))
    ));
    assert!(matches!(
        plan!("INSERT INTO users (user_id) VALUES ($1)"),
        Err(Error::MissingParameter(1))
    ));
}

#[test]
fn test_passthrough() {
    for (query, read) in [
        ("CALL refresh_stats(1)", false),
        ("CREATE TABLE t (id BIGINT)", false),
        ("SELECT 1", true),
        ("UPDATE countries SET name = 'x' WHERE id = 1", false),
    ] {
        let plan = plan!(query).unwrap();
        assert_eq!(plan.read, read, "{}", query);
        let routes = plan.routes.into_iter().collect::<Vec<_>>();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].database, "main");
        assert_eq!(routes[0].table, None);
    }

    let topology = topology();
    let err = QueryParser::new(&topology, &[])
        .parse("CALL refresh_stats(1)")
        .unwrap_err();
    assert!(matches!(err, Error::Rewrite(_)));
}

#[test]
fn test_broadcast_writes_rejected() {
    let topology = topology();
    let err = QueryParser::new(&topology, &[])
        .all_shards(true)
        .parse("DELETE FROM users WHERE user_id = 1")
        .unwrap_err();
    assert!(matches!(err, Error::Rewrite(_)));
}

#[test]
fn test_rule_evaluation_error() {
    let database = LogicDatabase::new(
        "db",
        "db_{}",
        vec![RouteRule::new("${code}.toLong() % 2").unwrap()],
    )
    .unwrap();
    let table = LogicTable::new("codes", Arc::new(database), None, vec![]).unwrap();
    let topology = Topology::new([table]);

    let err = QueryParser::new(&topology, &[])
        .parse("SELECT * FROM codes WHERE code = 'abc'")
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Sharding(sharding::Error::RuleEvaluation(_))
    ));
}

#[test]
fn test_empty() {
    assert!(matches!(plan!(""), Err(Error::EmptyQuery)));
}

#[test]
fn test_multiple_statements_passthrough() {
    let query = "UPDATE users SET name = 'x' WHERE user_id = 1; CREATE TABLE t (id BIGINT)";
    let plan = plan!(query).unwrap();
    assert!(!plan.read);

    let routes = plan.routes.into_iter().collect::<Vec<_>>();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].database, "main");
    assert_eq!(routes[0].table, None);
    assert_eq!(routes[0].sql, query);

    let plan = plan!("SELECT 1; SELECT 2").unwrap();
    assert!(!plan.read);
    assert_eq!(plan.routes.len(), 1);
}

#[test]
fn test_select_subquery() {
    let routes = routes!("SELECT * FROM (SELECT * FROM users WHERE user_id = 1) t");
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].database, "user_db_1");
    assert_eq!(routes[0].table.as_deref(), Some("users_1"));
    assert!(routes[0].sql.contains("FROM users_1 WHERE user_id = 1"));
    assert!(!routes[0].sql.contains("FROM users "));

    // No predicate next to the table.
    let routes = routes!("SELECT * FROM (SELECT * FROM users) t WHERE t.user_id = 1");
    assert_eq!(routes.len(), 4);
}

#[test]
fn test_select_cte() {
    let plan = plan!(
        "WITH recent AS (SELECT * FROM users WHERE user_id = $1) SELECT * FROM recent",
        vec![Value::Integer(2)]
    )
    .unwrap();
    assert!(plan.read);

    let routes = plan.routes.into_iter().collect::<Vec<_>>();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].database, "user_db_0");
    assert_eq!(routes[0].table.as_deref(), Some("users_2"));
    assert!(routes[0].sql.contains("FROM users_2 WHERE user_id = $1"));
}

#[test]
fn test_select_in_sublink() {
    let routes = routes!(
        "SELECT * FROM countries WHERE id IN (SELECT country_id FROM users WHERE user_id = 2)"
    );
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].database, "user_db_0");
    assert_eq!(routes[0].table.as_deref(), Some("users_2"));
    assert!(routes[0].sql.contains("FROM users_2 WHERE user_id = 2"));
}

#[test]
fn test_write_reading_sharded_subquery() {
    for query in [
        "DELETE FROM countries WHERE id IN (SELECT country_id FROM users WHERE user_id = 1)",
        "UPDATE countries SET name = 'x' WHERE id IN (SELECT country_id FROM users WHERE user_id = 1)",
        "INSERT INTO countries (id) SELECT country_id FROM users WHERE user_id = 1",
    ] {
        let err = plan!(query).unwrap_err();
        assert!(matches!(err, Error::Rewrite(_)), "{}", query);
    }

    // Two references to the same sharded table.
    let err = plan!(
        "DELETE FROM users WHERE user_id = 1 AND name IN (SELECT name FROM users WHERE user_id = 2)"
    )
    .unwrap_err();
    assert!(matches!(err, Error::Rewrite(_)));
}
