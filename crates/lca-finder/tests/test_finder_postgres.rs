//! Integration tests for the finder against PostgreSQL.
//!
//! These tests require a PostgreSQL database to be running.
//! Set DATABASE_URL or run them with `--ignored` only when one is available.

use std::sync::Arc;

use lca_finder::{
    Condition, Connection, FilterMap, FilterValue, FindRequest, Finder, FinderConfig,
    KeywordSearch, OrderSpec, PgStore, PoolConfig, Source, StoreErrorKind, Value,
};

async fn connect() -> Connection {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let uri = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/test_db".to_string());
    let conn = Connection::new(&uri, PoolConfig::default()).await.unwrap();
    conn.ping().await.unwrap();
    conn
}

async fn create_processes(conn: &Connection, table: &str) {
    let pool = conn.pool();

    sqlx::query(&format!("DROP TABLE IF EXISTS {} CASCADE", table))
        .execute(pool)
        .await
        .unwrap();

    sqlx::query(&format!(
        "CREATE TABLE {} (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT,
            phases TEXT[] NOT NULL DEFAULT '{{}}',
            process_db_ids INTEGER[] NOT NULL DEFAULT '{{}}'
        )",
        table
    ))
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(&format!(
        "INSERT INTO {} (name, category, phases, process_db_ids) VALUES
            ('Spruce plank', 'wood', '{{A1-3,C3}}', '{{1}}'),
            ('Reinforcing steel', 'metal', '{{A1-3,D}}', '{{1,2}}'),
            ('Oak beam', 'wood', '{{A1-3}}', '{{2}}'),
            ('Concrete C30', 'mineral', '{{A1-3,C4}}', '{{1}}'),
            ('Larch cladding', 'wood', '{{A1-3,C3,D}}', '{{3}}')",
        table
    ))
    .execute(pool)
    .await
    .unwrap();
}

async fn drop_table(conn: &Connection, table: &str) {
    sqlx::query(&format!("DROP TABLE {} CASCADE", table))
        .execute(conn.pool())
        .await
        .unwrap();
}

fn finder(conn: &Connection) -> Finder {
    Finder::from_config(Arc::new(PgStore::new(conn)), &FinderConfig::uncached())
}

#[tokio::test]
#[ignore] // Only run with --ignored flag when database is available
async fn test_find_and_count() {
    let conn = connect().await;
    create_processes(&conn, "finder_processes").await;
    let finder = finder(&conn);
    let request = FindRequest::new(Source::new("finder_processes").unwrap())
        .filters(FilterMap::new().with("category", "wood"))
        .order_by(OrderSpec::new().asc("name"));

    let rows = finder.find(&request).await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(|r| r.get_str("name")).collect();
    assert_eq!(names, vec!["Larch cladding", "Oak beam", "Spruce plank"]);
    assert_eq!(finder.count(&request).await.unwrap(), 3);

    let total = FindRequest::new(Source::new("finder_processes").unwrap());
    assert_eq!(finder.count(&total).await.unwrap(), 5);

    drop_table(&conn, "finder_processes").await;
}

#[tokio::test]
#[ignore]
async fn test_ordered_page() {
    let conn = connect().await;
    create_processes(&conn, "finder_pages").await;
    let finder = finder(&conn);
    let request = FindRequest::new(Source::new("finder_pages").unwrap())
        .order_by(OrderSpec::new().asc("name"))
        .limit(2)
        .offset(1);

    let rows = finder.find(&request).await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(|r| r.get_str("name")).collect();
    assert_eq!(names, vec!["Larch cladding", "Oak beam"]);

    drop_table(&conn, "finder_pages").await;
}

#[tokio::test]
#[ignore]
async fn test_array_conditions() {
    let conn = connect().await;
    create_processes(&conn, "finder_arrays").await;
    let finder = finder(&conn);
    let source = Source::new("finder_arrays").unwrap();

    let excluded = FindRequest::new(source.clone())
        .condition(Condition::array_not_subset_of("phases", ["C3"]))
        .condition(Condition::array_not_subset_of("phases", ["D"]))
        .order_by(OrderSpec::new().asc("id"));
    let rows = finder.find(&excluded).await.unwrap();
    let names: Vec<_> = rows.iter().filter_map(|r| r.get_str("name")).collect();
    assert_eq!(names, vec!["Oak beam", "Concrete C30"]);

    let required = FindRequest::new(source.clone()).filters(FilterMap::new().with(
        "phases",
        FilterValue::SubsetOf(vec![Value::from("C3"), Value::from("D")]),
    ));
    assert_eq!(finder.count(&required).await.unwrap(), 1);

    let overlap = FindRequest::new(source)
        .condition(Condition::array_overlaps("process_db_ids", [2, 3]));
    assert_eq!(finder.count(&overlap).await.unwrap(), 3);

    drop_table(&conn, "finder_arrays").await;
}

#[tokio::test]
#[ignore]
async fn test_keyword_search() {
    let conn = connect().await;
    create_processes(&conn, "finder_keywords").await;
    let finder = finder(&conn);
    let request = FindRequest::new(Source::new("finder_keywords").unwrap());

    let rows = finder
        .search(&KeywordSearch::parse("name", "PLANK spruce"), request.clone())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let rows = finder
        .search(&KeywordSearch::parse("name", "  "), request)
        .await
        .unwrap();
    assert!(rows.empty_reason().is_some());

    drop_table(&conn, "finder_keywords").await;
}

#[tokio::test]
#[ignore]
async fn test_find_by_sql() {
    let conn = connect().await;
    create_processes(&conn, "finder_raw").await;
    let finder = finder(&conn);
    let sources = [Source::new("finder_raw").unwrap()];

    let rows = finder
        .find_by_sql(
            &sources,
            "SELECT name, cardinality(phases) AS modules FROM finder_raw WHERE category = $1 AND $2 = ANY(phases) ORDER BY name",
            vec![Value::from("wood"), Value::from("C3")],
            true,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.first().and_then(|r| r.get_i64("modules")), Some(3));

    drop_table(&conn, "finder_raw").await;
}

#[tokio::test]
#[ignore]
async fn test_decode_float4_and_temporal_arrays() {
    let conn = connect().await;
    let finder = finder(&conn);
    let sources = [Source::new("finder_decode").unwrap()];

    let rows = finder
        .find_by_sql(
            &sources,
            "SELECT ARRAY[1.5, NULL]::float4[] AS ratios, \
             ARRAY['2024-03-01']::date[] AS days, \
             ARRAY['2024-03-01 12:30:00']::timestamp[] AS stamps, \
             ARRAY['2024-03-01 12:30:00+00']::timestamptz[] AS stamps_tz",
            vec![],
            true,
        )
        .await
        .unwrap();
    let row = rows.first().expect("one row");

    assert_eq!(
        row.get("ratios").and_then(Value::as_array),
        Some(&[Value::Double(1.5), Value::Null][..])
    );
    assert!(matches!(
        row.get("days").and_then(Value::as_array),
        Some([Value::Date(_)])
    ));
    assert!(matches!(
        row.get("stamps").and_then(Value::as_array),
        Some([Value::Timestamp(_)])
    ));
    assert!(matches!(
        row.get("stamps_tz").and_then(Value::as_array),
        Some([Value::TimestampTz(_)])
    ));
}

#[tokio::test]
#[ignore]
async fn test_missing_relation_is_store_error() {
    let conn = connect().await;
    let finder = finder(&conn);
    let request = FindRequest::new(Source::new("finder_does_not_exist").unwrap());

    let err = finder.find(&request).await.unwrap_err();
    let store_error = err.as_store_error().expect("store error");
    assert_eq!(store_error.kind(), StoreErrorKind::Execution);
}
