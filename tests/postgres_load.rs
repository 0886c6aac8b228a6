//! Loads against a real PostgreSQL.
//!
//! Set `SALES_INGEST_TEST_DATABASE_URL` to run these; without it each test returns early.

mod common;

use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sales_ingest::LoadError;
use sales_ingest::config::PipelineConfig;
use sales_ingest::disposition::read_note;
use sales_ingest::loading::{self, load};
use sales_ingest::processing::transform;
use sales_ingest::types::Stage;
use sqlx::PgPool;

type Row = (i64, String, NaiveDate, Decimal, Option<String>);

async fn pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("SALES_INGEST_TEST_DATABASE_URL") else {
        eprintln!("SALES_INGEST_TEST_DATABASE_URL not set; skipping");
        return None;
    };
    Some(loading::connect(&url, 4).await.unwrap())
}

async fn create_table(pool: &PgPool, name: &str, extra: &str) {
    sqlx::query(&format!("DROP TABLE IF EXISTS {name}"))
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(&format!(
        "CREATE TABLE {name} (
            id BIGINT PRIMARY KEY,
            salescode TEXT NOT NULL,
            dateorder DATE NOT NULL,
            totalsales NUMERIC(15,2) NOT NULL,
            brand TEXT{extra}
        )"
    ))
    .execute(pool)
    .await
    .unwrap();
}

async fn rows(pool: &PgPool, table: &str) -> Vec<Row> {
    sqlx::query_as::<_, Row>(&format!(
        "SELECT id, salescode, dateorder, totalsales, brand FROM {table} ORDER BY id"
    ))
    .fetch_all(pool)
    .await
    .unwrap()
}

fn with_table(config: PipelineConfig, table: &str) -> PipelineConfig {
    PipelineConfig {
        target_table: table.to_string(),
        ..config
    }
}

#[tokio::test]
async fn loads_scenario_file_and_rerun_is_idempotent() {
    let Some(pool) = pool().await else { return };
    let table = "it_sales_scenario";
    create_table(&pool, table, "").await;
    let (_dir, config) = common::layout();
    let config = with_table(config, table);

    let src = common::incoming(&config, "sales_2025_01.xlsx");
    common::write_scenario(&src);
    let done = transform(&src, &config).unwrap();
    let outcome = load(&done, &pool, &config).await.unwrap();

    assert_eq!(outcome.rows_copied, 1);
    assert_eq!(outcome.rows_loaded, 1);
    assert_eq!(outcome.archived_to, config.archive_dir.join("sales_2025_01.xlsx"));
    assert!(!src.exists());
    assert!(!done.artifact.exists());

    let expected = vec![(
        1,
        "SC001".to_string(),
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        Decimal::new(1500050, 2),
        Some("BrandA".to_string()),
    )];
    assert_eq!(rows(&pool, table).await, expected);

    // Same content again: same final state.
    std::fs::remove_file(&outcome.archived_to).unwrap();
    common::write_scenario(&src);
    let done = transform(&src, &config).unwrap();
    load(&done, &pool, &config).await.unwrap();
    assert_eq!(rows(&pool, table).await, expected);
}

#[tokio::test]
async fn overlapping_ids_are_updated_in_place() {
    let Some(pool) = pool().await else { return };
    let table = "it_sales_upsert";
    create_table(&pool, table, "").await;
    let (_dir, config) = common::layout();
    let config = with_table(config, table);

    let first = common::incoming(&config, "first.xlsx");
    common::write_single(&first, 10, "OLD");
    load(&transform(&first, &config).unwrap(), &pool, &config)
        .await
        .unwrap();

    let second = common::incoming(&config, "second.xlsx");
    common::write_single(&second, 10, "NEW");
    load(&transform(&second, &config).unwrap(), &pool, &config)
        .await
        .unwrap();

    let got = rows(&pool, table).await;
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].1, "NEW");
    assert_eq!(
        common::names_in(&config.archive_dir),
        vec!["first.xlsx", "second.xlsx"]
    );
}

#[tokio::test]
async fn constraint_violation_rolls_back_the_whole_file() {
    let Some(pool) = pool().await else { return };
    let table = "it_sales_atomic";
    create_table(&pool, table, ",\n            CHECK (salescode <> 'BAD')").await;
    sqlx::query(&format!(
        "INSERT INTO {table} VALUES (1, 'ORIG', DATE '2024-01-01', 1.00, NULL)"
    ))
    .execute(&pool)
    .await
    .unwrap();
    let (_dir, config) = common::layout();
    let config = with_table(config, table);

    let src = common::incoming(&config, "partial.xlsx");
    common::write_xlsx(
        &src,
        &common::HEADERS,
        &[
            vec![
                common::Cell::Num(1.0),
                common::Cell::Str("GOOD"),
                common::Cell::Date(2025, 1, 1),
                common::Cell::Num(5.0),
                common::Cell::Empty,
            ],
            vec![
                common::Cell::Num(2.0),
                common::Cell::Str("BAD"),
                common::Cell::Date(2025, 1, 2),
                common::Cell::Num(6.0),
                common::Cell::Empty,
            ],
        ],
    );
    let done = transform(&src, &config).unwrap();
    let err = load(&done, &pool, &config).await.unwrap_err();

    assert!(matches!(err, LoadError::Database(_)), "{err}");
    let got = rows(&pool, table).await;
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].1, "ORIG");

    assert!(!done.artifact.exists());
    assert!(common::names_in(&config.archive_dir).is_empty());
    let quarantined = config.error_dir.join("partial.xlsx");
    assert!(quarantined.exists());
    assert_eq!(read_note(&quarantined).unwrap().stage, Stage::Load);
}

#[tokio::test]
async fn blocked_load_times_out_and_leaves_table_untouched() {
    let Some(pool) = pool().await else { return };
    let table = "it_sales_timeout";
    create_table(&pool, table, "").await;
    let (_dir, config) = common::layout();
    let config = PipelineConfig {
        load_timeout: Duration::from_millis(500),
        ..with_table(config, table)
    };

    // Hold a conflicting lock so the upsert cannot proceed.
    let mut blocker = pool.begin().await.unwrap();
    sqlx::query(&format!("LOCK TABLE {table} IN ACCESS EXCLUSIVE MODE"))
        .execute(&mut *blocker)
        .await
        .unwrap();

    let src = common::incoming(&config, "slow.xlsx");
    common::write_single(&src, 1, "SC");
    let done = transform(&src, &config).unwrap();
    let err = load(&done, &pool, &config).await.unwrap_err();
    blocker.rollback().await.unwrap();

    assert!(matches!(err, LoadError::Timeout { .. }), "{err}");
    assert!(err.is_transient());
    assert!(rows(&pool, table).await.is_empty());
    assert!(!done.artifact.exists());
    assert!(config.error_dir.join("slow.xlsx").exists());
}

#[tokio::test]
async fn unsafe_table_name_is_rejected_before_touching_the_database() {
    let Some(pool) = pool().await else { return };
    let (_dir, config) = common::layout();
    let config = with_table(config, "sales; DROP TABLE x");

    let src = common::incoming(&config, "x.xlsx");
    common::write_single(&src, 1, "SC");
    let done = transform(&src, &config).unwrap();
    let err = load(&done, &pool, &config).await.unwrap_err();
    assert!(matches!(err, LoadError::InvalidTableName(_)));
    assert!(src.exists(), "configuration errors leave the source in incoming");
    assert!(common::names_in(&config.error_dir).is_empty());
    assert!(!done.artifact.exists());
}

#[tokio::test]
async fn oversized_amount_is_dropped_before_it_reaches_the_database() {
    let Some(pool) = pool().await else { return };
    let table = "it_sales_amount_range";
    create_table(&pool, table, "").await;
    let (_dir, config) = common::layout();
    let config = with_table(config, table);

    let src = common::incoming(&config, "huge.xlsx");
    common::write_xlsx(
        &src,
        &common::HEADERS,
        &[
            vec![
                common::Cell::Num(1.0),
                common::Cell::Str("BIG"),
                common::Cell::Date(2025, 1, 1),
                common::Cell::Num(1e15),
                common::Cell::Empty,
            ],
            vec![
                common::Cell::Num(2.0),
                common::Cell::Str("OK"),
                common::Cell::Date(2025, 1, 2),
                common::Cell::Num(7.0),
                common::Cell::Empty,
            ],
        ],
    );
    let done = transform(&src, &config).unwrap();
    assert_eq!(done.report.kept, 1);
    let outcome = load(&done, &pool, &config).await.unwrap();

    assert_eq!(outcome.rows_loaded, 1);
    let got = rows(&pool, table).await;
    assert_eq!(got.len(), 1);
    assert_eq!((got[0].0, got[0].1.as_str()), (2, "OK"));
}
