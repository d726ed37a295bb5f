//! Security tests for SQL injection prevention in identifiers and filter values

mod common;

use houm_insight::catalog::ExtractionRule;
use houm_insight::predicate::sql::render_predicate;
use houm_insight::predicate::Param;
use houm_insight::prelude::*;
use houm_insight::security::SqlSecurity;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

const HOSTILE_NAMES: [&str; 8] = [
    "listings; DROP TABLE listings; --",
    "listings' UNION SELECT * FROM users --",
    "listings--comment",
    "listings/*comment*/",
    "listings' OR '1'='1",
    "listings\"inside",
    "listings\nDROP",
    "",
];

#[tokio::test]
async fn test_hostile_table_names_rejected_by_datafusion_executor() {
    for name in HOSTILE_NAMES {
        let ctx = DataFusionExecutor::create_context();
        let result = DataFusionExecutor::new(ctx, name, None);
        assert!(result.is_err(), "should reject table name {name:?}");
    }
}

#[tokio::test]
async fn test_hostile_table_names_rejected_by_catalog() {
    for name in HOSTILE_NAMES {
        let config = CatalogConfig::listings().with_table(name);
        let err = FieldCatalog::from_config(config, &BTreeSet::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration, "table name {name:?}");
    }
}

#[tokio::test]
async fn test_hostile_column_in_catalog_config_rejected() {
    let mut config = CatalogConfig::listings();
    config.fields[0].extraction = ExtractionRule::Direct {
        column: "price) OR (1=1".to_string(),
    };
    let err = FieldCatalog::from_config(config, &BTreeSet::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = Engine::bootstrap(
        Arc::new(common::in_memory(common::listings())),
        CatalogConfig::listings(),
        EngineConfig::default().with_table("listings; DROP TABLE listings"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_valid_identifiers_accepted() {
    for name in ["listings", "hemnet_items", "_staging", "public.listings", "t2024"] {
        assert!(SqlSecurity::validate_identifier(name).is_ok(), "{name}");
    }
    assert!(SqlSecurity::validate_column("public.listings").is_err());
    assert_eq!(
        SqlSecurity::escape_identifier("public.listings").unwrap(),
        "\"public\".\"listings\""
    );
}

#[tokio::test]
async fn test_filter_values_are_bound_not_spliced() {
    let catalog = FieldCatalog::from_config(CatalogConfig::listings(), &BTreeSet::new()).unwrap();
    let hostile = "Stockholm'; DROP TABLE listings; --";
    let spec = FilterSpec::new()
        .with("municipalities", json!([hostile]))
        .with("districts", json!(["x') OR ('1'='1"]))
        .with("min_price", "1 OR 1=1");

    let predicate = compile(&spec, &catalog);
    let fragment = render_predicate(&predicate).unwrap();

    assert!(!fragment.sql.contains("DROP"));
    assert!(!fragment.sql.contains("'1'='1"));
    assert_eq!(fragment.params.len(), 2);
    assert_eq!(fragment.params[0], Param::Text(hostile.to_string()));
}

#[tokio::test]
async fn test_injection_attempt_matches_nothing_and_leaves_table_intact() {
    let ctx = DataFusionExecutor::create_context();
    ctx.register_table("listings", Arc::new(common::listings_table()))
        .unwrap();
    let engine = Engine::with_datafusion(ctx, CatalogConfig::listings(), EngineConfig::default())
        .await
        .unwrap();

    let request = EstimateRequest::new(
        FilterSpec::new().with("municipalities", "Stockholm' OR '1'='1"),
    )
    .with_tag_fields(Vec::<String>::new())
    .with_numeric_fields(Vec::<String>::new());
    let report = engine.estimate(request).await.unwrap();
    assert_eq!(report.filtered_count, 0);
    assert_eq!(report.total_count, 10);

    let report = engine.estimate(EstimateRequest::default()).await.unwrap();
    assert_eq!(report.total_count, 10);
}
