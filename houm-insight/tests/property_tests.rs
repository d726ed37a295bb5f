//! Property-based tests for filter compilation and estimation.
//!
//! Listings are generated with random prices and municipalities, then run
//! through the in-memory engine. The properties checked hold for any data:
//! the filtered population never exceeds the whole, shares stay within
//! `[0, 1]` and histograms account for every counted value.

mod common;

use houm_insight::predicate::compile;
use houm_insight::predicate::sql::render_predicate;
use houm_insight::prelude::*;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;

const MUNICIPALITIES: [&str; 4] = ["Stockholm", "Solna", "Uppsala", "Nacka"];

fn listing_strategy() -> impl Strategy<Value = Vec<(Option<i64>, Option<usize>)>> {
    prop::collection::vec(
        (
            prop::option::of(100_000i64..20_000_000),
            prop::option::of(0usize..MUNICIPALITIES.len()),
        ),
        0..60,
    )
}

fn rows(listings: &[(Option<i64>, Option<usize>)]) -> Vec<Value> {
    listings
        .iter()
        .enumerate()
        .map(|(i, (price, municipality))| {
            json!({
                "hemnet_id": i,
                "price": price,
                "municipality_name": municipality.map(|m| MUNICIPALITIES[m]),
            })
        })
        .collect()
}

fn catalog() -> FieldCatalog {
    FieldCatalog::from_config(CatalogConfig::listings(), &BTreeSet::new()).unwrap()
}

proptest! {
    /// The filtered count matches an independent count and never exceeds
    /// the total.
    #[test]
    fn test_filtered_within_total(
        listings in listing_strategy(),
        min_price in prop::option::of(0i64..20_000_000),
        max_price in prop::option::of(0i64..20_000_000),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let engine = common::engine(rows(&listings)).await;
            let mut filters = FilterSpec::new();
            if let Some(min) = min_price {
                filters = filters.with("min_price", min);
            }
            if let Some(max) = max_price {
                filters = filters.with("max_price", max);
            }

            let report = engine
                .estimate(EstimateRequest::new(filters).with_numeric_fields(["price"]))
                .await
                .unwrap();

            let expected = listings
                .iter()
                .filter(|(price, _)| match price {
                    Some(p) => {
                        min_price.map_or(true, |m| *p >= m) && max_price.map_or(true, |m| *p <= m)
                    }
                    None => min_price.is_none() && max_price.is_none(),
                })
                .count() as u64;

            prop_assert_eq!(report.total_count, listings.len() as u64);
            prop_assert_eq!(report.filtered_count, expected);
            prop_assert!(report.filtered_count <= report.total_count);

            let price = report.numeric_distributions["price"].ready().unwrap();
            prop_assert!(price.count <= report.filtered_count);
            if !price.histogram.is_empty() {
                let total: u64 = price.histogram.iter().map(|b| b.count).sum();
                prop_assert_eq!(total, price.count);
                prop_assert_eq!(price.histogram.len(), report.bins);
            }
            Ok(())
        })?;
    }

    /// Shares are within `[0, 1]` and, for a single-valued field, sum to at
    /// most one.
    #[test]
    fn test_shares_are_bounded(
        listings in listing_strategy(),
        selected in prop::collection::vec(0usize..MUNICIPALITIES.len(), 0..3),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let engine = common::engine(rows(&listings)).await;
            let names: Vec<&str> = selected.iter().map(|i| MUNICIPALITIES[*i]).collect();
            let filters = FilterSpec::new().with("municipalities", json!(names));
            let request = EstimateRequest::new(filters)
                .with_tag_fields(["municipality_name"])
                .with_numeric_fields(Vec::<String>::new());

            let report = engine.estimate(request).await.unwrap();
            let prevalence = report.tag_prevalence["municipality_name"].ready().unwrap();

            for observations in [&prevalence.overall, &prevalence.filtered] {
                for o in observations.iter() {
                    prop_assert!((0.0..=1.0).contains(&o.share));
                    prop_assert!(o.distinct_item_count > 0);
                }
                let sum: f64 = observations.iter().map(|o| o.share).sum();
                prop_assert!(sum <= 1.0 + 1e-9);
            }
            if !names.is_empty() {
                for o in &prevalence.filtered {
                    prop_assert!(names.contains(&o.tag_value.as_str()));
                }
            }
            Ok(())
        })?;
    }

    /// Compilation is deterministic and every bound parameter gets a
    /// placeholder.
    #[test]
    fn test_compile_is_deterministic(
        min_rooms in prop::option::of(-5.0f64..50.0),
        max_year in prop::option::of(1800i64..2100),
        districts in prop::collection::vec("[A-Za-z ]{0,12}", 0..5),
        upcoming in any::<bool>(),
    ) {
        let catalog = catalog();
        let mut spec = FilterSpec::new()
            .with("districts", json!(districts))
            .with("prefer_upcoming", upcoming);
        if let Some(v) = min_rooms {
            spec = spec.with("min_rooms", v);
        }
        if let Some(v) = max_year {
            spec = spec.with("max_year", v);
        }

        let first = compile(&spec, &catalog);
        let second = compile(&spec, &catalog);
        prop_assert_eq!(&first, &second);

        let fragment = render_predicate(&first).unwrap();
        prop_assert_eq!(&fragment.params, &first.bound_parameters());
        if !fragment.params.is_empty() {
            let last = format!("${}", fragment.params.len());
            prop_assert!(fragment.sql.contains(&last));
        }
        prop_assert_eq!(first.is_match_all(), fragment.sql == "TRUE");
    }
}
