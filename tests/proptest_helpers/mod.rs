#![allow(dead_code)]

use cooler_upload::geometry::Point;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use serde_json::{json, Map, Value};

pub const EPS_GEOMETRY: f64 = 1e-9;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_coord() -> BoxedStrategy<f64> {
    (-10_000.0f64..10_000.0).boxed()
}

pub fn arb_point() -> BoxedStrategy<Point> {
    (arb_coord(), arb_coord())
        .prop_map(|(x, y)| Point::new(x, y))
        .boxed()
}

pub fn arb_polygon(min_points: usize, max_points: usize) -> BoxedStrategy<Vec<Point>> {
    proptest::collection::vec(arb_point(), min_points..=max_points).boxed()
}

/// Four corners paired with an arbitrary reordering of the same corners.
pub fn arb_shuffled_corners() -> BoxedStrategy<(Vec<Point>, Vec<Point>)> {
    arb_polygon(4, 4)
        .prop_flat_map(|corners| (Just(corners.clone()), Just(corners).prop_shuffle()))
        .boxed()
}

fn points_json(points: &[Point]) -> Value {
    Value::Array(points.iter().map(|p| json!([p.x, p.y])).collect())
}

fn detection_json(corners: &[Point], name: &str, sku: u16, confidence: u16) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("product".to_string(), json!(name));
    map.insert("SKU-Code".to_string(), json!(format!("shelfscan_{sku:05}")));
    map.insert("Confidence".to_string(), json!(f64::from(confidence) / 1000.0));
    map.insert("Bounding-Box".to_string(), points_json(corners));
    map
}

fn arb_detection() -> BoxedStrategy<Map<String, Value>> {
    (
        arb_polygon(4, 4),
        proptest::string::string_regex("[A-Z_]{1,12}").expect("valid product regex"),
        any::<u16>(),
        0u16..=1000,
    )
        .prop_map(|(corners, name, sku, confidence)| {
            detection_json(&corners, &name, sku, confidence)
        })
        .boxed()
}

fn arb_product() -> BoxedStrategy<Value> {
    (arb_detection(), proptest::collection::vec(arb_detection(), 0..=2))
        .prop_map(|(mut product, stacked)| {
            if !stacked.is_empty() {
                product.insert(
                    "stacked".to_string(),
                    Value::Array(stacked.into_iter().map(Value::Object).collect()),
                );
            }
            Value::Object(product)
        })
        .boxed()
}

fn arb_section() -> BoxedStrategy<Value> {
    (arb_polygon(1, 6), proptest::collection::vec(arb_product(), 0..=3))
        .prop_map(|(outline, products)| {
            json!({ "data": points_json(&outline), "products": products })
        })
        .boxed()
}

fn arb_door() -> BoxedStrategy<Value> {
    (arb_polygon(0, 6), proptest::collection::vec(arb_section(), 0..=3))
        .prop_map(|(outline, sections)| {
            json!({ "data": points_json(&outline), "Sections": sections })
        })
        .boxed()
}

/// Record metadata holding a buildable cooler tree with up to `max_doors` doors.
pub fn arb_cooler_metadata(max_doors: usize) -> BoxedStrategy<Value> {
    proptest::collection::vec(arb_door(), 0..=max_doors)
        .prop_map(|doors| {
            let cooler: Map<String, Value> = doors
                .into_iter()
                .enumerate()
                .map(|(idx, door)| (format!("Door-{}", idx + 1), door))
                .collect();
            json!({ "Cooler": Value::Object(cooler) })
        })
        .boxed()
}
