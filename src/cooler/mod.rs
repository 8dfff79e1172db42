//! Typed model of cooler layout metadata.
//!
//! A cooler tree nests doors, shelf sections, product placements and the
//! products stacked on top of them:
//!
//! ```text
//! { "Cooler": { "Door-1": { "data": [[x, y], ...],
//!                           "Sections": [ { "data": [...],
//!                                           "products": [ { "product": "...",
//!                                                           "Bounding-Box": [[x, y] x4],
//!                                                           "stacked": [ ... ] } ] } ] } },
//!   "dimensions": { "width": 2448, "height": 3264 } }
//! ```
//!
//! Optional collections (`Sections`, `products`, `stacked`) may be missing or
//! `null` and are then treated as empty. Door order follows the order of keys
//! in the source JSON object.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::geometry::Point;

/// Root of a cooler metadata tree.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CoolerMetadata {
    /// Doors in source order, keyed by their name (e.g. `Door-1`).
    #[serde(rename = "Cooler", default, deserialize_with = "ordered_doors")]
    pub doors: Vec<(String, Door)>,
    /// Photo dimensions, when the producer recorded them.
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
}

/// Image dimensions recorded alongside the cooler tree.
///
/// Either axis may be missing; a zero counts as missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Dimensions {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// One cooler door with its outline and shelf sections.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Door {
    #[serde(default)]
    data: Option<Vec<Point>>,
    #[serde(rename = "Sections", default)]
    sections: Option<Vec<Section>>,
}

/// A shelf section inside a door.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Section {
    #[serde(default)]
    data: Option<Vec<Point>>,
    #[serde(default)]
    products: Option<Vec<Product>>,
}

/// A detected product placement on a shelf.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Product {
    #[serde(flatten)]
    pub detection: ProductDetection,
    #[serde(default)]
    stacked: Option<Vec<StackedProduct>>,
}

/// A product stacked on top of another placement.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct StackedProduct {
    #[serde(flatten)]
    pub detection: ProductDetection,
}

/// Fields shared by placed and stacked products.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ProductDetection {
    #[serde(rename = "product", default)]
    pub name: Option<String>,
    #[serde(rename = "SKU-Code", default, deserialize_with = "lenient_text")]
    pub sku_code: Option<String>,
    #[serde(rename = "Confidence", default, deserialize_with = "lenient_text")]
    pub confidence: Option<String>,
    #[serde(rename = "Bounding-Box", default)]
    bounding_box: Option<Vec<Point>>,
}

impl CoolerMetadata {
    /// Extract the cooler tree from a record's free-form metadata.
    ///
    /// Returns `Ok(None)` when the metadata carries no `Cooler` key, and an
    /// error when the key is present but does not describe a valid tree.
    pub fn from_metadata(metadata: &Value) -> Result<Option<Self>, serde_json::Error> {
        if metadata.get("Cooler").is_none() {
            return Ok(None);
        }
        Self::deserialize(metadata).map(Some)
    }

    /// Parse a cooler tree from raw JSON bytes.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Recorded photo width, ignoring zero placeholders.
    pub fn recorded_width(&self) -> Option<u32> {
        self.dimensions
            .and_then(|dims| dims.width)
            .filter(|&width| width > 0)
    }

    /// Recorded photo height, ignoring zero placeholders.
    pub fn recorded_height(&self) -> Option<u32> {
        self.dimensions
            .and_then(|dims| dims.height)
            .filter(|&height| height > 0)
    }
}

impl Door {
    /// Door outline polygon (empty when absent).
    pub fn outline(&self) -> &[Point] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Shelf sections in source order (empty when absent).
    pub fn sections(&self) -> &[Section] {
        self.sections.as_deref().unwrap_or_default()
    }
}

impl Section {
    /// Section outline polygon (empty when absent).
    pub fn outline(&self) -> &[Point] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Product placements in source order (empty when absent).
    pub fn products(&self) -> &[Product] {
        self.products.as_deref().unwrap_or_default()
    }
}

impl Product {
    /// Products stacked on this placement (empty when absent or null).
    pub fn stacked(&self) -> &[StackedProduct] {
        self.stacked.as_deref().unwrap_or_default()
    }
}

impl ProductDetection {
    /// Four-corner bounding box (empty when absent).
    pub fn corners(&self) -> &[Point] {
        self.bounding_box.as_deref().unwrap_or_default()
    }
}

fn ordered_doors<'de, D>(deserializer: D) -> Result<Vec<(String, Door)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct DoorsVisitor;

    impl<'de> Visitor<'de> for DoorsVisitor {
        type Value = Vec<(String, Door)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object mapping door names to doors")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut doors = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, door)) = map.next_entry::<String, Door>()? {
                doors.push((name, door));
            }
            Ok(doors)
        }
    }

    deserializer.deserialize_any(DoorsVisitor)
}

/// Accept strings, numbers and booleans as text; `null` becomes `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(Value::Bool(flag)) => Ok(Some(flag.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected text or number, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doors_keep_source_order() {
        let metadata = json!({
            "Cooler": {
                "Door-2": { "data": [[0, 0]] },
                "Door-10": { "data": [[1, 1]] },
                "Door-1": { "data": [[2, 2]] }
            }
        });
        let tree = CoolerMetadata::from_metadata(&metadata)
            .expect("parse")
            .expect("tree present");
        let names: Vec<&str> = tree.doors.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["Door-2", "Door-10", "Door-1"]);
    }

    #[test]
    fn missing_cooler_key_means_no_tree() {
        assert_eq!(CoolerMetadata::from_metadata(&json!({})).expect("parse"), None);
    }

    #[test]
    fn optional_collections_default_to_empty() {
        let metadata = json!({
            "Cooler": {
                "Door-1": {
                    "data": [[0, 0], [4, 4]],
                    "Sections": [
                        { "data": [[0, 0], [2, 2]], "products": null },
                        { "data": [[0, 0], [2, 2]], "products": [
                            { "product": "COLA", "Bounding-Box": [[0,0],[0,1],[1,1],[1,0]], "stacked": null }
                        ] }
                    ]
                },
                "Door-2": { "Sections": null }
            }
        });
        let tree = CoolerMetadata::from_metadata(&metadata)
            .expect("parse")
            .expect("tree present");

        let (_, first) = &tree.doors[0];
        assert_eq!(first.sections().len(), 2);
        assert!(first.sections()[0].products().is_empty());
        assert!(first.sections()[1].products()[0].stacked().is_empty());

        let (_, second) = &tree.doors[1];
        assert!(second.outline().is_empty());
        assert!(second.sections().is_empty());
    }

    #[test]
    fn product_fields_accept_strings_or_numbers() {
        let product: Product = serde_json::from_value(json!({
            "product": "PEPSI_COLA_750ML_PET",
            "SKU-Code": "shelfscan_00144",
            "Confidence": 0.94,
            "Position": "6",
            "stackSize": 0,
            "Bounding-Box": [[1, 2], [1, 4], [3, 4], [3, 2]]
        }))
        .expect("parse product");

        assert_eq!(product.detection.name.as_deref(), Some("PEPSI_COLA_750ML_PET"));
        assert_eq!(product.detection.confidence.as_deref(), Some("0.94"));
        assert_eq!(product.detection.sku_code.as_deref(), Some("shelfscan_00144"));
        assert_eq!(product.detection.corners().len(), 4);
    }

    #[test]
    fn malformed_points_are_rejected() {
        let metadata = json!({ "Cooler": { "Door-1": { "data": [["a", "b"]] } } });
        assert!(CoolerMetadata::from_metadata(&metadata).is_err());
    }

    #[test]
    fn zero_dimensions_are_ignored() {
        let tree: CoolerMetadata =
            serde_json::from_value(json!({ "dimensions": { "width": 0, "height": 3264 } }))
                .expect("parse");
        assert_eq!(tree.recorded_width(), None);
        assert_eq!(tree.recorded_height(), Some(3264));
    }

    #[test]
    fn partial_dimensions_parse() {
        let tree: CoolerMetadata =
            serde_json::from_value(json!({ "dimensions": { "width": 2448 } })).expect("parse");
        assert_eq!(tree.recorded_width(), Some(2448));
        assert_eq!(tree.recorded_height(), None);

        let tree: CoolerMetadata =
            serde_json::from_value(json!({ "dimensions": { "height": null } })).expect("parse");
        assert_eq!(tree.recorded_width(), None);
        assert_eq!(tree.recorded_height(), None);
    }
}
