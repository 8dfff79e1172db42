//! Flattening cooler trees into detection annotation documents.
//!
//! A cooler tree is walked door by door, emitting one [`AnnotationObject`]
//! per door outline, section, product placement and stacked product. The
//! resulting [`AnnotationDocument`] is rendered to Pascal VOC XML by
//! [`voc_xml::render`].

pub mod voc_xml;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::cooler::{CoolerMetadata, ProductDetection};
use crate::error::CoolerUploadError;
use crate::geometry::{corners_to_bbox, polygon_to_bbox, Rect};

pub const CLASS_DOOR: &str = "door";
pub const CLASS_SECTION: &str = "section";
pub const CLASS_PRODUCT: &str = "product";
pub const CLASS_STACKED_PRODUCT: &str = "stacked_product";

/// Image size assumed when neither the metadata nor the image bytes tell us.
pub const FALLBACK_WIDTH: u32 = 1766;
pub const FALLBACK_HEIGHT: u32 = 4096;
pub const DEFAULT_DEPTH: u32 = 3;

pub const DEFAULT_FOLDER: &str = "cooler-detection";
pub const DEFAULT_DATABASE: &str = "ShelfEx";

/// One labelled rectangle in an annotation document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnotationObject {
    pub class_name: String,
    pub rect: Rect,
    pub attributes: BTreeMap<String, String>,
}

impl AnnotationObject {
    fn new(class_name: &str, rect: Rect) -> Self {
        Self {
            class_name: class_name.to_string(),
            rect,
            attributes: BTreeMap::new(),
        }
    }

    fn product(class_name: &str, rect: Rect, detection: &ProductDetection) -> Self {
        let mut object = Self::new(class_name, rect);
        let fields = [
            ("product_name", &detection.name),
            ("sku_code", &detection.sku_code),
            ("confidence", &detection.confidence),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                object.attributes.insert(key.to_string(), value.clone());
            }
        }
        object
    }
}

/// Ordered annotations for one image plus the image's descriptive metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnotationDocument {
    pub folder: String,
    pub filename: String,
    pub path: String,
    pub database: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub objects: Vec<AnnotationObject>,
}

/// Where the annotated image lives, and what is known about its size.
#[derive(Clone, Debug)]
pub struct DocumentSource<'a> {
    pub filename: &'a str,
    pub path: &'a str,
    /// Size sniffed from the image bytes, used when the tree records none.
    pub detected_size: Option<(u32, u32)>,
}

impl<'a> DocumentSource<'a> {
    pub fn new(filename: &'a str, path: &'a str) -> Self {
        Self {
            filename,
            path,
            detected_size: None,
        }
    }

    pub fn with_detected_size(mut self, size: Option<(u32, u32)>) -> Self {
        self.detected_size = size;
        self
    }
}

/// Flatten a cooler tree into an annotation document.
///
/// Doors with an empty outline are skipped; any other malformed shape fails
/// the whole document with [`CoolerUploadError::InvalidGeometry`].
pub fn build_document(
    tree: &CoolerMetadata,
    source: &DocumentSource<'_>,
) -> Result<AnnotationDocument, CoolerUploadError> {
    let detected = source.detected_size;
    let width = tree
        .recorded_width()
        .or(detected.map(|(width, _)| width))
        .unwrap_or(FALLBACK_WIDTH);
    let height = tree
        .recorded_height()
        .or(detected.map(|(_, height)| height))
        .unwrap_or(FALLBACK_HEIGHT);

    let mut objects = Vec::with_capacity(count_annotations(tree));

    for (door_name, door) in &tree.doors {
        if !door.outline().is_empty() {
            let rect = polygon_to_bbox(door.outline()).map_err(|err| locate(err, door_name))?;
            objects.push(AnnotationObject::new(CLASS_DOOR, rect));
        }

        for (section_idx, section) in door.sections().iter().enumerate() {
            let rect = polygon_to_bbox(section.outline())
                .map_err(|err| locate(err, &format!("{door_name} section {}", section_idx + 1)))?;
            objects.push(AnnotationObject::new(CLASS_SECTION, rect));

            for (product_idx, product) in section.products().iter().enumerate() {
                let context = format!(
                    "{door_name} section {} product {}",
                    section_idx + 1,
                    product_idx + 1
                );
                let rect = corners_to_bbox(product.detection.corners())
                    .map_err(|err| locate(err, &context))?;
                objects.push(AnnotationObject::product(
                    CLASS_PRODUCT,
                    rect,
                    &product.detection,
                ));

                for (stacked_idx, stacked) in product.stacked().iter().enumerate() {
                    let rect = corners_to_bbox(stacked.detection.corners()).map_err(|err| {
                        locate(err, &format!("{context} stacked {}", stacked_idx + 1))
                    })?;
                    objects.push(AnnotationObject::product(
                        CLASS_STACKED_PRODUCT,
                        rect,
                        &stacked.detection,
                    ));
                }
            }
        }
    }

    Ok(AnnotationDocument {
        folder: DEFAULT_FOLDER.to_string(),
        filename: source.filename.to_string(),
        path: source.path.to_string(),
        database: DEFAULT_DATABASE.to_string(),
        width,
        height,
        depth: DEFAULT_DEPTH,
        objects,
    })
}

/// Number of objects [`build_document`] emits for `tree`.
pub fn count_annotations(tree: &CoolerMetadata) -> usize {
    tree.doors
        .iter()
        .map(|(_, door)| {
            let door_object = usize::from(!door.outline().is_empty());
            let nested: usize = door
                .sections()
                .iter()
                .map(|section| {
                    1 + section
                        .products()
                        .iter()
                        .map(|product| 1 + product.stacked().len())
                        .sum::<usize>()
                })
                .sum();
            door_object + nested
        })
        .sum()
}

/// Annotation file name for an uploaded image: the image stem plus `.xml`.
pub fn annotation_filename(image_filename: &str) -> String {
    Path::new(image_filename)
        .with_extension(voc_xml::VOC_XML_EXTENSION)
        .to_string_lossy()
        .into_owned()
}

fn locate(err: CoolerUploadError, context: &str) -> CoolerUploadError {
    match err {
        CoolerUploadError::InvalidGeometry(message) => {
            CoolerUploadError::InvalidGeometry(format!("{context}: {message}"))
        }
        other => other,
    }
}
