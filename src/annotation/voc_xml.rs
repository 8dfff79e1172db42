//! Pascal VOC XML rendering for annotation documents.
//!
//! Bounding boxes are written as rounded integer XYXY pixel coordinates,
//! which is what the dataset service's VOC importer expects.

use std::fmt::Write as _;

use super::{AnnotationDocument, AnnotationObject};

pub const VOC_XML_EXTENSION: &str = "xml";

/// Render a document as a Pascal VOC `<annotation>` string.
pub fn render(document: &AnnotationDocument) -> String {
    let mut xml = String::new();
    write_document(&mut xml, document).expect("write to string");
    xml
}

fn write_document(xml: &mut String, document: &AnnotationDocument) -> std::fmt::Result {
    writeln!(xml, "<?xml version=\"1.0\" encoding=\"utf-8\"?>")?;
    writeln!(xml, "<annotation>")?;
    writeln!(xml, "  <folder>{}</folder>", xml_escape(&document.folder))?;
    writeln!(xml, "  <filename>{}</filename>", xml_escape(&document.filename))?;
    writeln!(xml, "  <path>{}</path>", xml_escape(&document.path))?;
    writeln!(xml, "  <source>")?;
    writeln!(xml, "    <database>{}</database>", xml_escape(&document.database))?;
    writeln!(xml, "  </source>")?;
    writeln!(xml, "  <size>")?;
    writeln!(xml, "    <width>{}</width>", document.width)?;
    writeln!(xml, "    <height>{}</height>", document.height)?;
    writeln!(xml, "    <depth>{}</depth>", document.depth)?;
    writeln!(xml, "  </size>")?;
    writeln!(xml, "  <segmented>0</segmented>")?;

    for object in &document.objects {
        write_object(xml, object)?;
    }

    writeln!(xml, "</annotation>")
}

fn write_object(xml: &mut String, object: &AnnotationObject) -> std::fmt::Result {
    let (xmin, ymin, xmax, ymax) = object.rect.rounded_xyxy();

    writeln!(xml, "  <object>")?;
    writeln!(xml, "    <name>{}</name>", xml_escape(&object.class_name))?;
    writeln!(xml, "    <pose>Unspecified</pose>")?;
    writeln!(xml, "    <truncated>0</truncated>")?;
    writeln!(xml, "    <difficult>0</difficult>")?;
    writeln!(xml, "    <bndbox>")?;
    writeln!(xml, "      <xmin>{xmin}</xmin>")?;
    writeln!(xml, "      <ymin>{ymin}</ymin>")?;
    writeln!(xml, "      <xmax>{xmax}</xmax>")?;
    writeln!(xml, "      <ymax>{ymax}</ymax>")?;
    writeln!(xml, "    </bndbox>")?;

    if !object.attributes.is_empty() {
        writeln!(xml, "    <attributes>")?;
        for (key, value) in &object.attributes {
            let tag = element_name(key);
            writeln!(xml, "      <{tag}>{}</{tag}>", xml_escape(value))?;
        }
        writeln!(xml, "    </attributes>")?;
    }

    writeln!(xml, "  </object>")
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Attribute keys become element names; anything outside `[A-Za-z0-9_.-]`
/// is replaced so the output stays well-formed.
fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}
