//! Fuzz target for cooler metadata parsing and annotation building.
//!
//! Arbitrary bytes are parsed as a cooler tree; trees that parse are
//! flattened and rendered, checking for panics, crashes, or hangs.

#![no_main]

use cooler_upload::annotation::{build_document, count_annotations, voc_xml, DocumentSource};
use cooler_upload::cooler::CoolerMetadata;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid excessive memory usage.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(tree) = CoolerMetadata::from_json_slice(data) else {
        return;
    };
    if let Ok(document) = build_document(&tree, &DocumentSource::new("fuzz.jpg", "http://x/fuzz.jpg")) {
        assert_eq!(document.objects.len(), count_annotations(&tree));
        let _ = voc_xml::render(&document);
    }
});
