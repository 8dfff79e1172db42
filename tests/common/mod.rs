#![allow(dead_code)]

use std::io::Cursor;

use cooler_upload::normalize::RawRecord;
use cooler_upload::project::ProjectHandle;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([20, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn one_door_metadata() -> Value {
    json!({
        "Cooler": {
            "Door-1": {
                "data": [[0, 0], [0, 10], [10, 10], [10, 0]],
                "Sections": []
            }
        }
    })
}

pub fn record(url: &str, metadata: Value) -> RawRecord {
    RawRecord::new(url, metadata)
}

pub fn project() -> ProjectHandle {
    ProjectHandle {
        id: "coolerdata-2025-10-14".to_string(),
        name: "CoolerData 2025-10-14".to_string(),
        is_new: false,
        date_key: "2025-10-14".to_string(),
    }
}
