//! Sheet identifier: barcode/QR lookup and payload parsing.
//!
//! The symbol is searched on the whole sheet first, then inside the region
//! where templates usually print it. Nothing further is attempted. A payload
//! field that does not parse only nulls that field.

use std::sync::LazyLock;

use opencv::core::{Mat, Rect};
use opencv::objdetect::{BarcodeDetector, QRCodeDetector};
use opencv::prelude::*;
use regex::Regex;
use serde::Serialize;

use crate::config::{IdentifierConfig, RelRect};
use crate::errors::SheetError;

/// Structured fields of a decoded payload. Missing or malformed fields are
/// `None`, never defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetIdentifier {
    #[serde(rename = "id_examen")]
    pub exam_id: Option<u64>,
    #[serde(rename = "id_alumno")]
    pub student_id: Option<u64>,
    #[serde(rename = "fecha_qr")]
    pub date: Option<String>,
}

/// Something that can find and decode one symbol in an image.
pub trait SymbolReader {
    fn read(&self, image: &Mat) -> opencv::Result<Option<String>>;
}

/// QR codes first, then 1D barcodes.
pub struct OpenCvSymbolReader {
    qr: QRCodeDetector,
    barcode: BarcodeDetector,
}

impl OpenCvSymbolReader {
    pub fn new() -> opencv::Result<Self> {
        Ok(Self {
            qr: QRCodeDetector::default()?,
            barcode: BarcodeDetector::default()?,
        })
    }
}

fn non_empty(bytes: Vec<u8>) -> Option<String> {
    let text = String::from_utf8_lossy(&bytes).trim().to_string();
    (!text.is_empty()).then_some(text)
}

impl SymbolReader for OpenCvSymbolReader {
    fn read(&self, image: &Mat) -> opencv::Result<Option<String>> {
        if let Some(text) = non_empty(self.qr.detect_and_decode_def(image)?) {
            return Ok(Some(text));
        }
        Ok(non_empty(self.barcode.detect_and_decode_def(image)?))
    }
}

fn region_rect(region: RelRect, image: &Mat) -> Rect {
    let (w, h) = (image.cols() as f64, image.rows() as f64);
    let x = (region.x0 * w) as i32;
    let y = (region.y0 * h) as i32;
    Rect::new(
        x,
        y,
        ((region.width * w) as i32).min(image.cols() - x),
        ((region.height * h) as i32).min(image.rows() - y),
    )
}

fn read_logged(reader: &dyn SymbolReader, image: &Mat, what: &str) -> Option<String> {
    match reader.read(image) {
        Ok(found) => found,
        Err(e) => {
            log::warn!("symbol reader failed on {what}: {}", e.message);
            None
        }
    }
}

/// Find the raw payload: full image, then the configured search region.
pub fn find_payload(
    reader: &dyn SymbolReader,
    image: &Mat,
    config: &IdentifierConfig,
) -> Result<String, SheetError> {
    if let Some(payload) = read_logged(reader, image, "full sheet") {
        return Ok(payload);
    }
    let rect = region_rect(config.search_region, image);
    if rect.width > 0 && rect.height > 0 {
        match Mat::roi(image, rect).and_then(|roi| roi.try_clone()) {
            Ok(crop) => {
                if let Some(payload) = read_logged(reader, &crop, "search region") {
                    return Ok(payload);
                }
            }
            Err(e) => log::warn!("cannot crop symbol search region: {}", e.message),
        }
    }
    Err(SheetError::IdentifierNotFound)
}

fn parse_int(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

fn parse_text(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

static TOKEN_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^EXAM(\d+)ALU(\d+)(?:FECHA(\d+))?$").expect("token pattern is valid")
});

/// Parse `examId<delim>studentId<delim>date` or
/// `EXAM<digits>ALU<digits>FECHA<digits>`. A payload in neither form yields
/// an identifier with every field `None`.
pub fn parse_payload(payload: &str, delimiter: char) -> SheetIdentifier {
    let payload = payload.trim();
    if payload.contains(delimiter) {
        let mut parts = payload.split(delimiter);
        return SheetIdentifier {
            exam_id: parts.next().and_then(parse_int),
            student_id: parts.next().and_then(parse_int),
            date: parse_text(parts.next()),
        };
    }
    match TOKEN_PAYLOAD.captures(payload) {
        Some(caps) => SheetIdentifier {
            exam_id: caps.get(1).and_then(|m| parse_int(m.as_str())),
            student_id: caps.get(2).and_then(|m| parse_int(m.as_str())),
            date: caps.get(3).map(|m| m.as_str().to_string()),
        },
        None => SheetIdentifier::default(),
    }
}
