use opencv::core::{self, Mat, Point, Rect, Scalar, Vector};
use opencv::imgcodecs::imencode;
use opencv::imgproc;

use sheetscan_lib::config::{FillMetric, RelRect, ScanConfig};
use sheetscan_lib::identifier::{OpenCvSymbolReader, SymbolReader};
use sheetscan_lib::layout::{CellGeometry, Choice, Layout};
use sheetscan_lib::pipeline::{scan_sheet, ScanContext, ScanOptions};
use sheetscan_lib::{AnswerResult, ScanError, SheetTemplate};

const WIDTH: i32 = 1240;
const HEIGHT: i32 = 1754;

/// Corner squares whose centres land on the inset frame corners.
const MARKERS: [Rect; 4] = [
    Rect {
        x: 50,
        y: 50,
        width: 40,
        height: 40,
    },
    Rect {
        x: 1150,
        y: 50,
        width: 40,
        height: 40,
    },
    Rect {
        x: 50,
        y: 1664,
        width: 40,
        height: 40,
    },
    Rect {
        x: 1150,
        y: 1664,
        width: 40,
        height: 40,
    },
];

/// Pencil mark covering option B of the single question row once the sheet
/// is mapped into the corrected frame.
const MARK_B: Rect = Rect {
    x: 385,
    y: 535,
    width: 100,
    height: 70,
};

/// One question, options A-D, in a band at 30% of the corrected height.
fn one_row_layout() -> Layout {
    Layout {
        questions: 1,
        options: Choice::ALL.to_vec(),
        columns: 1,
        zone: RelRect {
            x0: 0.2,
            y0: 0.3,
            width: 0.4,
            height: 0.05,
        },
        cells: CellGeometry::Uniform,
    }
}

/// Large solid marks hollow out under adaptive thresholding, so the
/// shared-template tests score by darkness.
fn one_row_template() -> SheetTemplate {
    let mut config = ScanConfig::default();
    config.grid.metric = FillMetric::Darkness;
    SheetTemplate::new("single-row", one_row_layout(), config).unwrap()
}

fn sheet(markers: &[Rect], marks: &[Rect]) -> Mat {
    let mut mat = Mat::new_rows_cols_with_default(HEIGHT, WIDTH, core::CV_8UC3, Scalar::all(255.0)).unwrap();
    for &rect in markers.iter().chain(marks) {
        imgproc::rectangle(&mut mat, rect, Scalar::all(0.0), imgproc::FILLED, imgproc::LINE_8, 0).unwrap();
    }
    mat
}

fn png(mat: &Mat) -> Vec<u8> {
    let mut buf: Vector<u8> = Vector::new();
    imencode(".png", mat, &mut buf, &Vector::new()).unwrap();
    buf.to_vec()
}

fn sheet_png(markers: &[Rect], marks: &[Rect]) -> Vec<u8> {
    png(&sheet(markers, marks))
}

fn reader() -> OpenCvSymbolReader {
    OpenCvSymbolReader::new().unwrap()
}

#[test]
fn marked_b_with_four_markers() {
    let bytes = sheet_png(&MARKERS, &[MARK_B]);
    let result = scan_sheet(&bytes, &one_row_template(), &reader(), ScanOptions::default()).unwrap();

    assert!(result.warp_ok);
    assert_eq!(result.respuestas, vec![AnswerResult::Clear(Choice::B)]);
    assert_eq!(result.codigo, None);
    assert_eq!(result.identifier.exam_id, None);
    assert_eq!(result.debug_image, None);

    let json = serde_json::to_value(sheetscan_lib::ScanResponse::from(Ok(result))).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["warp_ok"], true);
    assert_eq!(json["respuestas"], serde_json::json!(["B"]));
}

#[test]
fn filled_bubble_under_default_thresholds() {
    let template = SheetTemplate::new("single-row-default", one_row_layout(), ScanConfig::default()).unwrap();
    // a pencilled bubble narrower than the adaptive block stays solid ink
    let mut mat = sheet(&MARKERS, &[]);
    imgproc::circle(
        &mut mat,
        Point::new(434, 570),
        9,
        Scalar::all(0.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )
    .unwrap();

    let result = scan_sheet(&png(&mat), &template, &reader(), ScanOptions::default()).unwrap();
    assert!(result.warp_ok);
    assert_eq!(result.respuestas, vec![AnswerResult::Clear(Choice::B)]);

    let blank = scan_sheet(&sheet_png(&MARKERS, &[]), &template, &reader(), ScanOptions::default()).unwrap();
    assert_eq!(blank.respuestas, vec![AnswerResult::Blank]);
}

#[test]
fn unmarked_row_is_blank() {
    let bytes = sheet_png(&MARKERS, &[]);
    let result = scan_sheet(&bytes, &one_row_template(), &reader(), ScanOptions::default()).unwrap();
    assert!(result.warp_ok);
    assert_eq!(result.respuestas, vec![AnswerResult::Blank]);
}

#[test]
fn partial_markers_fall_back() {
    let template = one_row_template();
    let reader = reader();
    for found in 0..4 {
        let bytes = sheet_png(&MARKERS[..found], &[MARK_B]);
        let result = scan_sheet(&bytes, &template, &reader, ScanOptions::default()).unwrap();
        assert!(!result.warp_ok, "{found} markers");
        assert_eq!(result.respuestas.len(), 1);
    }
}

#[test]
fn same_bytes_same_result() {
    let bytes = sheet_png(&MARKERS[..3], &[MARK_B]);
    let template = one_row_template();
    let reader = reader();
    let options = ScanOptions { debug: true };

    let first = scan_sheet(&bytes, &template, &reader, options).unwrap();
    let second = scan_sheet(&bytes, &template, &reader, options).unwrap();
    assert_eq!(first, second);
}

#[test]
fn answer_count_matches_generated_layouts() {
    let bytes = sheet_png(&MARKERS, &[MARK_B]);
    let reader = reader();
    for (questions, columns) in [(20, 1), (30, 1), (40, 2), (60, 3)] {
        let template = SheetTemplate::generate(questions, &Choice::ALL, columns).unwrap();
        let result = scan_sheet(&bytes, &template, &reader, ScanOptions::default()).unwrap();
        assert_eq!(result.respuestas.len(), questions);
    }
}

#[test]
fn debug_image_is_attached_on_request() {
    let bytes = sheet_png(&MARKERS, &[MARK_B]);
    let result = scan_sheet(&bytes, &one_row_template(), &reader(), ScanOptions { debug: true }).unwrap();
    assert!(result.debug_image.is_some_and(|image| !image.is_empty()));
}

#[test]
fn undecodable_upload_is_reported() {
    let template = one_row_template();
    let reader = reader();
    let context = ScanContext::new(&template, &reader, ScanOptions::default()).unwrap();

    assert!(matches!(context.scan(b"not an image"), Err(ScanError::Decode)));
    let json = serde_json::to_value(context.respond(b"")).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "ok": false, "error": "Unable to decode image bytes" })
    );
}

#[test]
fn layout_outside_the_frame_is_an_error_not_a_blank() {
    let mut template = one_row_template();
    template.layout.cells = CellGeometry::Explicit {
        option_offsets: vec![0.0, 0.3, 0.6, 0.95],
        row_pitch: 1.0,
        cell_width: 0.2,
        cell_height: 1.0,
    };
    template.layout.zone.width = 0.8;
    let bytes = sheet_png(&MARKERS, &[]);

    let response = ScanContext::new(&template, &reader(), ScanOptions::default())
        .unwrap()
        .respond(&bytes);
    assert!(!response.ok);
    assert!(response.result.is_none());
    assert!(response
        .error
        .is_some_and(|message| message.starts_with("Layout does not match the sheet")));
}

/// Always returns the same payload.
struct FixedReader(&'static str);

impl SymbolReader for FixedReader {
    fn read(&self, _image: &Mat) -> opencv::Result<Option<String>> {
        Ok(Some(self.0.to_string()))
    }
}

#[test]
fn identifier_fields_come_from_the_payload() {
    let bytes = sheet_png(&MARKERS, &[MARK_B]);
    let template = one_row_template();

    let result = scan_sheet(&bytes, &template, &FixedReader("42|7|2026-01-01"), ScanOptions::default()).unwrap();
    let json = serde_json::to_value(sheetscan_lib::ScanResponse::from(Ok(result))).unwrap();
    assert_eq!(json["codigo"], "42|7|2026-01-01");
    assert_eq!(json["id_examen"], 42);
    assert_eq!(json["id_alumno"], 7);
    assert_eq!(json["fecha_qr"], "2026-01-01");

    let result = scan_sheet(&bytes, &template, &FixedReader("abc|7|2026-01-01"), ScanOptions::default()).unwrap();
    assert_eq!(result.identifier.exam_id, None);
    assert_eq!(result.identifier.student_id, Some(7));
    assert_eq!(result.respuestas, vec![AnswerResult::Clear(Choice::B)]);
}
