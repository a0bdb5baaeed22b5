use opencv::core::{Mat, Scalar};
use opencv::imgproc;

use crate::classify::{peak, AnswerResult};
use crate::errors::ScanError;
use crate::image::mat_to_base64;
use crate::layout::Layout;
use crate::warp::CorrectedImage;

// BGR
const CHOSEN: (f64, f64, f64) = (0.0, 200.0, 0.0);
const WEAK: (f64, f64, f64) = (0.0, 220.0, 255.0);
const MULTI: (f64, f64, f64) = (0.0, 0.0, 255.0);
const BLANK: (f64, f64, f64) = (160.0, 160.0, 160.0);

fn color((b, g, r): (f64, f64, f64)) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

/// Outline colour of one cell, or `None` when the cell is left undrawn.
fn cell_color(result: AnswerResult, option: usize, strongest: Option<usize>, layout: &Layout) -> Option<Scalar> {
    match result {
        AnswerResult::Clear(choice) => (layout.options.get(option) == Some(&choice)).then(|| color(CHOSEN)),
        AnswerResult::Weak => (strongest == Some(option)).then(|| color(WEAK)),
        AnswerResult::Multi => Some(color(MULTI)),
        AnswerResult::Blank => Some(color(BLANK)),
    }
}

/// Colour copy of the corrected frame with every relevant cell outlined.
pub fn render_overlay(
    corrected: &CorrectedImage,
    layout: &Layout,
    scores: &[Vec<f64>],
    answers: &[AnswerResult],
) -> Result<Mat, ScanError> {
    let mut canvas = Mat::default();
    imgproc::cvt_color_def(&corrected.gray, &mut canvas, imgproc::COLOR_GRAY2BGR)?;
    let cells = layout.cell_rects(corrected.size()?)?;

    for ((row, row_scores), &result) in cells.iter().zip(scores).zip(answers) {
        let strongest = peak(row_scores);
        for (option, &cell) in row.iter().enumerate() {
            if let Some(outline) = cell_color(result, option, strongest, layout) {
                imgproc::rectangle(&mut canvas, cell, outline, 2, imgproc::LINE_8, 0)?;
            }
        }
    }
    Ok(canvas)
}

/// The overlay as base64 JPEG, ready for the `debug_image` field.
pub fn render_debug_image(
    corrected: &CorrectedImage,
    layout: &Layout,
    scores: &[Vec<f64>],
    answers: &[AnswerResult],
) -> Result<String, ScanError> {
    let overlay = render_overlay(corrected, layout, scores, answers)?;
    Ok(mat_to_base64(&overlay, ".jpg")?)
}
