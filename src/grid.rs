use opencv::core::{self, Mat, Rect};
use opencv::prelude::*;

use crate::config::{FillMetric, GridConfig};
use crate::errors::ScanError;
use crate::layout::Layout;
use crate::warp::CorrectedImage;

/// Central part of `cell`, keeping `fraction` of each axis. Never smaller
/// than one pixel.
pub fn inner_window(cell: Rect, fraction: f64) -> Rect {
    let width = ((cell.width as f64 * fraction).round() as i32).clamp(1, cell.width);
    let height = ((cell.height as f64 * fraction).round() as i32).clamp(1, cell.height);
    Rect::new(
        cell.x + (cell.width - width) / 2,
        cell.y + (cell.height - height) / 2,
        width,
        height,
    )
}

fn fill_score(corrected: &CorrectedImage, window: Rect, metric: FillMetric) -> opencv::Result<f64> {
    match metric {
        FillMetric::Foreground => {
            let roi = Mat::roi(&corrected.binary, window)?;
            Ok(core::count_non_zero(&*roi)? as f64)
        }
        FillMetric::Darkness => {
            let roi = Mat::roi(&corrected.gray, window)?;
            let mean = core::mean(&*roi, &core::no_array())?;
            Ok(255.0 - mean[0])
        }
    }
}

/// Fill score of every (question, option) cell, question-major. Pure
/// measurement: nothing is classified here.
pub fn score_grid(
    corrected: &CorrectedImage,
    layout: &Layout,
    config: &GridConfig,
) -> Result<Vec<Vec<f64>>, ScanError> {
    let cells = layout.cell_rects(corrected.size()?)?;
    let scores = cells
        .iter()
        .map(|row| {
            row.iter()
                .map(|&cell| {
                    let window = inner_window(cell, config.inner_fraction);
                    fill_score(corrected, window, config.metric)
                })
                .collect::<opencv::Result<Vec<f64>>>()
        })
        .collect::<opencv::Result<Vec<Vec<f64>>>>()?;
    log::debug!("scored {} questions x {} options", scores.len(), layout.options.len());
    Ok(scores)
}
