//! Corner marker detection.
//!
//! The sheet carries one filled square near each corner. Candidates are the
//! external contours of the binarized sheet that approximate to a
//! near-square quadrilateral of plausible size; one candidate is then
//! assigned to each corner by quadrant around the candidates' own mean
//! centroid, so a sheet filling only part of the photo still resolves.
//! Either all four corners are found or none are: a partial set is never
//! used for correction.

use itertools::Itertools;
use opencv::core::{Mat, Point, Point2f, Rect, Vector};
use opencv::imgproc::{self, CHAIN_APPROX_SIMPLE, RETR_EXTERNAL};
use opencv::prelude::*;

use crate::config::FiducialConfig;
use crate::errors::SheetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    fn of(point: Point2f, centre: Point2f) -> Corner {
        let left = point.x < centre.x;
        let top = point.y < centre.y;
        match (top, left) {
            (true, true) => Corner::TopLeft,
            (true, false) => Corner::TopRight,
            (false, true) => Corner::BottomLeft,
            (false, false) => Corner::BottomRight,
        }
    }

}

#[derive(Debug, Clone, PartialEq)]
pub struct FiducialMarker {
    pub centroid: Point2f,
    pub bbox: Rect,
    pub polygon: Vec<Point>,
    pub area: f64,
}

/// Exactly four markers, ordered top-left, top-right, bottom-left,
/// bottom-right.
#[derive(Debug, Clone, PartialEq)]
pub struct FiducialSet {
    markers: [FiducialMarker; 4],
}

impl FiducialSet {
    pub fn markers(&self) -> &[FiducialMarker; 4] {
        &self.markers
    }

    pub fn get(&self, corner: Corner) -> &FiducialMarker {
        let idx = match corner {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomLeft => 2,
            Corner::BottomRight => 3,
        };
        &self.markers[idx]
    }

    pub fn centroids(&self) -> Vector<Point2f> {
        self.markers.iter().map(|m| m.centroid).collect()
    }
}

/// All contours of `binary` that look like a corner marker.
pub fn find_candidates(binary: &Mat, config: &FiducialConfig) -> opencv::Result<Vec<FiducialMarker>> {
    let contours: Vector<Vector<Point>> = {
        let mut contours: Vector<Vector<Point>> = vec![].into();
        imgproc::find_contours_def(binary, &mut contours, RETR_EXTERNAL, CHAIN_APPROX_SIMPLE)?;
        contours
    };
    let image_area = (binary.cols() as f64) * (binary.rows() as f64);
    let min_area = config.min_area_fraction * image_area;
    let max_area = config.max_area_fraction * image_area;

    let candidates: Vec<FiducialMarker> = contours
        .iter()
        .filter_map(|contour| {
            let area = imgproc::contour_area_def(&contour).ok()?;
            if area < min_area || area > max_area {
                return None;
            }
            let peri = imgproc::arc_length(&contour, true).ok()?;
            let approx = {
                let mut approx: Vector<Point> = vec![].into();
                imgproc::approx_poly_dp(&contour, &mut approx, config.poly_epsilon * peri, true).ok()?;
                approx
            };
            if approx.len() != 4 {
                return None;
            }
            let bbox = imgproc::bounding_rect(&approx).ok()?;
            if bbox.height == 0 {
                return None;
            }
            let aspect = bbox.width as f64 / bbox.height as f64;
            if aspect < config.min_aspect || aspect > config.max_aspect {
                return None;
            }
            let moments = imgproc::moments_def(&contour).ok()?;
            if moments.m00 == 0.0 {
                return None;
            }
            Some(FiducialMarker {
                centroid: Point2f::new(
                    (moments.m10 / moments.m00) as f32,
                    (moments.m01 / moments.m00) as f32,
                ),
                bbox,
                polygon: approx.to_vec(),
                area,
            })
        })
        .collect();

    log::debug!(
        "{} of {} contours accepted as marker candidates",
        candidates.len(),
        contours.len()
    );
    Ok(candidates)
}

/// Mean of the candidate centroids, `None` without candidates.
fn mean_centroid(candidates: &[FiducialMarker]) -> Option<Point2f> {
    if candidates.is_empty() {
        return None;
    }
    let n = candidates.len() as f32;
    let (sx, sy) = candidates
        .iter()
        .fold((0.0, 0.0), |(sx, sy), m| (sx + m.centroid.x, sy + m.centroid.y));
    Some(Point2f::new(sx / n, sy / n))
}

/// Pick one candidate per corner: candidates are split into quadrants around
/// their mean centroid and each quadrant keeps the candidate farthest from
/// that centre. Fails as a whole when any quadrant is empty.
pub fn assign_corners(candidates: Vec<FiducialMarker>) -> Result<FiducialSet, SheetError> {
    let Some(centre) = mean_centroid(&candidates) else {
        return Err(SheetError::MissingMarkers { found: 0 });
    };
    let mut by_corner = candidates
        .into_iter()
        .into_group_map_by(|marker| Corner::of(marker.centroid, centre));

    let mut picked = Vec::with_capacity(4);
    for corner in Corner::ALL {
        let outermost = by_corner.remove(&corner).and_then(|group| {
            group.into_iter().max_by(|a, b| {
                distance(a.centroid, centre).total_cmp(&distance(b.centroid, centre))
            })
        });
        if let Some(marker) = outermost {
            picked.push(marker);
        }
    }

    let found = picked.len();
    let markers: [FiducialMarker; 4] = picked
        .try_into()
        .map_err(|_| SheetError::MissingMarkers { found })?;
    Ok(FiducialSet { markers })
}

fn distance(a: Point2f, b: Point2f) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Find the four corner markers of a binarized sheet.
///
/// The outer error is an OpenCV failure; the inner one a sheet without four
/// usable markers.
pub fn locate(
    binary: &Mat,
    config: &FiducialConfig,
) -> Result<Result<FiducialSet, SheetError>, opencv::Error> {
    let candidates = find_candidates(binary, config)?;
    Ok(assign_corners(candidates))
}
