use opencv::core::{
    self, Mat, Point, Point2f, Scalar, Size, Vector, BORDER_CONSTANT, BORDER_REPLICATE,
};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::WarpConfig;
use crate::fiducial::FiducialSet;
use crate::image::NormalizedImage;

/// The sheet in the canonical frame. `binary` is resampled with nearest
/// neighbour so it stays strictly 0/255.
#[derive(Debug)]
pub struct CorrectedImage {
    pub gray: Mat,
    pub binary: Mat,
    /// `true` when a full perspective correction from four markers was
    /// applied, `false` for the rotation-only fallback.
    pub warp_ok: bool,
}

impl CorrectedImage {
    pub fn size(&self) -> opencv::Result<Size> {
        self.gray.size()
    }
}

/// Marker centroids map to the frame corners inset by `margin`, in
/// top-left, top-right, bottom-left, bottom-right order.
pub fn destination_corners(config: &WarpConfig) -> Vector<Point2f> {
    let (w, h, m) = (config.width as f32, config.height as f32, config.margin as f32);
    Vector::from_iter([
        Point2f::new(m, m),
        Point2f::new(w - m, m),
        Point2f::new(m, h - m),
        Point2f::new(w - m, h - m),
    ])
}

pub fn correct(
    norm: &NormalizedImage,
    fiducials: Option<&FiducialSet>,
    config: &WarpConfig,
) -> opencv::Result<CorrectedImage> {
    match fiducials {
        Some(set) => warp_to_frame(norm, set, config),
        None => deskew(norm, config),
    }
}

fn warp_to_frame(
    norm: &NormalizedImage,
    set: &FiducialSet,
    config: &WarpConfig,
) -> opencv::Result<CorrectedImage> {
    let transform =
        imgproc::get_perspective_transform(&set.centroids(), &destination_corners(config), core::DECOMP_LU)?;
    let size = Size::new(config.width, config.height);
    let gray = {
        let mut gray = Mat::default();
        imgproc::warp_perspective(
            &norm.gray,
            &mut gray,
            &transform,
            size,
            imgproc::INTER_LINEAR,
            BORDER_CONSTANT,
            Scalar::all(255.0),
        )?;
        gray
    };
    let binary = {
        let mut binary = Mat::default();
        imgproc::warp_perspective(
            &norm.binary,
            &mut binary,
            &transform,
            size,
            imgproc::INTER_NEAREST,
            BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;
        binary
    };
    Ok(CorrectedImage {
        gray,
        binary,
        warp_ok: true,
    })
}

/// Angle in degrees, within (-45, 45], that makes the minimum-area
/// rectangle around all ink axis-aligned. Zero when there is no ink.
pub fn estimate_skew_angle(binary: &Mat) -> opencv::Result<f64> {
    let points: Vector<Point> = {
        let mut points: Vector<Point> = vec![].into();
        core::find_non_zero(binary, &mut points)?;
        points
    };
    if points.len() < 3 {
        return Ok(0.0);
    }
    let rect = imgproc::min_area_rect(&points)?;
    let mut angle = rect.angle as f64;
    if angle > 45.0 {
        angle -= 90.0;
    } else if angle <= -45.0 {
        angle += 90.0;
    }
    Ok(angle)
}

/// Rotation-only fallback: undo in-plane rotation, then scale into the
/// canonical frame. Camera perspective is left as is.
fn deskew(norm: &NormalizedImage, config: &WarpConfig) -> opencv::Result<CorrectedImage> {
    let angle = estimate_skew_angle(&norm.binary)?;
    log::debug!("deskewing by {angle:.2} degrees");
    let size = norm.size()?;
    let center = Point2f::new(size.width as f32 / 2.0, size.height as f32 / 2.0);
    let rotation = imgproc::get_rotation_matrix_2d(center, angle, 1.0)?;

    let rotate = |src: &Mat, interpolation: i32| -> opencv::Result<Mat> {
        let mut rotated = Mat::default();
        imgproc::warp_affine(
            src,
            &mut rotated,
            &rotation,
            size,
            interpolation,
            BORDER_REPLICATE,
            Scalar::default(),
        )?;
        let mut scaled = Mat::default();
        imgproc::resize(
            &rotated,
            &mut scaled,
            Size::new(config.width, config.height),
            0.0,
            0.0,
            interpolation,
        )?;
        Ok(scaled)
    };

    Ok(CorrectedImage {
        gray: rotate(&norm.gray, imgproc::INTER_LINEAR)?,
        binary: rotate(&norm.binary, imgproc::INTER_NEAREST)?,
        warp_ok: false,
    })
}
