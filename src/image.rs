use base64::Engine;
use opencv::core::{Mat, Size, Vector};
use opencv::imgcodecs::{imdecode, imencode, ImreadModes};
use opencv::imgproc::{self, ADAPTIVE_THRESH_GAUSSIAN_C, THRESH_BINARY_INV};
use opencv::prelude::*;

use crate::config::NormalizeConfig;
use crate::errors::ScanError;

/// A decoded upload, as handed over by the caller. Never modified.
#[derive(Debug)]
pub struct RawImage {
    mat: Mat,
}

impl RawImage {
    /// Decode an uploaded byte stream. Anything OpenCV cannot read as an
    /// image is a [`ScanError::Decode`].
    pub fn decode(bytes: &[u8]) -> Result<RawImage, ScanError> {
        if bytes.is_empty() {
            return Err(ScanError::Decode);
        }
        let buf: Vector<u8> = Vector::from_slice(bytes);
        imdecode(&buf, ImreadModes::IMREAD_COLOR.into())
            .map_err(|_| ScanError::Decode)
            .and_then(Self::from_mat)
    }

    pub fn from_mat(mat: Mat) -> Result<RawImage, ScanError> {
        if mat.empty() {
            Err(ScanError::Decode)
        } else {
            Ok(RawImage { mat })
        }
    }

    pub fn width(&self) -> i32 {
        self.mat.cols()
    }

    pub fn height(&self) -> i32 {
        self.mat.rows()
    }

    pub fn mat(&self) -> &Mat {
        &self.mat
    }
}

/// The sheet at canonical resolution: smoothed intensity and its binarized
/// counterpart (ink = 255, paper = 0).
#[derive(Debug)]
pub struct NormalizedImage {
    pub gray: Mat,
    pub binary: Mat,
}

impl NormalizedImage {
    pub fn size(&self) -> opencv::Result<Size> {
        self.gray.size()
    }
}

pub fn to_gray(src: &Mat) -> opencv::Result<Mat> {
    let code = match src.channels() {
        1 => return src.try_clone(),
        4 => imgproc::COLOR_BGRA2GRAY,
        _ => imgproc::COLOR_BGR2GRAY,
    };
    let mut gray = Mat::default();
    imgproc::cvt_color_def(src, &mut gray, code)?;
    Ok(gray)
}

pub fn normalize(raw: &RawImage, config: &NormalizeConfig) -> opencv::Result<NormalizedImage> {
    let resized = {
        let mut resized = Mat::default();
        imgproc::resize(
            raw.mat(),
            &mut resized,
            Size::new(config.width, config.height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        resized
    };
    let gray = to_gray(&resized)?;
    let equalized = if config.equalize {
        let mut equalized = Mat::default();
        imgproc::equalize_hist(&gray, &mut equalized)?;
        equalized
    } else {
        gray
    };
    let blurred = {
        let mut blurred = Mat::default();
        imgproc::gaussian_blur_def(
            &equalized,
            &mut blurred,
            Size::new(config.blur_kernel, config.blur_kernel),
            0.0,
        )?;
        blurred
    };
    let binary = binarize(&blurred, config)?;
    log::debug!(
        "normalized {}x{} upload to {}x{}",
        raw.width(),
        raw.height(),
        config.width,
        config.height
    );
    Ok(NormalizedImage {
        gray: blurred,
        binary,
    })
}

/// Locally thresholded, inverted binarization: dark ink becomes foreground.
pub fn binarize(gray: &Mat, config: &NormalizeConfig) -> opencv::Result<Mat> {
    let mut binary = Mat::default();
    imgproc::adaptive_threshold(
        gray,
        &mut binary,
        255.0,
        ADAPTIVE_THRESH_GAUSSIAN_C,
        THRESH_BINARY_INV,
        config.adaptive_block_size,
        config.adaptive_c,
    )?;
    Ok(binary)
}

/// Encode `mat` with the given extension (".png", ".jpg") as plain base64.
pub fn mat_to_base64(mat: &Mat, ext: &str) -> Result<String, opencv::Error> {
    let mut buf: Vector<u8> = Vec::new().into();
    imencode(ext, mat, &mut buf, &Vec::new().into())?;
    Ok(base64::prelude::BASE64_STANDARD.encode(&buf))
}
