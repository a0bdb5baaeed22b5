//! Tunable parameters for the recognition pipeline.
//!
//! Every threshold used by a stage lives here as a named field so that a
//! physical sheet template can carry its own calibrated values. All sections
//! deserialize with defaults, so a template only needs to list the values it
//! overrides:
//!
//! ```
//! use sheetscan_lib::config::ScanConfig;
//!
//! let config: ScanConfig =
//!     serde_json::from_str(r#"{ "classifier": { "umbral": 55 } }"#).unwrap();
//! assert_eq!(config.classifier.floor, 55.0);
//! assert_eq!(config.classifier.multi_ratio, 0.75);
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Complete set of thresholds for one sheet template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub normalize: NormalizeConfig,
    pub fiducials: FiducialConfig,
    pub warp: WarpConfig,
    pub identifier: IdentifierConfig,
    pub grid: GridConfig,
    pub classifier: ClassifierConfig,
}

/// Resize, contrast and binarization parameters applied to every upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Canonical width in pixels after resizing
    pub width: i32,
    /// Canonical height in pixels after resizing
    pub height: i32,
    /// Apply global histogram equalization
    pub equalize: bool,
    /// Gaussian blur kernel size (must be odd)
    pub blur_kernel: i32,
    /// Neighbourhood size for adaptive thresholding (must be odd)
    pub adaptive_block_size: i32,
    /// Constant subtracted from the local mean during adaptive thresholding
    pub adaptive_c: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            width: 1240,
            height: 1754,
            equalize: true,
            blur_kernel: 5,
            adaptive_block_size: 35,
            adaptive_c: 10.0,
        }
    }
}

/// Acceptance bounds for corner marker candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiducialConfig {
    /// Minimum contour area as a fraction of the image area
    pub min_area_fraction: f64,
    /// Maximum contour area as a fraction of the image area
    pub max_area_fraction: f64,
    /// Minimum bounding box width / height
    pub min_aspect: f64,
    /// Maximum bounding box width / height
    pub max_aspect: f64,
    /// Polygon approximation epsilon as a fraction of the contour perimeter
    pub poly_epsilon: f64,
}

impl Default for FiducialConfig {
    fn default() -> Self {
        Self {
            min_area_fraction: 0.0001,
            max_area_fraction: 0.004,
            min_aspect: 0.75,
            max_aspect: 1.25,
            poly_epsilon: 0.02,
        }
    }
}

/// Geometry of the corrected (canonical) frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    pub width: i32,
    pub height: i32,
    /// Distance between each marker centroid and its frame corner
    pub margin: i32,
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            width: 900,
            height: 1300,
            margin: 50,
        }
    }
}

/// A rectangle expressed as fractions of some parent rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelRect {
    pub x0: f64,
    pub y0: f64,
    pub width: f64,
    pub height: f64,
}

impl RelRect {
    pub fn is_within_unit(&self) -> bool {
        self.x0 >= 0.0
            && self.y0 >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x0 + self.width <= 1.0 + f64::EPSILON
            && self.y0 + self.height <= 1.0 + f64::EPSILON
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Separator of the `examId|studentId|date` payload
    pub delimiter: char,
    /// Where the symbol is usually printed, relative to the normalized sheet
    pub search_region: RelRect,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            delimiter: '|',
            search_region: RelRect {
                x0: 0.58,
                y0: 0.0,
                width: 0.42,
                height: 0.16,
            },
        }
    }
}

/// How a cell's fill is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMetric {
    /// Number of foreground pixels in the binarized frame
    Foreground,
    /// 255 minus the mean intensity of the grayscale frame
    Darkness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Fraction of each cell axis kept around the cell centre
    pub inner_fraction: f64,
    pub metric: FillMetric,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            inner_fraction: 0.6,
            metric: FillMetric::Foreground,
        }
    }
}

/// Decision thresholds for one row of fill scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Absolute score at or below which a row is blank
    #[serde(rename = "umbral", alias = "floor")]
    pub floor: f64,
    /// A row whose peak is below `blank_ratio * mean` is blank
    pub blank_ratio: f64,
    /// A row whose peak is below `weak_ratio * mean` is a weak mark
    pub weak_ratio: f64,
    /// A row whose runner-up reaches `multi_ratio * peak` is a double mark
    pub multi_ratio: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            floor: 40.0,
            blank_ratio: 1.25,
            weak_ratio: 1.6,
            multi_ratio: 0.75,
        }
    }
}

fn odd_kernel(name: &'static str, value: i32) -> Result<(), ConfigError> {
    if value > 0 && value % 2 == 1 {
        Ok(())
    } else {
        Err(ConfigError::KernelSize { name, value })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn in_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

fn ordered(low: &'static str, low_value: f64, high: &'static str, high_value: f64) -> Result<(), ConfigError> {
    if low_value <= high_value {
        Ok(())
    } else {
        Err(ConfigError::Ordering {
            low,
            low_value,
            high,
            high_value,
        })
    }
}

impl ScanConfig {
    /// Check every section. `options` is the number of options per question
    /// of the layout these thresholds will be used with.
    pub fn validate(&self, options: usize) -> Result<(), ConfigError> {
        self.normalize.validate()?;
        self.fiducials.validate()?;
        self.warp.validate()?;
        self.identifier.validate()?;
        self.grid.validate()?;
        self.classifier.validate(options)
    }
}

impl NormalizeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("normalize.width", self.width as f64)?;
        positive("normalize.height", self.height as f64)?;
        odd_kernel("normalize.blur_kernel", self.blur_kernel)?;
        odd_kernel("normalize.adaptive_block_size", self.adaptive_block_size)?;
        // adaptive thresholding needs at least a 3x3 neighbourhood
        in_range(
            "normalize.adaptive_block_size",
            self.adaptive_block_size as f64,
            3.0,
            f64::from(i32::MAX),
        )
    }
}

impl FiducialConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        in_range("fiducials.min_area_fraction", self.min_area_fraction, 0.0, 1.0)?;
        in_range("fiducials.max_area_fraction", self.max_area_fraction, 0.0, 1.0)?;
        ordered(
            "fiducials.min_area_fraction",
            self.min_area_fraction,
            "fiducials.max_area_fraction",
            self.max_area_fraction,
        )?;
        positive("fiducials.min_aspect", self.min_aspect)?;
        ordered(
            "fiducials.min_aspect",
            self.min_aspect,
            "fiducials.max_aspect",
            self.max_aspect,
        )?;
        in_range("fiducials.poly_epsilon", self.poly_epsilon, 0.0, 1.0)
    }
}

impl WarpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("warp.width", self.width as f64)?;
        positive("warp.height", self.height as f64)?;
        in_range(
            "warp.margin",
            self.margin as f64,
            0.0,
            (self.width.min(self.height) / 2 - 1) as f64,
        )
    }
}

impl IdentifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let region = self.search_region;
        in_range("identifier.search_region.x0", region.x0, 0.0, 1.0)?;
        in_range("identifier.search_region.y0", region.y0, 0.0, 1.0)?;
        in_range("identifier.search_region.width", region.width, f64::EPSILON, 1.0 - region.x0)?;
        in_range("identifier.search_region.height", region.height, f64::EPSILON, 1.0 - region.y0)
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        in_range("grid.inner_fraction", self.inner_fraction, f64::EPSILON, 1.0)
    }
}

impl ClassifierConfig {
    /// Beyond range checks, the weak ratio must stay below the option count:
    /// raising the leading score by `d` raises the row mean by `d / options`,
    /// so the peak only outgrows `weak_ratio * mean` while the ratio is
    /// smaller than the option count.
    pub fn validate(&self, options: usize) -> Result<(), ConfigError> {
        in_range("classifier.umbral", self.floor, 0.0, f64::MAX)?;
        in_range("classifier.blank_ratio", self.blank_ratio, 0.0, f64::MAX)?;
        ordered(
            "classifier.blank_ratio",
            self.blank_ratio,
            "classifier.weak_ratio",
            self.weak_ratio,
        )?;
        if self.weak_ratio >= options as f64 {
            return Err(ConfigError::OutOfRange {
                name: "classifier.weak_ratio",
                value: self.weak_ratio,
                min: 0.0,
                max: options as f64,
            });
        }
        in_range("classifier.multi_ratio", self.multi_ratio, f64::EPSILON, 1.0)
    }
}
