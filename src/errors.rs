use std::fmt::Write;

/// Conditions that make a scan result meaningless. These abort the request
/// and surface as `{ ok: false, error }`.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("Unable to decode image bytes")]
    Decode,
    #[error("OpenCV Error: {} (errno {})", .0.message, .0.code)]
    OpenCv(#[from] opencv::Error),
    #[error("Layout does not match the sheet: {0}")]
    LayoutMismatch(#[from] LayoutError),
    #[error("Invalid scan configuration: {0}")]
    Config(#[from] ConfigError),
}

impl serde::Serialize for ScanError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

/// Stage-local conditions. These degrade the result (`warp_ok = false`,
/// null identifier fields) but never abort a scan.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SheetError {
    #[error("Incomplete markers on page (found {found} of 4 corners)")]
    MissingMarkers { found: usize },
    #[error("No barcode or QR symbol could be decoded")]
    IdentifierNotFound,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum LayoutError {
    #[error("Layout declares no questions")]
    NoQuestions,
    #[error("Layout needs at least two options per question, got {found}")]
    TooFewOptions { found: usize },
    #[error("Layout declares option {0} more than once")]
    DuplicateOption(char),
    #[error("Layout needs at least one column")]
    NoColumns,
    #[error("Explicit layout has {found} option offsets for {expected} options")]
    OffsetCount { expected: usize, found: usize },
    #[error("Answer zone {x0}, {y0} ({width}x{height}) does not fit inside the frame")]
    ZoneOutOfBounds {
        x0: f64,
        y0: f64,
        width: f64,
        height: f64,
    },
    #[error("Cell for question {question}, option {option} is empty or outside the frame")]
    BadCell { question: usize, option: usize },
    #[error("Question {question} has {found} scores, expected {expected}")]
    OptionCount {
        question: usize,
        expected: usize,
        found: usize,
    },
    #[error("Scored {found} questions, layout declares {expected}")]
    QuestionCount { expected: usize, found: usize },
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive odd number, got {value}")]
    KernelSize { name: &'static str, value: i32 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must lie in {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{low} ({low_value}) must not exceed {high} ({high_value})")]
    Ordering {
        low: &'static str,
        low_value: f64,
        high: &'static str,
        high_value: f64,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("Cannot open/write template file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed template: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid layout: {0}")]
    Layout(#[from] LayoutError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("A template has already been loaded for this process")]
    AlreadyLoaded,
}

pub fn fmt_error_chain_of(mut err: &dyn std::error::Error) -> String {
    let mut str = err.to_string();
    while let Some(src) = err.source() {
        _ = write!(str, "\n  -> Caused by {src}");
        err = src;
    }
    str
}

#[macro_export]
macro_rules! err_log {
    ($error: expr) => {
        log::error!("{}", $crate::errors::fmt_error_chain_of($error))
    };
}
