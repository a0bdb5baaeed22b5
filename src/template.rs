use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::errors::TemplateError;
use crate::layout::{Choice, Layout};

/// One physical sheet design: its layout and the thresholds calibrated for
/// it, versioned together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetTemplate {
    pub name: String,
    #[serde(default = "first_version")]
    pub version: u32,
    pub layout: Layout,
    #[serde(default)]
    pub config: ScanConfig,
}

fn first_version() -> u32 {
    1
}

impl SheetTemplate {
    pub fn new(name: impl Into<String>, layout: Layout, config: ScanConfig) -> Result<Self, TemplateError> {
        let template = SheetTemplate {
            name: name.into(),
            version: first_version(),
            layout,
            config,
        };
        template.validate()?;
        Ok(template)
    }

    /// Template with a generated layout and default thresholds.
    pub fn generate(questions: usize, options: &[Choice], columns: usize) -> Result<Self, TemplateError> {
        let layout = Layout::generate(questions, options, columns)?;
        let letters: String = options.iter().map(|choice| choice.letter()).collect();
        Self::new(
            format!("{questions}q-{letters}-{columns}col"),
            layout,
            ScanConfig::default(),
        )
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        self.layout.validate()?;
        self.config.validate(self.layout.options.len())?;
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, TemplateError> {
        let template: SheetTemplate = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, TemplateError> {
        let reader = BufReader::new(File::open(path)?);
        let template: SheetTemplate = serde_json::from_reader(reader)?;
        template.validate()?;
        log::info!(
            "loaded template {} v{} ({} questions)",
            template.name,
            template.version,
            template.layout.questions
        );
        Ok(template)
    }

    pub fn write_json_file(&self, path: &Path) -> Result<(), TemplateError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
