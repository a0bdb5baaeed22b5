use std::fmt;

use itertools::Itertools;
use opencv::core::{Rect, Size};
use serde::{Deserialize, Serialize};

use crate::config::RelRect;
use crate::errors::LayoutError;

/// A selectable option letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
    C,
    D,
}

impl Choice {
    pub const ALL: [Choice; 4] = [Choice::A, Choice::B, Choice::C, Choice::D];

    pub fn letter(self) -> char {
        match self {
            Choice::A => 'A',
            Choice::B => 'B',
            Choice::C => 'C',
            Choice::D => 'D',
        }
    }

    pub fn from_letter(letter: char) -> Option<Choice> {
        match letter.to_ascii_uppercase() {
            'A' => Some(Choice::A),
            'B' => Some(Choice::B),
            'C' => Some(Choice::C),
            'D' => Some(Choice::D),
            _ => None,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// How the answer zone is cut into cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CellGeometry {
    /// Integer division of each block into `rows x options` equal cells.
    Uniform,
    /// Cells placed by fractions: offsets and widths relative to the block
    /// width, row pitch and height relative to the zone height.
    Explicit {
        option_offsets: Vec<f64>,
        row_pitch: f64,
        cell_width: f64,
        cell_height: f64,
    },
}

/// Where the answers sit on the corrected sheet. Shared read-only by every
/// scan once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub questions: usize,
    pub options: Vec<Choice>,
    /// Question blocks laid side by side; questions run top to bottom, then
    /// continue in the next block.
    #[serde(default = "default_columns")]
    pub columns: usize,
    /// Answer zone relative to the corrected frame
    pub zone: RelRect,
    pub cells: CellGeometry,
}

fn default_columns() -> usize {
    1
}

const DEFAULT_ZONE: RelRect = RelRect {
    x0: 0.12,
    y0: 0.20,
    width: 0.75,
    height: 0.70,
};

impl Layout {
    /// Build an explicit layout from simple parameters: every option gets an
    /// evenly spaced slot and every row an even share of the zone height.
    pub fn generate(questions: usize, options: &[Choice], columns: usize) -> Result<Layout, LayoutError> {
        if columns == 0 {
            return Err(LayoutError::NoColumns);
        }
        if options.len() < 2 {
            return Err(LayoutError::TooFewOptions { found: options.len() });
        }
        let rows = questions.div_ceil(columns).max(1);
        let slot = 1.0 / options.len() as f64;
        let row_pitch = 1.0 / rows as f64;
        let layout = Layout {
            questions,
            options: options.to_vec(),
            columns,
            zone: DEFAULT_ZONE,
            cells: CellGeometry::Explicit {
                option_offsets: (0..options.len())
                    .map(|idx| (idx as f64 + 0.2) * slot)
                    .collect(),
                row_pitch,
                cell_width: 0.6 * slot,
                cell_height: 0.8 * row_pitch,
            },
        };
        layout.validate()?;
        Ok(layout)
    }

    pub fn rows_per_column(&self) -> usize {
        self.questions.div_ceil(self.columns.max(1))
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.questions == 0 {
            return Err(LayoutError::NoQuestions);
        }
        // a lone option is its own row mean and could never stand out
        if self.options.len() < 2 {
            return Err(LayoutError::TooFewOptions {
                found: self.options.len(),
            });
        }
        if let Some(dup) = self.options.iter().duplicates().next() {
            return Err(LayoutError::DuplicateOption(dup.letter()));
        }
        if self.columns == 0 {
            return Err(LayoutError::NoColumns);
        }
        if !self.zone.is_within_unit() {
            return Err(self.zone_error());
        }
        if let CellGeometry::Explicit { option_offsets, .. } = &self.cells {
            if option_offsets.len() != self.options.len() {
                return Err(LayoutError::OffsetCount {
                    expected: self.options.len(),
                    found: option_offsets.len(),
                });
            }
        }
        Ok(())
    }

    fn zone_error(&self) -> LayoutError {
        LayoutError::ZoneOutOfBounds {
            x0: self.zone.x0,
            y0: self.zone.y0,
            width: self.zone.width,
            height: self.zone.height,
        }
    }

    /// Answer zone in pixels of a frame of the given size.
    pub fn zone_rect(&self, frame: Size) -> Result<Rect, LayoutError> {
        if !self.zone.is_within_unit() {
            return Err(self.zone_error());
        }
        let rect = Rect::new(
            (self.zone.x0 * frame.width as f64) as i32,
            (self.zone.y0 * frame.height as f64) as i32,
            (self.zone.width * frame.width as f64) as i32,
            (self.zone.height * frame.height as f64) as i32,
        );
        if rect.width <= 0 || rect.height <= 0 {
            return Err(self.zone_error());
        }
        Ok(rect)
    }

    /// Resolve every (question, option) cell to pixels, question-major.
    pub fn cell_rects(&self, frame: Size) -> Result<Vec<Vec<Rect>>, LayoutError> {
        self.validate()?;
        let zone = self.zone_rect(frame)?;
        let rows = self.rows_per_column() as i32;
        let block_width = zone.width / self.columns as i32;
        let n_options = self.options.len() as i32;

        (0..self.questions)
            .map(|question| {
                let block = (question as i32) / rows;
                let row = (question as i32) % rows;
                let block_x = zone.x + block * block_width;
                (0..self.options.len())
                    .map(|option| {
                        let rect = match &self.cells {
                            CellGeometry::Uniform => {
                                let cell_width = block_width / n_options;
                                let cell_height = zone.height / rows;
                                Rect::new(
                                    block_x + option as i32 * cell_width,
                                    zone.y + row * cell_height,
                                    cell_width,
                                    cell_height,
                                )
                            }
                            CellGeometry::Explicit {
                                option_offsets,
                                row_pitch,
                                cell_width,
                                cell_height,
                            } => Rect::new(
                                block_x + (option_offsets[option] * block_width as f64) as i32,
                                zone.y + (row as f64 * row_pitch * zone.height as f64) as i32,
                                (cell_width * block_width as f64) as i32,
                                (cell_height * zone.height as f64) as i32,
                            ),
                        };
                        let inside = rect.width > 0
                            && rect.height > 0
                            && rect.x >= 0
                            && rect.y >= 0
                            && rect.x + rect.width <= frame.width
                            && rect.y + rect.height <= frame.height;
                        if inside {
                            Ok(rect)
                        } else {
                            Err(LayoutError::BadCell { question, option })
                        }
                    })
                    .collect()
            })
            .collect()
    }
}
