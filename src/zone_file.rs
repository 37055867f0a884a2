//! Zone file reader / writer.
//!
//! ```text
//! zones:
//!    0: [(x1, y1), (x2, y2), ...]
//!    1: [(x1, y1), ...]
//!
//! number_of_zone: <int>
//! frame_width: <int>
//! frame_height: <int>
//! ```

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::{ensure_exists, Result};
use crate::zones::{Point, ZoneId, ZoneSet};

/// A line the reader could not make sense of. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ZoneFile {
    /// Raw point-list text per zone id, still unparsed.
    pub zones: BTreeMap<ZoneId, String>,
    pub number_of_zones: Option<u32>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub warnings: Vec<ParseWarning>,
}

fn zone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+):\s*\[(.*)\]$").expect("zone entry regex"))
}

fn footer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(number_of_zone|frame_width|frame_height):\s*(\d+)$").expect("footer regex")
    })
}

impl ZoneFile {
    pub fn parse(text: &str) -> Self {
        let mut out = ZoneFile::default();
        let mut width = None;
        let mut height = None;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line == "zones:" {
                continue;
            }

            if let Some(caps) = zone_re().captures(line) {
                let Ok(id) = caps[1].parse::<ZoneId>() else {
                    out.warn(line_no, format!("zone id '{}' out of range", &caps[1]));
                    continue;
                };
                if out.zones.insert(id, caps[2].to_string()).is_some() {
                    out.warn(line_no, format!("zone {} defined twice, keeping the last one", id));
                }
                continue;
            }

            if let Some(caps) = footer_re().captures(line) {
                let Ok(value) = caps[2].parse::<u32>() else {
                    out.warn(line_no, format!("{} value '{}' out of range", &caps[1], &caps[2]));
                    continue;
                };
                match &caps[1] {
                    "number_of_zone" => out.number_of_zones = Some(value),
                    "frame_width" => width = Some(value),
                    _ => height = Some(value),
                }
                continue;
            }

            out.warn(line_no, format!("unrecognized line '{}'", line));
        }

        if width.is_none() {
            out.warn(0, "missing frame_width");
        }
        if height.is_none() {
            out.warn(0, "missing frame_height");
        }
        out.frame_width = width.unwrap_or(0);
        out.frame_height = height.unwrap_or(0);

        if let Some(declared) = out.number_of_zones {
            if declared as usize != out.zones.len() {
                out.warn(
                    0,
                    format!("number_of_zone says {} but {} zones were found", declared, out.zones.len()),
                );
            }
        }

        out
    }

    /// Read and parse a zone file, logging every warning.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_exists("zones", path)?;
        let text = fs::read_to_string(path)?;
        let file = Self::parse(&text);
        for w in &file.warnings {
            warn!("{}:{}: {}", path.display(), w.line, w.message);
        }
        Ok(file)
    }

    pub fn to_zone_set(&self) -> Result<ZoneSet> {
        ZoneSet::load(&self.zones, self.frame_width, self.frame_height)
    }

    fn warn(&mut self, line: usize, message: impl Into<String>) {
        self.warnings.push(ParseWarning {
            line,
            message: message.into(),
        });
    }
}

/// Load a zone file and bring it to the operating frame size in one step.
pub fn load_zones(path: impl AsRef<Path>, frame_width: u32, frame_height: u32) -> Result<ZoneSet> {
    let file = ZoneFile::read(path)?;
    file.to_zone_set()?.rescale(frame_width, frame_height)
}

pub fn format_zone_entry(index: u32, points: &[Point]) -> String {
    let formatted = points
        .iter()
        .map(|p| format!("({}, {})", p.x, p.y))
        .collect::<Vec<_>>()
        .join(", ");
    format!("   {}: [{}]\n", index, formatted)
}

/// Writes zones one at a time as the operator saves them.
///
/// The first save recreates the file with the header, the save that
/// reaches `max_zones` appends the footer. Further saves are refused.
#[derive(Debug)]
pub struct ZoneFileWriter {
    path: PathBuf,
    max_zones: u32,
    frame_width: u32,
    frame_height: u32,
    written: u32,
}

impl ZoneFileWriter {
    pub fn new(path: impl Into<PathBuf>, max_zones: u32, frame_width: u32, frame_height: u32) -> Self {
        Self {
            path: path.into(),
            max_zones,
            frame_width,
            frame_height,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u32 {
        self.written
    }

    pub fn max_zones(&self) -> u32 {
        self.max_zones
    }

    pub fn is_complete(&self) -> bool {
        self.written >= self.max_zones
    }

    /// Returns `Ok(false)` when the maximum number of zones was already saved.
    pub fn append_zone(&mut self, points: &[Point]) -> Result<bool> {
        if self.is_complete() {
            info!("Maximum number of zones ({}) reached.", self.max_zones);
            return Ok(false);
        }

        let mut file = if self.written == 0 {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            f.write_all(b"zones: \n")?;
            f
        } else {
            OpenOptions::new().append(true).open(&self.path)?
        };

        file.write_all(format_zone_entry(self.written, points).as_bytes())?;

        if self.written + 1 == self.max_zones {
            write!(
                file,
                "\nnumber_of_zone: {}\nframe_width: {}\nframe_height: {}\n",
                self.written + 1,
                self.frame_width,
                self.frame_height
            )?;
        }
        file.flush()?;

        info!("Entry {} saved to '{}'.", self.written, self.path.display());
        self.written += 1;
        Ok(true)
    }
}
