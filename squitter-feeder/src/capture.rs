//! Frame file input for the feeder.
//!
//! Accepts one frame per line from tools like rtl_adsb or dump1090 --raw:
//! - plain hex: `8D4840D6202CC371C32CE0576098`
//! - dump1090 form: `*8D4840D6202CC371C32CE0576098;`
//! - either form with a capture timestamp after the semicolon:
//!   `*8D4840D6202CC371C32CE0576098;12.345`

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Spacing assigned to lines that carry no timestamp.
const DEFAULT_SPACING: f64 = 0.001;

/// One frame line.
#[derive(Debug, Clone, PartialEq)]
pub struct HexFrame {
    pub hex: String,
    pub timestamp: Option<f64>,
}

/// Read pre-demodulated hex frames from a file, or stdin for `-`.
pub struct FrameReader {
    path: PathBuf,
}

impl FrameReader {
    pub fn new(path: &Path) -> Self {
        FrameReader {
            path: path.to_path_buf(),
        }
    }

    fn read_text(&self) -> io::Result<String> {
        if self.path.as_os_str() == "-" {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(text)
        } else {
            fs::read_to_string(&self.path)
        }
    }

    /// Read all frames. Lines without a timestamp are placed just after
    /// the previous frame, so timestamps never run backwards.
    pub fn read_all(&self) -> io::Result<Vec<(String, f64)>> {
        let content = self.read_text()?;
        Ok(assign_timestamps(content.lines().filter_map(clean_hex_line)))
    }
}

fn assign_timestamps(frames: impl Iterator<Item = HexFrame>) -> Vec<(String, f64)> {
    let mut last: Option<f64> = None;
    frames
        .map(|f| {
            let ts = match (f.timestamp, last) {
                (Some(ts), _) => ts,
                (None, Some(prev)) => prev + DEFAULT_SPACING,
                (None, None) => 0.0,
            };
            last = Some(ts);
            (f.hex, ts)
        })
        .collect()
}

/// Extract a Mode S hex string and optional timestamp from a line.
///
/// Handles plain hex, dump1090 format (`*hex;`), a `;timestamp` suffix and
/// whitespace.
pub fn clean_hex_line(line: &str) -> Option<HexFrame> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let body = line.strip_prefix('*').unwrap_or(line);
    let (hex, timestamp) = match body.split_once(';') {
        Some((hex, rest)) => {
            let rest = rest.trim();
            let ts = if rest.is_empty() {
                None
            } else {
                Some(rest.parse::<f64>().ok()?)
            };
            (hex.trim(), ts)
        }
        None if body.len() == line.len() => (body, None),
        // `*hex` without the closing semicolon
        None => return None,
    };

    if !is_valid_hex(hex) {
        return None;
    }

    Some(HexFrame {
        hex: hex.to_ascii_uppercase(),
        timestamp,
    })
}

fn is_valid_hex(s: &str) -> bool {
    (s.len() == 14 || s.len() == 28) && s.chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
