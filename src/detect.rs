//! Sequence settings auto-detection
//!
//! Inspects a folder of numbered image files and proposes the FFmpeg
//! filename pattern and extension to feed the converter.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

/// Image extensions the converter accepts as sequence frames
pub const SUPPORTED_EXTS: &[&str] = &["png", "jpg", "jpeg", "exr", "tiff", "tga"];

/// Patterns offered in the UI combo (superset of what detection can propose)
pub const PATTERN_CHOICES: &[&str] = &["%04d", "%05d", "%06d", "frame_%04d", "render_%05d"];

/// Proposed settings for a scanned folder.
///
/// `None` fields mean "no match, leave the current setting unchanged".
/// Recomputed on every folder selection, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
    pub file_extension: Option<String>,
    pub file_pattern: Option<String>,
    pub file_count: usize,
}

/// Detection errors
#[derive(Debug)]
pub enum DetectError {
    NotADirectory(PathBuf),
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectError::NotADirectory(path) => {
                write!(f, "Not a readable directory: {}", path.display())
            }
        }
    }
}

impl std::error::Error for DetectError {}

/// Scan a folder and propose filename pattern + extension.
///
/// Filters the listing to supported image extensions, takes the
/// lexicographically first name as the sample and classifies its stem.
pub fn detect(folder: &Path) -> Result<DetectionResult, DetectError> {
    let entries =
        fs::read_dir(folder).map_err(|_| DetectError::NotADirectory(folder.to_path_buf()))?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|name| supported_ext(name).is_some())
        .collect();

    if names.is_empty() {
        return Ok(DetectionResult::default());
    }

    names.sort();
    // Filtered names always carry a supported extension
    let (stem, ext) = names[0].rsplit_once('.').unwrap_or((names[0].as_str(), ""));

    let result = DetectionResult {
        file_extension: Some(ext.to_lowercase()),
        file_pattern: classify_stem(stem),
        file_count: names.len(),
    };
    info!(
        "Detected {} files in {}, pattern: {}, extension: {}",
        result.file_count,
        folder.display(),
        result.file_pattern.as_deref().unwrap_or("(unchanged)"),
        result.file_extension.as_deref().unwrap_or("")
    );
    Ok(result)
}

/// Default output path: sibling of the input folder named `<basename>.mp4`
pub fn output_path_for(input_folder: &Path) -> PathBuf {
    let name = input_folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match input_folder.parent() {
        Some(parent) => parent.join(format!("{}.mp4", name)),
        None => PathBuf::from(format!("{}.mp4", name)),
    }
}

/// Return the supported extension of `name` (as written, pre-lowercase), if any
fn supported_ext(name: &str) -> Option<&str> {
    let (_, ext) = name.rsplit_once('.')?;
    SUPPORTED_EXTS
        .contains(&ext.to_lowercase().as_str())
        .then_some(ext)
}

/// Map a sample stem onto a printf-style frame pattern.
///
/// Pure digit stems only match at paddings 4/5/6; other widths return None
/// so the caller keeps whatever pattern was already set.
fn classify_stem(stem: &str) -> Option<String> {
    if is_digits(stem) {
        let pattern = match stem.len() {
            4 => "%04d",
            5 => "%05d",
            6 => "%06d",
            _ => return None,
        };
        return Some(pattern.to_string());
    }
    if stem.strip_prefix("frame_").is_some_and(is_digits) {
        return Some("frame_%04d".to_string());
    }
    if stem.strip_prefix("render_").is_some_and(is_digits) {
        return Some("render_%05d".to_string());
    }
    None
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
