use clap::Parser;
use std::path::PathBuf;

// Build version with encoder info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Encoder: external ffmpeg (libx264)\n",
    "Target: ",
    std::env::consts::ARCH,
    "-",
    std::env::consts::OS
);

/// Image sequence to MP4 converter
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Folder with the image sequence (PNG, JPG, JPEG, EXR, TIFF, TGA) - optional, can also drag-and-drop
    #[arg(value_name = "FOLDER")]
    pub folder: Option<PathBuf>,

    /// Output MP4 file (default: sibling of the input folder)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Frame rate, e.g. 24 or 23.976
    #[arg(long = "fps", value_name = "RATE")]
    pub frame_rate: Option<String>,

    /// Quality (CRF, lower = higher quality)
    #[arg(long = "crf", value_name = "N")]
    pub crf: Option<u32>,

    /// x264 preset (ultrafast..veryslow)
    #[arg(long = "preset", value_name = "NAME")]
    pub preset: Option<String>,

    /// Path to the ffmpeg binary (default: resolved through PATH)
    #[arg(long = "ffmpeg", value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Enable debug logging to file (default: seq2mp4.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
