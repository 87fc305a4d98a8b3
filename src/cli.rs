use clap::Parser;
use std::path::PathBuf;

use crate::config::FlipbookConfig;
use crate::entities::frame::PixelFormat;
use crate::entities::transform::ScaleMode;

// Build version with decoder info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Decode: image 0.25 (PNG, JPEG, TIFF, TGA)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless flip-book player for numbered image sequences
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Frame path template relative to --root, e.g. "anim/frame_%03d.png"
    #[arg(value_name = "TEMPLATE")]
    pub template: Option<String>,

    /// Directory frame paths are resolved against
    #[arg(short = 'r', long = "root", value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Frame count (default: number of files in the template folder)
    #[arg(short = 'n', long = "frames", value_name = "N")]
    pub frame_count: Option<usize>,

    /// Milliseconds per frame
    #[arg(short = 'd', long = "duration", value_name = "MS")]
    pub frame_duration_ms: Option<u64>,

    /// Start paused instead of auto-playing
    #[arg(short = 'p', long = "paused")]
    pub paused: bool,

    /// Enable looping
    #[arg(short = 'o', long = "loop", value_name = "0|1")]
    pub loop_playback: Option<u8>,

    /// Locate this frame instead of free playback
    #[arg(short = 't', long = "to-frame", value_name = "N")]
    pub to_frame: Option<usize>,

    /// Extra delay before the first step, in milliseconds
    #[arg(long = "delay", value_name = "MS", default_value_t = 0)]
    pub delay_ms: u64,

    /// How frames are fitted into the viewport
    #[arg(short = 's', long = "scale", value_enum)]
    pub scale_mode: Option<ScaleMode>,

    /// Decoded pixel format
    #[arg(long = "format", value_enum)]
    pub pixel_format: Option<PixelFormat>,

    /// Decode subsampling factor (rounded down to a power of two)
    #[arg(long = "sample", value_name = "N")]
    pub sample_size: Option<u32>,

    /// Viewport size
    #[arg(long = "size", value_names = ["W", "H"], num_args = 2, default_values_t = [1280, 720])]
    pub viewport: Vec<u32>,

    /// Seconds to run before recycling the view
    #[arg(long = "seconds", value_name = "S", default_value_t = 5.0)]
    pub seconds: f64,

    /// JSON config file (overrides FLIPBOOK_CONFIG)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the effective config as JSON and exit
    #[arg(long = "dump-config")]
    pub dump_config: bool,

    /// Enable debug logging to file (default: flipbook.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Layer command-line overrides on top of `config`
    pub fn apply(&self, config: &mut FlipbookConfig) {
        if let Some(template) = &self.template {
            config.template = template.clone();
        }
        if let Some(n) = self.frame_count {
            config.frame_count = Some(n);
        }
        if let Some(ms) = self.frame_duration_ms {
            config.frame_duration_ms = ms;
        }
        if self.paused || self.to_frame.is_some() {
            config.auto_play = false;
        }
        if let Some(l) = self.loop_playback {
            config.repeat = l != 0;
        }
        if let Some(mode) = self.scale_mode {
            config.scale_mode = mode;
        }
        if let Some(format) = self.pixel_format {
            config.pixel_format = format;
        }
        if let Some(sample) = self.sample_size {
            config.sample_size = sample;
        }
    }

    pub fn viewport(&self) -> (u32, u32) {
        match self.viewport.as_slice() {
            [w, h] => (*w, *h),
            _ => (1280, 720),
        }
    }
}
