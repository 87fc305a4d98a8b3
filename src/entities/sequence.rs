//! Animation sequence: path template and frame count
//!
//! A sequence is described by a printf-style template such as
//! `frames/walk_%04d.png`. Supported conversions:
//! - `%d` - plain index
//! - `%Nd` - index right-aligned to N columns with spaces
//! - `%0Nd` - index zero-padded to N digits
//! - `%%` - literal percent sign
//!
//! When the frame count is not configured it is discovered by counting the
//! resources in the template's folder.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{info, warn};
use regex::Regex;

use super::traits::ResourceStore;

static CONVERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%(?:(0)?(\d+))?d|%%").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Index { width: usize, zero_pad: bool },
}

/// Immutable description of a frame set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationSequence {
    template: String,
    segments: Vec<Segment>,
    frame_count: usize,
}

impl AnimationSequence {
    /// Sequence with an explicit frame count
    pub fn new(template: impl Into<String>, frame_count: usize) -> Self {
        let template = template.into();
        let segments = parse_template(&template);
        Self {
            template,
            segments,
            frame_count,
        }
    }

    /// Sequence whose frame count is the number of resources in the template folder.
    ///
    /// An unreadable folder yields an empty sequence; the error is logged.
    pub fn discover(template: impl Into<String>, store: &dyn ResourceStore) -> Self {
        let mut seq = Self::new(template, 0);
        let folder = seq.folder();
        match store.count(&folder) {
            Ok(count) => {
                info!(
                    "Discovered {} frames in {} for {}",
                    count,
                    folder.display(),
                    seq.template
                );
                seq.frame_count = count;
            }
            Err(e) => {
                warn!("Failed to enumerate {}: {}", folder.display(), e);
            }
        }
        seq
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.frame_count
    }

    /// Folder holding the frames (template parent, empty for bare names)
    pub fn folder(&self) -> PathBuf {
        Path::new(&self.template)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Resource path for frame `index`
    pub fn path(&self, index: usize) -> PathBuf {
        let mut out = String::with_capacity(self.template.len() + 8);
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Index { width, zero_pad: true } => {
                    out.push_str(&format!("{:0width$}", index, width = *width))
                }
                Segment::Index { width, zero_pad: false } => {
                    out.push_str(&format!("{:>width$}", index, width = *width))
                }
            }
        }
        PathBuf::from(out)
    }
}

fn parse_template(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut last = 0;

    for caps in CONVERSION.captures_iter(template) {
        let Some(m) = caps.get(0) else { continue };
        literal.push_str(&template[last..m.start()]);
        last = m.end();

        if m.as_str() == "%%" {
            literal.push('%');
            continue;
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        let width = caps
            .get(2)
            .and_then(|w| w.as_str().parse::<usize>().ok())
            .unwrap_or(0);
        segments.push(Segment::Index {
            width,
            zero_pad: caps.get(1).is_some(),
        });
    }

    literal.push_str(&template[last..]);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FixedStore(io::Result<usize>);

    impl ResourceStore for FixedStore {
        fn count(&self, _folder: &Path) -> io::Result<usize> {
            match &self.0 {
                Ok(n) => Ok(*n),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            Err(io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
        }
    }

    #[test]
    fn test_plain_index() {
        let seq = AnimationSequence::new("anim/image_%d.jpg", 3);
        assert_eq!(seq.path(0), PathBuf::from("anim/image_0.jpg"));
        assert_eq!(seq.path(12), PathBuf::from("anim/image_12.jpg"));
    }

    #[test]
    fn test_zero_padded_and_escape() {
        let seq = AnimationSequence::new("seq/100%%_%04d.png", 1);
        assert_eq!(seq.path(7), PathBuf::from("seq/100%_0007.png"));

        let spaced = AnimationSequence::new("f%3d.png", 1);
        assert_eq!(spaced.path(5), PathBuf::from("f  5.png"));
    }

    #[test]
    fn test_folder() {
        let seq = AnimationSequence::new("assets/walk/walk_%d.png", 0);
        assert_eq!(seq.folder(), PathBuf::from("assets/walk"));
        assert_eq!(AnimationSequence::new("x_%d.png", 0).folder(), PathBuf::new());
    }

    #[test]
    fn test_discover_counts_folder() {
        let seq = AnimationSequence::discover("a/f_%d.png", &FixedStore(Ok(24)));
        assert_eq!(seq.frame_count(), 24);
        assert!(seq.contains(23));
        assert!(!seq.contains(24));
    }

    #[test]
    fn test_discover_failure_is_empty() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let seq = AnimationSequence::discover("a/f_%d.png", &FixedStore(Err(err)));
        assert!(seq.is_empty());
    }
}
