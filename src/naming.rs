//! Output file naming: printf-style templates and collision-free probing.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::traits::{RecorderError, Result};

/// Filename template holding exactly one integer directive, e.g. `video%06d.avi`.
///
/// Supported directives are `%d`, `%Nd` (space padded) and `%0Nd` (zero padded);
/// `%%` stands for a literal percent sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    prefix: String,
    suffix: String,
    width: usize,
    zero_pad: bool,
}

impl FilenameTemplate {
    /// Parse a template string.
    pub fn parse(template: &str) -> Result<Self> {
        if template.is_empty() {
            return Err(RecorderError::EmptyFilename);
        }
        let invalid = |reason: &str| RecorderError::InvalidTemplate {
            template: template.to_owned(),
            reason: reason.to_owned(),
        };

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut directive: Option<(bool, usize)> = None;
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            let out = if directive.is_some() {
                &mut suffix
            } else {
                &mut prefix
            };
            if c != '%' {
                out.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                out.push('%');
                continue;
            }

            let zero_pad = chars.next_if_eq(&'0').is_some();
            let mut digits = String::new();
            while let Some(d) = chars.next_if(char::is_ascii_digit) {
                digits.push(d);
            }
            if chars.next() != Some('d') {
                return Err(invalid("only %d, %Nd and %0Nd directives are supported"));
            }
            if directive.is_some() {
                return Err(invalid("more than one %d directive"));
            }
            let width = if digits.is_empty() {
                0
            } else {
                digits
                    .parse()
                    .map_err(|_| invalid("directive width is too large"))?
            };
            directive = Some((zero_pad, width));
        }

        let (zero_pad, width) = directive.ok_or_else(|| invalid("missing %d directive"))?;
        Ok(Self {
            prefix,
            suffix,
            width,
            zero_pad,
        })
    }

    /// Substitute `number` into the template.
    pub fn render(&self, number: u32) -> String {
        let digits = if self.zero_pad {
            format!("{number:0width$}", width = self.width)
        } else {
            format!("{number:>width$}", width = self.width)
        };
        format!("{}{digits}{}", self.prefix, self.suffix)
    }

    /// Render and resolve against `base_dir` when the result is relative.
    pub fn resolve(&self, base_dir: &Path, number: u32) -> PathBuf {
        let rendered = PathBuf::from(self.render(number));
        if rendered.is_absolute() {
            rendered
        } else {
            base_dir.join(rendered)
        }
    }
}

/// Find the first path at or after `*number` that does not exist yet.
///
/// `number` is advanced past every existing file so that earlier recordings are
/// never overwritten. The parent directory of the returned path is created;
/// failing to do so is logged and otherwise ignored, opening the encoder will
/// report the real problem.
pub fn next_free_path(
    template: &FilenameTemplate,
    base_dir: &Path,
    number: &mut u32,
) -> Result<PathBuf> {
    loop {
        let candidate = template.resolve(base_dir, *number);
        if !candidate.exists() {
            // The number may sit in a directory component, so create it per candidate.
            ensure_parent_dir(&candidate);
            return Ok(candidate);
        }
        debug!("{} already exists, skipping", candidate.display());
        *number = number
            .checked_add(1)
            .ok_or(RecorderError::FileNumbersExhausted(candidate))?;
    }
}

fn ensure_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(err) = fs::create_dir_all(parent) {
        error!("Error creating directory {}: {err} -- IGNORED", parent.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_zero_padded() {
        let template = FilenameTemplate::parse("video%06d.avi").expect("valid template");
        assert_eq!(template.render(0), "video000000.avi");
        assert_eq!(template.render(42), "video000042.avi");
    }

    #[test]
    fn test_render_plain_and_space_padded() {
        let plain = FilenameTemplate::parse("clip%d.mp4").expect("valid template");
        assert_eq!(plain.render(7), "clip7.mp4");

        let padded = FilenameTemplate::parse("clip%3d.mp4").expect("valid template");
        assert_eq!(padded.render(7), "clip  7.mp4");
    }

    #[test]
    fn test_literal_percent() {
        let template = FilenameTemplate::parse("100%%_%02d.avi").expect("valid template");
        assert_eq!(template.render(3), "100%_03.avi");
    }

    #[test]
    fn test_wider_number_than_padding() {
        let template = FilenameTemplate::parse("clip%03d.mp4").expect("valid template");
        assert_eq!(template.render(1234), "clip1234.mp4");
    }

    #[test]
    fn test_parse_rejects_bad_templates() {
        assert!(matches!(
            FilenameTemplate::parse(""),
            Err(RecorderError::EmptyFilename)
        ));
        assert!(FilenameTemplate::parse("video.avi").is_err());
        assert!(FilenameTemplate::parse("video%d_%d.avi").is_err());
        assert!(FilenameTemplate::parse("video%s.avi").is_err());
        assert!(FilenameTemplate::parse("video%").is_err());
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = Path::new("/data/savevideo");

        let relative = FilenameTemplate::parse("sub/video%d.avi").expect("valid template");
        assert_eq!(
            relative.resolve(base, 1),
            PathBuf::from("/data/savevideo/sub/video1.avi")
        );

        let absolute = FilenameTemplate::parse("/tmp/video%d.avi").expect("valid template");
        assert_eq!(absolute.resolve(base, 1), PathBuf::from("/tmp/video1.avi"));
    }

    #[test]
    fn test_next_free_path_skips_existing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let template = FilenameTemplate::parse("video%06d.avi").expect("valid template");
        fs::write(dir.path().join("video000000.avi"), b"old").expect("write");
        fs::write(dir.path().join("video000001.avi"), b"old").expect("write");

        let mut number = 0;
        let path = next_free_path(&template, dir.path(), &mut number).expect("free path");

        assert_eq!(path, dir.path().join("video000002.avi"));
        assert_eq!(number, 2);
    }

    #[test]
    fn test_next_free_path_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let template = FilenameTemplate::parse("a/b/clip%03d.mp4").expect("valid template");

        let mut number = 5;
        let path = next_free_path(&template, dir.path(), &mut number).expect("free path");

        assert_eq!(path, dir.path().join("a/b/clip005.mp4"));
        assert!(dir.path().join("a/b").is_dir());
        assert_eq!(number, 5);
    }

    #[test]
    fn test_next_free_path_creates_directory_of_probed_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let template = FilenameTemplate::parse("run%d/clip.avi").expect("valid template");
        fs::create_dir(dir.path().join("run0")).expect("mkdir");
        fs::write(dir.path().join("run0/clip.avi"), b"old").expect("write");

        let mut number = 0;
        let path = next_free_path(&template, dir.path(), &mut number).expect("free path");

        assert_eq!(path, dir.path().join("run1/clip.avi"));
        assert!(dir.path().join("run1").is_dir());
        assert_eq!(number, 1);
    }

    #[test]
    fn test_next_free_path_ignores_directory_creation_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("blocker"), b"not a directory").expect("write");
        let template = FilenameTemplate::parse("blocker/clip%d.avi").expect("valid template");

        let mut number = 0;
        let path = next_free_path(&template, dir.path(), &mut number).expect("free path");

        assert_eq!(path, dir.path().join("blocker/clip0.avi"));
        assert!(dir.path().join("blocker").is_file());
        assert_eq!(number, 0);
    }

    #[test]
    fn test_next_free_path_stops_when_numbers_run_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let template = FilenameTemplate::parse("v%d.avi").expect("valid template");
        let last = dir.path().join(format!("v{}.avi", u32::MAX));
        fs::write(&last, b"old").expect("write");

        let mut number = u32::MAX;
        let result = next_free_path(&template, dir.path(), &mut number);

        assert!(matches!(
            result,
            Err(RecorderError::FileNumbersExhausted(path)) if path == last
        ));
        assert_eq!(number, u32::MAX);
    }
}
