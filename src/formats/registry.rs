//! Format resolution.
//!
//! The registry is a dispatch table of `(matcher, opener)` pairs. Matchers
//! inspect a [`Probe`] (the extension chain with compression suffixes
//! stripped, plus the first bytes of the decompressed content); the first
//! match wins. Registering a new format appends an entry without touching
//! the existing ones, and an explicit override in the configuration bypasses
//! sniffing entirely.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::config::ReadConfig;
use crate::error::{Result, TrajError};
use crate::formats::{dcd, open_as, trr, xtc, FormatReader};

/// The built-in trajectory formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Xtc,
    Trr,
    Dcd,
    Xyz,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Xtc => "XTC",
            Format::Trr => "TRR",
            Format::Dcd => "DCD",
            Format::Xyz => "XYZ",
        }
    }
}

/// Suffixes that mark transparent compression rather than a format.
const COMPRESSION_SUFFIXES: &[&str] = &["gz", "bz2", "xz", "zst"];

pub(crate) fn is_compressed_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            COMPRESSION_SUFFIXES.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// The format-bearing extension, with compression suffixes stripped
/// greedily: `md.xyz.gz` resolves to `xyz`.
pub fn format_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    let mut parts: Vec<&str> = name.split('.').collect();
    while parts.len() > 1 && COMPRESSION_SUFFIXES.contains(parts.last().unwrap()) {
        parts.pop();
    }
    if parts.len() > 1 {
        parts.pop().map(str::to_string)
    } else {
        None
    }
}

/// What a matcher gets to look at: path, resolved extension, and the first
/// bytes of the (decompressed) content.
pub struct Probe<'a> {
    pub path: &'a Path,
    pub extension: Option<String>,
    pub head: [u8; 8],
    pub head_len: usize,
    pub compressed: bool,
}

impl<'a> Probe<'a> {
    pub fn gather(path: &'a Path) -> Result<Self> {
        let compressed = is_compressed_path(path);
        let mut head = [0u8; 8];
        let head_len = if compressed {
            let file = File::open(path)?;
            let (mut reader, _format) =
                niffler::send::get_reader(Box::new(std::io::BufReader::new(file)))?;
            read_head(&mut reader, &mut head)?
        } else {
            let mut file = File::open(path)?;
            read_head(&mut file, &mut head)?
        };
        Ok(Self {
            path,
            extension: format_extension(path),
            head,
            head_len,
            compressed,
        })
    }

    pub fn extension_is(&self, ext: &str) -> bool {
        self.extension.as_deref() == Some(ext)
    }

    /// The first four content bytes as a big-endian integer, the way XDR
    /// magics are stored.
    pub fn magic_i32(&self) -> Option<i32> {
        (self.head_len >= 4).then(|| i32::from_be_bytes(self.head[..4].try_into().unwrap()))
    }
}

fn read_head<R: Read>(reader: &mut R, head: &mut [u8; 8]) -> Result<usize> {
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

type Matcher = Box<dyn Fn(&Probe) -> bool + Send + Sync>;
type Opener = Box<dyn Fn(&Path, &ReadConfig) -> Result<Box<dyn FormatReader>> + Send + Sync>;

pub struct Registry {
    entries: Vec<(&'static str, Matcher, Opener)>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// A registry with no formats at all.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry holding the built-in formats.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_format(Format::Xtc, |probe| {
            probe.extension_is("xtc") || probe.magic_i32() == Some(xtc::MAGIC)
        });
        registry.register_format(Format::Trr, |probe| {
            probe.extension_is("trr") || probe.magic_i32() == Some(trr::MAGIC)
        });
        registry.register_format(Format::Dcd, |probe| {
            probe.extension_is("dcd")
                || (probe.head_len >= 8 && &probe.head[4..8] == dcd::MAGIC)
        });
        registry.register_format(Format::Xyz, |probe| {
            probe.extension_is("xyz") || looks_like_xyz(&probe.head[..probe.head_len])
        });
        registry
    }

    fn register_format(
        &mut self,
        format: Format,
        matcher: impl Fn(&Probe) -> bool + Send + Sync + 'static,
    ) {
        self.register(
            format.name(),
            matcher,
            move |path, config| open_as(path, format, config),
        );
    }

    /// Append a `(matcher, opener)` pair. Later entries never shadow earlier
    /// ones; dispatch takes the first match.
    pub fn register(
        &mut self,
        name: &'static str,
        matcher: impl Fn(&Probe) -> bool + Send + Sync + 'static,
        opener: impl Fn(&Path, &ReadConfig) -> Result<Box<dyn FormatReader>> + Send + Sync + 'static,
    ) {
        self.entries
            .push((name, Box::new(matcher), Box::new(opener)));
    }

    /// Resolve `path` to a reader.
    ///
    /// An explicit format in the configuration bypasses sniffing; otherwise
    /// the probe runs through the dispatch table and an unmatched file fails
    /// with `UnsupportedFormat`.
    pub fn open(&self, path: &Path, config: &ReadConfig) -> Result<Box<dyn FormatReader>> {
        if let Some(format) = config.format {
            return open_as(path, format, config);
        }
        let probe = Probe::gather(path)?;
        for (_name, matcher, opener) in &self.entries {
            if matcher(&probe) {
                return opener(path, config);
            }
        }
        Err(TrajError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }

    /// Names of the registered formats, in dispatch order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, ..)| *name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// An XYZ file opens with an atom-count line: optional blanks, digits, then
/// a line break or more whitespace.
fn looks_like_xyz(head: &[u8]) -> bool {
    let mut seen_digit = false;
    for &byte in head {
        match byte {
            b' ' | b'\t' if !seen_digit => continue,
            b'0'..=b'9' => seen_digit = true,
            b'\r' | b'\n' | b' ' | b'\t' => return seen_digit,
            _ => return false,
        }
    }
    // All eight bytes digits and blanks; enough of an indication.
    seen_digit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_chain_strips_compression() {
        assert_eq!(format_extension(Path::new("md.xtc")), Some("xtc".into()));
        assert_eq!(format_extension(Path::new("md.xyz.gz")), Some("xyz".into()));
        assert_eq!(
            format_extension(Path::new("a.b/run.trr")),
            Some("trr".into())
        );
        assert_eq!(format_extension(Path::new("md.gz")), None);
        assert_eq!(format_extension(Path::new("plainfile")), None);
        assert_eq!(format_extension(Path::new("MD.XTC")), Some("xtc".into()));
    }

    #[test]
    fn xyz_head_sniffing() {
        assert!(looks_like_xyz(b"3\nfoo ba"));
        assert!(looks_like_xyz(b"  128\nC"));
        assert!(looks_like_xyz(b"12345678"));
        assert!(!looks_like_xyz(b"CORDxxxx"));
        assert!(!looks_like_xyz(b"\x00\x00\x07\xcb"));
        assert!(!looks_like_xyz(b""));
    }

    #[test]
    fn compressed_paths_recognized() {
        assert!(is_compressed_path(Path::new("run.xyz.gz")));
        assert!(is_compressed_path(Path::new("run.xyz.zst")));
        assert!(!is_compressed_path(Path::new("run.xyz")));
    }

    #[test]
    fn dispatch_order_is_first_match() {
        let mut registry = Registry::empty();
        registry.register(
            "refuse-everything",
            |_probe| true,
            |path, _config| {
                Err(TrajError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            },
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), ["refuse-everything"]);
    }
}
