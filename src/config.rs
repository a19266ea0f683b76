//! Configuration threaded explicitly through Universe and stream
//! construction.
//!
//! There is no ambient process-wide state: everything that affects reader
//! behavior (format overrides, memory mapping, the empty-system policy,
//! output precision) lives in a [`ReadConfig`] passed in by the caller.

use crate::formats::Format;

/// The default quantization precision used when writing compressed XTC
/// positions, in reciprocal nanometers.
pub const DEFAULT_PRECISION: f32 = 1000.0;

/// Configuration record for opening trajectories.
#[derive(Debug, Clone)]
pub struct ReadConfig {
    /// Force a specific format, bypassing extension and magic sniffing.
    pub format: Option<Format>,
    /// Memory-map plain files instead of going through buffered reads.
    ///
    /// Compressed sources ignore this and always stream.
    pub mmap: bool,
    /// Permit systems with zero atoms.
    ///
    /// By default a zero-atom trajectory or topology is an error at bind
    /// time.
    pub allow_empty: bool,
    /// Quantization precision for compressed position output.
    pub output_precision: f32,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            format: None,
            mmap: false,
            allow_empty: false,
            output_precision: DEFAULT_PRECISION,
        }
    }
}

impl ReadConfig {
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_mmap(mut self, mmap: bool) -> Self {
        self.mmap = mmap;
        self
    }

    pub fn with_allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReadConfig::default();
        assert!(config.format.is_none());
        assert!(!config.mmap);
        assert!(!config.allow_empty);
        assert_eq!(config.output_precision, DEFAULT_PRECISION);
    }

    #[test]
    fn builder_chain() {
        let config = ReadConfig::default()
            .with_format(Format::Dcd)
            .with_mmap(true)
            .with_allow_empty(true);
        assert_eq!(config.format, Some(Format::Dcd));
        assert!(config.mmap);
        assert!(config.allow_empty);
    }
}
