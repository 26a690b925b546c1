//! Candidate enumerators.
//!
//! Candidates come from three places: an arithmetic address range
//! (`start:stride[:count]`), a comma-separated list, or a file with one
//! candidate per line. Numeric entries become [`Candidate::Address`], anything
//! else (for example `127.0.0.1:8080`) stays a [`Candidate::Name`].

use std::fmt;
use std::path::Path;

use crate::error::ConfigError;

/// One target handed to a probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Candidate {
    Address(u64),
    Name(String),
}

impl Candidate {
    /// Numeric entries (decimal or `0x` hex) become addresses.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match parse_u64(s) {
            Some(addr) => Self::Address(addr),
            None => Self::Name(s.to_string()),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(a) => write!(f, "{a:#x}"),
            Self::Name(n) => f.write_str(n),
        }
    }
}

impl From<u64> for Candidate {
    fn from(addr: u64) -> Self {
        Self::Address(addr)
    }
}

/// Parse a decimal or `0x`-prefixed hex number. Underscores are allowed.
pub fn parse_u64(s: &str) -> Option<u64> {
    let s = s.trim().replace('_', "");
    if s.is_empty() {
        return None;
    }
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

// ---------------------------------------------------------------------------
// Address range
// ---------------------------------------------------------------------------

/// Lazy arithmetic sequence `start, start + stride, ...`.
///
/// Unbounded when `count` is `None`; iteration also ends if the next address
/// would overflow `u64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    next: Option<u64>,
    stride: u64,
    remaining: Option<u64>,
}

impl AddressRange {
    pub fn new(start: u64, stride: u64, count: Option<u64>) -> Self {
        Self {
            next: Some(start),
            stride,
            remaining: count,
        }
    }

    /// Parse `start:stride[:count]`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(ConfigError::InvalidCandidates(format!(
                "range '{s}' must look like start:stride[:count]"
            )));
        }
        let field = |i: usize, what: &str| {
            parse_u64(parts[i]).ok_or_else(|| {
                ConfigError::InvalidCandidates(format!("range '{s}': bad {what} '{}'", parts[i]))
            })
        };
        let start = field(0, "start")?;
        let stride = field(1, "stride")?;
        if stride == 0 {
            return Err(ConfigError::InvalidCandidates(format!(
                "range '{s}': stride must be nonzero"
            )));
        }
        let count = if parts.len() == 3 {
            Some(field(2, "count")?)
        } else {
            None
        };
        Ok(Self::new(start, stride, count))
    }
}

impl Iterator for AddressRange {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let current = self.next?;
        self.next = current.checked_add(self.stride);
        Some(current)
    }
}

// ---------------------------------------------------------------------------
// Lists and files
// ---------------------------------------------------------------------------

/// Parse a comma-separated candidate list. Empty entries are ignored.
pub fn parse_list(s: &str) -> Vec<Candidate> {
    s.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(Candidate::parse)
        .collect()
}

/// Read candidates from a file, one per line. Blank lines and lines
/// starting with `#` are skipped.
pub fn from_file(path: &Path) -> Result<Vec<Candidate>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(Candidate::parse)
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u64_forms() {
        assert_eq!(parse_u64("42"), Some(42));
        assert_eq!(parse_u64("0x1000"), Some(0x1000));
        assert_eq!(parse_u64("0XfF"), Some(255));
        assert_eq!(parse_u64("0x7fff_0000_0000"), Some(0x7fff_0000_0000));
        assert_eq!(parse_u64(""), None);
        assert_eq!(parse_u64("host"), None);
        assert_eq!(parse_u64("0x"), None);
    }

    #[test]
    fn test_candidate_parse_and_display() {
        assert_eq!(Candidate::parse(" 0x10 "), Candidate::Address(16));
        assert_eq!(
            Candidate::parse("127.0.0.1:80"),
            Candidate::Name("127.0.0.1:80".into())
        );
        assert_eq!(Candidate::Address(0x7ff7_0000).to_string(), "0x7ff70000");
        assert_eq!(Candidate::Name("abc".into()).to_string(), "abc");
    }

    #[test]
    fn test_range_bounded() {
        let r = AddressRange::parse("0x1000:0x100:3").unwrap();
        assert_eq!(r.collect::<Vec<_>>(), vec![0x1000, 0x1100, 0x1200]);
    }

    #[test]
    fn test_range_zero_count_is_empty() {
        assert_eq!(AddressRange::new(5, 1, Some(0)).count(), 0);
    }

    #[test]
    fn test_range_unbounded_is_lazy() {
        let r = AddressRange::parse("0:4096").unwrap();
        let first: Vec<u64> = r.take(4).collect();
        assert_eq!(first, vec![0, 4096, 8192, 12288]);
    }

    #[test]
    fn test_range_stops_on_overflow() {
        let r = AddressRange::new(u64::MAX - 1, 1, None);
        assert_eq!(r.collect::<Vec<_>>(), vec![u64::MAX - 1, u64::MAX]);
    }

    #[test]
    fn test_range_parse_errors() {
        for bad in ["", "10", "a:b", "1:0", "1:2:3:4", "1:2:x"] {
            assert!(
                matches!(AddressRange::parse(bad), Err(ConfigError::InvalidCandidates(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_parse_list_mixed() {
        let list = parse_list("0x10, 20 ,,localhost:22");
        assert_eq!(
            list,
            vec![
                Candidate::Address(16),
                Candidate::Address(20),
                Candidate::Name("localhost:22".into()),
            ]
        );
    }

    #[test]
    fn test_from_file_skips_comments() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("targets.txt");
        std::fs::write(&path, "# targets\n0x100\n\n  target-b  \n#0x200\n").unwrap();
        let list = from_file(&path).unwrap();
        assert_eq!(
            list,
            vec![Candidate::Address(0x100), Candidate::Name("target-b".into())]
        );
    }

    #[test]
    fn test_from_file_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            from_file(&tmp.path().join("nope.txt")),
            Err(ConfigError::Load { .. })
        ));
    }
}
