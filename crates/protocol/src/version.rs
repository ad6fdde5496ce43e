//! Dotted server version numbers.

use std::cmp::Ordering;
use std::fmt;

/// A dotted version such as `1.0.4`, compared component by component.
///
/// Missing components count as zero (`1.0 == 1.0.0`) and non-numeric
/// suffixes inside a component are ignored (`1.0.4rc1` parses as `1.0.4`).
#[derive(Debug, Clone)]
pub struct ServerVersion {
    raw: String,
    parts: Vec<u32>,
}

impl ServerVersion {
    pub fn parse(raw: &str) -> Self {
        let parts = raw
            .trim()
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect();
        Self {
            raw: raw.trim().to_string(),
            parts,
        }
    }

    /// Returns true if this version is `minimum` or newer.
    pub fn at_least(&self, minimum: &str) -> bool {
        *self >= ServerVersion::parse(minimum)
    }

    fn component(&self, idx: usize) -> u32 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl PartialEq for ServerVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ServerVersion {}

impl PartialOrd for ServerVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServerVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
