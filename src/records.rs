//! Local record table.
//!
//! Loaded once at startup from a hosts-style file and shared read-only by
//! every request. The address `0.0.0.0` marks a blocked name.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::LoadError;

/// Address that marks a name as blocked.
pub const BLOCKED_ADDR: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Result of looking up a name in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Blocked,
    Address(Ipv4Addr),
}

/// Immutable name to IPv4 address mapping.
#[derive(Debug, Default)]
pub struct RecordTable {
    records: FxHashMap<String, Ipv4Addr>,
}

impl RecordTable {
    /// Read and parse a records file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LoadError {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::parse(&text))
    }

    /// Parse `<ipv4> <domain>` lines.
    ///
    /// Blank lines and `#` comments are skipped, as are lines without two
    /// fields or with an unparsable address. Later entries for the same
    /// name replace earlier ones.
    pub fn parse(text: &str) -> Self {
        let mut records = FxHashMap::default();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(addr), Some(domain)) = (fields.next(), fields.next()) else {
                warn!(line = index + 1, "skipping record without a domain");
                continue;
            };
            let Ok(addr) = addr.parse::<Ipv4Addr>() else {
                warn!(line = index + 1, addr, "skipping record with invalid IPv4 address");
                continue;
            };

            records.insert(normalize(domain), addr);
        }

        Self { records }
    }

    /// Look up `domain`, ignoring case and a trailing dot.
    pub fn lookup(&self, domain: &str) -> Option<Lookup> {
        let addr = match self.records.get(domain) {
            Some(addr) => *addr,
            None => *self.records.get(&normalize(domain))?,
        };

        if addr == BLOCKED_ADDR {
            Some(Lookup::Blocked)
        } else {
            Some(Lookup::Address(addr))
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of names mapped to the blocked sentinel.
    pub fn blocked_count(&self) -> usize {
        self.records.values().filter(|a| **a == BLOCKED_ADDR).count()
    }
}

impl<S: AsRef<str>> FromIterator<(S, Ipv4Addr)> for RecordTable {
    fn from_iter<I: IntoIterator<Item = (S, Ipv4Addr)>>(iter: I) -> Self {
        let records = iter
            .into_iter()
            .map(|(domain, addr)| (normalize(domain.as_ref()), addr))
            .collect();

        Self { records }
    }
}

fn normalize(domain: &str) -> String {
    domain.trim_end_matches('.').to_lowercase()
}
