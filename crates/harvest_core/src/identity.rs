use std::fmt;
use std::str::FromStr;

/// Number of seed characters that prefix every rendered identity.
pub const SHORT_SEED_LEN: usize = 8;
/// Minimum rendered width of the sequence index.
pub const INDEX_WIDTH: usize = 6;
pub const DEFAULT_DOMAIN: &str = "example.com";

/// Campaign-scoped token from which identities are derived.
///
/// Always non-empty ASCII alphanumeric, so the short form can be sliced
/// without char-boundary checks and never contains the `-`/`@` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Seed(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeedError {
    #[error("seed is empty")]
    Empty,
    #[error("seed contains invalid character {0:?}")]
    InvalidChar(char),
}

impl Seed {
    pub fn new(raw: impl Into<String>) -> Result<Self, SeedError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SeedError::Empty);
        }
        if let Some(bad) = raw.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(SeedError::InvalidChar(bad));
        }
        Ok(Self(raw))
    }

    /// Renders 64 random bits as a 16-digit lowercase hex seed.
    pub fn from_bits(bits: u64) -> Self {
        Self(format!("{bits:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace prefix used in rendered identities.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(SHORT_SEED_LEN)]
    }
}

impl FromStr for Seed {
    type Err = SeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deterministic request credential: seed namespace plus sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    prefix: String,
    index: u64,
}

impl Identity {
    pub fn new(seed: &Seed, index: u64) -> Self {
        Self {
            prefix: seed.short().to_string(),
            index,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Address-like rendering handed to the transport: `<prefix>-<index>@<domain>`.
    pub fn address(&self, domain: &str) -> String {
        format!("{self}@{domain}")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:0width$}", self.prefix, self.index, width = INDEX_WIDTH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAddress<'a> {
    pub prefix: &'a str,
    pub index: u64,
}

/// Parses a rendered identity (with or without the `@domain` part).
///
/// Returns `None` for anything that is not a deterministic identity, e.g. a
/// fixed operator-supplied address.
pub fn parse_address(address: &str) -> Option<ParsedAddress<'_>> {
    let local = address.trim().split('@').next()?;
    let (prefix, digits) = local.rsplit_once('-')?;
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse().ok()?;
    Some(ParsedAddress { prefix, index })
}

/// One past the highest index issued under `prefix`, if any address matches.
pub fn next_index_for_prefix<'a, I>(addresses: I, prefix: &str) -> Option<u64>
where
    I: IntoIterator<Item = &'a str>,
{
    addresses
        .into_iter()
        .filter_map(parse_address)
        .filter(|parsed| parsed.prefix == prefix)
        .map(|parsed| parsed.index)
        .max()
        .map(|max| max.saturating_add(1))
}

/// The single prefix shared by every deterministic address.
///
/// Non-deterministic addresses are skipped. Returns `None` when there are no
/// deterministic addresses or when they disagree.
pub fn common_prefix<'a, I>(addresses: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut found: Option<&str> = None;
    for parsed in addresses.into_iter().filter_map(parse_address) {
        match found {
            None => found = Some(parsed.prefix),
            Some(prefix) if prefix == parsed.prefix => {}
            Some(_) => return None,
        }
    }
    found.map(str::to_string)
}
