//! Identifiers: [Tag], [Version], [Protocol] and [Timestamp].

use crate::always::*;
use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::{Choice, ConstantTimeEq};

pub use getrandom::Error as EntropyError;

static BASE32: &[u8; 32] = b"0123456789ABCDFGHJKLMNPQRSTVWXYZ";

fn base32_value(c: u8) -> Option<u8> {
    BASE32.iter().position(|&b| b == c).map(|i| i as u8)
}

/// Opaque random identifier naming one key lineage, account, or document.
///
/// # Examples
///
/// ```
/// use zf_notary::Tag;
/// let tag = Tag::from_bytes([0; 20]);
/// assert_eq!(tag.to_string(), "#00000000000000000000000000000000");
/// assert_eq!(tag.to_string().parse::<Tag>().unwrap(), tag);
/// ```
#[derive(Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag {
    value: [u8; TAG],
}

impl Tag {
    /// The raw bytes of the `Tag`.
    pub fn as_bytes(&self) -> &[u8; TAG] {
        &self.value
    }

    /// Create from bytes.
    pub fn from_bytes(value: [u8; TAG]) -> Self {
        Self { value }
    }

    /// Return a new [Tag] with entropy from [getrandom::fill()].
    pub fn generate() -> Result<Self, EntropyError> {
        let mut buf = [0; TAG];
        getrandom::fill(&mut buf)?;
        Ok(Self::from_bytes(buf))
    }

    /// Encode in base 32 (without the leading `#`).
    pub fn to_base32(&self) -> ArrayString<TAG_TEXT> {
        let mut text = ArrayString::new();
        for chunk in self.value.chunks(5) {
            let mut bits: u64 = 0;
            for &b in chunk {
                bits = (bits << 8) | b as u64;
            }
            for i in (0..8).rev() {
                text.push(BASE32[((bits >> (i * 5)) & 0x1f) as usize] as char);
            }
        }
        text
    }

    /// Decode from base 32, with or without the leading `#`.
    pub fn from_base32(text: &str) -> Result<Self, TagParseError> {
        let text = text.strip_prefix('#').unwrap_or(text);
        if text.len() != TAG_TEXT {
            return Err(TagParseError(format!(
                "tag needs {TAG_TEXT} characters; got {}",
                text.len()
            )));
        }
        let mut value = [0; TAG];
        for (i, chunk) in text.as_bytes().chunks(8).enumerate() {
            let mut bits: u64 = 0;
            for &c in chunk {
                let v = base32_value(c)
                    .ok_or_else(|| TagParseError(format!("invalid tag character {:?}", c as char)))?;
                bits = (bits << 5) | v as u64;
            }
            value[i * 5..i * 5 + 5].copy_from_slice(&bits.to_be_bytes()[3..8]);
        }
        Ok(Self { value })
    }
}

impl ConstantTimeEq for Tag {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.value[..].ct_eq(&other.value[..])
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl core::hash::Hash for Tag {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Tag").field(&self.to_base32().as_str()).finish()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.to_base32())
    }
}

impl FromStr for Tag {
    type Err = TagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base32(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = TagParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

/// A tag, version or protocol string could not be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct TagParseError(String);

fn parse_v(s: &str) -> Result<u32, TagParseError> {
    let digits = s
        .strip_prefix('v')
        .ok_or_else(|| TagParseError(format!("expected v<N>; got {s:?}")))?;
    let canonical = digits.bytes().all(|b| b.is_ascii_digit()) && !digits.starts_with('0');
    match digits.parse::<u32>() {
        Ok(n) if canonical && n > 0 => Ok(n),
        _ => Err(TagParseError(format!("expected v<N>; got {s:?}"))),
    }
}

/// Monotonically increasing document version, rendered `v<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(u32);

impl Version {
    /// The first version of anything.
    pub const FIRST: Version = Version(1);

    /// Version `n` (`n` must be at least 1).
    pub fn new(n: u32) -> Option<Self> {
        if n == 0 { None } else { Some(Self(n)) }
    }

    /// Numeric value.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// The version that follows this one, or `None` at `u32::MAX`.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for Version {
    type Err = TagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(parse_v(s)?))
    }
}

impl TryFrom<String> for Version {
    type Error = TagParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// Notary protocol version, rendered `v<N>`.
///
/// Each protocol version gets its own security module and configuration namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Protocol(u32);

impl Protocol {
    /// Protocol version `n` (`n` must be at least 1).
    pub fn new(n: u32) -> Option<Self> {
        if n == 0 { None } else { Some(Self(n)) }
    }

    // Only for constants; a zero fails at compile time.
    pub(crate) const fn fixed(n: u32) -> Self {
        assert!(n > 0);
        Self(n)
    }

    /// Numeric value.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for Protocol {
    type Err = TagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(parse_v(s)?))
    }
}

impl TryFrom<String> for Protocol {
    type Error = TagParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Protocol> for String {
    fn from(p: Protocol) -> Self {
        p.to_string()
    }
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The current time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Create from milliseconds since the epoch.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tag_generate() {
        let count = 1024;
        let mut hset = HashSet::new();
        for _ in 0..count {
            assert!(hset.insert(Tag::generate().unwrap()));
        }
        assert_eq!(hset.len(), count);
    }

    #[test]
    fn test_tag_base32() {
        let tag = Tag::from_bytes([0; TAG]);
        assert_eq!(tag.to_base32().as_str(), "00000000000000000000000000000000");
        let tag = Tag::from_bytes([255; TAG]);
        assert_eq!(tag.to_base32().as_str(), "ZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ");
        let mut bytes = [0; TAG];
        bytes[4] = 1;
        bytes[19] = 31;
        let tag = Tag::from_bytes(bytes);
        assert_eq!(tag.to_base32().as_str(), "0000000100000000000000000000000Z");
        assert_eq!(tag.to_string(), "#0000000100000000000000000000000Z");
    }

    #[test]
    fn test_tag_roundtrip() {
        for _ in 0..420 {
            let tag = Tag::generate().unwrap();
            let text = tag.to_string();
            assert_eq!(text.len(), TAG_TEXT + 1);
            assert!(text.starts_with('#'));
            assert_eq!(text.parse::<Tag>().unwrap(), tag);
            assert_eq!(Tag::from_base32(tag.to_base32().as_str()).unwrap(), tag);
        }
    }

    #[test]
    fn test_tag_parse_errors() {
        assert!("".parse::<Tag>().is_err());
        assert!("#".parse::<Tag>().is_err());
        assert!("#0000000000000000000000000000000".parse::<Tag>().is_err()); // 31
        assert!("#000000000000000000000000000000000".parse::<Tag>().is_err()); // 33
        assert!("#E0000000000000000000000000000000".parse::<Tag>().is_err()); // No E
        assert!("#u0000000000000000000000000000000".parse::<Tag>().is_err()); // Lowercase
    }

    #[test]
    fn test_tag_serde() {
        let tag = Tag::from_bytes([69; TAG]);
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, format!("\"{tag}\""));
        assert_eq!(serde_json::from_str::<Tag>(&json).unwrap(), tag);
        assert!(serde_json::from_str::<Tag>("\"#nope\"").is_err());
    }

    #[test]
    fn test_version() {
        assert_eq!(Version::FIRST.get(), 1);
        assert_eq!(Version::FIRST.next(), Version::new(2));
        assert_eq!(Version::new(0), None);
        assert_eq!(Version::new(42).unwrap().to_string(), "v42");
        assert_eq!("v7".parse::<Version>().unwrap(), Version::new(7).unwrap());
        assert!("v0".parse::<Version>().is_err());
        assert!("v07".parse::<Version>().is_err());
        assert!("7".parse::<Version>().is_err());
        assert!("v".parse::<Version>().is_err());
        assert!("v-1".parse::<Version>().is_err());
        assert!(Some(Version::FIRST) < Version::FIRST.next());
        let json = serde_json::to_string(&Version::FIRST).unwrap();
        assert_eq!(json, "\"v1\"");
    }

    #[test]
    fn test_version_last() {
        let last: Version = "v4294967295".parse().unwrap();
        assert_eq!(last, Version::new(u32::MAX).unwrap());
        assert_eq!(last.next(), None);
        assert_eq!(Version::new(u32::MAX - 1).unwrap().next(), Some(last));
        assert!("v4294967296".parse::<Version>().is_err());
    }

    #[test]
    fn test_protocol() {
        let p = Protocol::new(3).unwrap();
        assert_eq!(p.to_string(), "v3");
        assert_eq!("v3".parse::<Protocol>().unwrap(), p);
        assert!(Protocol::new(2).unwrap() < p);
        assert_eq!(Protocol::new(0), None);
        assert!("v0".parse::<Protocol>().is_err());
        assert_eq!(Protocol::fixed(1), Protocol::new(1).unwrap());
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"v3\"");
        assert_eq!(serde_json::from_str::<Protocol>("\"v3\"").unwrap(), p);
    }

    #[test]
    fn test_timestamp() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(a <= b);
        assert!(a.as_millis() > 1_600_000_000_000);
        assert_eq!(Timestamp::from_millis(314).as_millis(), 314);
    }
}
