use {
  serde::{Deserialize, Serialize},
  std::{
    fmt::{Debug, Display},
    str::FromStr,
  },
  thiserror::Error,
};

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// Longest name that fits in the 64 bit representation without
/// the truncated 13th character.
pub const MAX_NAME_LENGTH: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
  #[error("name '{0}' is longer than {MAX_NAME_LENGTH} characters")]
  TooLong(String),

  #[error("name '{0}' contains characters outside of [.1-5a-z]")]
  InvalidCharacter(String),

  #[error("name '{0}' cannot end with a dot")]
  TrailingDot(String),
}

/// Identifier of accounts, actions, permissions and tables.
///
/// Names are up to 12 characters from the alphabet `.12345a-z` packed
/// into a single `u64`, five bits per character starting from the most
/// significant bits. This makes them cheap to compare and order, and their
/// ordering matches the lexicographical ordering of their string form.
///
/// The zero value is the empty name and is used as "no name" in several
/// places, for example an `onfee` action without a beneficiary producer.
#[derive(
  Copy,
  Clone,
  Default,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
pub struct Name(u64);

const fn symbol(c: u8) -> Option<u64> {
  match c {
    b'a'..=b'z' => Some((c - b'a') as u64 + 6),
    b'1'..=b'5' => Some((c - b'1') as u64 + 1),
    b'.' => Some(0),
    _ => None,
  }
}

impl Name {
  pub const fn from_u64(value: u64) -> Self {
    Self(value)
  }

  /// Builds a name from a string at compile time.
  ///
  /// Panics (fails compilation when used in a const context) on names
  /// that would be rejected by [`FromStr`].
  pub const fn constant(s: &str) -> Self {
    let bytes = s.as_bytes();
    if bytes.len() > MAX_NAME_LENGTH {
      panic!("name too long");
    }
    let mut value = 0u64;
    let mut i = 0;
    while i < bytes.len() {
      let sym = match symbol(bytes[i]) {
        Some(sym) => sym,
        None => panic!("invalid character in name"),
      };
      value |= (sym & 0x1f) << (64 - 5 * (i + 1));
      i += 1;
    }
    Self(value)
  }

  pub const fn as_u64(&self) -> u64 {
    self.0
  }

  pub const fn is_empty(&self) -> bool {
    self.0 == 0
  }

  /// Number of characters in the string form of this name.
  pub fn len(&self) -> usize {
    self.to_string().len()
  }

  /// True if the string form of the name starts with the given prefix,
  /// used for reserved namespaces like `sys.`.
  pub fn has_prefix(&self, prefix: &str) -> bool {
    self.to_string().starts_with(prefix)
  }
}

impl Display for Name {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut out = [b'.'; 13];
    let mut tmp = self.0;
    for i in 0..=12 {
      let mask = if i == 0 { 0x0f } else { 0x1f };
      out[12 - i] = CHARMAP[(tmp & mask) as usize];
      tmp >>= if i == 0 { 4 } else { 5 };
    }
    let len = out.iter().rposition(|c| *c != b'.').map_or(0, |p| p + 1);
    // every byte comes from CHARMAP, which is ascii.
    write!(f, "{}", String::from_utf8_lossy(&out[..len]))
  }
}

impl Debug for Name {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "name({self})")
  }
}

impl FromStr for Name {
  type Err = NameError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.len() > MAX_NAME_LENGTH {
      return Err(NameError::TooLong(s.into()));
    }
    if s.ends_with('.') {
      return Err(NameError::TrailingDot(s.into()));
    }
    if s.bytes().any(|c| symbol(c).is_none()) {
      return Err(NameError::InvalidCharacter(s.into()));
    }
    Ok(Self::constant(s))
  }
}

impl TryFrom<&str> for Name {
  type Error = NameError;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    FromStr::from_str(value)
  }
}

impl From<Name> for String {
  fn from(name: Name) -> Self {
    name.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::{Name, NameError};

  #[test]
  fn name_string_forms() -> anyhow::Result<()> {
    for s in ["alice", "sys", "sys.prods", "a1b2c3d4e5", "abcdefghijkl"] {
      let name: Name = s.parse()?;
      assert_eq!(name.to_string(), s);
      assert_eq!(name.len(), s.len());
    }

    assert_eq!(Name::constant("owner"), "owner".parse()?);
    assert!(Name::default().is_empty());
    assert_eq!(Name::default().to_string(), "");
    Ok(())
  }

  #[test]
  fn name_ordering_is_lexicographic() -> anyhow::Result<()> {
    let a: Name = "alice".parse()?;
    let b: Name = "bob".parse()?;
    let c: Name = "bobby".parse()?;
    assert!(a < b);
    assert!(b < c);
    Ok(())
  }

  #[test]
  fn name_rejects_invalid() {
    assert!(matches!(
      "abcdefghijklm".parse::<Name>(),
      Err(NameError::TooLong(_))
    ));
    assert!(matches!(
      "Alice".parse::<Name>(),
      Err(NameError::InvalidCharacter(_))
    ));
    assert!(matches!(
      "bob6".parse::<Name>(),
      Err(NameError::InvalidCharacter(_))
    ));
    assert!(matches!(
      "alice.".parse::<Name>(),
      Err(NameError::TrailingDot(_))
    ));
  }

  #[test]
  fn name_prefix() -> anyhow::Result<()> {
    assert!("sys.token".parse::<Name>()?.has_prefix("sys."));
    assert!(!"system".parse::<Name>()?.has_prefix("sys."));
    Ok(())
  }
}
