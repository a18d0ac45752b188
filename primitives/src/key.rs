use {
  ed25519_dalek::{Signature, SignatureError, Verifier},
  serde::{Deserialize, Serialize},
  std::{
    fmt::{Debug, Display},
    ops::Deref,
    str::FromStr,
  },
};

/// Public half of an Ed25519 keypair as it appears in authorities.
///
/// Stored as raw compressed point bytes so that keys can be ordered and
/// hashed. Authorities require their keys in strictly ascending order of
/// these bytes, which is also what makes duplicate keys detectable.
#[derive(
  Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
  pub fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  /// Verifies an Ed25519 signature over `message` made by this key.
  ///
  /// Fails if the bytes do not decode to a valid curve point or if the
  /// signature does not match.
  pub fn verify(
    &self,
    message: &[u8],
    signature: &Signature,
  ) -> Result<(), SignatureError> {
    ed25519_dalek::PublicKey::from_bytes(&self.0)?.verify(message, signature)
  }
}

impl AsRef<[u8]> for PublicKey {
  fn as_ref(&self) -> &[u8] {
    &self.0
  }
}

impl Deref for PublicKey {
  type Target = [u8];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl Display for PublicKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", bs58::encode(self.0).into_string())
  }
}

impl Debug for PublicKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "key({})", bs58::encode(self.0).into_string())
  }
}

impl FromStr for PublicKey {
  type Err = bs58::decode::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut bytes = [0u8; 32];
    bs58::decode(s).into(&mut bytes)?;
    Ok(Self(bytes))
  }
}

impl TryFrom<&str> for PublicKey {
  type Error = bs58::decode::Error;

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    FromStr::from_str(value)
  }
}

impl From<ed25519_dalek::PublicKey> for PublicKey {
  fn from(p: ed25519_dalek::PublicKey) -> Self {
    Self(*p.as_bytes())
  }
}

impl From<PublicKey> for String {
  fn from(pk: PublicKey) -> Self {
    bs58::encode(pk.0).into_string()
  }
}
