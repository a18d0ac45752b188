use {
  crate::{Action, Asset, Name, PublicKey},
  ed25519_dalek::{Keypair, Signature, SignatureError, Signer},
  multihash::{Hasher, Sha3_256},
  once_cell::sync::OnceCell,
  serde::{Deserialize, Serialize},
  std::{
    collections::BTreeSet,
    fmt::{Debug, Display},
  },
};

/// SHA3-256 of the msgpack encoding of a [`Transaction`].
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
pub struct TransactionId([u8; 32]);

impl TransactionId {
  pub fn from_bytes(bytes: [u8; 32]) -> Self {
    Self(bytes)
  }

  /// Identifier under which a delayed transaction is scheduled.
  ///
  /// Built from the third and fourth little-endian 64 bit words of the
  /// hash (word 3 is the high half), so that canceling a delayed
  /// transaction only needs its id.
  pub fn sender_id(&self) -> u128 {
    let word = |i: usize| {
      let mut bytes = [0u8; 8];
      bytes.copy_from_slice(&self.0[i * 8..(i + 1) * 8]);
      u64::from_le_bytes(bytes)
    };
    (u128::from(word(3)) << 64) | u128::from(word(2))
  }
}

impl AsRef<[u8]> for TransactionId {
  fn as_ref(&self) -> &[u8] {
    &self.0
  }
}

impl Display for TransactionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", hex::encode(self.0))
  }
}

impl Debug for TransactionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "trx({})", hex::encode(self.0))
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
  /// Seconds since unix epoch after which the transaction
  /// can no longer be included in a block.
  pub expiration: u32,

  /// Upper bound on billed network usage in 8 byte words,
  /// zero means no limit beyond the chain limits.
  pub max_net_usage_words: u32,

  /// Upper bound on billed cpu time in milliseconds,
  /// zero means no limit beyond the chain limits.
  pub max_cpu_usage_ms: u8,

  /// Number of seconds to wait before executing the actions. A delayed
  /// transaction is scheduled instead of executed when pushed.
  pub delay_sec: u32,

  /// The most the first authorizer agrees to pay in fees for all
  /// actions of this transaction.
  pub fee: Asset,

  pub context_free_actions: Vec<Action>,
  pub actions: Vec<Action>,
}

impl Transaction {
  pub fn id(&self) -> TransactionId {
    let mut hasher = Sha3_256::default();
    hasher.update(&self.pack());
    let mut id = [0u8; 32];
    id.copy_from_slice(hasher.finalize());
    TransactionId(id)
  }

  pub fn pack(&self) -> Vec<u8> {
    rmp_serde::to_vec(self).expect("transaction fields are always encodable")
  }

  /// The account that pays fees of the transaction.
  pub fn first_authorizer(&self) -> Option<Name> {
    self
      .actions
      .iter()
      .flat_map(|act| act.authorization.iter())
      .map(|level| level.actor)
      .next()
  }

  pub fn sign(self, keypairs: &[&Keypair]) -> SignedTransaction {
    let id = self.id();
    let signatures = keypairs
      .iter()
      .map(|kp| (PublicKey::from(kp.public), kp.sign(id.as_ref())))
      .collect();
    SignedTransaction {
      trx: self,
      signatures,
      id_cache: OnceCell::new(),
    }
  }
}

/// A transaction together with the signatures over its id.
///
/// Ed25519 keys cannot be recovered from signatures, so every
/// signature travels with the key that made it and the signing key set
/// is obtained by verifying each pair.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
  pub trx: Transaction,
  pub signatures: Vec<(PublicKey, Signature)>,

  #[serde(skip)]
  id_cache: OnceCell<TransactionId>,
}

impl SignedTransaction {
  pub fn new(
    trx: Transaction,
    signatures: Vec<(PublicKey, Signature)>,
  ) -> Self {
    Self {
      trx,
      signatures,
      id_cache: OnceCell::new(),
    }
  }

  pub fn id(&self) -> &TransactionId {
    self.id_cache.get_or_init(|| self.trx.id())
  }

  /// Verifies every attached signature against the transaction id and
  /// returns the set of keys that signed it.
  pub fn signing_keys(&self) -> Result<BTreeSet<PublicKey>, SignatureError> {
    let id = self.id();
    let mut keys = BTreeSet::new();
    for (key, signature) in &self.signatures {
      key.verify(id.as_ref(), signature)?;
      keys.insert(*key);
    }
    Ok(keys)
  }

  /// Sizes in bytes of the part of the transaction that is always kept
  /// and of the part that can be pruned (signatures).
  pub fn packed_sizes(&self) -> (u64, u64) {
    let unprunable = self.trx.pack().len() as u64;
    let prunable = self.signatures.len() as u64 * (32 + 64);
    (unprunable, prunable)
  }
}

impl Debug for SignedTransaction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SignedTransaction")
      .field("id", self.id())
      .field("trx", &self.trx)
      .field("signatures", &self.signatures.len())
      .finish()
  }
}
