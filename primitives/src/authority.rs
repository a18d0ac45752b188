use {
  crate::{Name, PublicKey},
  serde::{Deserialize, Serialize},
  std::fmt::Debug,
};

pub type Weight = u16;

/// Upper bound on the combined number of keys, accounts and waits
/// in a single authority.
pub const MAX_AUTHORITY_ENTRIES: usize = 1 << 16;

/// Billable bytes of one entry of each kind inside a stored authority.
pub const KEY_WEIGHT_BILLABLE_SIZE: u64 = 40;
pub const PERMISSION_LEVEL_WEIGHT_BILLABLE_SIZE: u64 = 24;
pub const WAIT_WEIGHT_BILLABLE_SIZE: u64 = 8;

/// A permission of an account, e.g. `alice@active`.
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
pub struct PermissionLevel {
  pub actor: Name,
  pub permission: Name,
}

impl PermissionLevel {
  pub fn new(actor: Name, permission: Name) -> Self {
    Self { actor, permission }
  }
}

impl Debug for PermissionLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}@{}", self.actor, self.permission)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyWeight {
  pub key: PublicKey,
  pub weight: Weight,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionLevelWeight {
  pub permission: PermissionLevel,
  pub weight: Weight,
}

/// Weight contributed once the transaction was delayed by at least
/// `wait_sec` seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaitWeight {
  pub wait_sec: u32,
  pub weight: Weight,
}

/// Weighted threshold over keys, other accounts' permissions and time
/// delays. It is satisfied when the weights of all satisfied entries add
/// up to at least `threshold`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authority {
  pub threshold: u32,
  pub keys: Vec<KeyWeight>,
  pub accounts: Vec<PermissionLevelWeight>,
  pub waits: Vec<WaitWeight>,
}

impl Authority {
  /// Single key authority with threshold 1.
  pub fn from_key(key: PublicKey) -> Self {
    Self {
      threshold: 1,
      keys: vec![KeyWeight { key, weight: 1 }],
      accounts: vec![],
      waits: vec![],
    }
  }

  /// Single account permission authority with threshold 1.
  pub fn from_permission(permission: PermissionLevel) -> Self {
    Self {
      threshold: 1,
      keys: vec![],
      accounts: vec![PermissionLevelWeight {
        permission,
        weight: 1,
      }],
      waits: vec![],
    }
  }

  /// Checks the structural shape of the authority.
  ///
  /// Keys, accounts and waits must each be sorted in strictly ascending
  /// order, which also rules out duplicates. The threshold must be
  /// non-zero and reachable by the sum of all weights.
  pub fn validate(&self) -> bool {
    let entries = self.keys.len() + self.accounts.len() + self.waits.len();
    if entries > MAX_AUTHORITY_ENTRIES || self.threshold == 0 {
      return false;
    }

    let ascending_keys = self.keys.windows(2).all(|w| w[0].key < w[1].key);
    let ascending_accounts = self
      .accounts
      .windows(2)
      .all(|w| w[0].permission < w[1].permission);
    let ascending_waits =
      self.waits.windows(2).all(|w| w[0].wait_sec < w[1].wait_sec);
    if !(ascending_keys && ascending_accounts && ascending_waits) {
      return false;
    }

    let total_weight: u64 = self
      .keys
      .iter()
      .map(|k| k.weight)
      .chain(self.accounts.iter().map(|a| a.weight))
      .chain(self.waits.iter().map(|w| w.weight))
      .map(u64::from)
      .sum();

    total_weight >= u64::from(self.threshold)
  }

  /// Longest delay this authority can wait on, if any.
  pub fn max_delay(&self) -> Option<u32> {
    self.waits.last().map(|w| w.wait_sec)
  }

  /// Bytes charged to the permission owner for storing this authority.
  pub fn billable_size(&self) -> u64 {
    self.keys.len() as u64 * KEY_WEIGHT_BILLABLE_SIZE
      + self.accounts.len() as u64 * PERMISSION_LEVEL_WEIGHT_BILLABLE_SIZE
      + self.waits.len() as u64 * WAIT_WEIGHT_BILLABLE_SIZE
  }
}
