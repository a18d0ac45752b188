use {
  crate::{authorization, store::Database},
  ledger_primitives::{Authority, PermissionLevel, PublicKey},
  std::collections::{BTreeMap, BTreeSet},
};

/// Decides whether a set of signing keys and a transaction delay satisfy
/// authorities, following account references recursively.
///
/// Keys that contributed to satisfying any authority are remembered, so
/// that signatures that were not needed can be detected afterwards.
pub struct AuthorityChecker<'a> {
  db: &'a Database,
  provided_keys: &'a BTreeSet<PublicKey>,
  provided_delay_sec: u32,
  max_depth: u16,
  used_keys: BTreeSet<PublicKey>,
  cache: BTreeMap<PermissionLevel, bool>,
}

impl<'a> AuthorityChecker<'a> {
  pub fn new(
    db: &'a Database,
    provided_keys: &'a BTreeSet<PublicKey>,
    provided_delay_sec: u32,
    max_depth: u16,
  ) -> Self {
    Self {
      db,
      provided_keys,
      provided_delay_sec,
      max_depth,
      used_keys: BTreeSet::new(),
      cache: BTreeMap::new(),
    }
  }

  /// True if the stored authority of `level` is satisfied.
  /// Permissions that do not exist are never satisfied.
  pub fn satisfied(&mut self, level: &PermissionLevel) -> bool {
    self.level_satisfied(level, 0)
  }

  pub fn authority_satisfied(&mut self, authority: &Authority) -> bool {
    self.weigh(authority, 0)
  }

  /// Provided keys that were not needed by any checked authority.
  pub fn unused_keys(&self) -> impl Iterator<Item = &PublicKey> {
    self.provided_keys.difference(&self.used_keys)
  }

  pub fn used_keys(&self) -> &BTreeSet<PublicKey> {
    &self.used_keys
  }

  fn level_satisfied(&mut self, level: &PermissionLevel, depth: u16) -> bool {
    if let Some(cached) = self.cache.get(level) {
      return *cached;
    }

    let authority = match authorization::find_permission(self.db, level) {
      Some(permission) => permission.auth.clone(),
      None => return false,
    };

    let satisfied = self.weigh(&authority, depth);
    self.cache.insert(*level, satisfied);
    satisfied
  }

  fn weigh(&mut self, authority: &Authority, depth: u16) -> bool {
    let threshold = u64::from(authority.threshold);
    let mut total = 0u64;

    for wait in &authority.waits {
      if self.provided_delay_sec >= wait.wait_sec {
        total += u64::from(wait.weight);
      }
    }
    if total >= threshold {
      return true;
    }

    for key in &authority.keys {
      if self.provided_keys.contains(&key.key) {
        self.used_keys.insert(key.key);
        total += u64::from(key.weight);
        if total >= threshold {
          return true;
        }
      }
    }

    if depth < self.max_depth {
      for account in &authority.accounts {
        if self.level_satisfied(&account.permission, depth + 1) {
          total += u64::from(account.weight);
          if total >= threshold {
            return true;
          }
        }
      }
    }

    total >= threshold
  }
}
