use {
  crate::objects::{
    AccountBalance,
    AccountObject,
    AccountSequenceObject,
    ActionFeeObject,
    ConfigObject,
    GeneratedTransaction,
    PermissionId,
    PermissionLinkObject,
    PermissionObject,
    ProducerInfo,
    ResourceLimitsObject,
    ResourceState,
    ResourceUsageObject,
    VoteInfo,
  },
  ledger_primitives::{Name, TransactionId},
  std::{
    collections::BTreeMap,
    fmt::Debug,
    ops::RangeBounds,
  },
};

/// Nested undo sessions over mutable state.
///
/// Every mutation made while a session is open is recorded, so the
/// session can be undone, folded into its parent (squash) or made
/// permanent (commit).
pub trait Undoable {
  fn start_session(&mut self);

  /// Reverts every change made since the newest session started and
  /// closes it.
  fn undo(&mut self);

  /// Closes the newest session, keeping its changes. They become part
  /// of the enclosing session, or permanent if there is none.
  fn squash(&mut self);

  /// Makes all changes permanent and drops every open session.
  fn commit(&mut self);
}

/// An ordered table that remembers the previous value of every row it
/// touches while undo sessions are open.
#[derive(Debug, Clone)]
pub struct Table<K, V> {
  rows: BTreeMap<K, V>,
  // for every open session, the value each touched key had
  // before the session first modified it.
  sessions: Vec<BTreeMap<K, Option<V>>>,
}

impl<K, V> Default for Table<K, V> {
  fn default() -> Self {
    Self {
      rows: BTreeMap::new(),
      sessions: vec![],
    }
  }
}

impl<K: Ord + Clone, V: Clone> Table<K, V> {
  pub fn get(&self, key: &K) -> Option<&V> {
    self.rows.get(key)
  }

  pub fn contains(&self, key: &K) -> bool {
    self.rows.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
    self.rows.iter()
  }

  pub fn range<R: RangeBounds<K>>(
    &self,
    range: R,
  ) -> impl Iterator<Item = (&K, &V)> {
    self.rows.range(range)
  }

  /// Inserts or replaces a row, returning the previous value.
  pub fn insert(&mut self, key: K, value: V) -> Option<V> {
    self.record(&key);
    self.rows.insert(key, value)
  }

  /// Mutates a row in place. Returns false if there is no such row.
  pub fn modify(&mut self, key: &K, f: impl FnOnce(&mut V)) -> bool {
    if !self.rows.contains_key(key) {
      return false;
    }
    self.record(key);
    match self.rows.get_mut(key) {
      Some(value) => {
        f(value);
        true
      }
      None => false,
    }
  }

  pub fn remove(&mut self, key: &K) -> Option<V> {
    if !self.rows.contains_key(key) {
      return None;
    }
    self.record(key);
    self.rows.remove(key)
  }

  fn record(&mut self, key: &K) {
    if let Some(log) = self.sessions.last_mut() {
      if !log.contains_key(key) {
        log.insert(key.clone(), self.rows.get(key).cloned());
      }
    }
  }
}

impl<K: Ord + Clone, V: Clone> Undoable for Table<K, V> {
  fn start_session(&mut self) {
    self.sessions.push(BTreeMap::new());
  }

  fn undo(&mut self) {
    if let Some(log) = self.sessions.pop() {
      for (key, previous) in log {
        match previous {
          Some(value) => self.rows.insert(key, value),
          None => self.rows.remove(&key),
        };
      }
    }
  }

  fn squash(&mut self) {
    if let Some(log) = self.sessions.pop() {
      if let Some(parent) = self.sessions.last_mut() {
        for (key, previous) in log {
          // the parent keeps the oldest value it has seen
          parent.entry(key).or_insert(previous);
        }
      }
    }
  }

  fn commit(&mut self) {
    self.sessions.clear();
  }
}

/// A single undoable value.
#[derive(Debug, Clone, Default)]
pub struct Singleton<T> {
  value: T,
  sessions: Vec<Option<T>>,
}

impl<T: Clone> Singleton<T> {
  pub fn new(value: T) -> Self {
    Self {
      value,
      sessions: vec![],
    }
  }

  pub fn get(&self) -> &T {
    &self.value
  }

  pub fn modify<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
    if let Some(saved @ None) = self.sessions.last_mut() {
      *saved = Some(self.value.clone());
    }
    f(&mut self.value)
  }
}

impl<T: Clone> Undoable for Singleton<T> {
  fn start_session(&mut self) {
    self.sessions.push(None);
  }

  fn undo(&mut self) {
    if let Some(Some(previous)) = self.sessions.pop() {
      self.value = previous;
    }
  }

  fn squash(&mut self) {
    if let Some(saved) = self.sessions.pop() {
      if let Some(parent @ None) = self.sessions.last_mut() {
        *parent = saved;
      }
    }
  }

  fn commit(&mut self) {
    self.sessions.clear();
  }
}

/// The whole replicated ledger state.
///
/// All tables share the same undo session stack, so a session on the
/// database spans every table.
#[derive(Debug)]
pub struct Database {
  pub accounts: Table<Name, AccountObject>,
  pub sequences: Table<Name, AccountSequenceObject>,

  pub permissions: Table<PermissionId, PermissionObject>,
  /// (owner, name) index over `permissions`.
  pub permissions_by_owner: Table<(Name, Name), PermissionId>,
  pub next_permission_id: Singleton<PermissionId>,

  /// Keyed by (account, code, message type). An empty message type is
  /// the default link for every action of the code.
  pub links: Table<(Name, Name, Name), PermissionLinkObject>,

  pub fees: Table<(Name, Name), ActionFeeObject>,
  pub balances: Table<Name, AccountBalance>,
  pub producers: Table<Name, ProducerInfo>,
  /// Keyed by (voter, producer).
  pub votes: Table<(Name, Name), VoteInfo>,
  pub configs: Table<Name, ConfigObject>,

  /// Keyed by (sender, sender id). Transactions delayed by their
  /// signers have an empty sender.
  pub generated: Table<(Name, u128), GeneratedTransaction>,
  /// Ids of applied input transactions with their expiration.
  pub recorded: Table<TransactionId, u32>,

  pub resource_limits: Table<Name, ResourceLimitsObject>,
  pub resource_usage: Table<Name, ResourceUsageObject>,
  pub resource_state: Singleton<ResourceState>,

  depth: usize,
}

impl Database {
  pub fn new(resource_state: ResourceState) -> Self {
    Self {
      accounts: Table::default(),
      sequences: Table::default(),
      permissions: Table::default(),
      permissions_by_owner: Table::default(),
      // id zero is the parent of every owner permission
      next_permission_id: Singleton::new(1),
      links: Table::default(),
      fees: Table::default(),
      balances: Table::default(),
      producers: Table::default(),
      votes: Table::default(),
      configs: Table::default(),
      generated: Table::default(),
      recorded: Table::default(),
      resource_limits: Table::default(),
      resource_usage: Table::default(),
      resource_state: Singleton::new(resource_state),
      depth: 0,
    }
  }

  /// Number of currently open undo sessions.
  pub fn session_depth(&self) -> usize {
    self.depth
  }

  fn tables(&mut self) -> [&mut dyn Undoable; 16] {
    [
      &mut self.accounts,
      &mut self.sequences,
      &mut self.permissions,
      &mut self.permissions_by_owner,
      &mut self.next_permission_id,
      &mut self.links,
      &mut self.fees,
      &mut self.balances,
      &mut self.producers,
      &mut self.votes,
      &mut self.configs,
      &mut self.generated,
      &mut self.recorded,
      &mut self.resource_limits,
      &mut self.resource_usage,
      &mut self.resource_state,
    ]
  }
}

impl Undoable for Database {
  fn start_session(&mut self) {
    self.tables().into_iter().for_each(|t| t.start_session());
    self.depth += 1;
  }

  fn undo(&mut self) {
    if self.depth == 0 {
      return;
    }
    self.tables().into_iter().for_each(|t| t.undo());
    self.depth -= 1;
  }

  fn squash(&mut self) {
    if self.depth == 0 {
      return;
    }
    self.tables().into_iter().for_each(|t| t.squash());
    self.depth -= 1;
  }

  fn commit(&mut self) {
    self.tables().into_iter().for_each(|t| t.commit());
    self.depth = 0;
  }
}
