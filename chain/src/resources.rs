//! Stake weighted net and cpu limits, averaged usage and RAM quotas.

use {
  crate::{
    config::ChainConfig,
    error::{Error, LimitCause},
    objects::{ResourceLimitsObject, ResourceState, ResourceUsageObject},
    store::Database,
  },
  ledger_primitives::Name,
  std::collections::BTreeSet,
};

/// Fixed point precision of averaged usage values.
pub const RATE_LIMITING_PRECISION: u64 = 1_000_000;

fn divide_ceil(num: u128, den: u128) -> u128 {
  if den == 0 {
    return 0;
  }
  (num + den - 1) / den
}

fn clamp_u64(value: u128) -> u64 {
  u64::try_from(value).unwrap_or(u64::MAX)
}

/// Exponentially decaying average of usage over a window of blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageAccumulator {
  pub last_ordinal: u32,
  /// Average scaled by [`RATE_LIMITING_PRECISION`].
  pub value_ex: u64,
  pub consumed: u64,
}

impl UsageAccumulator {
  pub fn average(&self) -> u64 {
    clamp_u64(divide_ceil(
      u128::from(self.value_ex),
      u128::from(RATE_LIMITING_PRECISION),
    ))
  }

  /// Adds `units` consumed in block `ordinal`, decaying the previous
  /// average by the number of blocks elapsed since the last update.
  pub fn add(&mut self, units: u64, ordinal: u32, window_size: u32) {
    let window = u128::from(window_size.max(1));
    let contribution = clamp_u64(divide_ceil(
      u128::from(units) * u128::from(RATE_LIMITING_PRECISION),
      window,
    ));

    if self.last_ordinal != ordinal {
      let elapsed = ordinal.saturating_sub(self.last_ordinal);
      if u128::from(elapsed) < window {
        let remaining = window - u128::from(elapsed);
        self.value_ex =
          clamp_u64(u128::from(self.value_ex) * remaining / window);
      } else {
        self.value_ex = 0;
      }
      self.last_ordinal = ordinal;
      self.consumed = self.average();
    }

    self.consumed = self.consumed.saturating_add(units);
    self.value_ex = self.value_ex.saturating_add(contribution);
  }
}

pub fn initial_state(config: &ChainConfig) -> ResourceState {
  ResourceState {
    virtual_net_limit: config.max_block_net_usage,
    virtual_cpu_limit: u64::from(config.max_block_cpu_usage),
    ..Default::default()
  }
}

/// Creates unlimited resource rows for a new account.
pub fn initialize_account(db: &mut Database, account: Name) -> Result<(), Error> {
  if db.resource_limits.contains(&account) {
    return Err(Error::Invariant(format!(
      "resource rows of {account} already exist"
    )));
  }
  db.resource_limits
    .insert(account, ResourceLimitsObject::default());
  db.resource_usage
    .insert(account, ResourceUsageObject::default());
  Ok(())
}

pub fn account_limits(db: &Database, account: Name) -> ResourceLimitsObject {
  db.resource_limits
    .get(&account)
    .copied()
    .unwrap_or_default()
}

/// Replaces the resource allotment of an account and keeps the chain
/// wide weight totals consistent.
///
/// Returns an error if the account already uses more RAM than the new
/// quota.
pub fn set_account_limits(
  db: &mut Database,
  account: Name,
  limits: ResourceLimitsObject,
) -> Result<(), Error> {
  let previous = db
    .resource_limits
    .get(&account)
    .copied()
    .ok_or(Error::AccountNotFound(account))?;

  let ram_usage = db
    .resource_usage
    .get(&account)
    .map(|u| u.ram_usage)
    .unwrap_or_default();
  if limits.ram_bytes >= 0 && ram_usage > limits.ram_bytes as u64 {
    return Err(Error::RamUsageExceeded {
      account,
      usage: ram_usage as i64,
      quota: limits.ram_bytes,
    });
  }

  let weight = |w: i64| w.max(0) as u64;
  db.resource_state.modify(|state| {
    state.total_net_weight = state.total_net_weight
      - weight(previous.net_weight).min(state.total_net_weight)
      + weight(limits.net_weight);
    state.total_cpu_weight = state.total_cpu_weight
      - weight(previous.cpu_weight).min(state.total_cpu_weight)
      + weight(limits.cpu_weight);
    state.total_ram_bytes = state.total_ram_bytes
      - weight(previous.ram_bytes).min(state.total_ram_bytes)
      + weight(limits.ram_bytes);
  });
  db.resource_limits.insert(account, limits);
  Ok(())
}

fn account_limit(
  weight: i64,
  total_weight: u64,
  capacity: u64,
  window: u32,
  used_value_ex: u64,
) -> i64 {
  if weight < 0 {
    return -1;
  }
  if total_weight == 0 {
    return 0;
  }

  let window = u128::from(window);
  let capacity_in_window = u128::from(capacity) * window;
  let max_use_in_window =
    capacity_in_window * weight as u128 / u128::from(total_weight);
  let used_in_window = divide_ceil(
    u128::from(used_value_ex) * window,
    u128::from(RATE_LIMITING_PRECISION),
  );

  if max_use_in_window <= used_in_window {
    0
  } else {
    i64::try_from(max_use_in_window - used_in_window).unwrap_or(i64::MAX)
  }
}

/// Net bytes the account may still use in the current window, -1 when
/// unlimited. With `elastic` the virtual capacity of uncongested blocks
/// is used instead of the block limit.
pub fn account_net_limit(
  db: &Database,
  config: &ChainConfig,
  account: Name,
  elastic: bool,
) -> i64 {
  let state = db.resource_state.get();
  let limits = account_limits(db, account);
  let used = db
    .resource_usage
    .get(&account)
    .map(|u| u.net_usage.value_ex)
    .unwrap_or_default();
  let capacity = if elastic {
    state.virtual_net_limit
  } else {
    config.max_block_net_usage
  };
  account_limit(
    limits.net_weight,
    state.total_net_weight,
    capacity,
    config.account_net_usage_average_window,
    used,
  )
}

/// Cpu microseconds the account may still use in the current window,
/// -1 when unlimited.
pub fn account_cpu_limit(
  db: &Database,
  config: &ChainConfig,
  account: Name,
  elastic: bool,
) -> i64 {
  let state = db.resource_state.get();
  let limits = account_limits(db, account);
  let used = db
    .resource_usage
    .get(&account)
    .map(|u| u.cpu_usage.value_ex)
    .unwrap_or_default();
  let capacity = if elastic {
    state.virtual_cpu_limit
  } else {
    u64::from(config.max_block_cpu_usage)
  };
  account_limit(
    limits.cpu_weight,
    state.total_cpu_weight,
    capacity,
    config.account_cpu_usage_average_window,
    used,
  )
}

/// Net bytes left in the block being produced.
pub fn block_net_limit(db: &Database, config: &ChainConfig) -> u64 {
  config
    .max_block_net_usage
    .saturating_sub(db.resource_state.get().pending_net_usage)
}

/// Cpu microseconds left in the block being produced.
pub fn block_cpu_limit(db: &Database, config: &ChainConfig) -> u64 {
  u64::from(config.max_block_cpu_usage)
    .saturating_sub(db.resource_state.get().pending_cpu_usage)
}

/// Charges a finished transaction to its billed accounts and to the
/// pending block.
pub fn add_transaction_usage(
  db: &mut Database,
  config: &ChainConfig,
  accounts: &BTreeSet<Name>,
  cpu_usage: u64,
  net_usage: u64,
  ordinal: u32,
) -> Result<(), Error> {
  for account in accounts {
    let found = db.resource_usage.modify(account, |usage| {
      usage.net_usage.add(
        net_usage,
        ordinal,
        config.account_net_usage_average_window,
      );
      usage.cpu_usage.add(
        cpu_usage,
        ordinal,
        config.account_cpu_usage_average_window,
      );
    });
    if !found {
      return Err(Error::AccountNotFound(*account));
    }

    let net_limit = account_net_limit(db, config, *account, true);
    if net_limit == 0 {
      return Err(Error::NetUsageExceeded {
        usage: net_usage,
        limit: 0,
        cause: LimitCause::Account,
      });
    }
    let cpu_limit = account_cpu_limit(db, config, *account, true);
    if cpu_limit == 0 {
      return Err(Error::CpuUsageExceeded {
        billed_us: cpu_usage,
        limit_us: 0,
        cause: LimitCause::Account,
      });
    }
  }

  let state = db.resource_state.modify(|state| {
    state.pending_net_usage += net_usage;
    state.pending_cpu_usage += cpu_usage;
    state.clone()
  });

  if state.pending_net_usage > config.max_block_net_usage {
    return Err(Error::NetUsageExceeded {
      usage: state.pending_net_usage,
      limit: config.max_block_net_usage,
      cause: LimitCause::Block,
    });
  }
  if state.pending_cpu_usage > u64::from(config.max_block_cpu_usage) {
    return Err(Error::CpuUsageExceeded {
      billed_us: state.pending_cpu_usage,
      limit_us: u64::from(config.max_block_cpu_usage),
      cause: LimitCause::Block,
    });
  }
  Ok(())
}

/// Applies a signed change to the persisted RAM usage of an account.
///
/// Usage going negative means the ledger released more bytes than it
/// ever billed, which is a fatal inconsistency.
pub fn add_pending_ram_usage(
  db: &mut Database,
  account: Name,
  delta: i64,
) -> Result<(), Error> {
  let usage = db
    .resource_usage
    .get(&account)
    .map(|u| u.ram_usage)
    .ok_or(Error::AccountNotFound(account))?;

  let updated = if delta >= 0 {
    usage.checked_add(delta as u64)
  } else {
    usage.checked_sub(delta.unsigned_abs())
  }
  .ok_or_else(|| {
    Error::Invariant(format!(
      "ram usage of {account} would become negative ({usage} + {delta})"
    ))
  })?;

  db.resource_usage
    .modify(&account, |u| u.ram_usage = updated);
  Ok(())
}

/// Fails if the account uses more RAM than its quota.
pub fn verify_account_ram_usage(
  db: &Database,
  account: Name,
) -> Result<(), Error> {
  let quota = account_limits(db, account).ram_bytes;
  let usage = db
    .resource_usage
    .get(&account)
    .map(|u| u.ram_usage)
    .unwrap_or_default();
  if quota >= 0 && usage > quota as u64 {
    return Err(Error::RamUsageExceeded {
      account,
      usage: usage as i64,
      quota,
    });
  }
  Ok(())
}

/// Folds the usage of a finished block into the block averages and
/// adjusts the elastic capacities.
pub fn process_block_usage(
  db: &mut Database,
  config: &ChainConfig,
  ordinal: u32,
) {
  db.resource_state.modify(|state| {
    let window = config.block_usage_average_window;
    state
      .average_block_net_usage
      .add(state.pending_net_usage, ordinal, window);
    state
      .average_block_cpu_usage
      .add(state.pending_cpu_usage, ordinal, window);

    state.virtual_net_limit = elastic_limit(
      state.virtual_net_limit,
      config.max_block_net_usage,
      state.average_block_net_usage.average(),
      config,
    );
    state.virtual_cpu_limit = elastic_limit(
      state.virtual_cpu_limit,
      u64::from(config.max_block_cpu_usage),
      state.average_block_cpu_usage.average(),
      config,
    );

    state.pending_net_usage = 0;
    state.pending_cpu_usage = 0;
  });
}

fn elastic_limit(
  current: u64,
  block_max: u64,
  average_usage: u64,
  config: &ChainConfig,
) -> u64 {
  let target = block_max * config.target_block_usage_pct / 100;
  let max = block_max.saturating_mul(config.max_elastic_multiplier);
  if average_usage > target {
    // congested, contract by 1%
    (current * 99 / 100).max(block_max)
  } else {
    // relax by 1/1000
    (current + current / 1000).max(current + 1).min(max)
  }
}

#[cfg(test)]
mod tests {
  use {
    super::*,
    crate::objects::ResourceState,
  };

  fn db_with(accounts: &[Name]) -> Database {
    let mut db = Database::new(initial_state(&ChainConfig::default()));
    for a in accounts {
      initialize_account(&mut db, *a).unwrap();
    }
    db
  }

  #[test]
  fn accumulator_decays_over_the_window() {
    let mut acc = UsageAccumulator::default();
    acc.add(1000, 1, 10);
    assert_eq!(acc.average(), 100);

    // five of ten blocks later half of the average is left
    acc.add(0, 6, 10);
    assert_eq!(acc.average(), 50);

    // a full window later nothing is left
    acc.add(0, 16, 10);
    assert_eq!(acc.average(), 0);
  }

  #[test]
  fn unlimited_accounts_report_negative_limits() {
    let alice = Name::constant("alice");
    let db = db_with(&[alice]);
    let config = ChainConfig::default();
    assert_eq!(account_net_limit(&db, &config, alice, true), -1);
    assert_eq!(account_cpu_limit(&db, &config, alice, false), -1);
  }

  #[test]
  fn stake_weighted_limits() {
    let alice = Name::constant("alice");
    let bob = Name::constant("bob");
    let mut db = db_with(&[alice, bob]);
    let config = ChainConfig {
      account_cpu_usage_average_window: 10,
      ..Default::default()
    };

    for (account, weight) in [(alice, 1), (bob, 3)] {
      set_account_limits(&mut db, account, ResourceLimitsObject {
        ram_bytes: 10_000,
        net_weight: weight,
        cpu_weight: weight,
      })
      .unwrap();
    }
    assert_eq!(db.resource_state.get().total_cpu_weight, 4);

    let capacity = u64::from(config.max_block_cpu_usage) * 10;
    assert_eq!(
      account_cpu_limit(&db, &config, alice, false),
      (capacity / 4) as i64
    );
    assert_eq!(
      account_cpu_limit(&db, &config, bob, false),
      (capacity * 3 / 4) as i64
    );
  }

  #[test]
  fn ram_quota_is_enforced() {
    let alice = Name::constant("alice");
    let mut db = db_with(&[alice]);
    set_account_limits(&mut db, alice, ResourceLimitsObject {
      ram_bytes: 100,
      ..Default::default()
    })
    .unwrap();

    add_pending_ram_usage(&mut db, alice, 100).unwrap();
    assert!(verify_account_ram_usage(&db, alice).is_ok());
    add_pending_ram_usage(&mut db, alice, 1).unwrap();
    assert!(matches!(
      verify_account_ram_usage(&db, alice),
      Err(Error::RamUsageExceeded { usage: 101, quota: 100, .. })
    ));

    // releasing more than was billed is fatal
    let err = add_pending_ram_usage(&mut db, alice, -500).unwrap_err();
    assert!(err.is_fatal());
  }

  #[test]
  fn block_usage_is_limited() {
    let alice = Name::constant("alice");
    let mut db = db_with(&[alice]);
    let config = ChainConfig {
      max_block_cpu_usage: 1000,
      ..Default::default()
    };
    let accounts = [alice].into_iter().collect();

    add_transaction_usage(&mut db, &config, &accounts, 600, 100, 1).unwrap();
    assert_eq!(block_cpu_limit(&db, &config), 400);
    assert!(matches!(
      add_transaction_usage(&mut db, &config, &accounts, 600, 100, 1),
      Err(Error::CpuUsageExceeded {
        cause: LimitCause::Block,
        ..
      })
    ));

    process_block_usage(&mut db, &config, 1);
    let state: &ResourceState = db.resource_state.get();
    assert_eq!(state.pending_cpu_usage, 0);
  }
}
