use {
  crate::store::Database,
  ledger_primitives::{
    system::{FEE_ADMIN_ACCOUNT, SYSTEM_ACCOUNT},
    Asset,
    Name,
    PublicKey,
  },
  serde::{Deserialize, Serialize},
  std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
  },
};

/// Consensus parameters of the chain.
///
/// All nodes must run with the same values, otherwise they will not
/// agree on which transactions are valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
  pub max_block_net_usage: u64,
  pub max_block_cpu_usage: u32,
  pub max_transaction_net_usage: u32,
  pub max_transaction_cpu_usage: u32,
  pub min_transaction_cpu_usage: u32,

  /// Net bytes billed to every transaction regardless of its size.
  pub base_per_transaction_net_usage: u32,

  /// Net bytes billed for keeping a transaction id for duplicate
  /// detection, and for removing a delayed transaction.
  pub transaction_id_net_usage: u32,

  pub context_free_discount_net_usage_num: u64,
  pub context_free_discount_net_usage_den: u64,

  /// Longest delay in seconds a transaction or an authority can ask for.
  pub max_transaction_delay: u32,

  /// How far in the future in seconds a transaction may expire.
  pub max_transaction_lifetime: u32,

  pub max_inline_action_depth: u16,
  pub max_authority_depth: u16,

  /// Grace period given to a transaction on top of its cpu limit
  /// before it is interrupted. Billing still uses the limit.
  pub deadline_leeway: Duration,

  pub block_interval_ms: u32,

  /// Length of the usage averaging windows, in blocks.
  pub account_net_usage_average_window: u32,
  pub account_cpu_usage_average_window: u32,
  pub block_usage_average_window: u32,

  /// Block usage, as a fraction of the block limits, above which the
  /// chain is considered congested.
  pub target_block_usage_pct: u64,

  /// How far the elastic capacity may grow beyond the block limits.
  pub max_elastic_multiplier: u64,

  /// Resources bought by one whole token of fees.
  pub cpu_us_per_fee_token: u64,
  pub net_bytes_per_fee_token: u64,
  pub ram_bytes_per_fee_token: u64,

  /// Fees of system actions that have no configured fee row.
  pub native_fees: BTreeMap<Name, Asset>,
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      max_block_net_usage: 1024 * 1024,
      max_block_cpu_usage: 200_000,
      max_transaction_net_usage: 512 * 1024,
      max_transaction_cpu_usage: 150_000,
      min_transaction_cpu_usage: 100,
      base_per_transaction_net_usage: 12,
      transaction_id_net_usage: 32,
      context_free_discount_net_usage_num: 20,
      context_free_discount_net_usage_den: 100,
      max_transaction_delay: 45 * 24 * 3600,
      max_transaction_lifetime: 3600,
      max_inline_action_depth: 4,
      max_authority_depth: 6,
      deadline_leeway: Duration::from_millis(3),
      block_interval_ms: 500,
      account_net_usage_average_window: 24 * 3600 * 2,
      account_cpu_usage_average_window: 24 * 3600 * 2,
      block_usage_average_window: 120,
      target_block_usage_pct: 10,
      max_elastic_multiplier: 1000,
      cpu_us_per_fee_token: 10_000,
      net_bytes_per_fee_token: 4096,
      ram_bytes_per_fee_token: 1024,
      native_fees: [
        ("newaccount", 1000),
        ("updateauth", 1000),
        ("deleteauth", 1000),
        ("linkauth", 1000),
        ("unlinkauth", 1000),
        ("canceldelay", 500),
        ("setcode", 10000),
        ("setabi", 10000),
      ]
      .into_iter()
      .map(|(name, units)| (Name::constant(name), Asset::from_units(units)))
      .collect(),
    }
  }
}

/// Subjective allow and deny lists of this node.
///
/// They are only enforced while this node produces blocks, so different
/// nodes may run with different lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
  pub actor_whitelist: BTreeSet<Name>,
  pub actor_blacklist: BTreeSet<Name>,
  pub contract_whitelist: BTreeSet<Name>,
  pub contract_blacklist: BTreeSet<Name>,
  pub key_blacklist: BTreeSet<PublicKey>,

  /// Accounts billed with their stake-derived limits only, without the
  /// elastic capacity of uncongested blocks.
  pub resource_greylist: BTreeSet<Name>,
}

impl ListConfig {
  pub fn check_actor(&self, actor: Name) -> Result<(), &'static str> {
    if !self.actor_whitelist.is_empty()
      && !self.actor_whitelist.contains(&actor)
    {
      return Err("actor is not on the whitelist");
    }
    if self.actor_blacklist.contains(&actor) {
      return Err("actor is on the blacklist");
    }
    Ok(())
  }

  pub fn check_contract(&self, code: Name) -> Result<(), &'static str> {
    if !self.contract_whitelist.is_empty()
      && !self.contract_whitelist.contains(&code)
    {
      return Err("contract is not on the whitelist");
    }
    if self.contract_blacklist.contains(&code) {
      return Err("contract is on the blacklist");
    }
    Ok(())
  }
}

/// Keys of the on-chain configuration registry that the chain itself
/// reads. Other keys may be written with `setconfig` and are stored but
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKey {
  /// Vote age spent per whole token of fee, scaled by 10000.
  VoteAgeRatio,

  /// Highest fee in base units `setfee` accepts.
  FeeCap,

  /// Block height from which fees are charged.
  FeeActivation,
}

impl ConfigKey {
  pub const fn name(self) -> Name {
    match self {
      ConfigKey::VoteAgeRatio => Name::constant("res.voteage"),
      ConfigKey::FeeCap => Name::constant("fee.cap"),
      ConfigKey::FeeActivation => Name::constant("f.onfee"),
    }
  }

  pub const fn default_value(self) -> i64 {
    match self {
      ConfigKey::VoteAgeRatio => 10_000,
      ConfigKey::FeeCap => 200_0000,
      ConfigKey::FeeActivation => 0,
    }
  }

  pub fn from_name(name: Name) -> Option<Self> {
    [
      ConfigKey::VoteAgeRatio,
      ConfigKey::FeeCap,
      ConfigKey::FeeActivation,
    ]
    .into_iter()
    .find(|key| key.name() == name)
  }
}

/// Current value of a configuration key, its default if never set.
pub fn config_value(db: &Database, key: ConfigKey) -> i64 {
  db.configs
    .get(&key.name())
    .map(|row| row.num)
    .unwrap_or_else(|| key.default_value())
}

/// True once the chain reached the height a feature is switched on at.
pub fn is_activated(db: &Database, key: ConfigKey, height: u32) -> bool {
  i64::from(height) >= config_value(db, key)
}

/// Accounts allowed to authorize fee overrides.
pub fn is_fee_admin(account: Name) -> bool {
  account == FEE_ADMIN_ACCOUNT || account == SYSTEM_ACCOUNT
}

#[cfg(test)]
mod tests {
  use {
    super::{config_value, is_activated, ConfigKey, ListConfig},
    crate::{objects::ConfigObject, objects::ResourceState, store::Database},
    ledger_primitives::{Asset, Name},
  };

  #[test]
  fn registry_values_fall_back_to_defaults() {
    let mut db = Database::new(ResourceState::default());
    assert_eq!(config_value(&db, ConfigKey::VoteAgeRatio), 10_000);
    assert!(is_activated(&db, ConfigKey::FeeActivation, 0));

    db.configs.insert(ConfigKey::FeeActivation.name(), ConfigObject {
      typ: ConfigKey::FeeActivation.name(),
      num: 50,
      key: Name::default(),
      fee: Asset::zero(),
    });
    assert!(!is_activated(&db, ConfigKey::FeeActivation, 49));
    assert!(is_activated(&db, ConfigKey::FeeActivation, 50));
    assert_eq!(
      ConfigKey::from_name(Name::constant("fee.cap")),
      Some(ConfigKey::FeeCap)
    );
  }

  #[test]
  fn lists_allow_everything_when_empty() {
    let mut lists = ListConfig::default();
    let alice = Name::constant("alice");
    assert!(lists.check_actor(alice).is_ok());

    lists.actor_whitelist.insert(Name::constant("bob"));
    assert!(lists.check_actor(alice).is_err());

    lists.contract_blacklist.insert(Name::constant("token"));
    assert!(lists.check_contract(Name::constant("token")).is_err());
    assert!(lists.check_contract(Name::constant("dex")).is_ok());
  }
}
