//! Per-action fees, the resources they buy, and the balance and vote age
//! ledgers fees are paid from.

use {
  crate::{
    config::ChainConfig,
    error::Error,
    objects::{ActionFeeObject, ProducerInfo, VoteInfo},
    store::Database,
  },
  ledger_primitives::{
    system::SYSTEM_ACCOUNT,
    Action,
    Asset,
    Name,
    SystemAction,
    ASSET_PRECISION,
  },
};

/// Precision of the vote age to fee ratio.
pub const VOTEAGE_RATIO_PRECISION: i128 = 10_000;

/// Where the fee of an action comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFee {
  /// Set with `setfee`, buys resources.
  Configured(ActionFeeObject),

  /// Built-in fee of a system action. Execution is not metered by it.
  Native(Asset),
}

impl ActionFee {
  pub fn amount(&self) -> Asset {
    match self {
      ActionFee::Configured(row) => row.fee,
      ActionFee::Native(fee) => *fee,
    }
  }
}

/// Resources a transaction may use because of the fees it pays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeLimits {
  pub cpu_us: u64,
  pub net_bytes: u64,
  pub ram_bytes: u64,
}

impl FeeLimits {
  fn bought_with(fee: Asset, config: &ChainConfig) -> Self {
    let units = u128::try_from(fee.units()).unwrap_or_default();
    let scale = |per_token: u64| {
      let value = units * u128::from(per_token) / ASSET_PRECISION as u128;
      u64::try_from(value).unwrap_or(u64::MAX)
    };
    Self {
      cpu_us: scale(config.cpu_us_per_fee_token),
      net_bytes: scale(config.net_bytes_per_fee_token),
      ram_bytes: scale(config.ram_bytes_per_fee_token),
    }
  }

  fn saturating_add(self, other: Self) -> Self {
    Self {
      cpu_us: self.cpu_us.saturating_add(other.cpu_us),
      net_bytes: self.net_bytes.saturating_add(other.net_bytes),
      ram_bytes: self.ram_bytes.saturating_add(other.ram_bytes),
    }
  }
}

/// The fee of `account::action`. Configured fees take precedence over
/// native fees of system actions.
pub fn action_fee(
  db: &Database,
  config: &ChainConfig,
  account: Name,
  action: Name,
) -> Option<ActionFee> {
  if let Some(row) = db.fees.get(&(account, action)) {
    return Some(ActionFee::Configured(row.clone()));
  }
  if account == SYSTEM_ACCOUNT {
    return config
      .native_fees
      .get(&action)
      .map(|fee| ActionFee::Native(*fee));
  }
  None
}

/// Fees of every action of a transaction.
///
/// System actions without a fee run for free, any other action without
/// a fee can not be executed.
pub fn transaction_fees<'a>(
  db: &Database,
  config: &ChainConfig,
  actions: impl IntoIterator<Item = &'a Action>,
) -> Result<Vec<ActionFee>, Error> {
  let mut fees = vec![];
  for act in actions {
    match action_fee(db, config, act.account, act.name) {
      Some(fee) => fees.push(fee),
      None if act.account == SYSTEM_ACCOUNT
        && SystemAction::is_system_action(act.name) => {}
      None => {
        return Err(Error::MissingFee {
          account: act.account,
          action: act.name,
        })
      }
    }
  }
  Ok(fees)
}

pub fn total_fee(fees: &[ActionFee]) -> Result<Asset, Error> {
  fees
    .iter()
    .try_fold(Asset::zero(), |acc, fee| acc.checked_add(fee.amount()))
    .ok_or_else(|| Error::InvalidArguments("fee total overflows".into()))
}

/// Limits bought by the fees of a transaction.
///
/// Each action with a configured fee contributes its explicit limits,
/// or the resources its fee buys when the row has none. `extra` is the
/// part of the declared maximum fee above the required fee, it buys
/// more resources once for the whole transaction. Returns `None` when
/// no action has a configured fee, such transactions run unmetered
/// within the chain limits.
pub fn fee_limits(
  config: &ChainConfig,
  fees: &[ActionFee],
  extra: Asset,
) -> Option<FeeLimits> {
  let mut limits: Option<FeeLimits> = None;
  for fee in fees {
    if let ActionFee::Configured(row) = fee {
      let bought = if row.has_explicit_limits() {
        FeeLimits {
          cpu_us: u64::from(row.cpu_limit),
          net_bytes: u64::from(row.net_limit),
          ram_bytes: u64::from(row.ram_limit),
        }
      } else {
        FeeLimits::bought_with(row.fee, config)
      };
      limits = Some(limits.unwrap_or_default().saturating_add(bought));
    }
  }
  limits.map(|l| l.saturating_add(FeeLimits::bought_with(extra, config)))
}

/// Moves `fee` from the balance of `payer` to the rewards pool of
/// `producer`. With an empty producer name the fee is only debited.
pub fn pay_fee(
  db: &mut Database,
  payer: Name,
  fee: Asset,
  producer: Name,
) -> Result<(), Error> {
  let available = db
    .balances
    .get(&payer)
    .map(|b| b.available)
    .ok_or(Error::AccountNotFound(payer))?;

  if !producer.is_empty() && !db.producers.contains(&producer) {
    return Err(Error::ProducerNotFound(producer));
  }

  let remaining = match available.checked_sub(fee) {
    Some(remaining) if remaining.units() >= 0 => remaining,
    _ => {
      return Err(Error::InsufficientBalance {
        account: payer,
        available,
        required: fee,
      })
    }
  };

  db.balances.modify(&payer, |b| b.available = remaining);
  if !producer.is_empty() {
    db.producers.modify(&producer, |p| {
      p.rewards_pool = p.rewards_pool + fee;
    });
  }
  Ok(())
}

/// Pays `fee` with the vote age `actor` accumulated voting for
/// `producer` and returns the vote age spent.
///
/// Both the vote and the producer totals are brought up to `height`
/// before the spend is checked against them.
pub fn spend_vote_age(
  db: &mut Database,
  height: u32,
  ratio: i64,
  actor: Name,
  producer: Name,
  fee: Asset,
) -> Result<i128, Error> {
  if !db.balances.contains(&actor) {
    return Err(Error::AccountNotFound(actor));
  }
  let producer_info = db
    .producers
    .get(&producer)
    .cloned()
    .ok_or(Error::ProducerNotFound(producer))?;
  let vote = db
    .votes
    .get(&(actor, producer))
    .cloned()
    .ok_or(Error::VoteNotFound {
      voter: actor,
      producer,
    })?;

  let spend =
    i128::from(fee.units()) * i128::from(ratio) / VOTEAGE_RATIO_PRECISION;
  let newest_voteage = vote.voteage_at(height);
  let newest_total = producer_info.voteage_at(height);

  if spend <= 0 || spend > newest_voteage {
    return Err(Error::InsufficientVoteAge {
      actor,
      producer,
      available: newest_voteage,
      required: spend,
    });
  }
  if spend > newest_total {
    return Err(Error::Invariant(format!(
      "vote age of {actor} exceeds the total vote age of {producer}"
    )));
  }

  db.votes.modify(&(actor, producer), |v| {
    v.voteage = newest_voteage - spend;
    v.voteage_update_height = height;
  });
  db.producers.modify(&producer, |p| {
    p.total_voteage = newest_total - spend;
    p.voteage_update_height = height;
  });
  Ok(spend)
}

/// Adds stake to a vote, bringing both accumulators up to `height`
/// first so that past blocks accrue at the previous stake.
pub fn add_vote(
  db: &mut Database,
  height: u32,
  voter: Name,
  producer: Name,
  stake: Asset,
) -> Result<(), Error> {
  let producer_info = db
    .producers
    .get(&producer)
    .cloned()
    .ok_or(Error::ProducerNotFound(producer))?;
  let vote = db
    .votes
    .get(&(voter, producer))
    .cloned()
    .unwrap_or(VoteInfo {
      voter,
      producer,
      voteage_update_height: height,
      ..Default::default()
    });

  let updated_vote = VoteInfo {
    staked: vote.staked + stake,
    voteage: vote.voteage_at(height),
    voteage_update_height: height,
    ..vote.clone()
  };
  let staked_delta = updated_vote.staked_tokens() - vote.staked_tokens();
  if updated_vote.staked.units() < 0 {
    return Err(Error::InvalidArguments(format!(
      "stake of {voter} for {producer} would become negative"
    )));
  }

  db.producers.insert(producer, ProducerInfo {
    total_staked: producer_info.total_staked + staked_delta,
    total_voteage: producer_info.voteage_at(height),
    voteage_update_height: height,
    ..producer_info
  });
  db.votes.insert((voter, producer), updated_vote);
  Ok(())
}

#[cfg(test)]
mod tests {
  use {
    super::*,
    crate::objects::{AccountBalance, ResourceState},
  };

  fn name(s: &str) -> Name {
    Name::constant(s)
  }

  fn ledger() -> Database {
    let mut db = Database::new(ResourceState::default());
    db.balances.insert(name("alice"), AccountBalance {
      name: name("alice"),
      available: Asset::from_units(5_0000),
    });
    db.producers.insert(name("bp1"), ProducerInfo {
      name: name("bp1"),
      ..Default::default()
    });
    db
  }

  fn row(fee: i64, cpu: u32, net: u32, ram: u32) -> ActionFee {
    ActionFee::Configured(ActionFeeObject {
      account: name("token"),
      action: name("transfer"),
      fee: Asset::from_units(fee),
      cpu_limit: cpu,
      net_limit: net,
      ram_limit: ram,
    })
  }

  #[test]
  fn fee_derived_limits() {
    let config = ChainConfig {
      cpu_us_per_fee_token: 1000,
      net_bytes_per_fee_token: 100,
      ram_bytes_per_fee_token: 10,
      ..Default::default()
    };

    // (f + F) x (C, N, R) for rows without explicit limits
    let limits =
      fee_limits(&config, &[row(1_0000, 0, 0, 0)], Asset::from_units(1_0000));
    assert_eq!(
      limits,
      Some(FeeLimits {
        cpu_us: 2000,
        net_bytes: 200,
        ram_bytes: 20,
      })
    );

    // (c + F x C, n + F x N, r + F x R) for explicit limits
    let limits =
      fee_limits(&config, &[row(1_0000, 5, 6, 7)], Asset::from_units(1_0000));
    assert_eq!(
      limits,
      Some(FeeLimits {
        cpu_us: 1005,
        net_bytes: 106,
        ram_bytes: 17,
      })
    );

    // native fees do not meter execution
    let native = [ActionFee::Native(Asset::from_units(1000))];
    assert_eq!(fee_limits(&config, &native, Asset::from_units(1_0000)), None);
  }

  #[test]
  fn missing_fee_rejects_non_system_actions() -> anyhow::Result<()> {
    let db = ledger();
    let config = ChainConfig::default();
    let transfer = Action::new(name("token"), name("transfer"), vec![], &())?;
    assert!(matches!(
      transaction_fees(&db, &config, [&transfer]),
      Err(Error::MissingFee { .. })
    ));

    let setconfig = Action::new(SYSTEM_ACCOUNT, name("setconfig"), vec![], &())?;
    assert!(transaction_fees(&db, &config, [&setconfig])?.is_empty());

    let newaccount =
      Action::new(SYSTEM_ACCOUNT, name("newaccount"), vec![], &())?;
    assert_eq!(
      total_fee(&transaction_fees(&db, &config, [&newaccount])?)?,
      Asset::from_units(1000)
    );
    Ok(())
  }

  #[test]
  fn fee_payment_moves_balance() {
    let mut db = ledger();
    pay_fee(&mut db, name("alice"), Asset::from_units(1_5000), name("bp1"))
      .unwrap();
    assert_eq!(
      db.balances.get(&name("alice")).unwrap().available,
      Asset::from_units(3_5000)
    );
    assert_eq!(
      db.producers.get(&name("bp1")).unwrap().rewards_pool,
      Asset::from_units(1_5000)
    );

    assert!(matches!(
      pay_fee(&mut db, name("alice"), Asset::from_units(4_0000), name("bp1")),
      Err(Error::InsufficientBalance { .. })
    ));
    assert!(matches!(
      pay_fee(&mut db, name("alice"), Asset::from_units(1), name("bp9")),
      Err(Error::ProducerNotFound(_))
    ));
  }

  #[test]
  fn vote_age_is_recomputed_before_spending() {
    let mut db = ledger();
    add_vote(&mut db, 10, name("alice"), name("bp1"), Asset::from_units(3_0000))
      .unwrap();

    // 3 tokens for 10 blocks
    let spent = spend_vote_age(
      &mut db,
      20,
      10_000,
      name("alice"),
      name("bp1"),
      Asset::from_units(20),
    )
    .unwrap();
    assert_eq!(spent, 20);

    let vote = db.votes.get(&(name("alice"), name("bp1"))).unwrap();
    assert_eq!(vote.voteage, 30 - 20);
    assert_eq!(vote.voteage_update_height, 20);
    let producer = db.producers.get(&name("bp1")).unwrap();
    assert_eq!(producer.total_voteage, 10);
    assert_eq!(producer.voteage_update_height, 20);

    assert!(matches!(
      spend_vote_age(
        &mut db,
        20,
        10_000,
        name("alice"),
        name("bp1"),
        Asset::from_units(11),
      ),
      Err(Error::InsufficientVoteAge { available: 10, .. })
    ));
    assert!(matches!(
      spend_vote_age(
        &mut db,
        20,
        10_000,
        name("alice"),
        name("bp1"),
        Asset::zero(),
      ),
      Err(Error::InsufficientVoteAge { .. })
    ));
  }
}
