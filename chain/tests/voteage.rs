use {
  common::{action, active, name, tokens, TestChain},
  ledger_chain::{ConfigKey, Error},
  ledger_primitives::{
    system::{SetConfig, VoteAgeFee},
    Asset,
  },
};

mod common;

fn voteagefee(units: i64) -> VoteAgeFee {
  VoteAgeFee {
    actor: name("alice"),
    bpname: name("bp1"),
    fee: Asset::from_units(units),
  }
}

/// alice stakes 10 tokens for bp1 at genesis, then `blocks` blocks are
/// produced and a new one is started.
fn staked_chain(blocks: u32) -> anyhow::Result<TestChain> {
  let mut t = TestChain::builder()
    .producer("bp1")
    .account("alice", tokens(10))
    .build()?;
  t.chain.add_vote(name("alice"), name("bp1"), tokens(10))?;
  t.produce_blocks(blocks)?;
  t.start_block()?;
  Ok(t)
}

#[test]
fn spending_more_than_accrued_fails() -> anyhow::Result<()> {
  let mut t = staked_chain(4)?;
  assert_eq!(t.chain.head_block_num(), 4);

  // 10 tokens for 4 blocks
  let err = t
    .push(vec![action(voteagefee(41), active("alice"))])
    .unwrap_err();
  assert!(matches!(
    err.root(),
    Error::InsufficientVoteAge { available: 40, required: 41, .. }
  ));

  let vote = t
    .chain
    .db()
    .votes
    .get(&(name("alice"), name("bp1")))
    .expect("vote");
  assert_eq!(vote.voteage_update_height, 0);
  Ok(())
}

#[test]
fn spending_everything_resets_the_vote() -> anyhow::Result<()> {
  let mut t = staked_chain(4)?;

  t.push(vec![action(voteagefee(40), active("alice"))])?;

  let db = t.chain.db();
  let vote = db.votes.get(&(name("alice"), name("bp1"))).expect("vote");
  assert_eq!(vote.voteage, 0);
  assert_eq!(vote.voteage_update_height, 4);

  let producer = db.producers.get(&name("bp1")).expect("bp1");
  assert_eq!(producer.total_voteage, 0);
  assert_eq!(producer.voteage_update_height, 4);

  // vote age is not a balance
  assert_eq!(t.balance("alice"), tokens(10));
  Ok(())
}

#[test]
fn ratio_scales_the_spend() -> anyhow::Result<()> {
  let mut t = staked_chain(4)?;
  t.push(vec![action(
    SetConfig {
      typ: ConfigKey::VoteAgeRatio.name(),
      num: 5_000,
      key: Default::default(),
      fee: Asset::zero(),
    },
    active("sys.config"),
  )])?;

  // half a unit of age per unit of fee
  t.push(vec![action(voteagefee(60), active("alice"))])?;
  let vote = t
    .chain
    .db()
    .votes
    .get(&(name("alice"), name("bp1")))
    .expect("vote");
  assert_eq!(vote.voteage, 10);
  Ok(())
}

#[test]
fn voteagefee_needs_the_actor() -> anyhow::Result<()> {
  let mut t = TestChain::builder()
    .producer("bp1")
    .account("alice", tokens(10))
    .account("mallory", tokens(10))
    .build()?;
  t.chain.add_vote(name("alice"), name("bp1"), tokens(10))?;
  t.produce_blocks(2)?;
  t.start_block()?;

  let err = t
    .push(vec![action(voteagefee(10), active("mallory"))])
    .unwrap_err();
  assert!(matches!(err.root(), Error::MissingAuth(_)));
  Ok(())
}

#[test]
fn vote_for_unknown_producer_fails() -> anyhow::Result<()> {
  let mut t = staked_chain(1)?;
  let err = t
    .push(vec![action(
      VoteAgeFee {
        actor: name("alice"),
        bpname: name("bp2"),
        fee: Asset::from_units(1),
      },
      active("alice"),
    )])
    .unwrap_err();
  assert!(matches!(err.root(), Error::ProducerNotFound(_)));
  Ok(())
}
