use {
  ledger_primitives::{Action, Asset, Name, TransactionId},
  serde::Serialize,
  std::{collections::BTreeMap, time::Duration},
};

#[derive(Debug, Clone, Serialize)]
pub struct ActionTrace {
  pub receiver: Name,
  pub act: Action,
  /// Zero for actions of the transaction, parent depth + 1 for inline
  /// actions.
  pub depth: u16,
  pub context_free: bool,
  pub elapsed: Duration,
}

/// Outcome of an applied transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionTrace {
  pub id: TransactionId,
  pub block_num: u32,
  pub scheduled: bool,
  pub elapsed: Duration,
  pub net_usage: u64,
  pub cpu_usage_us: u64,
  /// Whether the billed cpu was supplied by the caller instead of
  /// measured.
  pub explicit_cpu_bill: bool,
  pub fee_charged: Asset,
  pub fee_payer: Option<Name>,
  /// Net change in billed RAM per account.
  pub ram_deltas: BTreeMap<Name, i64>,
  pub action_traces: Vec<ActionTrace>,
}

impl TransactionTrace {
  pub fn new(id: TransactionId, block_num: u32) -> Self {
    Self {
      id,
      block_num,
      scheduled: false,
      elapsed: Duration::ZERO,
      net_usage: 0,
      cpu_usage_us: 0,
      explicit_cpu_bill: false,
      fee_charged: Asset::zero(),
      fee_payer: None,
      ram_deltas: BTreeMap::new(),
      action_traces: vec![],
    }
  }
}
