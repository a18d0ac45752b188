use {
  crate::{
    authorization,
    config::{config_value, ChainConfig, ConfigKey, ListConfig},
    error::Error,
    fees::{self, ActionFee},
    objects::{
      AccountBalance,
      AccountObject,
      AccountSequenceObject,
      ProducerInfo,
      ResourceLimitsObject,
      OVERHEAD_PER_ACCOUNT_RAM_BYTES,
    },
    resources,
    store::{Database, Undoable},
    trace::TransactionTrace,
    transaction::TransactionContext,
    vm::Vm,
  },
  ledger_primitives::{
    system::{
      ACTIVE_PERMISSION,
      CONFIG_ACCOUNT,
      FEE_ADMIN_ACCOUNT,
      OWNER_PERMISSION,
      PRODUCERS_ACCOUNT,
      SYSTEM_ACCOUNT,
    },
    Asset,
    Authority,
    Name,
    PublicKey,
    SignedTransaction,
    Transaction,
  },
  metrics::{gauge, histogram, increment_counter},
  serde::{Deserialize, Serialize},
  std::{sync::Arc, time::Instant},
  tracing::{debug, info, warn},
};

/// The block currently being built on top of the head block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingBlock {
  pub block_num: u32,
  pub timestamp_ms: u64,
  pub producer: Name,
  /// True when this node produces the block, false when it replays a
  /// block produced elsewhere.
  pub producing: bool,
}

impl PendingBlock {
  /// Block time in seconds since unix epoch.
  pub fn time_secs(&self) -> u32 {
    (self.timestamp_ms / 1000) as u32
  }

  /// Index of the block slot, the time unit resource usage averages
  /// decay in.
  pub fn slot(&self, interval_ms: u32) -> u32 {
    (self.timestamp_ms / u64::from(interval_ms.max(1))) as u32
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAccount {
  pub name: Name,
  pub key: PublicKey,
  pub balance: Asset,
}

/// Initial content of the ledger.
///
/// The native accounts are always created and controlled by
/// `initial_key`, `sys` being the only privileged one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisState {
  pub initial_timestamp_ms: u64,
  pub initial_key: PublicKey,
  pub accounts: Vec<GenesisAccount>,
  pub producers: Vec<Name>,
}

/// Owns the ledger and applies blocks of transactions to it.
///
/// Every block runs in an undo session of its own, opened by
/// [`start_block`](Self::start_block) and either committed by
/// [`finalize_block`](Self::finalize_block) or reverted by
/// [`abort_block`](Self::abort_block). Transactions run in nested
/// sessions inside it.
pub struct Chain {
  pub(crate) db: Database,
  pub(crate) config: ChainConfig,
  pub(crate) lists: ListConfig,
  pub(crate) vm: Arc<dyn Vm>,
  head_block_num: u32,
  head_block_time_ms: u64,
  pending: Option<PendingBlock>,
}

impl Chain {
  pub fn new(
    config: ChainConfig,
    lists: ListConfig,
    genesis: &GenesisState,
    vm: Arc<dyn Vm>,
  ) -> Result<Self, Error> {
    let mut db = Database::new(resources::initial_state(&config));
    let now = (genesis.initial_timestamp_ms / 1000) as u32;

    for native in [
      SYSTEM_ACCOUNT,
      PRODUCERS_ACCOUNT,
      CONFIG_ACCOUNT,
      FEE_ADMIN_ACCOUNT,
    ] {
      create_genesis_account(&mut db, native, genesis.initial_key, now)?;
    }
    db.accounts.modify(&SYSTEM_ACCOUNT, |a| a.privileged = true);

    for account in &genesis.accounts {
      create_genesis_account(&mut db, account.name, account.key, now)?;
      db.balances.modify(&account.name, |b| b.available = account.balance);
    }

    for producer in &genesis.producers {
      if !db.accounts.contains(producer) {
        return Err(Error::AccountNotFound(*producer));
      }
      db.producers.insert(*producer, ProducerInfo {
        name: *producer,
        ..Default::default()
      });
    }

    info!(
      "genesis with {} accounts and {} producers",
      db.accounts.len(),
      db.producers.len()
    );

    Ok(Self {
      db,
      config,
      lists,
      vm,
      head_block_num: 0,
      head_block_time_ms: genesis.initial_timestamp_ms,
      pending: None,
    })
  }

  pub fn db(&self) -> &Database {
    &self.db
  }

  pub fn config(&self) -> &ChainConfig {
    &self.config
  }

  pub fn lists(&self) -> &ListConfig {
    &self.lists
  }

  pub fn lists_mut(&mut self) -> &mut ListConfig {
    &mut self.lists
  }

  pub fn head_block_num(&self) -> u32 {
    self.head_block_num
  }

  pub fn head_block_time_ms(&self) -> u64 {
    self.head_block_time_ms
  }

  pub fn pending_block(&self) -> Result<&PendingBlock, Error> {
    self.pending.as_ref().ok_or(Error::NoPendingBlock)
  }

  /// Opens a new block on top of the head block.
  pub fn start_block(
    &mut self,
    timestamp_ms: u64,
    producer: Name,
    producing: bool,
  ) -> Result<&PendingBlock, Error> {
    if self.pending.is_some() {
      return Err(Error::Validation("a block is already pending".into()));
    }
    if timestamp_ms <= self.head_block_time_ms {
      return Err(Error::Validation(format!(
        "block time {timestamp_ms} does not advance past {}",
        self.head_block_time_ms
      )));
    }

    self.db.start_session();
    let block = PendingBlock {
      block_num: self.head_block_num + 1,
      timestamp_ms,
      producer,
      producing,
    };

    // ids of expired transactions can not be replayed anymore
    let now = block.time_secs();
    let expired: Vec<_> = self
      .db
      .recorded
      .iter()
      .filter(|(_, expiration)| **expiration < now)
      .map(|(id, _)| *id)
      .collect();
    for id in expired {
      self.db.recorded.remove(&id);
    }

    debug!("started block {} produced by {producer}", block.block_num);
    Ok(self.pending.insert(block))
  }

  /// Updates the chain wide usage averages and makes the pending block
  /// the new head. Returns the number of the new head block.
  pub fn finalize_block(&mut self) -> Result<u32, Error> {
    let block = self.pending.take().ok_or(Error::NoPendingBlock)?;
    resources::process_block_usage(
      &mut self.db,
      &self.config,
      block.slot(self.config.block_interval_ms),
    );
    self.db.commit();

    self.head_block_num = block.block_num;
    self.head_block_time_ms = block.timestamp_ms;
    gauge!("ledger_head_block_num", f64::from(block.block_num));
    info!("finalized block {}", block.block_num);
    Ok(block.block_num)
  }

  /// Discards the pending block and everything applied in it.
  pub fn abort_block(&mut self) {
    if let Some(block) = self.pending.take() {
      self.db.undo();
      warn!("aborted block {}", block.block_num);
    }
  }

  /// Verifies, executes and bills a signed transaction in the pending
  /// block.
  ///
  /// `billed_cpu_time_us` replaces the measured cpu time, it is used
  /// when replaying blocks of other producers.
  pub fn push_transaction(
    &mut self,
    trx: &SignedTransaction,
    deadline: Option<Instant>,
    billed_cpu_time_us: Option<u64>,
  ) -> Result<TransactionTrace, Error> {
    let keys = trx
      .signing_keys()
      .map_err(|e| Error::Signature(e.to_string()))?;
    let (unprunable, prunable) = trx.packed_sizes();
    let start = Instant::now();

    let mut ctx = TransactionContext::new(self, &trx.trx, *trx.id(), start)?;
    if let Some(deadline) = deadline {
      ctx.set_deadline(deadline);
    }
    if let Some(billed) = billed_cpu_time_us {
      ctx.set_explicit_billed_cpu_time(billed);
    }

    let result = (|| {
      ctx.init_for_input_trx(unprunable, prunable, false)?;
      ctx.check_authorization(&keys)?;
      ctx.exec()?;
      ctx.finalize()
    })();
    close(ctx, result)
  }

  /// Executes a delayed transaction whose time came.
  ///
  /// The transaction leaves the ledger whether it succeeds or not, and
  /// its payer gets the RAM it occupied back.
  pub fn push_scheduled_transaction(
    &mut self,
    sender: Name,
    sender_id: u128,
    deadline: Option<Instant>,
  ) -> Result<TransactionTrace, Error> {
    let block = *self.pending_block()?;
    let key = (sender, sender_id);
    let generated = self
      .db
      .generated
      .get(&key)
      .cloned()
      .ok_or(Error::DeferredNotFound(sender_id))?;

    let now = block.time_secs();
    if generated.delay_until > now {
      return Err(Error::Validation(format!(
        "deferred transaction {sender_id:#x} is not due before {}",
        generated.delay_until
      )));
    }
    if generated.expiration < now {
      self.retire_generated(sender, sender_id)?;
      return Err(Error::TransactionExpired {
        expiration: generated.expiration,
        now,
      });
    }

    let start = Instant::now();
    let mut ctx =
      TransactionContext::new(self, &generated.trx, generated.trx_id, start)?;
    if let Some(deadline) = deadline {
      ctx.set_deadline(deadline);
    }

    let result = (|| {
      ctx.chain.db.generated.remove(&key);
      ctx.add_ram_usage(
        generated.payer,
        -(generated.total_billable_size() as i64),
      );
      ctx.init_for_deferred_trx(generated.published)?;
      ctx.exec()?;
      ctx.finalize()
    })();

    let outcome = close(ctx, result);
    if outcome.is_err() {
      self.retire_generated(sender, sender_id)?;
    }
    outcome
  }

  /// Executes a transaction synthesized by the chain. It carries no
  /// signatures and pays no fees.
  pub fn push_implicit_transaction(
    &mut self,
    trx: &Transaction,
    initial_net_usage: u64,
  ) -> Result<TransactionTrace, Error> {
    let start = Instant::now();
    let mut ctx = TransactionContext::new(self, trx, trx.id(), start)?;
    let result = (|| {
      ctx.init_for_implicit_trx(initial_net_usage)?;
      ctx.exec()?;
      ctx.finalize()
    })();
    close(ctx, result)
  }

  /// Delayed transactions that may run in the pending block, the
  /// longest waiting first.
  pub fn scheduled_transactions_due(&self) -> Result<Vec<(Name, u128)>, Error> {
    let now = self.pending_block()?.time_secs();
    let mut due: Vec<_> = self
      .db
      .generated
      .iter()
      .filter(|(_, g)| g.delay_until <= now)
      .map(|(key, g)| (g.delay_until, *key))
      .collect();
    due.sort();
    Ok(due.into_iter().map(|(_, key)| key).collect())
  }

  /// Drops a delayed transaction outside of any transaction session.
  fn retire_generated(
    &mut self,
    sender: Name,
    sender_id: u128,
  ) -> Result<(), Error> {
    if let Some(generated) = self.db.generated.remove(&(sender, sender_id)) {
      resources::add_pending_ram_usage(
        &mut self.db,
        generated.payer,
        -(generated.total_billable_size() as i64),
      )?;
      debug!("retired deferred transaction {sender_id:#x} of {sender}");
    }
    Ok(())
  }

  /// Sum of the fees a transaction with these actions has to pay.
  pub fn required_fee(&self, trx: &Transaction) -> Result<Asset, Error> {
    let fees = fees::transaction_fees(&self.db, &self.config, &trx.actions)?;
    fees::total_fee(&fees)
  }

  pub fn action_fee(&self, account: Name, action: Name) -> Option<ActionFee> {
    fees::action_fee(&self.db, &self.config, account, action)
  }

  pub fn config_value(&self, key: ConfigKey) -> i64 {
    config_value(&self.db, key)
  }

  pub fn balance(&self, account: Name) -> Option<Asset> {
    self.db.balances.get(&account).map(|b| b.available)
  }

  pub fn set_balance(&mut self, account: Name, amount: Asset) -> Result<(), Error> {
    if !self.db.balances.modify(&account, |b| b.available = amount) {
      return Err(Error::AccountNotFound(account));
    }
    Ok(())
  }

  pub fn register_producer(&mut self, producer: Name) -> Result<(), Error> {
    if !self.db.accounts.contains(&producer) {
      return Err(Error::AccountNotFound(producer));
    }
    if self.db.producers.contains(&producer) {
      return Err(Error::AccountExists(producer));
    }
    self.db.producers.insert(producer, ProducerInfo {
      name: producer,
      voteage_update_height: self.head_block_num,
      ..Default::default()
    });
    Ok(())
  }

  /// Adds stake to the vote of `voter` for `producer` as of the head
  /// block.
  pub fn add_vote(
    &mut self,
    voter: Name,
    producer: Name,
    stake: Asset,
  ) -> Result<(), Error> {
    if !self.db.accounts.contains(&voter) {
      return Err(Error::AccountNotFound(voter));
    }
    fees::add_vote(&mut self.db, self.head_block_num, voter, producer, stake)
  }

  pub fn set_account_limits(
    &mut self,
    account: Name,
    limits: ResourceLimitsObject,
  ) -> Result<(), Error> {
    resources::set_account_limits(&mut self.db, account, limits)
  }

  pub fn set_privileged(
    &mut self,
    account: Name,
    privileged: bool,
  ) -> Result<(), Error> {
    if !self.db.accounts.modify(&account, |a| a.privileged = privileged) {
      return Err(Error::AccountNotFound(account));
    }
    Ok(())
  }

  pub fn ram_usage(&self, account: Name) -> u64 {
    self
      .db
      .resource_usage
      .get(&account)
      .map(|u| u.ram_usage)
      .unwrap_or_default()
  }

  pub fn account_net_limit(&self, account: Name) -> i64 {
    resources::account_net_limit(&self.db, &self.config, account, true)
  }

  pub fn account_cpu_limit(&self, account: Name) -> i64 {
    resources::account_cpu_limit(&self.db, &self.config, account, true)
  }
}

/// Keeps the changes of a finalized transaction or reverts them, and
/// reports the outcome.
fn close(
  mut ctx: TransactionContext<'_>,
  result: Result<(), Error>,
) -> Result<TransactionTrace, Error> {
  match result {
    Ok(()) => {
      ctx.squash();
      let trace = ctx.take_trace();
      increment_counter!("ledger_transactions_applied_total");
      histogram!("ledger_transaction_cpu_us", trace.cpu_usage_us as f64);
      histogram!("ledger_transaction_net_bytes", trace.net_usage as f64);
      debug!(
        "applied {}: cpu {}us, net {} bytes, fee {}",
        trace.id, trace.cpu_usage_us, trace.net_usage, trace.fee_charged
      );
      Ok(trace)
    }
    Err(e) => {
      ctx.undo();
      increment_counter!(
        "ledger_transactions_failed_total",
        "kind" => format!("{:?}", e.kind())
      );
      debug!("transaction {} failed: {e}", ctx.id());
      Err(e)
    }
  }
}

fn create_genesis_account(
  db: &mut Database,
  name: Name,
  key: PublicKey,
  now: u32,
) -> Result<(), Error> {
  if db.accounts.contains(&name) {
    return Err(Error::AccountExists(name));
  }

  db.accounts.insert(name, AccountObject {
    name,
    creation_date: now,
    ..Default::default()
  });
  db.sequences.insert(name, AccountSequenceObject {
    name,
    ..Default::default()
  });
  db.balances.insert(name, AccountBalance {
    name,
    ..Default::default()
  });

  let owner = authorization::create_permission(
    db,
    name,
    OWNER_PERMISSION,
    0,
    Authority::from_key(key),
    now,
  )?;
  let active = authorization::create_permission(
    db,
    name,
    ACTIVE_PERMISSION,
    owner.id,
    Authority::from_key(key),
    now,
  )?;
  resources::initialize_account(db, name)?;

  let ram = OVERHEAD_PER_ACCOUNT_RAM_BYTES
    + owner.total_billable_size()
    + active.total_billable_size();
  resources::add_pending_ram_usage(db, name, ram as i64)
}
