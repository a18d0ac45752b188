use {
  crate::{
    apply::ApplyContext,
    authorization,
    config::{is_activated, ConfigKey},
    controller::{Chain, PendingBlock},
    error::{DeadlineKind, Error, LimitCause},
    fees::{self, ActionFee, FeeLimits},
    objects::GeneratedTransaction,
    resources,
    store::Undoable,
    trace::{ActionTrace, TransactionTrace},
  },
  ledger_primitives::{
    system::{OnFee, SystemPayload, ACTIVE_PERMISSION},
    Action,
    Asset,
    Name,
    PermissionLevel,
    PublicKey,
    Transaction,
    TransactionId,
  },
  std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{
      atomic::{AtomicBool, Ordering},
      Arc,
    },
    time::{Duration, Instant},
  },
  tracing::debug,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
  /// Synthesized by the chain, not signed and not charged fees.
  Implicit,

  /// Signed and pushed by a user.
  Input,

  /// Delayed transaction whose time came.
  Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
  Created,
  Initialized,
  Executed,
  Finalized,
  Closed,
}

/// Limits of the billed accounts, -1 when unlimited.
#[derive(Debug, Clone, Copy)]
struct AccountBandwidth {
  net: i64,
  cpu: i64,
  greylisted_net: bool,
  greylisted_cpu: bool,
}

/// Applies one transaction to the ledger.
///
/// All state changes happen in an undo session opened when the context
/// is created. The caller either squashes the session after a successful
/// [`finalize`](Self::finalize) or undoes it. A context dropped with the
/// session still open undoes it.
pub struct TransactionContext<'c> {
  pub(crate) chain: &'c mut Chain,
  pub(crate) block: PendingBlock,
  trx: &'c Transaction,
  id: TransactionId,
  kind: Option<TransactionKind>,
  stage: Stage,
  session_open: bool,
  trace: TransactionTrace,

  start: Instant,
  published: u32,
  delay_sec: u32,
  pub(crate) enforce_whiteblacklist: bool,
  bill_to_accounts: BTreeSet<Name>,
  validate_ram_usage: BTreeSet<Name>,
  ram_deltas: BTreeMap<Name, i64>,

  deadline: Option<Instant>,
  effective_deadline: Option<Instant>,
  deadline_kind: DeadlineKind,
  billing_timer_kind: DeadlineKind,
  objective_duration_limit: u64,
  billing_timer_duration_limit: u64,
  pseudo_start: Option<Instant>,
  billed_time: Duration,
  billed_cpu_time_us: u64,
  explicit_billed_cpu_time: bool,
  cpu_limit_due_to_greylist: bool,
  cancel: Arc<AtomicBool>,

  net_usage: u64,
  net_limit: u64,
  eager_net_limit: u64,
  net_limit_cause: LimitCause,

  fees: Vec<ActionFee>,
  required_fee: Asset,
  fee_payer: Option<Name>,
  fee_limits: Option<FeeLimits>,
  contract_limits: Option<(u64, u64)>,
}

impl<'c> TransactionContext<'c> {
  pub fn new(
    chain: &'c mut Chain,
    trx: &'c Transaction,
    id: TransactionId,
    start: Instant,
  ) -> Result<Self, Error> {
    let block = *chain.pending_block()?;
    chain.db.start_session();

    Ok(Self {
      chain,
      block,
      trx,
      id,
      kind: None,
      stage: Stage::Created,
      session_open: true,
      trace: TransactionTrace::new(id, block.block_num),
      start,
      published: block.time_secs(),
      delay_sec: 0,
      enforce_whiteblacklist: block.producing,
      bill_to_accounts: BTreeSet::new(),
      validate_ram_usage: BTreeSet::new(),
      ram_deltas: BTreeMap::new(),
      deadline: None,
      effective_deadline: None,
      deadline_kind: DeadlineKind::Deadline,
      billing_timer_kind: DeadlineKind::TransactionCpu,
      objective_duration_limit: 0,
      billing_timer_duration_limit: 0,
      pseudo_start: None,
      billed_time: Duration::ZERO,
      billed_cpu_time_us: 0,
      explicit_billed_cpu_time: false,
      cpu_limit_due_to_greylist: false,
      cancel: Arc::new(AtomicBool::new(false)),
      net_usage: 0,
      net_limit: 0,
      eager_net_limit: 0,
      net_limit_cause: LimitCause::Transaction,
      fees: vec![],
      required_fee: Asset::zero(),
      fee_payer: None,
      fee_limits: None,
      contract_limits: None,
    })
  }

  pub fn id(&self) -> &TransactionId {
    &self.id
  }

  pub fn kind(&self) -> Option<TransactionKind> {
    self.kind
  }

  /// Wall clock time after which execution is interrupted.
  pub fn set_deadline(&mut self, deadline: Instant) {
    self.deadline = Some(deadline);
    self.refresh_deadline();
  }

  /// Bill exactly this much cpu instead of measuring it, used when
  /// replaying blocks produced by other nodes.
  pub fn set_explicit_billed_cpu_time(&mut self, billed_us: u64) {
    self.explicit_billed_cpu_time = true;
    self.billed_cpu_time_us = billed_us;
  }

  pub fn set_enforce_whiteblacklist(&mut self, enforce: bool) {
    self.enforce_whiteblacklist = enforce;
  }

  /// Setting the returned flag interrupts the transaction at its next
  /// time check.
  pub fn cancellation_token(&self) -> Arc<AtomicBool> {
    Arc::clone(&self.cancel)
  }

  pub fn net_usage(&self) -> u64 {
    self.net_usage
  }

  pub fn billed_cpu_time_us(&self) -> u64 {
    self.billed_cpu_time_us
  }

  pub fn required_fee(&self) -> Asset {
    self.required_fee
  }

  /// Fees of the actions, in action order. Empty until fees are
  /// resolved and for actions that run for free.
  pub fn fees(&self) -> &[ActionFee] {
    &self.fees
  }

  pub fn take_trace(&mut self) -> TransactionTrace {
    std::mem::replace(
      &mut self.trace,
      TransactionTrace::new(self.id, self.block.block_num),
    )
  }

  fn init(&mut self, initial_net_usage: u64) -> Result<(), Error> {
    let chain = &*self.chain;
    let config = &chain.config;

    // net limit: the tightest of the chain, block and declared limits
    let mut net_limit = u64::from(config.max_transaction_net_usage);
    let mut net_cause = LimitCause::Transaction;
    let block_net = resources::block_net_limit(&chain.db, config);
    if block_net < net_limit {
      net_limit = block_net;
      net_cause = LimitCause::Block;
    }
    if self.trx.max_net_usage_words > 0 {
      let declared = u64::from(self.trx.max_net_usage_words) * 8;
      if declared < net_limit {
        net_limit = declared;
        net_cause = LimitCause::Transaction;
      }
    }

    // cpu limit, same sources
    let mut objective = u64::from(config.max_transaction_cpu_usage);
    let mut timer_kind = DeadlineKind::TransactionCpu;
    let block_cpu = resources::block_cpu_limit(&chain.db, config);
    if block_cpu < objective {
      objective = block_cpu;
      timer_kind = DeadlineKind::BlockCpu;
    }
    if self.trx.max_cpu_usage_ms > 0 {
      let declared = u64::from(self.trx.max_cpu_usage_ms) * 1000;
      if declared < objective {
        objective = declared;
        timer_kind = DeadlineKind::TransactionCpu;
      }
    }

    if let Some(limits) = self.fee_limits {
      if limits.net_bytes < net_limit {
        net_limit = limits.net_bytes;
        net_cause = LimitCause::Transaction;
      }
      if limits.cpu_us < objective {
        objective = limits.cpu_us;
        timer_kind = DeadlineKind::TransactionCpu;
      }
    }

    for act in &self.trx.actions {
      self.bill_to_accounts.extend(act.authorizers());
    }

    let bandwidth = self.max_bandwidth_billed_accounts_can_pay(false);
    if bandwidth.net >= 0 && (bandwidth.net as u64) < net_limit {
      net_limit = bandwidth.net as u64;
      net_cause = if bandwidth.greylisted_net {
        LimitCause::Greylist
      } else {
        LimitCause::Account
      };
    }
    if bandwidth.cpu >= 0 && (bandwidth.cpu as u64) < objective {
      objective = bandwidth.cpu as u64;
      timer_kind = DeadlineKind::Leeway;
      self.cpu_limit_due_to_greylist = bandwidth.greylisted_cpu;
    }

    let leeway = self.chain.config.deadline_leeway.as_micros() as u64;
    self.net_limit = net_limit;
    self.eager_net_limit = net_limit;
    self.net_limit_cause = net_cause;
    self.objective_duration_limit = objective;
    self.billing_timer_kind = timer_kind;
    self.billing_timer_duration_limit = objective.saturating_add(leeway);

    if self.explicit_billed_cpu_time {
      // fail early if the amount to be billed is too high
      self.validate_cpu_usage_to_bill(self.billed_cpu_time_us, false)?;
    }

    self.pseudo_start = Some(self.start);
    self.refresh_deadline();

    self.stage = Stage::Initialized;
    self.add_net_usage(initial_net_usage)?;
    self.checktime()
  }

  /// Prepares a transaction synthesized by the chain.
  pub fn init_for_implicit_trx(
    &mut self,
    initial_net_usage: u64,
  ) -> Result<(), Error> {
    self.ensure_stage(Stage::Created)?;
    self.kind = Some(TransactionKind::Implicit);
    self.init(initial_net_usage)
  }

  /// Prepares a signed transaction pushed by a user.
  ///
  /// `packed_trx_unprunable_size` and `packed_trx_prunable_size` are the
  /// sizes of the encoded transaction and its signatures, they are the
  /// base of the billed net usage.
  pub fn init_for_input_trx(
    &mut self,
    packed_trx_unprunable_size: u64,
    packed_trx_prunable_size: u64,
    skip_recording: bool,
  ) -> Result<(), Error> {
    self.ensure_stage(Stage::Created)?;
    let config = &self.chain.config;
    let now = self.block.time_secs();

    if self.trx.expiration < now {
      return Err(Error::TransactionExpired {
        expiration: self.trx.expiration,
        now,
      });
    }
    if self.trx.expiration > now.saturating_add(config.max_transaction_lifetime)
    {
      return Err(Error::InvalidArguments(format!(
        "expiration {} is too far in the future",
        self.trx.expiration
      )));
    }
    if self.trx.delay_sec > config.max_transaction_delay {
      return Err(Error::InvalidArguments(format!(
        "delay of {}s exceeds the maximum of {}s",
        self.trx.delay_sec, config.max_transaction_delay
      )));
    }
    if self.trx.actions.is_empty() {
      return Err(Error::Validation(
        "transaction must have at least one action".into(),
      ));
    }
    if self
      .trx
      .context_free_actions
      .iter()
      .any(|act| !act.authorization.is_empty())
    {
      return Err(Error::Validation(
        "context free actions can not require authorization".into(),
      ));
    }

    let discounted_prunable = if self.trx.context_free_actions.is_empty() {
      packed_trx_prunable_size
    } else {
      packed_trx_prunable_size * config.context_free_discount_net_usage_num
        / config.context_free_discount_net_usage_den.max(1)
    };

    let mut initial_net_usage = u64::from(config.base_per_transaction_net_usage)
      + packed_trx_unprunable_size
      + discounted_prunable;

    if self.trx.delay_sec > 0 {
      // charged ahead of time for retiring the delayed transaction
      initial_net_usage += u64::from(config.base_per_transaction_net_usage)
        + u64::from(config.transaction_id_net_usage);
    }

    self.published = now;
    self.delay_sec = self.trx.delay_sec;
    self.kind = Some(TransactionKind::Input);

    self.validate_referenced_accounts()?;
    if self.delay_sec == 0 {
      self.resolve_fees()?;
    }
    self.init(initial_net_usage)?;

    if !skip_recording {
      self.record_transaction()?;
    }
    Ok(())
  }

  /// Prepares a delayed transaction that is due. Its removal from the
  /// ledger was paid for when it was scheduled.
  pub fn init_for_deferred_trx(&mut self, published: u32) -> Result<(), Error> {
    self.ensure_stage(Stage::Created)?;
    if !self.trx.context_free_actions.is_empty() {
      return Err(Error::Validation(
        "deferred transactions can not have context free actions".into(),
      ));
    }
    self.published = published;
    self.kind = Some(TransactionKind::Deferred);
    self.trace.scheduled = true;
    self.resolve_fees()?;
    self.init(0)
  }

  /// Works out the fee of every action, the payer and the resources
  /// bought, before anything is executed.
  fn resolve_fees(&mut self) -> Result<(), Error> {
    let chain = &*self.chain;
    if !is_activated(&chain.db, ConfigKey::FeeActivation, self.block.block_num)
    {
      return Ok(());
    }

    let fees =
      fees::transaction_fees(&chain.db, &chain.config, &self.trx.actions)?;
    let required = fees::total_fee(&fees)?;
    if required > self.trx.fee {
      return Err(Error::FeeExceedsMaximum {
        required,
        maximum: self.trx.fee,
      });
    }

    let extra = self.trx.fee - required;
    self.fee_limits = fees::fee_limits(&chain.config, &fees, extra);
    self.fee_payer = self.trx.first_authorizer();
    self.required_fee = required;
    self.fees = fees;
    Ok(())
  }

  /// Checks declared authorizations against the signing keys.
  pub fn check_authorization(
    &self,
    provided_keys: &BTreeSet<PublicKey>,
  ) -> Result<(), Error> {
    authorization::check_authorization(
      &self.chain.db,
      self.chain.config.max_authority_depth,
      &self.trx.actions,
      provided_keys,
      self.trx.delay_sec,
    )
  }

  /// Runs all actions, or schedules them if the transaction is delayed.
  pub fn exec(&mut self) -> Result<(), Error> {
    self.ensure_stage(Stage::Initialized)?;

    let trx = self.trx;
    if self.kind == Some(TransactionKind::Input) {
      for act in &trx.context_free_actions {
        self.dispatch_action(act, true, false)?;
      }
    }

    if self.delay_sec == 0 {
      self.dispatch_fee_action()?;
      for act in &trx.actions {
        self.dispatch_action(act, false, false)?;
      }
    } else {
      self.schedule_transaction()?;
    }

    self.stage = Stage::Executed;
    Ok(())
  }

  /// Settles RAM, net and cpu of an executed transaction and bills the
  /// accounts that authorized it.
  pub fn finalize(&mut self) -> Result<(), Error> {
    self.ensure_stage(Stage::Executed)?;
    let now_secs = self.block.time_secs();

    if self.kind == Some(TransactionKind::Input) {
      for act in &self.trx.actions {
        for level in &act.authorization {
          let used = authorization::find_permission(&self.chain.db, level)
            .map(|p| p.id);
          if let Some(id) = used {
            authorization::update_permission_usage(
              &mut self.chain.db,
              id,
              now_secs,
            );
          }
        }
      }
    }

    self.settle_ram_usage()?;
    if self.enforce_whiteblacklist {
      self.validate_executed_accounts()?;
    }

    if self.contract_limits.is_none() {
      let bandwidth = self.max_bandwidth_billed_accounts_can_pay(false);
      if bandwidth.net >= 0 && (bandwidth.net as u64) < self.net_limit {
        self.net_limit = bandwidth.net as u64;
        self.net_limit_cause = if bandwidth.greylisted_net {
          LimitCause::Greylist
        } else {
          LimitCause::Account
        };
      }
      if bandwidth.cpu >= 0
        && (bandwidth.cpu as u64) < self.objective_duration_limit
      {
        self.objective_duration_limit = bandwidth.cpu as u64;
        self.billing_timer_kind = DeadlineKind::TransactionCpu;
        self.cpu_limit_due_to_greylist = bandwidth.greylisted_cpu;
      }
    }

    self.net_usage = ((self.net_usage + 7) / 8) * 8;
    self.eager_net_limit = self.net_limit;
    self.check_net_usage()?;

    let now = Instant::now();
    self.trace.elapsed = now.saturating_duration_since(self.start);
    let billed = self.update_billed_cpu_time(now);
    self.validate_cpu_usage_to_bill(billed, true)?;

    let ordinal = self.block.slot(self.chain.config.block_interval_ms);
    let chain = &mut *self.chain;
    resources::add_transaction_usage(
      &mut chain.db,
      &chain.config,
      &self.bill_to_accounts,
      billed,
      self.net_usage,
      ordinal,
    )?;

    self.trace.net_usage = self.net_usage;
    self.trace.cpu_usage_us = billed;
    self.trace.explicit_cpu_bill = self.explicit_billed_cpu_time;
    self.trace.ram_deltas = self.ram_deltas.clone();
    self.stage = Stage::Finalized;
    Ok(())
  }

  /// Keeps the changes of the transaction in the enclosing session.
  pub fn squash(&mut self) {
    if self.session_open {
      self.chain.db.squash();
      self.session_open = false;
    }
    self.stage = Stage::Closed;
  }

  /// Reverts every change made by the transaction.
  pub fn undo(&mut self) {
    if self.session_open {
      self.chain.db.undo();
      self.session_open = false;
    }
    self.stage = Stage::Closed;
  }

  fn ensure_stage(&self, expected: Stage) -> Result<(), Error> {
    if self.stage != expected {
      return Err(Error::Validation(format!(
        "transaction context is {:?}, expected {expected:?}",
        self.stage
      )));
    }
    Ok(())
  }

  pub fn add_net_usage(&mut self, usage: u64) -> Result<(), Error> {
    self.net_usage = self.net_usage.saturating_add(usage);
    self.check_net_usage()
  }

  pub fn check_net_usage(&self) -> Result<(), Error> {
    if self.net_usage > self.eager_net_limit {
      return Err(Error::NetUsageExceeded {
        usage: self.net_usage,
        limit: self.eager_net_limit,
        cause: self.net_limit_cause,
      });
    }
    Ok(())
  }

  /// Fails once the deadline passed or the transaction was cancelled.
  pub fn checktime(&self) -> Result<(), Error> {
    let expired = self
      .effective_deadline
      .map(|deadline| Instant::now() > deadline)
      .unwrap_or(false);

    if expired || self.cancel.load(Ordering::Acquire) {
      let kind = if self.explicit_billed_cpu_time {
        DeadlineKind::Deadline
      } else {
        match self.deadline_kind {
          DeadlineKind::TransactionCpu | DeadlineKind::Leeway
            if self.cpu_limit_due_to_greylist =>
          {
            DeadlineKind::GreylistCpu
          }
          kind => kind,
        }
      };
      return Err(Error::DeadlineExceeded(kind));
    }
    Ok(())
  }

  /// Stops billing wall clock time, while paused only the caller's
  /// deadline applies.
  pub fn pause_billing_timer(&mut self) {
    if self.explicit_billed_cpu_time {
      return;
    }
    if let Some(pseudo_start) = self.pseudo_start.take() {
      self.billed_time = Instant::now().saturating_duration_since(pseudo_start);
      self.refresh_deadline();
    }
  }

  pub fn resume_billing_timer(&mut self) {
    if self.explicit_billed_cpu_time || self.pseudo_start.is_some() {
      return;
    }
    let now = Instant::now();
    self.pseudo_start = Some(now.checked_sub(self.billed_time).unwrap_or(now));
    self.refresh_deadline();
  }

  fn refresh_deadline(&mut self) {
    let timer = self.pseudo_start.map(|start| {
      start + Duration::from_micros(self.billing_timer_duration_limit)
    });
    match (timer, self.deadline) {
      (Some(timer), Some(deadline)) if deadline < timer => {
        self.effective_deadline = Some(deadline);
        self.deadline_kind = DeadlineKind::Deadline;
      }
      (Some(timer), _) => {
        self.effective_deadline = Some(timer);
        self.deadline_kind = self.billing_timer_kind;
      }
      (None, deadline) => {
        self.effective_deadline = deadline;
        self.deadline_kind = DeadlineKind::Deadline;
      }
    }
  }

  /// Cpu to bill as of `now`, never less than the chain minimum. An
  /// explicitly supplied amount is returned unchanged.
  pub fn update_billed_cpu_time(&mut self, now: Instant) -> u64 {
    if self.explicit_billed_cpu_time {
      return self.billed_cpu_time_us;
    }
    let elapsed = match self.pseudo_start {
      Some(pseudo_start) => now.saturating_duration_since(pseudo_start),
      None => self.billed_time,
    };
    let minimum = u64::from(self.chain.config.min_transaction_cpu_usage);
    self.billed_cpu_time_us = (elapsed.as_micros() as u64).max(minimum);
    self.billed_cpu_time_us
  }

  pub fn validate_cpu_usage_to_bill(
    &self,
    billed_us: u64,
    check_minimum: bool,
  ) -> Result<(), Error> {
    let minimum = u64::from(self.chain.config.min_transaction_cpu_usage);
    if check_minimum && billed_us < minimum {
      return Err(Error::CpuBelowMinimum {
        billed_us,
        minimum_us: minimum,
      });
    }

    if billed_us > self.objective_duration_limit {
      let cause = match self.billing_timer_kind {
        DeadlineKind::BlockCpu => LimitCause::Block,
        _ if self.cpu_limit_due_to_greylist => LimitCause::Greylist,
        DeadlineKind::Leeway => LimitCause::Account,
        _ => LimitCause::Transaction,
      };
      return Err(Error::CpuUsageExceeded {
        billed_us,
        limit_us: self.objective_duration_limit,
        cause,
      });
    }
    Ok(())
  }

  fn max_bandwidth_billed_accounts_can_pay(
    &self,
    force_elastic: bool,
  ) -> AccountBandwidth {
    let chain = &*self.chain;
    let mut bandwidth = AccountBandwidth {
      net: -1,
      cpu: -1,
      greylisted_net: false,
      greylisted_cpu: false,
    };

    for account in &self.bill_to_accounts {
      let elastic = force_elastic
        || !(self.block.producing
          && chain.lists.resource_greylist.contains(account));

      let net =
        resources::account_net_limit(&chain.db, &chain.config, *account, elastic);
      if net >= 0 && (bandwidth.net < 0 || net < bandwidth.net) {
        bandwidth.net = net;
        bandwidth.greylisted_net = !elastic;
      }

      let cpu =
        resources::account_cpu_limit(&chain.db, &chain.config, *account, elastic);
      if cpu >= 0 && (bandwidth.cpu < 0 || cpu < bandwidth.cpu) {
        bandwidth.cpu = cpu;
        bandwidth.greylisted_cpu = !elastic;
      }
    }
    bandwidth
  }

  pub(crate) fn add_ram_usage(&mut self, account: Name, delta: i64) {
    *self.ram_deltas.entry(account).or_default() += delta;
    if delta > 0 {
      self.validate_ram_usage.insert(account);
    }
  }

  /// Applies the net RAM change of every account to the persisted
  /// counters and checks the quotas of accounts that grew.
  fn settle_ram_usage(&mut self) -> Result<(), Error> {
    for (account, delta) in &self.ram_deltas {
      if *delta != 0 {
        resources::add_pending_ram_usage(&mut self.chain.db, *account, *delta)?;
      }
    }
    for account in &self.validate_ram_usage {
      resources::verify_account_ram_usage(&self.chain.db, *account)?;
    }

    if let Some(limits) = self.fee_limits {
      let grown: i64 = self.ram_deltas.values().filter(|d| **d > 0).sum();
      if grown > limits.ram_bytes as i64 {
        return Err(Error::RamUsageExceeded {
          account: self.fee_payer.unwrap_or_default(),
          usage: grown,
          quota: limits.ram_bytes as i64,
        });
      }
    }
    Ok(())
  }

  /// Overrides cpu and net limits with values set by a privileged
  /// contract. They take precedence over fee and stake derived limits,
  /// the chain and block limits still apply.
  pub(crate) fn set_limits_by_contract(&mut self, cpu_us: u64, net_bytes: u64) {
    let chain = &*self.chain;
    let block_cpu = resources::block_cpu_limit(&chain.db, &chain.config);
    let block_net = resources::block_net_limit(&chain.db, &chain.config);
    let cpu = cpu_us
      .min(u64::from(chain.config.max_transaction_cpu_usage))
      .min(block_cpu);
    let net = net_bytes
      .min(u64::from(chain.config.max_transaction_net_usage))
      .min(block_net);
    let leeway = chain.config.deadline_leeway.as_micros() as u64;

    self.contract_limits = Some((cpu, net));
    self.objective_duration_limit = cpu;
    self.billing_timer_kind = DeadlineKind::TransactionCpu;
    self.billing_timer_duration_limit = cpu.saturating_add(leeway);
    self.cpu_limit_due_to_greylist = false;
    self.net_limit = net;
    self.eager_net_limit = net;
    self.net_limit_cause = LimitCause::Transaction;
    self.refresh_deadline();
  }

  fn validate_referenced_accounts(&self) -> Result<(), Error> {
    let chain = &*self.chain;
    let actions = self
      .trx
      .context_free_actions
      .iter()
      .chain(self.trx.actions.iter());

    for act in actions {
      if !chain.db.accounts.contains(&act.account) {
        return Err(Error::AccountNotFound(act.account));
      }
      if self.enforce_whiteblacklist {
        chain
          .lists
          .check_contract(act.account)
          .map_err(|reason| Error::AccountNotAllowed(act.account, reason))?;
      }
      for actor in act.authorizers() {
        if !chain.db.accounts.contains(&actor) {
          return Err(Error::AccountNotFound(actor));
        }
        if self.enforce_whiteblacklist {
          chain
            .lists
            .check_actor(actor)
            .map_err(|reason| Error::AccountNotAllowed(actor, reason))?;
        }
      }
    }
    Ok(())
  }

  /// Checks the receivers and actors of everything that ran, including
  /// inline actions, against the allow and deny lists.
  fn validate_executed_accounts(&self) -> Result<(), Error> {
    let lists = &self.chain.lists;
    for trace in &self.trace.action_traces {
      lists
        .check_contract(trace.receiver)
        .map_err(|reason| Error::AccountNotAllowed(trace.receiver, reason))?;
      for actor in trace.act.authorizers() {
        lists
          .check_actor(actor)
          .map_err(|reason| Error::AccountNotAllowed(actor, reason))?;
      }
    }
    Ok(())
  }

  fn record_transaction(&mut self) -> Result<(), Error> {
    if self.chain.db.recorded.contains(&self.id) {
      return Err(Error::DuplicateTransaction(self.id));
    }
    self
      .chain
      .db
      .recorded
      .insert(self.id, self.trx.expiration);
    Ok(())
  }

  /// Stores a delayed input transaction to run once its delay passed.
  fn schedule_transaction(&mut self) -> Result<(), Error> {
    let payer = self.trx.first_authorizer().ok_or_else(|| {
      Error::Validation("delayed transaction has no authorizer".into())
    })?;

    let sender_id = self.id.sender_id();
    let key = (Name::default(), sender_id);
    if self.chain.db.generated.contains(&key) {
      return Err(Error::DuplicateTransaction(self.id));
    }

    let delay_until = self.published.saturating_add(self.delay_sec);
    let generated = GeneratedTransaction {
      sender: Name::default(),
      sender_id,
      payer,
      trx_id: self.id,
      published: self.published,
      delay_until,
      expiration: delay_until
        .saturating_add(self.chain.config.max_transaction_lifetime),
      trx: Transaction {
        delay_sec: 0,
        ..self.trx.clone()
      },
      packed_size: self.trx.pack().len() as u64,
    };
    let billed = generated.total_billable_size() as i64;

    debug!(
      "scheduling {:?} from {payer} until {delay_until}",
      self.id
    );
    self.chain.db.generated.insert(key, generated);
    self.add_ram_usage(payer, billed);
    Ok(())
  }

  /// Charges the fees of the transaction by dispatching a synthesized
  /// `onfee` action before the user's actions run.
  fn dispatch_fee_action(&mut self) -> Result<(), Error> {
    let payer = match self.fee_payer {
      Some(payer) if !self.required_fee.is_zero() => payer,
      _ => return Ok(()),
    };

    let onfee = OnFee {
      actor: payer,
      fee: self.required_fee,
      bpname: self.block.producer,
    }
    .into_action(vec![PermissionLevel::new(payer, ACTIVE_PERMISSION)])?;

    self.dispatch_action(&onfee, false, true)?;
    self.trace.fee_charged = self.required_fee;
    self.trace.fee_payer = Some(payer);
    Ok(())
  }

  /// Runs an action and then every inline action it produced, level by
  /// level.
  fn dispatch_action(
    &mut self,
    act: &Action,
    context_free: bool,
    system_dispatched: bool,
  ) -> Result<(), Error> {
    let max_depth = self.chain.config.max_inline_action_depth;
    let mut queue = VecDeque::from([(act.clone(), 0u16)]);

    while let Some((act, depth)) = queue.pop_front() {
      if depth > max_depth {
        return Err(
          Error::InlineDepthExceeded(max_depth).in_action(act.account, act.name),
        );
      }

      let started = Instant::now();
      let inline = self
        .apply_one(&act, context_free, depth, system_dispatched && depth == 0)
        .map_err(|e| e.in_action(act.account, act.name))?;

      self.trace.action_traces.push(ActionTrace {
        receiver: act.account,
        act,
        depth,
        context_free,
        elapsed: started.elapsed(),
      });
      queue.extend(inline.into_iter().map(|a| (a, depth + 1)));
    }
    Ok(())
  }

  fn apply_one(
    &mut self,
    act: &Action,
    context_free: bool,
    depth: u16,
    system_dispatched: bool,
  ) -> Result<Vec<Action>, Error> {
    self.checktime()?;
    let mut ctx =
      ApplyContext::new(self, act.clone(), context_free, depth, system_dispatched);
    ctx.exec()?;
    Ok(ctx.into_inline_actions())
  }
}

impl Drop for TransactionContext<'_> {
  fn drop(&mut self) {
    if self.session_open {
      self.chain.db.undo();
    }
  }
}
