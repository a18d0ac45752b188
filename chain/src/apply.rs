use {
  crate::{
    authorization,
    config::{ChainConfig, ListConfig},
    contract,
    error::Error,
    objects::GeneratedTransaction,
    store::Database,
    transaction::TransactionContext,
    vm::Vm,
  },
  ledger_primitives::{
    system::CODE_PERMISSION,
    Action,
    Name,
    PermissionLevel,
    SystemAction,
    Transaction,
  },
  std::sync::Arc,
};

/// Execution context of a single action.
///
/// Gives the handler of the action access to the ledger, the
/// authorization it was declared with, and the means to bill RAM and
/// to produce further actions.
pub struct ApplyContext<'t, 'c> {
  trx: &'t mut TransactionContext<'c>,
  act: Action,
  context_free: bool,
  depth: u16,
  system_dispatched: bool,
  inline_actions: Vec<Action>,
}

impl<'t, 'c> ApplyContext<'t, 'c> {
  pub(crate) fn new(
    trx: &'t mut TransactionContext<'c>,
    act: Action,
    context_free: bool,
    depth: u16,
    system_dispatched: bool,
  ) -> Self {
    Self {
      trx,
      act,
      context_free,
      depth,
      system_dispatched,
      inline_actions: vec![],
    }
  }

  pub(crate) fn exec(&mut self) -> Result<(), Error> {
    let receiver = self.receiver();
    let system_action = SystemAction::decode(&self.act)?;

    if self.context_free && system_action.is_some() {
      return Err(Error::Validation(
        "system actions can not be context free".into(),
      ));
    }

    let found = self
      .db_mut()
      .sequences
      .modify(&receiver, |s| s.recv_sequence += 1);
    if !found {
      return Err(Error::AccountNotFound(receiver));
    }

    match system_action {
      Some(action) => contract::apply(self, action),
      None => {
        let code = self
          .db()
          .accounts
          .get(&receiver)
          .map(|a| a.code.clone())
          .unwrap_or_default();
        if code.is_empty() {
          // accounts without code accept every action
          return Ok(());
        }
        let vm = self.vm();
        vm.apply(&code, self)
      }
    }
  }

  pub(crate) fn into_inline_actions(self) -> Vec<Action> {
    self.inline_actions
  }

  pub fn action(&self) -> &Action {
    &self.act
  }

  pub fn receiver(&self) -> Name {
    self.act.account
  }

  pub fn depth(&self) -> u16 {
    self.depth
  }

  pub fn is_context_free(&self) -> bool {
    self.context_free
  }

  /// True for actions synthesized by the chain itself, such as fee
  /// payments, as opposed to actions signed by users.
  pub fn is_system_dispatched(&self) -> bool {
    self.system_dispatched
  }

  pub fn db(&self) -> &Database {
    &self.trx.chain.db
  }

  pub fn db_mut(&mut self) -> &mut Database {
    &mut self.trx.chain.db
  }

  pub fn config(&self) -> &ChainConfig {
    &self.trx.chain.config
  }

  pub fn lists(&self) -> &ListConfig {
    &self.trx.chain.lists
  }

  pub fn vm(&self) -> Arc<dyn Vm> {
    Arc::clone(&self.trx.chain.vm)
  }

  pub fn head_block_num(&self) -> u32 {
    self.trx.chain.head_block_num()
  }

  /// Seconds since unix epoch of the block being produced.
  pub fn pending_block_time(&self) -> u32 {
    self.trx.block.time_secs()
  }

  pub fn pending_block_producer(&self) -> Name {
    self.trx.block.producer
  }

  /// Whether deny listed keys must be rejected in new authorities.
  pub fn enforce_key_list(&self) -> bool {
    self.trx.enforce_whiteblacklist
  }

  pub fn has_authorization(&self, account: Name) -> bool {
    self.act.authorizers().any(|actor| actor == account)
  }

  pub fn require_authorization(&self, account: Name) -> Result<(), Error> {
    if self.has_authorization(account) {
      Ok(())
    } else {
      Err(Error::MissingAuth(account))
    }
  }

  pub fn is_privileged(&self, account: Name) -> bool {
    self
      .db()
      .accounts
      .get(&account)
      .map(|a| a.privileged)
      .unwrap_or_default()
  }

  /// Bills (or refunds, with a negative delta) RAM to `account`.
  pub fn add_ram_usage(&mut self, account: Name, delta: i64) {
    self.trx.add_ram_usage(account, delta);
  }

  pub fn checktime(&self) -> Result<(), Error> {
    self.trx.checktime()
  }

  /// Queues an action to run after this one, one level deeper.
  ///
  /// Inline actions may only carry authorizations of the receiver,
  /// authorizations that delegate to the receiver's code permission, or
  /// any authorization when the receiver is privileged.
  pub fn execute_inline(&mut self, action: Action) -> Result<(), Error> {
    if !self.db().accounts.contains(&action.account) {
      return Err(Error::AccountNotFound(action.account));
    }

    let privileged = self.is_privileged(self.receiver());
    for level in &action.authorization {
      if !self.db().accounts.contains(&level.actor) {
        return Err(Error::AccountNotFound(level.actor));
      }
      if !(privileged || self.inline_authorized(level)) {
        return Err(Error::MissingAuth(level.actor));
      }
    }

    self.inline_actions.push(action);
    Ok(())
  }

  fn inline_authorized(&self, level: &PermissionLevel) -> bool {
    if level.actor == self.receiver() {
      return true;
    }
    let code = PermissionLevel::new(self.receiver(), CODE_PERMISSION);
    match authorization::find_permission(self.db(), level) {
      Some(permission) => permission.auth.accounts.iter().any(|a| {
        a.permission == code && u32::from(a.weight) >= permission.auth.threshold
      }),
      None => false,
    }
  }

  /// Schedules `trx` to run after `delay_sec` seconds under the
  /// receiver's sender id namespace, replacing a pending transaction
  /// with the same id when `replace` is set.
  pub fn schedule_deferred(
    &mut self,
    sender_id: u128,
    payer: Name,
    trx: Transaction,
    delay_sec: u32,
    replace: bool,
  ) -> Result<(), Error> {
    let sender = self.receiver();
    if payer != sender && !self.has_authorization(payer) {
      return Err(Error::MissingAuth(payer));
    }
    if delay_sec > self.config().max_transaction_delay {
      return Err(Error::InvalidArguments(format!(
        "delay of {delay_sec}s exceeds the maximum delay"
      )));
    }
    if !trx.context_free_actions.is_empty() {
      return Err(Error::Validation(
        "deferred transactions can not have context free actions".into(),
      ));
    }

    if self.db().generated.contains(&(sender, sender_id)) {
      if !replace {
        return Err(Error::Validation(format!(
          "deferred transaction {sender_id:#x} of {sender} already exists"
        )));
      }
      self.cancel_deferred(sender_id)?;
    }

    let now = self.pending_block_time();
    let delay_until = now.saturating_add(delay_sec);
    let packed_size = trx.pack().len() as u64;
    let generated = GeneratedTransaction {
      sender,
      sender_id,
      payer,
      trx_id: trx.id(),
      published: now,
      delay_until,
      expiration: delay_until
        .saturating_add(self.config().max_transaction_lifetime),
      trx,
      packed_size,
    };
    let billed = generated.total_billable_size() as i64;
    self.db_mut().generated.insert((sender, sender_id), generated);
    self.add_ram_usage(payer, billed);
    Ok(())
  }

  /// Removes a deferred transaction scheduled by the receiver. Returns
  /// false if there was none.
  pub fn cancel_deferred(&mut self, sender_id: u128) -> Result<bool, Error> {
    let key = (self.receiver(), sender_id);
    match self.db_mut().generated.remove(&key) {
      Some(generated) => {
        self.add_ram_usage(
          generated.payer,
          -(generated.total_billable_size() as i64),
        );
        Ok(true)
      }
      None => Ok(false),
    }
  }

  /// Overrides the cpu and net limits of the running transaction.
  /// Only privileged contracts may do this, and the limits of the block
  /// still apply.
  pub fn set_transaction_limits(
    &mut self,
    cpu_us: u64,
    net_bytes: u64,
  ) -> Result<(), Error> {
    if !self.is_privileged(self.receiver()) {
      return Err(Error::MissingAuth(self.receiver()));
    }
    self.trx.set_limits_by_contract(cpu_us, net_bytes);
    Ok(())
  }
}
