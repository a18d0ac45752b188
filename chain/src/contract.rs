//! Handlers of the native system actions.
//!
//! Every handler checks the authorization it needs before touching the
//! ledger, and bills or refunds the RAM of every object it creates,
//! resizes or removes.

use {
  crate::{
    apply::ApplyContext,
    authorization,
    config::{config_value, is_fee_admin, ConfigKey},
    error::Error,
    fees,
    objects::{
      AccountBalance,
      AccountObject,
      AccountSequenceObject,
      ActionFeeObject,
      BillableSize,
      ConfigObject,
      PermissionLinkObject,
      PermissionObject,
      OVERHEAD_PER_ACCOUNT_RAM_BYTES,
      SETCODE_RAM_BYTES_MULTIPLIER,
    },
    resources,
  },
  ledger_primitives::{
    system::{
      CancelDelay,
      DeleteAuth,
      LinkAuth,
      NewAccount,
      OnFee,
      SetAbi,
      SetCode,
      SetConfig,
      SetFee,
      UnlinkAuth,
      UpdateAuth,
      VoteAgeFee,
      ACTIVE_PERMISSION,
      ANY_PERMISSION,
      CONFIG_ACCOUNT,
      FEE_ADMIN_ACCOUNT,
      OWNER_PERMISSION,
      PRODUCERS_ACCOUNT,
      RESERVED_PREFIX,
      SYSTEM_ACCOUNT,
    },
    Authority,
    Name,
    PermissionLevel,
    SystemAction,
    MAX_NAME_LENGTH,
  },
  multihash::{Hasher, Sha3_256},
  tracing::debug,
};

pub(crate) fn apply(
  ctx: &mut ApplyContext<'_, '_>,
  action: SystemAction,
) -> Result<(), Error> {
  match action {
    SystemAction::NewAccount(create) => newaccount(ctx, create),
    SystemAction::SetCode(set) => setcode(ctx, set),
    SystemAction::SetAbi(set) => setabi(ctx, set),
    SystemAction::UpdateAuth(update) => updateauth(ctx, update),
    SystemAction::DeleteAuth(remove) => deleteauth(ctx, remove),
    SystemAction::LinkAuth(link) => linkauth(ctx, link),
    SystemAction::UnlinkAuth(unlink) => unlinkauth(ctx, unlink),
    SystemAction::CancelDelay(cancel) => canceldelay(ctx, cancel),
    SystemAction::SetConfig(config) => setconfig(ctx, config),
    SystemAction::SetFee(fee) => setfee(ctx, fee),
    SystemAction::OnFee(fee) => onfee(ctx, fee),
    SystemAction::VoteAgeFee(fee) => voteagefee(ctx, fee),
  }
}

fn validate_authority(
  ctx: &ApplyContext<'_, '_>,
  auth: &Authority,
) -> Result<(), Error> {
  if !auth.validate() {
    return Err(Error::InvalidArguments("invalid authority".into()));
  }
  authorization::validate_authority_precondition(
    ctx.db(),
    ctx.lists(),
    ctx.enforce_key_list(),
    auth,
  )
}

fn newaccount(
  ctx: &mut ApplyContext<'_, '_>,
  create: NewAccount,
) -> Result<(), Error> {
  ctx.require_authorization(create.creator)?;

  if create.name.is_empty() {
    return Err(Error::InvalidArguments("account name can not be empty".into()));
  }
  if create.name.len() > MAX_NAME_LENGTH {
    return Err(Error::InvalidArguments(format!(
      "account name {} is longer than {MAX_NAME_LENGTH} characters",
      create.name
    )));
  }

  let creator = ctx
    .db()
    .accounts
    .get(&create.creator)
    .cloned()
    .ok_or(Error::AccountNotFound(create.creator))?;
  if creator.privileged {
    return Err(Error::Validation(
      "privileged accounts can not create accounts".into(),
    ));
  }

  if create.name.has_prefix(RESERVED_PREFIX)
    && ![SYSTEM_ACCOUNT, PRODUCERS_ACCOUNT, CONFIG_ACCOUNT]
      .contains(&create.creator)
  {
    return Err(Error::Validation(format!(
      "only system accounts can create names starting with '{RESERVED_PREFIX}'"
    )));
  }

  if ctx.db().accounts.contains(&create.name) {
    return Err(Error::AccountExists(create.name));
  }

  validate_authority(ctx, &create.owner)?;
  validate_authority(ctx, &create.active)?;

  let now = ctx.pending_block_time();
  let db = ctx.db_mut();
  db.accounts.insert(create.name, AccountObject {
    name: create.name,
    creation_date: now,
    ..Default::default()
  });
  db.sequences.insert(create.name, AccountSequenceObject {
    name: create.name,
    ..Default::default()
  });
  if !db.balances.contains(&create.name) {
    db.balances.insert(create.name, AccountBalance {
      name: create.name,
      ..Default::default()
    });
  }

  let owner = authorization::create_permission(
    db,
    create.name,
    OWNER_PERMISSION,
    0,
    create.owner,
    now,
  )?;
  let active = authorization::create_permission(
    db,
    create.name,
    ACTIVE_PERMISSION,
    owner.id,
    create.active,
    now,
  )?;
  resources::initialize_account(db, create.name)?;

  let ram = OVERHEAD_PER_ACCOUNT_RAM_BYTES
    + owner.total_billable_size()
    + active.total_billable_size();
  ctx.add_ram_usage(create.name, ram as i64);

  debug!("account {} created by {}", create.name, create.creator);
  Ok(())
}

fn code_hash(code: &[u8]) -> [u8; 32] {
  let mut hash = [0u8; 32];
  if code.is_empty() {
    return hash;
  }
  let mut hasher = Sha3_256::default();
  hasher.update(code);
  hash.copy_from_slice(hasher.finalize());
  hash
}

fn setcode(ctx: &mut ApplyContext<'_, '_>, set: SetCode) -> Result<(), Error> {
  ctx.require_authorization(set.account)?;

  if set.vmtype != 0 || set.vmversion != 0 {
    return Err(Error::InvalidVm);
  }

  let code_version = code_hash(&set.code);
  if !set.code.is_empty() {
    ctx.vm().validate(&set.code)?;
  }

  let account = ctx
    .db()
    .accounts
    .get(&set.account)
    .cloned()
    .ok_or(Error::AccountNotFound(set.account))?;
  if account.code_version == code_version {
    return Err(Error::SetExactCode);
  }

  let old_size = account.code.len() as i64 * SETCODE_RAM_BYTES_MULTIPLIER as i64;
  let new_size = set.code.len() as i64 * SETCODE_RAM_BYTES_MULTIPLIER as i64;

  let now = ctx.pending_block_time();
  let db = ctx.db_mut();
  db.accounts.modify(&set.account, |a| {
    a.code = set.code;
    a.code_version = code_version;
    a.last_code_update = now;
    a.vm_type = set.vmtype;
    a.vm_version = set.vmversion;
  });
  db.sequences
    .modify(&set.account, |s| s.code_sequence += 1);

  if new_size != old_size {
    ctx.add_ram_usage(set.account, new_size - old_size);
  }
  Ok(())
}

fn setabi(ctx: &mut ApplyContext<'_, '_>, set: SetAbi) -> Result<(), Error> {
  ctx.require_authorization(set.account)?;

  let old_size = ctx
    .db()
    .accounts
    .get(&set.account)
    .map(|a| a.abi.len() as i64)
    .ok_or(Error::AccountNotFound(set.account))?;
  let new_size = set.abi.len() as i64;

  let db = ctx.db_mut();
  db.accounts.modify(&set.account, |a| a.abi = set.abi);
  db.sequences
    .modify(&set.account, |s| s.abi_sequence += 1);

  if new_size != old_size {
    ctx.add_ram_usage(set.account, new_size - old_size);
  }
  Ok(())
}

fn updateauth(
  ctx: &mut ApplyContext<'_, '_>,
  update: UpdateAuth,
) -> Result<(), Error> {
  ctx.require_authorization(update.account)?;

  if update.permission.is_empty() {
    return Err(Error::InvalidArguments(
      "permission name can not be empty".into(),
    ));
  }
  if update.permission.has_prefix(RESERVED_PREFIX) {
    return Err(Error::InvalidArguments(format!(
      "permission names starting with '{RESERVED_PREFIX}' are reserved"
    )));
  }
  if update.permission == update.parent {
    return Err(Error::InvalidArguments(
      "a permission can not be its own parent".into(),
    ));
  }
  if !ctx.db().accounts.contains(&update.account) {
    return Err(Error::AccountNotFound(update.account));
  }

  if update.permission == OWNER_PERMISSION {
    if !update.parent.is_empty() {
      return Err(Error::InvalidArguments(
        "the owner permission can not have a parent".into(),
      ));
    }
  } else if update.permission == ACTIVE_PERMISSION {
    if update.parent != OWNER_PERMISSION {
      return Err(Error::InvalidArguments(
        "the parent of the active permission must be owner".into(),
      ));
    }
  } else if update.parent.is_empty() {
    return Err(Error::InvalidArguments(
      "only the owner permission can have no parent".into(),
    ));
  }

  validate_authority(ctx, &update.auth)?;
  if let Some(max_delay) = update.auth.max_delay() {
    if max_delay > ctx.config().max_transaction_delay {
      return Err(Error::InvalidArguments(format!(
        "wait of {max_delay}s exceeds the maximum transaction delay"
      )));
    }
  }

  let parent_id = if update.permission == OWNER_PERMISSION {
    0
  } else {
    authorization::get_permission(
      ctx.db(),
      &PermissionLevel::new(update.account, update.parent),
    )?
    .id
  };

  let level = PermissionLevel::new(update.account, update.permission);
  let existing = authorization::find_permission(ctx.db(), &level).cloned();
  let now = ctx.pending_block_time();

  match existing {
    Some(permission) => {
      let old_size = permission.total_billable_size() as i64;
      let new_size =
        (PermissionObject::billable_size() + update.auth.billable_size()) as i64;
      authorization::modify_permission(
        ctx.db_mut(),
        &permission,
        parent_id,
        update.auth,
        now,
      )?;
      ctx.add_ram_usage(update.account, new_size - old_size);
    }
    None => {
      let permission = authorization::create_permission(
        ctx.db_mut(),
        update.account,
        update.permission,
        parent_id,
        update.auth,
        now,
      )?;
      ctx.add_ram_usage(
        update.account,
        permission.total_billable_size() as i64,
      );
    }
  }

  ctx
    .db_mut()
    .sequences
    .modify(&update.account, |s| s.auth_sequence += 1);
  Ok(())
}

fn deleteauth(
  ctx: &mut ApplyContext<'_, '_>,
  remove: DeleteAuth,
) -> Result<(), Error> {
  ctx.require_authorization(remove.account)?;

  if remove.permission == OWNER_PERMISSION
    || remove.permission == ACTIVE_PERMISSION
  {
    return Err(Error::InvalidArguments(
      "the owner and active permissions can not be deleted".into(),
    ));
  }

  let level = PermissionLevel::new(remove.account, remove.permission);
  let id = authorization::get_permission(ctx.db(), &level)?.id;
  let removed = authorization::remove_permission(ctx.db_mut(), id)?;
  ctx.add_ram_usage(remove.account, -(removed.total_billable_size() as i64));

  ctx
    .db_mut()
    .sequences
    .modify(&remove.account, |s| s.auth_sequence += 1);
  Ok(())
}

fn linkauth(ctx: &mut ApplyContext<'_, '_>, link: LinkAuth) -> Result<(), Error> {
  if link.requirement.is_empty() {
    return Err(Error::InvalidArguments(
      "required permission can not be empty".into(),
    ));
  }
  ctx.require_authorization(link.account)?;

  if !ctx.db().accounts.contains(&link.account) {
    return Err(Error::AccountNotFound(link.account));
  }
  if !ctx.db().accounts.contains(&link.code) {
    return Err(Error::AccountNotFound(link.code));
  }
  if authorization::is_unlinkable(link.code, link.message_type) {
    return Err(Error::InvalidArguments(format!(
      "the minimum permission of {}::{} can not be linked",
      link.code, link.message_type
    )));
  }
  if link.requirement != ANY_PERMISSION {
    authorization::get_permission(
      ctx.db(),
      &PermissionLevel::new(link.account, link.requirement),
    )?;
  }

  let key = (link.account, link.code, link.message_type);
  let existing = ctx.db().links.get(&key).map(|l| l.required_permission);
  match existing {
    Some(current) if current == link.requirement => {
      return Err(Error::NoOpRequirement(link.requirement));
    }
    Some(_) => {
      ctx
        .db_mut()
        .links
        .modify(&key, |l| l.required_permission = link.requirement);
    }
    None => {
      ctx.db_mut().links.insert(key, PermissionLinkObject {
        account: link.account,
        code: link.code,
        message_type: link.message_type,
        required_permission: link.requirement,
      });
      ctx.add_ram_usage(
        link.account,
        PermissionLinkObject::billable_size() as i64,
      );
    }
  }
  Ok(())
}

fn unlinkauth(
  ctx: &mut ApplyContext<'_, '_>,
  unlink: UnlinkAuth,
) -> Result<(), Error> {
  ctx.require_authorization(unlink.account)?;

  let key = (unlink.account, unlink.code, unlink.message_type);
  if ctx.db_mut().links.remove(&key).is_none() {
    return Err(Error::LinkNotFound {
      account: unlink.account,
      code: unlink.code,
      message_type: unlink.message_type,
    });
  }
  ctx.add_ram_usage(
    unlink.account,
    -(PermissionLinkObject::billable_size() as i64),
  );
  Ok(())
}

fn canceldelay(
  ctx: &mut ApplyContext<'_, '_>,
  cancel: CancelDelay,
) -> Result<(), Error> {
  ctx.require_authorization(cancel.canceling_auth.actor)?;

  let sender_id = cancel.trx_id.sender_id();
  let key = (Name::default(), sender_id);
  let generated = match ctx.db().generated.get(&key) {
    Some(generated) if generated.trx_id == cancel.trx_id => generated.clone(),
    _ => return Err(Error::DeferredNotFound(sender_id)),
  };

  let authorized_original = generated
    .trx
    .actions
    .iter()
    .any(|act| act.authorization.contains(&cancel.canceling_auth));
  if !authorized_original {
    return Err(Error::IrrelevantAuthority {
      declared: cancel.canceling_auth,
      required: generated
        .trx
        .actions
        .iter()
        .flat_map(|act| act.authorization.iter())
        .next()
        .copied()
        .unwrap_or_default(),
    });
  }

  ctx.db_mut().generated.remove(&key);
  ctx.add_ram_usage(
    generated.payer,
    -(generated.total_billable_size() as i64),
  );
  debug!("canceled delayed transaction {:?}", cancel.trx_id);
  Ok(())
}

fn setconfig(
  ctx: &mut ApplyContext<'_, '_>,
  config: SetConfig,
) -> Result<(), Error> {
  let authorized = [CONFIG_ACCOUNT, SYSTEM_ACCOUNT, PRODUCERS_ACCOUNT]
    .into_iter()
    .any(|account| ctx.has_authorization(account));
  if !authorized {
    return Err(Error::MissingAuth(CONFIG_ACCOUNT));
  }

  if ConfigKey::from_name(config.typ).is_none() {
    debug!("storing unrecognized configuration key {}", config.typ);
  }

  ctx.db_mut().configs.insert(config.typ, ConfigObject {
    typ: config.typ,
    num: config.num,
    key: config.key,
    fee: config.fee,
  });
  Ok(())
}

fn setfee(ctx: &mut ApplyContext<'_, '_>, fee: SetFee) -> Result<(), Error> {
  let overrides_limits =
    fee.cpu_limit != 0 || fee.net_limit != 0 || fee.ram_limit != 0;
  let admin = ctx.action().authorizers().any(is_fee_admin);

  if overrides_limits {
    // only the fee admin may hand out resources
    ctx.require_authorization(FEE_ADMIN_ACCOUNT)?;
  } else if !admin {
    ctx.require_authorization(fee.account)?;
  }

  if fee.fee.units() <= 0 {
    return Err(Error::InvalidArguments("fee must be positive".into()));
  }
  let cap = config_value(ctx.db(), ConfigKey::FeeCap);
  if fee.fee.units() > cap {
    return Err(Error::InvalidArguments(format!(
      "fee {} exceeds the cap of {cap} units",
      fee.fee
    )));
  }
  if !ctx.db().accounts.contains(&fee.account) {
    return Err(Error::AccountNotFound(fee.account));
  }

  ctx.db_mut().fees.insert((fee.account, fee.action), ActionFeeObject {
    account: fee.account,
    action: fee.action,
    fee: fee.fee,
    cpu_limit: fee.cpu_limit,
    net_limit: fee.net_limit,
    ram_limit: fee.ram_limit,
  });
  Ok(())
}

/// Only the system charges fees: either the transaction dispatches this
/// action itself, or it carries the authority of the `sys` account.
fn onfee(ctx: &mut ApplyContext<'_, '_>, fee: OnFee) -> Result<(), Error> {
  if !ctx.is_system_dispatched() {
    ctx.require_authorization(SYSTEM_ACCOUNT)?;
  }
  fees::pay_fee(ctx.db_mut(), fee.actor, fee.fee, fee.bpname)
}

fn voteagefee(
  ctx: &mut ApplyContext<'_, '_>,
  fee: VoteAgeFee,
) -> Result<(), Error> {
  if !ctx.is_system_dispatched() {
    ctx.require_authorization(fee.actor)?;
  }
  let ratio = config_value(ctx.db(), ConfigKey::VoteAgeRatio);
  let height = ctx.head_block_num();
  fees::spend_vote_age(
    ctx.db_mut(),
    height,
    ratio,
    fee.actor,
    fee.bpname,
    fee.fee,
  )?;
  Ok(())
}
