//! Permission trees, permission links and transaction authorization.

use {
  crate::{
    checker::AuthorityChecker,
    config::ListConfig,
    error::Error,
    objects::{PermissionId, PermissionObject},
    store::Database,
  },
  ledger_primitives::{
    system::{
      CancelDelay,
      DeleteAuth,
      LinkAuth,
      UnlinkAuth,
      UpdateAuth,
      ACTIVE_PERMISSION,
      ANY_PERMISSION,
      CODE_PERMISSION,
      OWNER_PERMISSION,
      SYSTEM_ACCOUNT,
      SystemPayload,
    },
    Action,
    Authority,
    Name,
    PermissionLevel,
    PublicKey,
    SystemAction,
  },
  std::collections::BTreeSet,
};

pub fn find_permission<'a>(
  db: &'a Database,
  level: &PermissionLevel,
) -> Option<&'a PermissionObject> {
  db.permissions_by_owner
    .get(&(level.actor, level.permission))
    .and_then(|id| db.permissions.get(id))
}

pub fn get_permission<'a>(
  db: &'a Database,
  level: &PermissionLevel,
) -> Result<&'a PermissionObject, Error> {
  find_permission(db, level).ok_or(Error::PermissionNotFound(*level))
}

/// Inserts a new permission under `parent` and returns it.
///
/// `parent` must be zero for owner permissions and an existing
/// permission of the same account otherwise.
pub fn create_permission(
  db: &mut Database,
  owner: Name,
  name: Name,
  parent: PermissionId,
  auth: Authority,
  now: u32,
) -> Result<PermissionObject, Error> {
  if db.permissions_by_owner.contains(&(owner, name)) {
    return Err(Error::Invariant(format!(
      "permission {owner}@{name} already exists"
    )));
  }
  if parent != 0 {
    match db.permissions.get(&parent) {
      Some(p) if p.owner == owner => {}
      _ => {
        return Err(Error::Invariant(format!(
          "parent {parent} of {owner}@{name} is not a permission of {owner}"
        )))
      }
    }
  }

  let id = db.next_permission_id.modify(|next| {
    let id = *next;
    *next += 1;
    id
  });

  let permission = PermissionObject {
    id,
    parent,
    owner,
    name,
    last_updated: now,
    last_used: now,
    auth,
  };
  db.permissions.insert(id, permission.clone());
  db.permissions_by_owner.insert((owner, name), id);
  Ok(permission)
}

/// Replaces the authority of an existing permission. Moving a
/// permission to another parent is not supported.
pub fn modify_permission(
  db: &mut Database,
  permission: &PermissionObject,
  parent: PermissionId,
  auth: Authority,
  now: u32,
) -> Result<(), Error> {
  if permission.parent != parent {
    return Err(Error::UnsupportedOperation(
      "changing the parent of a permission",
    ));
  }
  let found = db.permissions.modify(&permission.id, |p| {
    p.auth = auth;
    p.last_updated = now;
  });
  if !found {
    return Err(Error::PermissionNotFound(permission.level()));
  }
  Ok(())
}

/// Removes a permission that has no children and is not the minimum
/// permission of any link.
pub fn remove_permission(
  db: &mut Database,
  id: PermissionId,
) -> Result<PermissionObject, Error> {
  let permission = db
    .permissions
    .get(&id)
    .cloned()
    .ok_or_else(|| Error::Invariant(format!("no permission with id {id}")))?;

  let links = db.links.range(
    (permission.owner, Name::default(), Name::default())
      ..=(permission.owner, Name::from_u64(u64::MAX), Name::from_u64(u64::MAX)),
  );
  for (_, link) in links {
    if link.required_permission == permission.name {
      return Err(Error::LinkedAuthorityInUse {
        permission: permission.level(),
        code: link.code,
        message_type: link.message_type,
      });
    }
  }

  let has_children = children(db, &permission).next().is_some();
  if has_children {
    return Err(Error::Validation(format!(
      "cannot remove {:?} while it has child permissions",
      permission.level()
    )));
  }

  db.permissions_by_owner
    .remove(&(permission.owner, permission.name));
  db.permissions.remove(&id);
  Ok(permission)
}

fn children<'a>(
  db: &'a Database,
  parent: &'a PermissionObject,
) -> impl Iterator<Item = &'a PermissionObject> {
  db.permissions_by_owner
    .range(
      (parent.owner, Name::default())..=(parent.owner, Name::from_u64(u64::MAX)),
    )
    .filter_map(|(_, id)| db.permissions.get(id))
    .filter(move |p| p.parent == parent.id)
}

pub fn update_permission_usage(db: &mut Database, id: PermissionId, now: u32) {
  db.permissions.modify(&id, |p| p.last_used = now);
}

/// The permission linked to `code::message_type` for `account`, falling
/// back to the default link of `code`. `None` if neither link exists.
pub fn lookup_linked_permission(
  db: &Database,
  account: Name,
  code: Name,
  message_type: Name,
) -> Option<Name> {
  db.links
    .get(&(account, code, message_type))
    .or_else(|| db.links.get(&(account, code, Name::default())))
    .map(|link| link.required_permission)
}

/// The least permission of `account` that may authorize
/// `code::message_type`. `None` means any permission of the account is
/// sufficient.
pub fn lookup_minimum_permission(
  db: &Database,
  account: Name,
  code: Name,
  message_type: Name,
) -> Option<Name> {
  match lookup_linked_permission(db, account, code, message_type) {
    Some(ANY_PERMISSION) => None,
    Some(linked) => Some(linked),
    None => Some(ACTIVE_PERMISSION),
  }
}

/// True if `declared` is `required` or one of its ancestors.
pub fn permission_satisfies(
  db: &Database,
  declared: &PermissionObject,
  required: &PermissionObject,
) -> bool {
  if declared.owner != required.owner {
    return false;
  }

  let mut current = Some(required);
  while let Some(permission) = current {
    if permission.id == declared.id {
      return true;
    }
    current = match permission.parent {
      0 => None,
      parent => db.permissions.get(&parent),
    };
  }
  false
}

/// Checks that every account and permission referenced by an authority
/// exists. Keys on the deny list are rejected when `enforce_key_list` is
/// set.
pub fn validate_authority_precondition(
  db: &Database,
  lists: &ListConfig,
  enforce_key_list: bool,
  auth: &Authority,
) -> Result<(), Error> {
  for account in &auth.accounts {
    let level = account.permission;
    if !db.accounts.contains(&level.actor) {
      return Err(Error::AccountNotFound(level.actor));
    }
    if level.permission == OWNER_PERMISSION
      || level.permission == ACTIVE_PERMISSION
      || level.permission == CODE_PERMISSION
    {
      // every account has these, code is virtual
      continue;
    }
    get_permission(db, &level)?;
  }

  if enforce_key_list {
    if let Some(key) = auth
      .keys
      .iter()
      .map(|k| &k.key)
      .find(|k| lists.key_blacklist.contains(k))
    {
      return Err(Error::KeyNotAllowed(*key));
    }
  }
  Ok(())
}

/// The permission a declared authorization must satisfy for `action`.
///
/// Actions that administer permissions have fixed requirements derived
/// from their payload, every other action uses the linked minimum
/// permission of the declaring account.
fn required_permission(
  db: &Database,
  action: &Action,
  declared: &PermissionLevel,
) -> Result<Option<PermissionLevel>, Error> {
  let special = match SystemAction::decode(action)? {
    Some(SystemAction::UpdateAuth(update)) => {
      Some(updateauth_minimum(db, &update, declared)?)
    }
    Some(SystemAction::DeleteAuth(delete)) => {
      Some(deleteauth_minimum(&delete, declared)?)
    }
    Some(SystemAction::LinkAuth(link)) => linkauth_minimum(
      db,
      link.account,
      link.code,
      link.message_type,
      declared,
    )?,
    Some(SystemAction::UnlinkAuth(UnlinkAuth {
      account,
      code,
      message_type,
    })) => linkauth_minimum(db, account, code, message_type, declared)?,
    Some(SystemAction::CancelDelay(cancel)) => {
      Some(canceldelay_minimum(&cancel, declared)?)
    }
    _ => lookup_minimum_permission(
      db,
      declared.actor,
      action.account,
      action.name,
    )
    .map(|name| PermissionLevel::new(declared.actor, name)),
  };
  Ok(special)
}

fn updateauth_minimum(
  db: &Database,
  update: &UpdateAuth,
  declared: &PermissionLevel,
) -> Result<PermissionLevel, Error> {
  if declared.actor != update.account {
    return Err(Error::IrrelevantAuthority {
      declared: *declared,
      required: PermissionLevel::new(update.account, update.permission),
    });
  }
  let existing = PermissionLevel::new(update.account, update.permission);
  if find_permission(db, &existing).is_some() {
    Ok(existing)
  } else {
    // creating a permission requires its parent
    Ok(PermissionLevel::new(update.account, update.parent))
  }
}

fn deleteauth_minimum(
  delete: &DeleteAuth,
  declared: &PermissionLevel,
) -> Result<PermissionLevel, Error> {
  let required = PermissionLevel::new(delete.account, delete.permission);
  if declared.actor != delete.account {
    return Err(Error::IrrelevantAuthority {
      declared: *declared,
      required,
    });
  }
  Ok(required)
}

fn linkauth_minimum(
  db: &Database,
  account: Name,
  code: Name,
  message_type: Name,
  declared: &PermissionLevel,
) -> Result<Option<PermissionLevel>, Error> {
  if declared.actor != account {
    return Err(Error::IrrelevantAuthority {
      declared: *declared,
      required: PermissionLevel::new(account, ACTIVE_PERMISSION),
    });
  }
  // whoever may currently perform the action may change its link
  Ok(
    lookup_minimum_permission(db, account, code, message_type)
      .map(|name| PermissionLevel::new(account, name)),
  )
}

fn canceldelay_minimum(
  cancel: &CancelDelay,
  declared: &PermissionLevel,
) -> Result<PermissionLevel, Error> {
  if *declared != cancel.canceling_auth {
    return Err(Error::IrrelevantAuthority {
      declared: *declared,
      required: cancel.canceling_auth,
    });
  }
  Ok(cancel.canceling_auth)
}

/// Checks the declared authorizations of `actions` against the signing
/// keys and the transaction delay.
///
/// Every declared authorization must exist, must satisfy the minimum
/// permission of its action and must be satisfied by the keys. Keys
/// that were not needed by any authorization are rejected.
pub fn check_authorization<'a>(
  db: &Database,
  max_authority_depth: u16,
  actions: impl IntoIterator<Item = &'a Action>,
  provided_keys: &BTreeSet<PublicKey>,
  provided_delay_sec: u32,
) -> Result<(), Error> {
  let mut to_satisfy = BTreeSet::new();

  for action in actions {
    for declared in &action.authorization {
      let declared_permission = get_permission(db, declared)?;
      if let Some(required) = required_permission(db, action, declared)? {
        let required_permission = get_permission(db, &required)?;
        if !permission_satisfies(db, declared_permission, required_permission)
        {
          return Err(Error::IrrelevantAuthority {
            declared: *declared,
            required,
          });
        }
      }
      to_satisfy.insert(*declared);
    }
  }

  let mut checker = AuthorityChecker::new(
    db,
    provided_keys,
    provided_delay_sec,
    max_authority_depth,
  );
  for level in &to_satisfy {
    if !checker.satisfied(level) {
      return Err(Error::UnsatisfiedAuthorization(*level));
    }
  }

  if let Some(unused) = checker.unused_keys().next() {
    return Err(Error::IrrelevantSignature(*unused));
  }
  Ok(())
}

/// True if `code::message_type` is an action whose minimum permission
/// can not be changed with links.
pub fn is_unlinkable(code: Name, message_type: Name) -> bool {
  code == SYSTEM_ACCOUNT
    && [
      UpdateAuth::NAME,
      DeleteAuth::NAME,
      LinkAuth::NAME,
      UnlinkAuth::NAME,
      CancelDelay::NAME,
    ]
    .contains(&message_type)
}
