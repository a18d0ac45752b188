use {
  common::{action, active, name, owner, tokens, TestChain},
  ledger_chain::{
    find_permission,
    BillableSize,
    Error,
    ErrorKind,
    PermissionLinkObject,
    PermissionObject,
  },
  ledger_primitives::{
    system::{
      DeleteAuth,
      LinkAuth,
      UnlinkAuth,
      UpdateAuth,
      ACTIVE_PERMISSION,
      CODE_PERMISSION,
      OWNER_PERMISSION,
    },
    Action,
    Authority,
    KeyWeight,
    Name,
    PermissionLevel,
    PermissionLevelWeight,
    WaitWeight,
  },
};

mod common;

fn updateauth(
  account: &str,
  permission: &str,
  parent: &str,
  auth: Authority,
) -> UpdateAuth {
  UpdateAuth {
    account: name(account),
    permission: name(permission),
    parent: if parent.is_empty() {
      Name::default()
    } else {
      name(parent)
    },
    auth,
  }
}

fn custom_action(
  account: &str,
  action_name: &str,
  actor: &str,
  permission: &str,
) -> Action {
  Action {
    account: name(account),
    name: name(action_name),
    authorization: vec![PermissionLevel::new(name(actor), name(permission))],
    data: vec![],
  }
}

fn chain() -> anyhow::Result<TestChain> {
  let mut t = TestChain::builder()
    .account("alice", tokens(100))
    .account("bob", tokens(100))
    .account("carol", tokens(100))
    .build()?;
  t.start_block()?;
  Ok(t)
}

#[test]
fn created_permissions_keep_their_authority() -> anyhow::Result<()> {
  let mut t = chain()?;

  let mut keys: Vec<_> = (0..3)
    .map(|_| KeyWeight {
      key: common::keypair().public.into(),
      weight: 1,
    })
    .collect();
  keys.sort_by_key(|k| k.key);

  let authorities = [
    ("multisig", Authority {
      threshold: 2,
      keys: keys.clone(),
      accounts: vec![],
      waits: vec![],
    }),
    ("delegated", Authority {
      threshold: 3,
      keys: vec![],
      accounts: vec![
        PermissionLevelWeight {
          permission: PermissionLevel::new(name("bob"), ACTIVE_PERMISSION),
          weight: 2,
        },
        PermissionLevelWeight {
          permission: PermissionLevel::new(name("carol"), ACTIVE_PERMISSION),
          weight: 1,
        },
      ],
      waits: vec![],
    }),
    ("recovery", Authority {
      threshold: 2,
      keys: keys[..1].to_vec(),
      accounts: vec![],
      waits: vec![WaitWeight {
        wait_sec: 3600,
        weight: 1,
      }],
    }),
  ];

  for (permission, auth) in authorities {
    t.push(vec![action(
      updateauth("alice", permission, "active", auth.clone()),
      active("alice"),
    )])?;

    let stored = find_permission(
      t.chain.db(),
      &PermissionLevel::new(name("alice"), name(permission)),
    )
    .expect("created permission");
    assert_eq!(stored.auth, auth);
    assert_eq!(stored.owner, name("alice"));

    let parent = find_permission(
      t.chain.db(),
      &PermissionLevel::new(name("alice"), ACTIVE_PERMISSION),
    )
    .expect("active permission");
    assert_eq!(stored.parent, parent.id);
  }
  Ok(())
}

#[test]
fn updateauth_bills_authority_size_difference() -> anyhow::Result<()> {
  let mut t = chain()?;
  let key = t.key_of("alice");

  let before = t.ram_usage("alice");
  let trace = t.push(vec![action(
    updateauth("alice", "custom", "active", Authority::from_key(key)),
    active("alice"),
  )])?;
  let created = PermissionObject::billable_size()
    + Authority::from_key(key).billable_size();
  assert_eq!(t.ram_usage("alice"), before + created);
  assert_eq!(
    trace.ram_deltas.values().sum::<i64>(),
    created as i64
  );

  let wider = Authority {
    threshold: 1,
    keys: vec![KeyWeight { key, weight: 1 }],
    accounts: vec![PermissionLevelWeight {
      permission: PermissionLevel::new(name("bob"), ACTIVE_PERMISSION),
      weight: 1,
    }],
    waits: vec![],
  };
  t.push(vec![action(
    updateauth("alice", "custom", "active", wider.clone()),
    active("alice"),
  )])?;
  assert_eq!(
    t.ram_usage("alice"),
    before + PermissionObject::billable_size() + wider.billable_size()
  );
  Ok(())
}

#[test]
fn owner_and_active_can_never_be_deleted() -> anyhow::Result<()> {
  let mut t = chain()?;

  // links do not change the outcome
  let key = t.key_of("bob");
  t.push(vec![action(
    updateauth("bob", "custom", "active", Authority::from_key(key)),
    active("bob"),
  )])?;
  t.push(vec![action(
    LinkAuth {
      account: name("bob"),
      code: name("carol"),
      message_type: name("hello"),
      requirement: name("custom"),
    },
    active("bob"),
  )])?;

  for account in ["alice", "bob", "carol"] {
    for permission in [OWNER_PERMISSION, ACTIVE_PERMISSION] {
      let err = t
        .push(vec![action(
          DeleteAuth {
            account: name(account),
            permission,
          },
          owner(account),
        )])
        .unwrap_err();
      assert!(matches!(err.root(), Error::InvalidArguments(_)));
      assert!(find_permission(
        t.chain.db(),
        &PermissionLevel::new(name(account), permission)
      )
      .is_some());
    }
  }
  Ok(())
}

#[test]
fn deleteauth_refunds_ram_and_respects_links() -> anyhow::Result<()> {
  let mut t = chain()?;
  let key = t.key_of("alice");
  let before = t.ram_usage("alice");

  t.push(vec![action(
    updateauth("alice", "custom", "active", Authority::from_key(key)),
    active("alice"),
  )])?;
  t.push(vec![action(
    LinkAuth {
      account: name("alice"),
      code: name("bob"),
      message_type: name("hello"),
      requirement: name("custom"),
    },
    active("alice"),
  )])?;

  let delete = || {
    action(
      DeleteAuth {
        account: name("alice"),
        permission: name("custom"),
      },
      active("alice"),
    )
  };

  let err = t.push(vec![delete()]).unwrap_err();
  assert!(matches!(err.root(), Error::LinkedAuthorityInUse { .. }));

  t.push(vec![action(
    UnlinkAuth {
      account: name("alice"),
      code: name("bob"),
      message_type: name("hello"),
    },
    active("alice"),
  )])?;
  t.push(vec![delete()])?;

  assert_eq!(t.ram_usage("alice"), before);
  assert!(find_permission(
    t.chain.db(),
    &PermissionLevel::new(name("alice"), name("custom"))
  )
  .is_none());
  Ok(())
}

#[test]
fn deleteauth_rejects_permissions_with_children() -> anyhow::Result<()> {
  let mut t = chain()?;
  let key = t.key_of("alice");

  t.push(vec![action(
    updateauth("alice", "parent", "active", Authority::from_key(key)),
    active("alice"),
  )])?;
  t.push(vec![action(
    updateauth("alice", "child", "parent", Authority::from_key(key)),
    active("alice"),
  )])?;

  let err = t
    .push(vec![action(
      DeleteAuth {
        account: name("alice"),
        permission: name("parent"),
      },
      active("alice"),
    )])
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  Ok(())
}

#[test]
fn linking_twice_is_a_noop_and_unlinking_nothing_fails() -> anyhow::Result<()> {
  let mut t = chain()?;
  let key = t.key_of("alice");
  t.push(vec![action(
    updateauth("alice", "custom", "active", Authority::from_key(key)),
    active("alice"),
  )])?;

  let link = || {
    action(
      LinkAuth {
        account: name("alice"),
        code: name("bob"),
        message_type: name("hello"),
        requirement: name("custom"),
      },
      active("alice"),
    )
  };

  let before = t.ram_usage("alice");
  t.push(vec![link()])?;
  assert_eq!(
    t.ram_usage("alice"),
    before + PermissionLinkObject::billable_size()
  );

  let err = t.push(vec![link()]).unwrap_err();
  assert!(matches!(err.root(), Error::NoOpRequirement(r) if *r == name("custom")));

  let err = t
    .push(vec![action(
      UnlinkAuth {
        account: name("alice"),
        code: name("carol"),
        message_type: name("hello"),
      },
      active("alice"),
    )])
    .unwrap_err();
  assert!(matches!(err.root(), Error::LinkNotFound { .. }));
  Ok(())
}

#[test]
fn system_permission_actions_can_not_be_linked() -> anyhow::Result<()> {
  let mut t = chain()?;
  let key = t.key_of("alice");
  t.push(vec![action(
    updateauth("alice", "custom", "active", Authority::from_key(key)),
    active("alice"),
  )])?;

  let err = t
    .push(vec![action(
      LinkAuth {
        account: name("alice"),
        code: name("sys"),
        message_type: name("updateauth"),
        requirement: name("custom"),
      },
      active("alice"),
    )])
    .unwrap_err();
  assert!(matches!(err.root(), Error::InvalidArguments(_)));
  Ok(())
}

#[test]
fn linked_permission_authorizes_the_action() -> anyhow::Result<()> {
  let mut t = chain()?;

  // "custom" is controlled by carol's key only
  let carol = t.key_of("carol");
  t.push(vec![action(
    updateauth("alice", "custom", "active", Authority::from_key(carol)),
    active("alice"),
  )])?;

  // bob has no code, so the action itself is a no-op. Without a link
  // its minimum permission is active and custom is not enough.
  t.push(vec![action(
    ledger_primitives::system::SetFee {
      account: name("bob"),
      action: name("hello"),
      fee: tokens(1),
      cpu_limit: 0,
      net_limit: 0,
      ram_limit: 0,
    },
    active("bob"),
  )])?;

  let trx = t.transaction(
    vec![custom_action("bob", "hello", "alice", "custom")],
    tokens(1),
  );
  let signed = trx.sign(&[t.keys.get(&name("carol")).expect("carol key")]);
  let err = t.chain.push_transaction(&signed, None, None).unwrap_err();
  assert!(matches!(err, Error::IrrelevantAuthority { .. }));

  t.push(vec![action(
    LinkAuth {
      account: name("alice"),
      code: name("bob"),
      message_type: name("hello"),
      requirement: name("custom"),
    },
    active("alice"),
  )])?;

  let trx = t.transaction(
    vec![custom_action("bob", "hello", "alice", "custom")],
    tokens(1),
  );
  let signed = trx.sign(&[t.keys.get(&name("carol")).expect("carol key")]);
  t.chain.push_transaction(&signed, None, None)?;
  Ok(())
}

#[test]
fn active_parent_must_stay_owner() -> anyhow::Result<()> {
  let mut t = chain()?;
  let key = t.key_of("alice");
  t.push(vec![action(
    updateauth("alice", "custom", "active", Authority::from_key(key)),
    active("alice"),
  )])?;

  let valid = Authority::from_key(key);
  let invalid = Authority {
    threshold: 0,
    keys: vec![],
    accounts: vec![],
    waits: vec![],
  };

  for auth in [valid, invalid] {
    for parent in ["custom", ""] {
      let err = t
        .push(vec![action(
          updateauth("alice", "active", parent, auth.clone()),
          owner("alice"),
        )])
        .unwrap_err();
      assert_eq!(err.kind(), ErrorKind::Validation);
      assert!(matches!(err.root(), Error::InvalidArguments(_)));
    }
  }
  Ok(())
}

#[test]
fn updateauth_rejects_reserved_and_self_parented_names() -> anyhow::Result<()> {
  let mut t = chain()?;
  let key = t.key_of("alice");
  t.push(vec![action(
    updateauth("alice", "custom", "active", Authority::from_key(key)),
    active("alice"),
  )])?;

  for (permission, parent) in [("sys.custom", "active"), ("custom", "custom")] {
    let err = t
      .push(vec![action(
        updateauth("alice", permission, parent, Authority::from_key(key)),
        owner("alice"),
      )])
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
  }
  Ok(())
}

#[test]
fn updateauth_rejects_unknown_accounts_in_authority() -> anyhow::Result<()> {
  let mut t = chain()?;

  let auth = Authority::from_permission(PermissionLevel::new(
    name("nobody"),
    ACTIVE_PERMISSION,
  ));
  let err = t
    .push(vec![action(
      updateauth("alice", "custom", "active", auth),
      active("alice"),
    )])
    .unwrap_err();
  assert!(matches!(
    err.root(),
    Error::PermissionNotFound(_) | Error::AccountNotFound(_)
  ));
  Ok(())
}

#[test]
fn authorities_may_reference_the_code_permission() -> anyhow::Result<()> {
  let mut t = chain()?;

  // sys.code is never stored, yet every account has it
  let trade = Authority::from_permission(PermissionLevel::new(
    name("bob"),
    CODE_PERMISSION,
  ));
  t.push(vec![action(
    updateauth("alice", "trade", "active", trade.clone()),
    active("alice"),
  )])?;

  let stored = find_permission(
    t.chain.db(),
    &PermissionLevel::new(name("alice"), name("trade")),
  )
  .expect("trade permission");
  assert_eq!(stored.auth, trade);

  // the account itself must still exist
  let err = t
    .push(vec![action(
      updateauth(
        "alice",
        "other",
        "active",
        Authority::from_permission(PermissionLevel::new(
          name("nobody"),
          CODE_PERMISSION,
        )),
      ),
      active("alice"),
    )])
    .unwrap_err();
  assert!(matches!(err.root(), Error::AccountNotFound(n) if *n == name("nobody")));
  Ok(())
}
