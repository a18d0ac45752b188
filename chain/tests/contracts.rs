use {
  common::{action, active, name, tokens, TestChain},
  ledger_chain::{ApplyContext, ChainConfig, Error, Vm, WasmValidator},
  ledger_primitives::{
    system::{SetCode, SetFee, UpdateAuth, CODE_PERMISSION},
    Action,
    Authority,
    PermissionLevel,
    Transaction,
  },
  std::{
    sync::Arc,
    time::{Duration, Instant},
  },
};

mod common;

const CODE: &[u8] = b"\0asm\x01\0\0\0scripted";

/// Interprets the action name as a behavior instead of running code.
struct ScriptedVm;

impl Vm for ScriptedVm {
  fn validate(&self, code: &[u8]) -> Result<(), Error> {
    WasmValidator.validate(code)
  }

  fn apply(
    &self,
    _code: &[u8],
    ctx: &mut ApplyContext<'_, '_>,
  ) -> Result<(), Error> {
    let receiver = ctx.receiver();
    match ctx.action().name.to_string().as_str() {
      "noop" => Ok(()),
      "forward" => {
        let again = Action {
          authorization: active(&receiver.to_string()),
          ..ctx.action().clone()
        };
        ctx.execute_inline(again)
      }
      "schedule" => {
        let trx = Transaction {
          fee: tokens(1),
          actions: vec![Action {
            account: receiver,
            name: name("noop"),
            authorization: active(&receiver.to_string()),
            data: vec![],
          }],
          ..Default::default()
        };
        ctx.schedule_deferred(1, receiver, trx, 0, false)
      }
      "spin" => loop {
        ctx.checktime()?;
      },
      "limit" => ctx.set_transaction_limits(100_000, 8),
      "delegate" => ctx.execute_inline(Action {
        account: receiver,
        name: name("noop"),
        authorization: vec![PermissionLevel::new(name("alice"), name("trade"))],
        data: vec![],
      }),
      other => Err(Error::ContractExecution(format!("unknown action {other}"))),
    }
  }
}

fn call(message: &str) -> Action {
  Action {
    account: name("dapp"),
    name: name(message),
    authorization: active("alice"),
    data: vec![],
  }
}

/// `dapp` runs the scripted vm and charges one token for each of its
/// actions.
fn chain() -> anyhow::Result<TestChain> {
  let mut t = TestChain::builder()
    .config(ChainConfig {
      cpu_us_per_fee_token: 100_000,
      ..Default::default()
    })
    .vm(Arc::new(ScriptedVm))
    .producer("bp1")
    .account("alice", tokens(100))
    .account("dapp", tokens(100))
    .build()?;
  t.start_block()?;

  let mut actions = vec![action(
    SetCode {
      account: name("dapp"),
      vmtype: 0,
      vmversion: 0,
      code: CODE.to_vec(),
    },
    active("dapp"),
  )];
  for message in [
    "noop", "forward", "schedule", "spin", "limit", "delegate",
  ] {
    actions.push(action(
      SetFee {
        account: name("dapp"),
        action: name(message),
        fee: tokens(1),
        cpu_limit: 0,
        net_limit: 0,
        ram_limit: 0,
      },
      active("dapp"),
    ));
  }
  t.push(actions)?;
  Ok(t)
}

#[test]
fn contract_actions_run_in_the_vm() -> anyhow::Result<()> {
  let mut t = chain()?;
  let trace = t.push(vec![call("noop")])?;
  assert_eq!(trace.action_traces.len(), 2);
  assert_eq!(trace.action_traces[1].receiver, name("dapp"));

  let err = t.push(vec![call("other")]).unwrap_err();
  assert!(matches!(err, Error::MissingFee { .. }));
  Ok(())
}

#[test]
fn inline_actions_are_bounded_in_depth() -> anyhow::Result<()> {
  let mut t = chain()?;
  let balance = t.balance("alice");

  let err = t.push(vec![call("forward")]).unwrap_err();
  assert!(matches!(err.root(), Error::InlineDepthExceeded(4)));
  assert_eq!(t.balance("alice"), balance);
  Ok(())
}

#[test]
fn inline_actions_need_the_receivers_authority() -> anyhow::Result<()> {
  struct Impersonate;
  impl Vm for Impersonate {
    fn validate(&self, _code: &[u8]) -> Result<(), Error> {
      Ok(())
    }

    fn apply(
      &self,
      _code: &[u8],
      ctx: &mut ApplyContext<'_, '_>,
    ) -> Result<(), Error> {
      ctx.execute_inline(Action {
        account: name("alice"),
        name: name("noop"),
        authorization: active("alice"),
        data: vec![],
      })
    }
  }

  let mut t = TestChain::builder()
    .vm(Arc::new(Impersonate))
    .producer("bp1")
    .account("alice", tokens(100))
    .account("dapp", tokens(100))
    .build()?;
  t.start_block()?;
  t.push(vec![
    action(
      SetCode {
        account: name("dapp"),
        vmtype: 0,
        vmversion: 0,
        code: CODE.to_vec(),
      },
      active("dapp"),
    ),
    action(
      SetFee {
        account: name("dapp"),
        action: name("noop"),
        fee: tokens(1),
        cpu_limit: 0,
        net_limit: 0,
        ram_limit: 0,
      },
      active("dapp"),
    ),
  ])?;

  let err = t.push(vec![call("noop")]).unwrap_err();
  assert!(matches!(err.root(), Error::MissingAuth(actor) if *actor == name("alice")));
  Ok(())
}

#[test]
fn inline_actions_use_permissions_delegated_to_code() -> anyhow::Result<()> {
  let mut t = chain()?;

  let err = t.push(vec![call("delegate")]).unwrap_err();
  assert!(matches!(err.root(), Error::MissingAuth(actor) if *actor == name("alice")));

  t.push(vec![action(
    UpdateAuth {
      account: name("alice"),
      permission: name("trade"),
      parent: name("active"),
      auth: Authority::from_permission(PermissionLevel::new(
        name("dapp"),
        CODE_PERMISSION,
      )),
    },
    active("alice"),
  )])?;

  let trace = t.push(vec![call("delegate")])?;
  let inline = trace.action_traces.last().expect("inline trace");
  assert_eq!(inline.depth, 1);
  assert_eq!(inline.act.name, name("noop"));
  assert_eq!(
    inline.act.authorization,
    vec![PermissionLevel::new(name("alice"), name("trade"))]
  );
  Ok(())
}

#[test]
fn contract_scheduled_transaction_runs_and_refunds_ram() -> anyhow::Result<()> {
  let mut t = chain()?;
  let ram_before = t.ram_usage("dapp");

  t.push(vec![call("schedule")])?;
  assert!(t.ram_usage("dapp") > ram_before);

  let due = t.chain.scheduled_transactions_due()?;
  assert_eq!(due, vec![(name("dapp"), 1)]);

  let trace = t.chain.push_scheduled_transaction(name("dapp"), 1, None)?;
  assert!(trace.scheduled);
  assert_eq!(trace.fee_payer, Some(name("dapp")));
  assert_eq!(t.ram_usage("dapp"), ram_before);
  assert!(t.chain.scheduled_transactions_due()?.is_empty());

  let err = t
    .chain
    .push_scheduled_transaction(name("dapp"), 1, None)
    .unwrap_err();
  assert!(matches!(err, Error::DeferredNotFound(1)));
  Ok(())
}

#[test]
fn runaway_contract_hits_the_deadline() -> anyhow::Result<()> {
  let mut t = chain()?;
  let trx = t.transaction(vec![call("spin")], tokens(1));
  let signed = t.sign(trx);

  let deadline = Instant::now() + Duration::from_millis(20);
  let err = t
    .chain
    .push_transaction(&signed, Some(deadline), None)
    .unwrap_err();
  assert!(matches!(err.root(), Error::DeadlineExceeded(_)));
  assert_eq!(t.chain.db().session_depth(), 1);
  Ok(())
}

#[test]
fn only_privileged_contracts_set_limits() -> anyhow::Result<()> {
  let mut t = chain()?;

  let err = t.push(vec![call("limit")]).unwrap_err();
  assert!(matches!(err.root(), Error::MissingAuth(_)));

  t.chain.set_privileged(name("dapp"), true)?;
  let err = t.push(vec![call("limit")]).unwrap_err();
  assert!(matches!(err, Error::NetUsageExceeded { limit: 8, .. }));
  Ok(())
}
