#![allow(dead_code)]

use {
  ed25519_dalek::Keypair,
  ledger_chain::{
    Chain,
    ChainConfig,
    Error,
    GenesisAccount,
    GenesisState,
    ListConfig,
    TransactionTrace,
    Vm,
    WasmValidator,
  },
  ledger_primitives::{
    system::{SystemPayload, ACTIVE_PERMISSION, OWNER_PERMISSION},
    Action,
    Asset,
    Name,
    PermissionLevel,
    PublicKey,
    SignedTransaction,
    Transaction,
  },
  std::{collections::BTreeMap, sync::Arc},
};

pub const GENESIS_TIME_MS: u64 = 1_600_000_000_000;
pub const BLOCK_INTERVAL_MS: u64 = 500;

pub fn keypair() -> Keypair {
  Keypair::generate(&mut rand::thread_rng())
}

pub fn name(s: &str) -> Name {
  s.parse().expect("valid account name in test")
}

pub fn tokens(whole: i64) -> Asset {
  Asset::from_units(whole * 10_000)
}

pub fn active(actor: &str) -> Vec<PermissionLevel> {
  vec![PermissionLevel::new(name(actor), ACTIVE_PERMISSION)]
}

pub fn owner(actor: &str) -> Vec<PermissionLevel> {
  vec![PermissionLevel::new(name(actor), OWNER_PERMISSION)]
}

pub fn action<P: SystemPayload>(
  payload: P,
  authorization: Vec<PermissionLevel>,
) -> Action {
  payload
    .into_action(authorization)
    .expect("system payloads are encodable")
}

#[derive(Default)]
pub struct TestChainBuilder {
  accounts: Vec<(Name, Asset)>,
  producers: Vec<Name>,
  config: ChainConfig,
  vm: Option<Arc<dyn Vm>>,
}

impl TestChainBuilder {
  pub fn account(mut self, account: &str, balance: Asset) -> Self {
    self.accounts.push((name(account), balance));
    self
  }

  /// Registers a producer, the first one produces all blocks.
  pub fn producer(mut self, producer: &str) -> Self {
    self.accounts.push((name(producer), Asset::zero()));
    self.producers.push(name(producer));
    self
  }

  pub fn config(mut self, config: ChainConfig) -> Self {
    self.config = config;
    self
  }

  pub fn vm(mut self, vm: Arc<dyn Vm>) -> Self {
    self.vm = Some(vm);
    self
  }

  pub fn build(self) -> anyhow::Result<TestChain> {
    let system = keypair();
    let mut keys = BTreeMap::new();
    let mut accounts = vec![];
    for (account, balance) in self.accounts {
      let kp = keypair();
      accounts.push(GenesisAccount {
        name: account,
        key: kp.public.into(),
        balance,
      });
      keys.insert(account, kp);
    }

    let genesis = GenesisState {
      initial_timestamp_ms: GENESIS_TIME_MS,
      initial_key: system.public.into(),
      accounts,
      producers: self.producers.clone(),
    };

    let chain = Chain::new(
      self.config,
      ListConfig::default(),
      &genesis,
      self.vm.unwrap_or_else(|| Arc::new(WasmValidator)),
    )?;

    Ok(TestChain {
      chain,
      system,
      keys,
      producer: self.producers.first().copied().unwrap_or_default(),
      time_ms: GENESIS_TIME_MS,
      nonce: 0,
    })
  }
}

/// A chain with known keys for every account.
///
/// Native accounts sign with the genesis key, every other account with
/// its own key which controls both its owner and active permissions.
pub struct TestChain {
  pub chain: Chain,
  pub system: Keypair,
  pub keys: BTreeMap<Name, Keypair>,
  pub producer: Name,
  time_ms: u64,
  nonce: u32,
}

impl TestChain {
  pub fn builder() -> TestChainBuilder {
    TestChainBuilder::default()
  }

  pub fn key_of(&self, account: &str) -> PublicKey {
    self.keypair_of(name(account)).public.into()
  }

  fn keypair_of(&self, account: Name) -> &Keypair {
    self.keys.get(&account).unwrap_or(&self.system)
  }

  pub fn start_block(&mut self) -> anyhow::Result<()> {
    self.time_ms += BLOCK_INTERVAL_MS;
    self.chain.start_block(self.time_ms, self.producer, true)?;
    Ok(())
  }

  pub fn finish_block(&mut self) -> anyhow::Result<u32> {
    Ok(self.chain.finalize_block()?)
  }

  /// Produces `count` empty blocks.
  pub fn produce_blocks(&mut self, count: u32) -> anyhow::Result<()> {
    for _ in 0..count {
      self.start_block()?;
      self.finish_block()?;
    }
    Ok(())
  }

  pub fn pending_time_secs(&self) -> u32 {
    (self.time_ms / 1000) as u32
  }

  /// Every transaction built expires a second later than the previous
  /// one so that equal actions still make distinct transactions.
  pub fn transaction(&mut self, actions: Vec<Action>, fee: Asset) -> Transaction {
    self.nonce += 1;
    Transaction {
      expiration: self.pending_time_secs() + 60 + self.nonce % 3000,
      fee,
      actions,
      ..Default::default()
    }
  }

  /// Signs with the keys of every distinct actor of the transaction.
  pub fn sign(&self, trx: Transaction) -> SignedTransaction {
    let mut signers: Vec<Name> = trx
      .actions
      .iter()
      .flat_map(|act| act.authorizers())
      .collect();
    signers.sort();
    signers.dedup();

    let mut keypairs: Vec<&Keypair> =
      signers.iter().map(|s| self.keypair_of(*s)).collect();
    keypairs.sort_by_key(|kp| kp.public.to_bytes());
    keypairs.dedup_by_key(|kp| kp.public.to_bytes());
    trx.sign(&keypairs)
  }

  /// Pushes the actions with exactly the required fee.
  pub fn push(
    &mut self,
    actions: Vec<Action>,
  ) -> Result<TransactionTrace, Error> {
    let trx = self.transaction(actions, Asset::zero());
    let fee = self.chain.required_fee(&trx)?;
    self.push_trx(Transaction { fee, ..trx })
  }

  pub fn push_trx(&mut self, trx: Transaction) -> Result<TransactionTrace, Error> {
    let signed = self.sign(trx);
    self.chain.push_transaction(&signed, None, None)
  }

  pub fn balance(&self, account: &str) -> Asset {
    self.chain.balance(name(account)).unwrap_or_default()
  }

  pub fn ram_usage(&self, account: &str) -> u64 {
    self.chain.ram_usage(name(account))
  }
}
