mod apply;
mod authorization;
mod checker;
mod config;
mod contract;
mod controller;
mod error;
mod fees;
mod objects;
mod resources;
mod store;
mod trace;
mod transaction;
mod vm;

pub use {
  apply::ApplyContext,
  authorization::{
    check_authorization,
    find_permission,
    lookup_minimum_permission,
    permission_satisfies,
  },
  checker::AuthorityChecker,
  config::{ChainConfig, ConfigKey, ListConfig},
  controller::{Chain, GenesisAccount, GenesisState, PendingBlock},
  error::{DeadlineKind, Error, ErrorKind, LimitCause},
  fees::{ActionFee, FeeLimits, VOTEAGE_RATIO_PRECISION},
  objects::{
    AccountObject,
    ActionFeeObject,
    BillableSize,
    GeneratedTransaction,
    PermissionLinkObject,
    PermissionObject,
    ProducerInfo,
    ResourceLimitsObject,
    VoteInfo,
  },
  resources::UsageAccumulator,
  store::{Database, Undoable},
  trace::{ActionTrace, TransactionTrace},
  transaction::{TransactionContext, TransactionKind},
  vm::{Vm, WasmValidator},
};
