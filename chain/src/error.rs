use {
  ledger_primitives::{
    Asset,
    CodecError,
    Name,
    PermissionLevel,
    PublicKey,
    TransactionId,
  },
  thiserror::Error,
};

/// Coarse classification of failures, used by block producers to decide
/// whether a rejected transaction may be retried later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  Validation,
  Authorization,
  ResourceExceeded,
  DeadlineExceeded,
  NotFound,
  AlreadyExists,
  Fatal,
}

/// The limit that was binding when a resource check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitCause {
  /// Remaining capacity of the block being produced.
  Block,

  /// Limits of the transaction itself, its declared maximums, the chain
  /// wide per-transaction limits or the limits bought with fees.
  Transaction,

  /// Billed accounts on the subjective resource greylist.
  Greylist,

  /// Limits derived from the stake of billed accounts.
  Account,
}

/// Which timer fired when a transaction ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadlineKind {
  /// The wall clock deadline supplied by the caller.
  Deadline,

  /// Remaining cpu of the block being produced.
  BlockCpu,

  /// Cpu limit of the transaction or its billed accounts.
  TransactionCpu,

  /// Cpu limit of greylisted billed accounts.
  GreylistCpu,

  /// The leeway granted on top of the objective limit ran out.
  Leeway,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0}")]
  Validation(String),

  #[error("invalid action arguments: {0}")]
  InvalidArguments(String),

  #[error("account {0} does not exist")]
  AccountNotFound(Name),

  #[error("account name {0} is already taken")]
  AccountExists(Name),

  #[error("permission {0:?} does not exist")]
  PermissionNotFound(PermissionLevel),

  #[error("no permission link of {account} for {code}::{message_type}")]
  LinkNotFound {
    account: Name,
    code: Name,
    message_type: Name,
  },

  #[error("permission link is already set to {0}")]
  NoOpRequirement(Name),

  #[error(
    "permission {permission:?} is the minimum permission of \
     {code}::{message_type}, unlink it first"
  )]
  LinkedAuthorityInUse {
    permission: PermissionLevel,
    code: Name,
    message_type: Name,
  },

  #[error("unsupported operation: {0}")]
  UnsupportedOperation(&'static str),

  #[error("key {0} is blacklisted")]
  KeyNotAllowed(PublicKey),

  #[error("account {0} is not allowed: {1}")]
  AccountNotAllowed(Name, &'static str),

  #[error("missing authority of {0}")]
  MissingAuth(Name),

  #[error("declared authorization {0:?} is not satisfied by provided keys")]
  UnsatisfiedAuthorization(PermissionLevel),

  #[error("declared authorization {declared:?} does not satisfy {required:?}")]
  IrrelevantAuthority {
    declared: PermissionLevel,
    required: PermissionLevel,
  },

  #[error("transaction was signed by unneeded key {0}")]
  IrrelevantSignature(PublicKey),

  #[error("invalid signature: {0}")]
  Signature(String),

  #[error("{account} has {available}, cannot pay {required}")]
  InsufficientBalance {
    account: Name,
    available: Asset,
    required: Asset,
  },

  #[error(
    "{actor} has {available} vote age with {producer}, cannot spend \
     {required}"
  )]
  InsufficientVoteAge {
    actor: Name,
    producer: Name,
    available: i128,
    required: i128,
  },

  #[error("producer {0} is not registered")]
  ProducerNotFound(Name),

  #[error("{voter} has no vote for {producer}")]
  VoteNotFound { voter: Name, producer: Name },

  #[error("no fee is configured for {account}::{action}")]
  MissingFee { account: Name, action: Name },

  #[error("required fee {required} exceeds the declared maximum {maximum}")]
  FeeExceedsMaximum { required: Asset, maximum: Asset },

  #[error("net usage of {usage} bytes exceeds the {cause:?} limit of {limit}")]
  NetUsageExceeded {
    usage: u64,
    limit: u64,
    cause: LimitCause,
  },

  #[error("billed cpu of {billed_us}us exceeds the {cause:?} limit of {limit_us}us")]
  CpuUsageExceeded {
    billed_us: u64,
    limit_us: u64,
    cause: LimitCause,
  },

  #[error("billed cpu of {billed_us}us is below the minimum of {minimum_us}us")]
  CpuBelowMinimum { billed_us: u64, minimum_us: u64 },

  #[error("{account} needs {usage} bytes of ram, quota is {quota} bytes")]
  RamUsageExceeded {
    account: Name,
    usage: i64,
    quota: i64,
  },

  #[error("transaction ran out of time ({0:?})")]
  DeadlineExceeded(DeadlineKind),

  #[error("vm type and version must both be zero")]
  InvalidVm,

  #[error("contract is already running this version of code")]
  SetExactCode,

  #[error("code rejected by the vm: {0}")]
  InvalidCode(String),

  #[error("contract execution failed: {0}")]
  ContractExecution(String),

  #[error("no deferred transaction with sender id {0:#x}")]
  DeferredNotFound(u128),

  #[error("duplicate transaction {0}")]
  DuplicateTransaction(TransactionId),

  #[error("transaction expired at {expiration}, block time is {now}")]
  TransactionExpired { expiration: u32, now: u32 },

  #[error("inline actions nested deeper than {0}")]
  InlineDepthExceeded(u16),

  #[error("no block is being produced")]
  NoPendingBlock,

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error("ledger invariant violated: {0}")]
  Invariant(String),

  #[error("{account}::{name}: {source}")]
  Action {
    account: Name,
    name: Name,
    source: Box<Error>,
  },
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::Validation(_)
      | Error::InvalidArguments(_)
      | Error::NoOpRequirement(_)
      | Error::LinkedAuthorityInUse { .. }
      | Error::UnsupportedOperation(_)
      | Error::InvalidVm
      | Error::SetExactCode
      | Error::InvalidCode(_)
      | Error::ContractExecution(_)
      | Error::TransactionExpired { .. }
      | Error::InlineDepthExceeded(_)
      | Error::NoPendingBlock
      | Error::MissingFee { .. }
      | Error::FeeExceedsMaximum { .. }
      | Error::InsufficientBalance { .. }
      | Error::InsufficientVoteAge { .. }
      | Error::Codec(_) => ErrorKind::Validation,

      Error::KeyNotAllowed(_)
      | Error::AccountNotAllowed(..)
      | Error::MissingAuth(_)
      | Error::UnsatisfiedAuthorization(_)
      | Error::IrrelevantAuthority { .. }
      | Error::IrrelevantSignature(_)
      | Error::Signature(_) => ErrorKind::Authorization,

      Error::NetUsageExceeded { .. }
      | Error::CpuUsageExceeded { .. }
      | Error::CpuBelowMinimum { .. }
      | Error::RamUsageExceeded { .. } => ErrorKind::ResourceExceeded,

      Error::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,

      Error::AccountNotFound(_)
      | Error::PermissionNotFound(_)
      | Error::LinkNotFound { .. }
      | Error::ProducerNotFound(_)
      | Error::VoteNotFound { .. }
      | Error::DeferredNotFound(_) => ErrorKind::NotFound,

      Error::AccountExists(_) | Error::DuplicateTransaction(_) => {
        ErrorKind::AlreadyExists
      }

      Error::Invariant(_) => ErrorKind::Fatal,

      Error::Action { source, .. } => source.kind(),
    }
  }

  /// True when the failure was caused by subjective or block-local
  /// conditions, so the same transaction may succeed in a later block.
  pub fn is_retryable(&self) -> bool {
    match self {
      Error::DeadlineExceeded(kind) => matches!(
        kind,
        DeadlineKind::BlockCpu
          | DeadlineKind::Deadline
          | DeadlineKind::GreylistCpu
      ),
      Error::NetUsageExceeded { cause, .. }
      | Error::CpuUsageExceeded { cause, .. } => {
        matches!(cause, LimitCause::Block | LimitCause::Greylist)
      }
      Error::Action { source, .. } => source.is_retryable(),
      _ => false,
    }
  }

  /// Ledger corruption, the node must stop.
  pub fn is_fatal(&self) -> bool {
    self.kind() == ErrorKind::Fatal
  }

  /// Attaches the failing action to the error.
  pub(crate) fn in_action(self, account: Name, name: Name) -> Self {
    match self {
      e @ Error::Action { .. } => e,
      e => Error::Action {
        account,
        name,
        source: Box::new(e),
      },
    }
  }

  /// The innermost error, skipping action context wrappers.
  pub fn root(&self) -> &Error {
    match self {
      Error::Action { source, .. } => source.root(),
      e => e,
    }
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{DeadlineKind, Error, ErrorKind, LimitCause},
    ledger_primitives::Name,
  };

  #[test]
  fn action_context_preserves_classification() {
    let inner = Error::CpuUsageExceeded {
      billed_us: 500,
      limit_us: 400,
      cause: LimitCause::Block,
    };
    let wrapped =
      inner.in_action(Name::constant("token"), Name::constant("transfer"));

    assert_eq!(wrapped.kind(), ErrorKind::ResourceExceeded);
    assert!(wrapped.is_retryable());
    assert!(matches!(wrapped.root(), Error::CpuUsageExceeded { .. }));
    assert!(wrapped.to_string().starts_with("token::transfer: "));
  }

  #[test]
  fn only_subjective_failures_are_retryable() {
    assert!(Error::DeadlineExceeded(DeadlineKind::BlockCpu).is_retryable());
    assert!(!Error::DeadlineExceeded(DeadlineKind::TransactionCpu)
      .is_retryable());
    assert!(!Error::MissingAuth(Name::constant("alice")).is_retryable());
    assert!(Error::Invariant("negative ram".into()).is_fatal());
  }
}
