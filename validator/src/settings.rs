use {
  clap::Parser,
  humantime::Duration,
  std::path::{Path, PathBuf},
};

/// Ledger Replay Node
///
/// Boots the ledger from a genesis file and applies blocks of signed
/// transactions to it, logging the outcome of every transaction.
#[derive(Debug, Parser)]
pub struct NodeSettings {
  /// Genesis state, chain parameters and node lists (MessagePack)
  #[clap(long, short,
    value_name = "FILE")]
  genesis: PathBuf,

  /// Blocks of signed transactions to apply (MessagePack)
  #[clap(long, short,
    value_name = "FILE")]
  blocks: PathBuf,

  /// Write the traces of applied transactions to this file
  #[clap(long, short,
    value_name = "FILE")]
  traces: Option<PathBuf>,

  /// Wall clock time a single transaction may run for
  #[clap(long, short,
    value_name = "DURATION",
    default_value = "150ms")]
  deadline: Duration,

  /// Apply blocks as their producer, enforcing the node lists
  #[clap(long)]
  producing: bool,

  /// Stop at the first failed transaction instead of skipping it
  #[clap(long)]
  strict: bool,

  /// Collect prometheus metrics and log them once all blocks are applied
  #[clap(long)]
  metrics: bool,
}

impl NodeSettings {
  pub fn genesis(&self) -> &Path {
    &self.genesis
  }

  pub fn blocks(&self) -> &Path {
    &self.blocks
  }

  pub fn traces(&self) -> Option<&Path> {
    self.traces.as_deref()
  }

  pub fn deadline(&self) -> std::time::Duration {
    self.deadline.into()
  }

  pub fn producing(&self) -> bool {
    self.producing
  }

  pub fn strict(&self) -> bool {
    self.strict
  }

  pub fn metrics(&self) -> bool {
    self.metrics
  }
}
