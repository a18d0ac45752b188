use {
  crate::block::Block,
  anyhow::bail,
  ledger_chain::{Chain, Error, TransactionTrace},
  std::time::{Duration, Instant},
  tracing::{debug, info, warn},
};

/// Outcome counts of one applied block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
  pub block_num: u32,
  pub applied: usize,
  pub failed: usize,
  pub scheduled: usize,
}

/// Applies blocks to a chain one after another.
pub struct Replayer {
  chain: Chain,
  deadline: Duration,
  producing: bool,
  strict: bool,
  traces: Vec<TransactionTrace>,
}

impl Replayer {
  pub fn new(chain: Chain, deadline: Duration) -> Self {
    Self {
      chain,
      deadline,
      producing: false,
      strict: false,
      traces: vec![],
    }
  }

  /// Enforce the node lists, as if this node produced the blocks.
  pub fn producing(mut self, producing: bool) -> Self {
    self.producing = producing;
    self
  }

  /// Reject the whole block when one of its transactions fails.
  pub fn strict(mut self, strict: bool) -> Self {
    self.strict = strict;
    self
  }

  pub fn chain(&self) -> &Chain {
    &self.chain
  }

  pub fn traces(&self) -> &[TransactionTrace] {
    &self.traces
  }

  /// Applies the transactions of `block`, then every deferred
  /// transaction that is due, and makes the block irreversible.
  ///
  /// A failed transaction is skipped unless the replay is strict. Fatal
  /// ledger errors always abort the block.
  pub fn apply_block(&mut self, block: &Block) -> anyhow::Result<BlockSummary> {
    let pending = *self.chain.start_block(
      block.timestamp_ms,
      block.producer,
      self.producing,
    )?;
    let mut summary = BlockSummary {
      block_num: pending.block_num,
      ..Default::default()
    };

    for trx in &block.transactions {
      let deadline = Instant::now() + self.deadline;
      match self.chain.push_transaction(trx, Some(deadline), None) {
        Ok(trace) => {
          debug!("{} applied, {}us cpu", trace.id, trace.cpu_usage_us);
          summary.applied += 1;
          self.traces.push(trace);
        }
        Err(e) => self.skip(trx.id().to_string(), e, &mut summary)?,
      }
    }

    for (sender, sender_id) in self.chain.scheduled_transactions_due()? {
      let deadline = Instant::now() + self.deadline;
      match self
        .chain
        .push_scheduled_transaction(sender, sender_id, Some(deadline))
      {
        Ok(trace) => {
          debug!("deferred {} of {sender} applied", trace.id);
          summary.scheduled += 1;
          self.traces.push(trace);
        }
        Err(e) => {
          let what = format!("deferred {sender_id:#x} of {sender}");
          self.skip(what, e, &mut summary)?;
        }
      }
    }

    self.chain.finalize_block()?;
    info!(
      "block {}: {} applied, {} deferred, {} failed",
      summary.block_num, summary.applied, summary.scheduled, summary.failed
    );
    Ok(summary)
  }

  fn skip(
    &mut self,
    what: String,
    error: Error,
    summary: &mut BlockSummary,
  ) -> anyhow::Result<()> {
    if error.is_fatal() || self.strict {
      self.chain.abort_block();
      bail!("block {} rejected, {what}: {error}", summary.block_num);
    }
    warn!("{what} failed: {error}");
    summary.failed += 1;
    Ok(())
  }
}
