use {
  crate::{
    block::{Block, GenesisFile},
    replay::Replayer,
    settings::NodeSettings,
  },
  clap::Parser,
  ledger_chain::{Chain, WasmValidator},
  metrics_exporter_prometheus::PrometheusBuilder,
  std::sync::Arc,
  tracing::{info, subscriber::set_global_default},
  tracing_subscriber::{EnvFilter, FmtSubscriber},
};

mod block;
mod replay;
mod settings;

fn main() -> anyhow::Result<()> {
  // configure logging
  set_global_default(
    FmtSubscriber::builder()
      .with_env_filter(EnvFilter::from_default_env())
      .finish(),
  )?;

  // gather CLI parameters
  let settings = NodeSettings::parse();
  info!("startup settings: {settings:#?}");

  let metrics = if settings.metrics() {
    Some(PrometheusBuilder::new().install_recorder()?)
  } else {
    None
  };

  let genesis: GenesisFile = block::load(settings.genesis())?;
  let chain = Chain::new(
    genesis.config,
    genesis.lists,
    &genesis.state,
    Arc::new(WasmValidator),
  )?;

  let blocks: Vec<Block> = block::load(settings.blocks())?;
  info!("replaying {} blocks", blocks.len());

  let mut replayer = Replayer::new(chain, settings.deadline())
    .producing(settings.producing())
    .strict(settings.strict());

  let (mut applied, mut failed) = (0, 0);
  for block in &blocks {
    let summary = replayer.apply_block(block)?;
    applied += summary.applied + summary.scheduled;
    failed += summary.failed;
  }

  info!(
    "head block {}, {applied} transactions applied, {failed} failed",
    replayer.chain().head_block_num()
  );

  if let Some(path) = settings.traces() {
    block::store(path, &replayer.traces())?;
    info!("traces written to {}", path.display());
  }

  if let Some(handle) = metrics {
    info!("metrics:\n{}", handle.render());
  }

  Ok(())
}
