use {
  ledger_chain::{ChainConfig, GenesisState, ListConfig},
  ledger_primitives::{Name, SignedTransaction},
  serde::{de::DeserializeOwned, Deserialize, Serialize},
  std::path::Path,
};

/// A block produced elsewhere, applied in order of its transactions.
#[derive(Clone, Serialize, Deserialize)]
pub struct Block {
  pub timestamp_ms: u64,
  pub producer: Name,
  pub transactions: Vec<SignedTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisFile {
  pub state: GenesisState,

  #[serde(default)]
  pub config: ChainConfig,

  #[serde(default)]
  pub lists: ListConfig,
}

/// Reads a MessagePack encoded file.
pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let bytes = std::fs::read(path)?;
  Ok(rmp_serde::from_slice(&bytes)?)
}

/// Writes `value` MessagePack encoded, with field names.
pub fn store<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
  std::fs::write(path, rmp_serde::to_vec_named(value)?)?;
  Ok(())
}
