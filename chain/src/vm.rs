use crate::{apply::ApplyContext, error::Error};

/// Runs contract code deployed with `setcode`.
///
/// System actions never reach the vm, they are handled natively.
pub trait Vm: Send + Sync {
  /// Called by `setcode` before code is stored.
  fn validate(&self, code: &[u8]) -> Result<(), Error>;

  /// Executes the code of `ctx.receiver()` for `ctx.action()`.
  fn apply(&self, code: &[u8], ctx: &mut ApplyContext<'_, '_>)
    -> Result<(), Error>;
}

const WASM_MAGIC: &[u8] = b"\0asm";
const WASM_VERSION: &[u8] = &[1, 0, 0, 0];

/// Accepts well formed WebAssembly modules and has no execution engine.
///
/// Nodes that only validate and bill system actions use it. Actions
/// addressed to deployed code fail with an execution error.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmValidator;

impl Vm for WasmValidator {
  fn validate(&self, code: &[u8]) -> Result<(), Error> {
    if code.len() < 8 || &code[..4] != WASM_MAGIC {
      return Err(Error::InvalidCode("not a wasm module".into()));
    }
    if &code[4..8] != WASM_VERSION {
      return Err(Error::InvalidCode("unsupported wasm version".into()));
    }
    Ok(())
  }

  fn apply(
    &self,
    _code: &[u8],
    ctx: &mut ApplyContext<'_, '_>,
  ) -> Result<(), Error> {
    Err(Error::ContractExecution(format!(
      "no execution engine for contract {}",
      ctx.receiver()
    )))
  }
}
