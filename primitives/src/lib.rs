mod action;
mod asset;
mod authority;
mod key;
mod name;
mod transaction;

pub mod system;

pub use {
  action::{Action, CodecError},
  asset::{Asset, AssetError, ASSET_PRECISION, ASSET_SYMBOL},
  authority::{
    Authority,
    KeyWeight,
    PermissionLevel,
    PermissionLevelWeight,
    WaitWeight,
    Weight,
  },
  key::PublicKey,
  name::{Name, NameError, MAX_NAME_LENGTH},
  system::SystemAction,
  transaction::{SignedTransaction, Transaction, TransactionId},
};

// re-exported so downstream crates sign with the same
// version of the crypto library.
pub use ed25519_dalek::{Keypair, Signature};
