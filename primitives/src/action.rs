use {
  crate::{Name, PermissionLevel},
  serde::{de::DeserializeOwned, Deserialize, Serialize},
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum CodecError {
  #[error("payload encoding failed: {0}")]
  Encode(#[from] rmp_serde::encode::Error),

  #[error("payload decoding failed: {0}")]
  Decode(#[from] rmp_serde::decode::Error),
}

/// A call of `name` on the contract deployed at `account`, carrying the
/// permission levels that authorize it and the binary payload.
///
/// Payloads are encoded with msgpack in struct-as-array form, so the
/// order of fields in a payload type is part of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
  pub account: Name,
  pub name: Name,
  pub authorization: Vec<PermissionLevel>,
  pub data: Vec<u8>,
}

impl Action {
  pub fn new<T: Serialize>(
    account: Name,
    name: Name,
    authorization: Vec<PermissionLevel>,
    payload: &T,
  ) -> Result<Self, CodecError> {
    Ok(Self {
      account,
      name,
      authorization,
      data: rmp_serde::to_vec(payload)?,
    })
  }

  pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(&self.data)?)
  }

  /// Accounts named in the authorization list, in declaration order.
  pub fn authorizers(&self) -> impl Iterator<Item = Name> + '_ {
    self.authorization.iter().map(|level| level.actor)
  }
}
