//! Accounts, permission names and payloads of the built-in system
//! contract deployed at [`SYSTEM_ACCOUNT`].

use {
  crate::{
    Action,
    Asset,
    Authority,
    CodecError,
    Name,
    PermissionLevel,
    TransactionId,
  },
  serde::{de::DeserializeOwned, Deserialize, Serialize},
};

pub const SYSTEM_ACCOUNT: Name = Name::constant("sys");
pub const PRODUCERS_ACCOUNT: Name = Name::constant("sys.prods");
pub const CONFIG_ACCOUNT: Name = Name::constant("sys.config");
pub const FEE_ADMIN_ACCOUNT: Name = Name::constant("sys.feeadmin");

pub const OWNER_PERMISSION: Name = Name::constant("owner");
pub const ACTIVE_PERMISSION: Name = Name::constant("active");

/// Virtual permission granted to contract code acting on behalf of its
/// own account. It is never stored.
pub const CODE_PERMISSION: Name = Name::constant("sys.code");

/// Link requirement that is satisfied by any permission of the account.
pub const ANY_PERMISSION: Name = Name::constant("sys.any");

/// Prefix reserved for names owned by the system.
pub const RESERVED_PREFIX: &str = "sys.";

/// Implemented by every system action payload.
pub trait SystemPayload: Serialize + DeserializeOwned + Sized {
  const NAME: Name;

  /// Wraps the payload in an action addressed to the system account.
  fn into_action(
    &self,
    authorization: Vec<PermissionLevel>,
  ) -> Result<Action, CodecError> {
    Action::new(SYSTEM_ACCOUNT, Self::NAME, authorization, self)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
  pub creator: Name,
  pub name: Name,
  pub owner: Authority,
  pub active: Authority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCode {
  pub account: Name,
  pub vmtype: u8,
  pub vmversion: u8,
  pub code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAbi {
  pub account: Name,
  pub abi: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAuth {
  pub account: Name,
  pub permission: Name,
  pub parent: Name,
  pub auth: Authority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAuth {
  pub account: Name,
  pub permission: Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAuth {
  pub account: Name,
  pub code: Name,
  pub message_type: Name,
  pub requirement: Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkAuth {
  pub account: Name,
  pub code: Name,
  pub message_type: Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelDelay {
  pub canceling_auth: PermissionLevel,
  pub trx_id: TransactionId,
}

/// Writes one row of the on-chain configuration registry.
///
/// `typ` selects the configuration key, `num` is its value. `key` and
/// `fee` are carried for keys that are parameterized by an account or
/// an amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetConfig {
  pub typ: Name,
  pub num: i64,
  pub key: Name,
  pub fee: Asset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetFee {
  pub account: Name,
  pub action: Name,
  pub fee: Asset,
  pub cpu_limit: u32,
  pub net_limit: u32,
  pub ram_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnFee {
  pub actor: Name,
  pub fee: Asset,
  pub bpname: Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAgeFee {
  pub actor: Name,
  pub bpname: Name,
  pub fee: Asset,
}

macro_rules! system_payload {
  ($($payload:ident => $name:literal),* $(,)?) => {
    $(
      impl SystemPayload for $payload {
        const NAME: Name = Name::constant($name);
      }
    )*

    /// The closed set of actions handled natively by the system account.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SystemAction {
      $($payload($payload),)*
    }

    impl SystemAction {
      /// Decodes the payload of an action addressed to the system
      /// account. Returns `None` for actions that are not system
      /// actions.
      pub fn decode(action: &Action) -> Result<Option<Self>, CodecError> {
        if action.account != SYSTEM_ACCOUNT {
          return Ok(None);
        }
        $(
          if action.name == $payload::NAME {
            return Ok(Some(SystemAction::$payload(action.data_as()?)));
          }
        )*
        Ok(None)
      }

      pub fn name(&self) -> Name {
        match self {
          $(SystemAction::$payload(_) => $payload::NAME,)*
        }
      }

      /// True if `name` is one of the system action names.
      pub fn is_system_action(name: Name) -> bool {
        $(name == $payload::NAME ||)* false
      }
    }
  };
}

system_payload! {
  NewAccount => "newaccount",
  SetCode => "setcode",
  SetAbi => "setabi",
  UpdateAuth => "updateauth",
  DeleteAuth => "deleteauth",
  LinkAuth => "linkauth",
  UnlinkAuth => "unlinkauth",
  CancelDelay => "canceldelay",
  SetConfig => "setconfig",
  SetFee => "setfee",
  OnFee => "onfee",
  VoteAgeFee => "voteagefee",
}
