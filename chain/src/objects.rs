//! Rows of the ledger tables and the number of bytes of RAM each of them
//! is billed for.

use {
  crate::resources::UsageAccumulator,
  ledger_primitives::{
    Asset,
    Authority,
    Name,
    PermissionLevel,
    Transaction,
    TransactionId,
    ASSET_PRECISION,
  },
};

pub type PermissionId = u64;

/// Fixed overhead billed for every index a row is part of.
pub const OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES: u64 = 32;

/// Billed to every new account on top of its objects.
pub const OVERHEAD_PER_ACCOUNT_RAM_BYTES: u64 = 2 * 1024;

/// Deployed code is billed this many times its size.
pub const SETCODE_RAM_BYTES_MULTIPLIER: u64 = 10;

const BILLABLE_ALIGNMENT: u64 = 16;

/// Objects stored in the ledger that are billed a fixed size.
pub trait BillableSize {
  /// Size of the object's fixed fields plus its index overhead.
  const BASE_SIZE: u64;

  /// Base size rounded up to the allocation alignment.
  fn billable_size() -> u64 {
    ((Self::BASE_SIZE + BILLABLE_ALIGNMENT - 1) / BILLABLE_ALIGNMENT)
      * BILLABLE_ALIGNMENT
  }
}

#[derive(Debug, Clone, Default)]
pub struct AccountObject {
  pub name: Name,
  pub creation_date: u32,
  pub privileged: bool,
  pub vm_type: u8,
  pub vm_version: u8,
  pub code: Vec<u8>,
  /// Hash of the deployed code, all zeros when there is none.
  pub code_version: [u8; 32],
  pub last_code_update: u32,
  pub abi: Vec<u8>,
}

impl BillableSize for AccountObject {
  const BASE_SIZE: u64 = OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES * 2 + 8 + 4;
}

#[derive(Debug, Clone, Default)]
pub struct AccountSequenceObject {
  pub name: Name,
  pub recv_sequence: u64,
  pub auth_sequence: u64,
  pub code_sequence: u64,
  pub abi_sequence: u64,
}

impl BillableSize for AccountSequenceObject {
  const BASE_SIZE: u64 = OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES * 2 + 8 * 5;
}

/// A node in an account's permission tree.
#[derive(Debug, Clone)]
pub struct PermissionObject {
  pub id: PermissionId,
  /// Zero for owner permissions.
  pub parent: PermissionId,
  pub owner: Name,
  pub name: Name,
  pub last_updated: u32,
  pub last_used: u32,
  pub auth: Authority,
}

impl PermissionObject {
  pub fn level(&self) -> PermissionLevel {
    PermissionLevel::new(self.owner, self.name)
  }

  /// Bytes billed for this permission including its authority entries.
  pub fn total_billable_size(&self) -> u64 {
    Self::billable_size() + self.auth.billable_size()
  }
}

impl BillableSize for PermissionObject {
  // id, parent, owner, name, last_updated, last_used, threshold
  const BASE_SIZE: u64 = OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES * 5 + 8 * 7;
}

#[derive(Debug, Clone)]
pub struct PermissionLinkObject {
  pub account: Name,
  pub code: Name,
  pub message_type: Name,
  pub required_permission: Name,
}

impl BillableSize for PermissionLinkObject {
  const BASE_SIZE: u64 = OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES * 3 + 8 * 5;
}

/// Fee configured for one action of one contract, and the resources the
/// fee buys when non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFeeObject {
  pub account: Name,
  pub action: Name,
  pub fee: Asset,
  pub cpu_limit: u32,
  pub net_limit: u32,
  pub ram_limit: u32,
}

impl ActionFeeObject {
  pub fn has_explicit_limits(&self) -> bool {
    self.cpu_limit != 0 || self.net_limit != 0 || self.ram_limit != 0
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountBalance {
  pub name: Name,
  pub available: Asset,
}

/// A block producer registered to receive fees and votes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerInfo {
  pub name: Name,
  pub rewards_pool: Asset,
  /// Whole tokens staked by all voters of this producer.
  pub total_staked: i64,
  pub total_voteage: i128,
  pub voteage_update_height: u32,
}

impl ProducerInfo {
  /// Total vote age accumulated up to `height`, without writing it back.
  pub fn voteage_at(&self, height: u32) -> i128 {
    let blocks = height.saturating_sub(self.voteage_update_height);
    self.total_voteage + i128::from(self.total_staked) * i128::from(blocks)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteInfo {
  pub voter: Name,
  pub producer: Name,
  pub staked: Asset,
  pub voteage: i128,
  pub voteage_update_height: u32,
}

impl VoteInfo {
  /// Stake in whole tokens, the unit vote age accrues in.
  pub fn staked_tokens(&self) -> i64 {
    self.staked.units() / ASSET_PRECISION
  }

  /// Vote age accumulated up to `height`, without writing it back.
  pub fn voteage_at(&self, height: u32) -> i128 {
    let blocks = height.saturating_sub(self.voteage_update_height);
    self.voteage + i128::from(self.staked_tokens()) * i128::from(blocks)
  }
}

/// One row of the on-chain configuration registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigObject {
  pub typ: Name,
  pub num: i64,
  pub key: Name,
  pub fee: Asset,
}

/// A transaction waiting in the ledger to be executed later.
#[derive(Debug, Clone)]
pub struct GeneratedTransaction {
  pub sender: Name,
  pub sender_id: u128,
  pub payer: Name,
  pub trx_id: TransactionId,
  pub published: u32,
  pub delay_until: u32,
  pub expiration: u32,
  pub trx: Transaction,
  pub packed_size: u64,
}

impl GeneratedTransaction {
  pub fn total_billable_size(&self) -> u64 {
    Self::billable_size() + self.packed_size
  }
}

impl BillableSize for GeneratedTransaction {
  // id, trx_id, expiration, delay, sender_id
  const BASE_SIZE: u64 = OVERHEAD_PER_ROW_PER_INDEX_RAM_BYTES * 5 + 96;
}

/// Resource allotment of an account, negative values mean unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimitsObject {
  pub ram_bytes: i64,
  pub net_weight: i64,
  pub cpu_weight: i64,
}

impl Default for ResourceLimitsObject {
  fn default() -> Self {
    Self {
      ram_bytes: -1,
      net_weight: -1,
      cpu_weight: -1,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceUsageObject {
  pub net_usage: UsageAccumulator,
  pub cpu_usage: UsageAccumulator,
  pub ram_usage: u64,
}

/// Chain wide resource accounting.
#[derive(Debug, Clone, Default)]
pub struct ResourceState {
  pub average_block_net_usage: UsageAccumulator,
  pub average_block_cpu_usage: UsageAccumulator,
  pub pending_net_usage: u64,
  pub pending_cpu_usage: u64,
  pub total_net_weight: u64,
  pub total_cpu_weight: u64,
  pub total_ram_bytes: u64,
  /// Elastic capacities, they grow while blocks are mostly empty and
  /// shrink back to the block limits under congestion.
  pub virtual_net_limit: u64,
  pub virtual_cpu_limit: u64,
}

#[cfg(test)]
mod tests {
  use {
    super::{
      BillableSize,
      PermissionLinkObject,
      PermissionObject,
      ProducerInfo,
      VoteInfo,
    },
    ledger_primitives::{Asset, Name},
  };

  #[test]
  fn billable_sizes_are_aligned() {
    assert_eq!(PermissionObject::billable_size() % 16, 0);
    assert!(PermissionObject::billable_size() >= PermissionObject::BASE_SIZE);
    assert_eq!(PermissionLinkObject::billable_size(), 144);
  }

  #[test]
  fn voteage_accrues_per_block() {
    let vote = VoteInfo {
      voter: Name::constant("alice"),
      producer: Name::constant("bp1"),
      staked: Asset::from_units(25_0000),
      voteage: 10,
      voteage_update_height: 100,
    };
    assert_eq!(vote.voteage_at(100), 10);
    assert_eq!(vote.voteage_at(104), 10 + 25 * 4);
    // heights before the last update never reduce the age
    assert_eq!(vote.voteage_at(50), 10);

    let producer = ProducerInfo {
      total_staked: 25,
      total_voteage: 10,
      voteage_update_height: 100,
      ..Default::default()
    };
    assert_eq!(producer.voteage_at(104), vote.voteage_at(104));
  }
}
