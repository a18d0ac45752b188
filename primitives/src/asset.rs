use {
  serde::{Deserialize, Serialize},
  std::{
    fmt::{Debug, Display},
    ops::{Add, Sub},
    str::FromStr,
  },
  thiserror::Error,
};

/// Number of decimal places of the core token.
pub const ASSET_DECIMALS: u32 = 4;

/// Units in one whole token, `1.0000`.
pub const ASSET_PRECISION: i64 = 10i64.pow(ASSET_DECIMALS);

pub const ASSET_SYMBOL: &str = "SYS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
  #[error("malformed asset amount '{0}'")]
  Malformed(String),

  #[error("asset amount '{0}' must use {ASSET_DECIMALS} decimal places")]
  Precision(String),

  #[error("unexpected asset symbol '{0}'")]
  Symbol(String),
}

/// An amount of the core token, stored as a signed number of
/// 1/10000 units so `0.5000` is represented as `5000`.
#[derive(
  Copy,
  Clone,
  Default,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
pub struct Asset(i64);

impl Asset {
  pub const fn from_units(units: i64) -> Self {
    Self(units)
  }

  pub const fn zero() -> Self {
    Self(0)
  }

  pub const fn units(&self) -> i64 {
    self.0
  }

  pub const fn is_zero(&self) -> bool {
    self.0 == 0
  }

  pub fn checked_add(self, other: Asset) -> Option<Asset> {
    self.0.checked_add(other.0).map(Asset)
  }

  pub fn checked_sub(self, other: Asset) -> Option<Asset> {
    self.0.checked_sub(other.0).map(Asset)
  }
}

impl Add for Asset {
  type Output = Asset;

  fn add(self, rhs: Asset) -> Asset {
    Asset(self.0 + rhs.0)
  }
}

impl Sub for Asset {
  type Output = Asset;

  fn sub(self, rhs: Asset) -> Asset {
    Asset(self.0 - rhs.0)
  }
}

impl Display for Asset {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let sign = if self.0 < 0 { "-" } else { "" };
    let abs = self.0.unsigned_abs();
    let precision = ASSET_PRECISION as u64;
    write!(
      f,
      "{sign}{}.{:04} {ASSET_SYMBOL}",
      abs / precision,
      abs % precision
    )
  }
}

impl Debug for Asset {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "asset({self})")
  }
}

/// Parses `"1.5000"` or `"1.5000 SYS"`.
impl FromStr for Asset {
  type Err = AssetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.trim().split_whitespace();
    let amount = parts.next().ok_or_else(|| AssetError::Malformed(s.into()))?;
    if let Some(symbol) = parts.next() {
      if symbol != ASSET_SYMBOL {
        return Err(AssetError::Symbol(symbol.into()));
      }
    }
    if parts.next().is_some() {
      return Err(AssetError::Malformed(s.into()));
    }

    let (negative, amount) = match amount.strip_prefix('-') {
      Some(rest) => (true, rest),
      None => (false, amount),
    };
    let (whole, fraction) = amount
      .split_once('.')
      .ok_or_else(|| AssetError::Precision(s.into()))?;
    if fraction.len() != ASSET_DECIMALS as usize {
      return Err(AssetError::Precision(s.into()));
    }
    let whole: i64 = whole.parse().map_err(|_| AssetError::Malformed(s.into()))?;
    let fraction: i64 =
      fraction.parse().map_err(|_| AssetError::Malformed(s.into()))?;
    let units = whole
      .checked_mul(ASSET_PRECISION)
      .and_then(|w| w.checked_add(fraction))
      .ok_or_else(|| AssetError::Malformed(s.into()))?;
    Ok(Asset(if negative { -units } else { units }))
  }
}
