//! Fixed-precision decimal amounts.
//!
//! EOSIO assets carry an exact number of decimal places per symbol, so balances are kept as an
//! integer count of the smallest unit together with that precision instead of a float.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Largest precision accepted when parsing.
pub const MAX_PRECISION: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
	#[error("Empty amount")]
	Empty,

	#[error("Invalid amount digits: {0}")]
	InvalidDigits(String),

	#[error("Precision {0} exceeds the supported maximum")]
	PrecisionTooLarge(usize),

	#[error("Amount overflows the supported range")]
	Overflow,

	#[error("Invalid asset string: {0}")]
	InvalidAsset(String),

	#[error("Invalid symbol: {0}")]
	InvalidSymbol(String),
}

/// A signed decimal amount stored as `units / 10^precision`.
#[derive(Debug, Clone, Copy)]
pub struct Amount {
	units: i128,
	precision: u8,
}

impl Amount {
	pub fn new(units: i128, precision: u8) -> Self {
		Self { units, precision }
	}

	pub fn zero() -> Self {
		Self::new(0, 0)
	}

	pub fn units(&self) -> i128 {
		self.units
	}

	pub fn precision(&self) -> u8 {
		self.precision
	}

	pub fn is_zero(&self) -> bool {
		self.units == 0
	}

	pub fn is_negative(&self) -> bool {
		self.units < 0
	}

	/// Re-express the amount with `precision` decimal places.
	///
	/// Narrowing only succeeds when no significant digits are dropped.
	pub fn with_precision(&self, precision: u8) -> Option<Amount> {
		if precision >= self.precision {
			let factor = 10i128.checked_pow(u32::from(precision - self.precision))?;
			Some(Amount::new(self.units.checked_mul(factor)?, precision))
		} else {
			let factor = 10i128.checked_pow(u32::from(self.precision - precision))?;
			if self.units % factor != 0 {
				return None;
			}
			Some(Amount::new(self.units / factor, precision))
		}
	}

	fn aligned(&self, other: &Amount) -> Option<(i128, i128, u8)> {
		let precision = self.precision.max(other.precision);
		let lhs = self.with_precision(precision)?;
		let rhs = other.with_precision(precision)?;
		Some((lhs.units, rhs.units, precision))
	}

	pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
		let (lhs, rhs, precision) = self.aligned(other)?;
		Some(Amount::new(lhs.checked_add(rhs)?, precision))
	}

	pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
		let (lhs, rhs, precision) = self.aligned(other)?;
		Some(Amount::new(lhs.checked_sub(rhs)?, precision))
	}
}

impl Default for Amount {
	fn default() -> Self {
		Self::zero()
	}
}

impl PartialEq for Amount {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for Amount {}

impl PartialOrd for Amount {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Amount {
	fn cmp(&self, other: &Self) -> Ordering {
		match self.aligned(other) {
			Some((lhs, rhs, _)) => lhs.cmp(&rhs),
			// Only reachable for values near the i128 limits.
			None => {
				let lhs = self.units as f64 / 10f64.powi(i32::from(self.precision));
				let rhs = other.units as f64 / 10f64.powi(i32::from(other.precision));
				lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal)
			}
		}
	}
}

impl FromStr for Amount {
	type Err = AmountParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(AmountParseError::Empty);
		}

		let (negative, digits) = match s.strip_prefix('-') {
			Some(rest) => (true, rest),
			None => (false, s.strip_prefix('+').unwrap_or(s)),
		};

		let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
		if int_part.is_empty() && frac_part.is_empty() {
			return Err(AmountParseError::InvalidDigits(s.to_string()));
		}
		if !int_part.chars().all(|c| c.is_ascii_digit())
			|| !frac_part.chars().all(|c| c.is_ascii_digit())
		{
			return Err(AmountParseError::InvalidDigits(s.to_string()));
		}
		if frac_part.len() > usize::from(MAX_PRECISION) {
			return Err(AmountParseError::PrecisionTooLarge(frac_part.len()));
		}

		let precision = frac_part.len() as u8;
		let mut units: i128 = 0;
		for c in int_part.chars().chain(frac_part.chars()) {
			let digit = i128::from(c as u8 - b'0');
			units = units
				.checked_mul(10)
				.and_then(|u| u.checked_add(digit))
				.ok_or(AmountParseError::Overflow)?;
		}

		Ok(Amount::new(if negative { -units } else { units }, precision))
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let abs = self.units.unsigned_abs();
		let sign = if self.units < 0 { "-" } else { "" };
		if self.precision == 0 {
			return write!(f, "{}{}", sign, abs);
		}
		let divisor = 10u128.pow(u32::from(self.precision));
		write!(
			f,
			"{}{}.{:0width$}",
			sign,
			abs / divisor,
			abs % divisor,
			width = usize::from(self.precision)
		)
	}
}

impl Serialize for Amount {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Amount {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// An EOSIO asset: an amount paired with its symbol, written as `"1.0000 EOS"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
	pub amount: Amount,
	pub symbol: String,
}

impl Asset {
	pub fn new(amount: Amount, symbol: impl Into<String>) -> Self {
		Self {
			amount,
			symbol: symbol.into(),
		}
	}
}

fn is_valid_symbol(symbol: &str) -> bool {
	(1..=7).contains(&symbol.len()) && symbol.chars().all(|c| c.is_ascii_uppercase())
}

impl FromStr for Asset {
	type Err = AmountParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (amount, symbol) = s
			.trim()
			.split_once(' ')
			.ok_or_else(|| AmountParseError::InvalidAsset(s.to_string()))?;
		let symbol = symbol.trim();
		if !is_valid_symbol(symbol) {
			return Err(AmountParseError::InvalidSymbol(symbol.to_string()));
		}
		Ok(Asset::new(amount.parse()?, symbol))
	}
}

impl fmt::Display for Asset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.amount, self.symbol)
	}
}
