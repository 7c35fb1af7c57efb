//! Protocol constants. All monetary values are fixed-point with 8 decimals.

use crate::amount::Fixed;

/// Number of decimal places carried by [`Fixed`] values.
pub const DECIMALS: u32 = 8;

/// Units per whole coin (10^DECIMALS).
pub const COIN: u64 = 100_000_000;

/// Transaction format version produced by the builder.
pub const TX_VERSION: u32 = 1;

/// Length in bytes of the transaction id prefix taken from the transaction hash.
pub const TXID_PREFIX_LEN: usize = 8;

/// Remainders at or below this amount produce no change output.
///
/// Scaled-integer arithmetic is exact, so only a strictly positive remainder
/// needs a change output.
pub const CHANGE_EPSILON: Fixed = Fixed::ZERO;

/// Group id used in status paths for submitters without group membership.
pub const RETAIL_GROUP: &str = "retail";

/// Values below `10^-6` render in exponent form on the wire.
pub const EXPONENT_FORM_BELOW_UNITS: u64 = COIN / 1_000_000;
