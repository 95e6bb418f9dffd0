//! Pincraft Core
//!
//! Shared models, status machines, and capability traits used by every
//! pincraft crate. No I/O lives here; the traits are implemented by the
//! ledger, ipfs, and hunter crates and mocked in tests.

pub mod config;
pub mod contract;
pub mod events;
pub mod hunter;
pub mod records;
pub mod traits;

pub use config::{DaemonConfig, DaemonMode, HunterConfig};
pub use contract::{ContractErrorCode, PinnerData, SlotInfo};
pub use events::{ContractEvent, PinEvent, PinnedEvent, UnpinEvent};
pub use records::{
    ActionResult, ActivityRecord, ClaimOutcome, ClaimResult, DaemonConfigRecord, EarningsSummary,
    FilterResult, OfferRecord, OfferStatus, PinRecord, PinResult, RejectReason,
};

/// Smallest unit of the ledger's native asset per whole token.
pub const STROOPS_PER_XLM: i64 = 10_000_000;

/// Format a stroop amount as a human-readable XLM string.
///
/// Integer arithmetic only; this string is display-only and never feeds
/// back into any decision.
pub fn format_xlm(stroops: i64) -> String {
    let whole = stroops / STROOPS_PER_XLM;
    let frac = (stroops % STROOPS_PER_XLM).abs();
    format!("{}.{:07} XLM", whole, frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_xlm() {
        assert_eq!(format_xlm(10_000_000), "1.0000000 XLM");
        assert_eq!(format_xlm(1_000_000), "0.1000000 XLM");
        assert_eq!(format_xlm(0), "0.0000000 XLM");
        assert_eq!(format_xlm(123_456_789), "12.3456789 XLM");
    }
}
