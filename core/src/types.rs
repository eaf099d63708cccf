//! Shared primitive types used across the park.

/// Area in acres. The park's capacity budget is a single scalar of this unit.
pub type Acres = f64;

/// Money. Real-valued; never rounded by the ledger.
pub type Money = f64;

/// A stable attraction identifier: the attraction's reachable base URL.
pub type AttractionId = String;

/// One reconciliation tick counter.
pub type Tick = u64;
