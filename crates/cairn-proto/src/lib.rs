//! Wire-protocol layer: XML element trees, typed request models and
//! streamed XML response building for the `DeltaV`-derived repository
//! access protocol.

pub mod dav;
