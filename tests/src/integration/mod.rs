//! Cross-crate flows.
//!
//! Each module drives the public API of several crates against the
//! in-memory popup window, relay server and chain.

#[cfg(test)]
mod fixtures;

mod filter_flows;
mod relay_flows;
mod scw_flows;
