//! # Wallet Bridge Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── fixtures.rs      # Fake popup wallet and relay server
//! │   ├── scw_flows.rs     # Selector -> SCW signer over the popup
//! │   ├── relay_flows.rs   # Selector -> relay signer, paired through the popup
//! │   └── filter_flows.rs  # Filter polyfill polling a growing chain
//! └── benches/
//!     └── crypto_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p wb-tests
//! cargo test -p wb-tests integration::relay_flows
//! cargo bench -p wb-tests
//! ```

pub mod integration;
