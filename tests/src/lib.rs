//! # Twin Enforcement Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/          # Enforcer flows across crates
//!     ├── enforcer_flows.rs # Mailbox loop, delivery, isolation, pools
//!     └── policy_flows.rs   # Policy strategy behind a caching provider
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p twin-tests
//! cargo test -p twin-tests integration::policy_flows::
//! ```

pub mod integration;
