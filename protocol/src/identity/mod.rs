//! # Identity
//!
//! Who owns a balance. The ledger never authenticates anyone itself; the
//! surrounding execution layer hands it an [`Address`] per call and the
//! ledger trusts that the caller is who the address says.

pub mod address;

pub use address::{Address, AddressError};
