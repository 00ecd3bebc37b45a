//! WASM bridge between the Dashlab pages and `dashlab_core`.
//!
//! Each page calls one exported function per button click; the core result is
//! flattened into a plain serde payload and handed to JavaScript.

pub mod epidemic;
pub mod field;
mod shared;

pub use epidemic::{run_sir, sir_payload, SirPayload};
pub use field::{field_payload, FieldPayload};
