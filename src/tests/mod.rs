//! Test suite
//!
//! Everything driver-facing runs against the in-memory driver in
//! [`test_utils`], which implements the full native-call contract over a
//! snapshot-capable table store in both vendor modes.


mod blob_tests;
mod constraint_tests;
mod env_tests;
mod transaction_tests;
mod value_tests;
