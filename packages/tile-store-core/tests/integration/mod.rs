//! Integration test suite for tile storage, version chains and foreign keys.
//!
//! Sections:
//! 1. Insert path and tile group growth
//! 2. Concurrent slot allocation and unique keys
//! 3. Version-chain updates, deletes and aborts
//! 4. Foreign key enforcement and cascades
//! 5. Garbage collection and slot reuse
//! 6. Configuration loading

pub mod concurrency_tests;
pub mod config_tests;
pub mod foreign_key_tests;
pub mod gc_tests;
pub mod insert_tests;
pub mod update_tests;
