//! Blob Retriever Test Suite
//!
//! End-to-end scenarios for the blob sidecar sync engine, driven through the
//! mock beacon node and both the in-memory and RocksDB storage engines.

pub mod tests;

pub use tests::{CountingStore, TestChain};
