//! Adapters for the domain ports.

pub mod in_memory;
pub mod ledger;
pub mod mailer;
pub mod rendering;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
