//! Pending-queue implementations.

pub mod memory;

pub use memory::ClassQueue;
