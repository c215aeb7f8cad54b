//! Storage Module
//!
//! This module provides the persistent storage for mapkv: an in-process
//! map mirrored to one backing file through a memory-mapped region.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                       Store                          │
//! │                                                      │
//! │   Mutex ─ guards map, file handle, and region        │
//! │   ┌─────────────┐   serialize   ┌────────────────┐   │
//! │   │  HashMap    │──────────────>│  MmapMut       │   │
//! │   │  (truth)    │   every write │  (snapshot)    │   │
//! │   └─────────────┘               └───────┬────────┘   │
//! └─────────────────────────────────────────┼────────────┘
//!                                           ▼
//!                                     backing file
//! ```
//!
//! The map is the single source of truth. The mapped region and the file
//! behind it are a derived copy, rebuilt from the map on every mutation
//! and read back only once, at startup.

pub mod store;

// Re-export commonly used types
pub use store::{Store, StoreError, INITIAL_REGION_SIZE};
