//! # ArborKV
//!
//! An in-memory key-value store whose nodes form a replication tree:
//! - Each node has at most one parent and any number of children
//! - Writes flow both up and down the tree (last-writer-wins)
//! - New children bootstrap from a snapshot of their parent (JOIN/RECOVER)
//! - Line-oriented TCP protocol with JSON bodies
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌──────────────┐
//!                    │ Parent node  │
//!                    └──────▲───────┘
//!                           │ Subscriber (JOIN, relay)
//! ┌─────────────────────────┴───────────────────────────────────┐
//! │                      TCP Server                              │
//! │            (clients and joined children)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one thread per connection
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Node (dispatch)                            │
//! │            write lock: apply, then broadcast                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Store    │          │  Registry   │
//!   │  (RwLock)   │          │  (Mutex)    │
//!   └─────────────┘          └──────┬──────┘
//!                                   │ fan-out
//!                                   ▼
//!                          children + parent
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod protocol;
pub mod network;
pub mod node;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ArborError, Result};
pub use config::{Config, ParentLossPolicy};
pub use node::Node;
pub use client::Client;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ArborKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
