//! # Shellpark
//!
//! Keeps live SSH shell sessions alive after the browser transport that was
//! driving them goes away, and hands them back to a new transport later with
//! their scroll-back intact.
//!
//! ## Architecture Overview
//!
//! - **[`shell`]**: traits for the live SSH client and shell channel handed over by
//!   the connection layer
//! - **[`suspend`]**: the suspension subsystem: durable log store, session
//!   registry, startup recovery and the [`SuspensionCoordinator`]
//! - **[`cli`]**: configuration discovery and the offline administration commands
//! - **[`env`]**: on-disk layout constants and path helpers
//!
//! ## Lifecycle
//!
//! ```text
//! take_over ──► hanging ──(liveness signal)──► disconnected
//!                  │                               │
//!                resume                     terminate / remove
//!                  ▼                               ▼
//!           handles returned                files deleted
//! ```
//!
//! A hanging session can also be terminated directly. Disconnected sessions are
//! written to a JSON sidecar so they are still listed after a restart.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shellpark::{SuspendConfig, SuspensionCoordinator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = SuspensionCoordinator::new(SuspendConfig::default()).await;
//!     let mut notifications = coordinator.subscribe();
//!
//!     tokio::spawn(async move {
//!         while let Ok(event) = notifications.recv().await {
//!             println!("{} lost session {}: {}", event.owner_user_id, event.suspend_id, event.reason);
//!         }
//!     });
//!
//!     for record in coordinator.list_sessions("alice").await {
//!         println!("{} {:?}", record.display_name(), record.status);
//!     }
//! }
//! ```

/// Live SSH handle abstraction.
///
/// The connection layer implements these traits for its SSH library and moves
/// the handles into the coordinator at takeover time.
pub mod shell;

/// Session suspension and resumption.
pub mod suspend;

/// Configuration discovery and administrative commands.
pub mod cli;

/// Environment constants and path utilities.
pub mod env;

pub use shell::{ChannelEvent, ClientEvent, ShellChannel, ShellClient, ShellError, ShellHandles};
pub use suspend::{
    LogExport, LogStore, RecoveryReport, ResumedSession, SessionAutoTerminated, SessionRecord,
    SessionStatus, SuspendConfig, SuspendId, SuspensionCoordinator, TakeoverRequest,
};
