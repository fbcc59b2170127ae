//! Actor-based scheduling
//!
//! Each monitored service is driven by its own actor running as an
//! independent async task. The scheduler talks to actors through handles.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌─────────────┐
//!                  │  Scheduler  │
//!                  └──────┬──────┘
//!                         │ spawns
//!          ┌──────────────┼──────────────┐
//!          │              │              │
//!  ┌───────▼──────┐       │      ┌───────▼──────┐
//!  │ Monitor-1    │       │      │ Monitor-N    │
//!  │ (Service A)  │       │      │ (Service N)  │
//!  └───────┬──────┘       │      └───────┬──────┘
//!          │   checks on the shared worker pool
//!          └──────────────┼──────────────┘
//!                         │
//!                ┌────────▼────────┐
//!                │  HistoryStore   │
//!                └─────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **State**: Each actor publishes its timer state on a watch channel
//! 3. **Request/Response**: oneshot channels for on-demand checks

pub mod messages;
pub mod service_monitor;
