//! Infrastructure Adapters
//!
//! Implementations of the domain ports.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Ports (domain::ports)                        │
//! │     KvStore │ EventPublisher │ PageRenderer │ Clock              │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  InMemoryStore │ LoggingEventPublisher │ InMemoryEventCollector │
//! │  TokenRenderer │ SystemClock │ ManualClock                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod clock;
mod event_publisher;
mod memory_store;
mod renderer;

pub use clock::{ManualClock, SystemClock};
pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use memory_store::{InMemoryStore, StoreStats};
pub use renderer::TokenRenderer;
