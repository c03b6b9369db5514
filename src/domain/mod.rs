//! Domain Layer
//!
//! Value objects, collaborator ports and events shared by every cache tier.
//!
//! - **Ports** (`ports.rs`) - `TenantKey`, `ShardKey` and the collaborator traits
//! - **Tenant** (`tenant.rs`) - tenant records and response metadata
//! - **Events** (`events.rs`) - analytics and shard lifecycle events

pub mod events;
pub mod ports;
pub mod tenant;

pub use events::{DomainEvent, ServedFrom};
pub use ports::{Clock, EventPublisher, KvStore, PageRenderer, ShardKey, TenantKey};
pub use tenant::{ExperimentConfig, ResponseMetadata, TenantRecord};
