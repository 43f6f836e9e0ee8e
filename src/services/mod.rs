pub mod memory_service;
pub mod session_registry;

pub use memory_service::{display_timestamp, AddedMemory, MemoryMatch, MemoryService, UserSummary};
pub use session_registry::{
    OpenedSession, OutboundMessage, QueueSlot, RegistryError, Session, SessionRegistry, SessionState,
    DEFAULT_QUEUE_CAPACITY,
};
