//! Services module
//!
//! External collaborators of the dialogue: interpretation, key-value
//! storage, message transport and background work.

pub mod ai;
pub mod background;
pub mod redis;
pub mod store;
pub mod transport;

// Re-export commonly used services
pub use ai::{GeminiClient, Interpreter, ScriptedInterpreter};
pub use background::{BackgroundTaskManager, ManagerState};
pub use self::redis::RedisStore;
pub use store::{KeyValueStore, KeyValueStoreExt, MemoryStore};
pub use transport::{MemoryTransport, MessageHandler, MessageTransport, RedisQueueTransport};
