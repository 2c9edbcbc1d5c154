pub mod agent;
pub mod config;
pub mod error;
pub mod identity;
pub mod memory;
pub mod patterns;
pub mod storage;

pub use agent::events::{HitlKind, HitlRequest, ProgressEvent, ProgressStage};
pub use agent::state::{AgentInfo, AgentState, AgentStatus};
pub use agent::types::{Message, Role, Session};
pub use agent::{Agent, AgentError, AgentReply, ProgressSink, UsageReport};
pub use config::{AgentConfig, BehaviorConfig, LlmConfig, MemoryConfig, ToolsConfig};
pub use error::{RpcCode, ServiceError};
pub use identity::{new_session_id, validate_user_id, DEFAULT_USER_ID};
pub use memory::SharedMemoryStore;
pub use patterns::{Pattern, PatternError, PatternInfo, PatternLibrary};
pub use storage::{MemoryBackend, SqliteBackend, StorageBackend, StorageDetails, StorageError};
