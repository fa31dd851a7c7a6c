//! 状态层：聊天历史、会话状态 / 轮次临时状态、状态存储、会话引用

pub mod history;
pub mod references;
pub mod store;
pub mod turn;

pub use history::{ChatHistory, Message, Role};
pub use references::{ConversationReference, ConversationReferences};
pub use store::{MemoryStateStore, StateStore};
pub use turn::{ConversationState, SharedTurnState, TempState, TurnState, UploadedDocument};
