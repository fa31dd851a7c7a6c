//! 活动层：入站活动模型、会话键、关键字命令、轮次上下文与出站发送

pub mod context;
pub mod keywords;
pub mod model;

pub use context::{ActivitySender, CollectingSender, TurnContext};
pub use keywords::BotMessageKeyword;
pub use model::{
    strip_mentions, Activity, ActivityType, ChannelAccount, ConversationAccount, ConversationKey,
    OutboundActivity,
};
