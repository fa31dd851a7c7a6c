//! 机器人层：轮次管线、关键字命令、助手处理器与应用装配

pub mod app;
pub mod commands;
pub mod handler;
pub mod pipeline;

pub use app::{on_turn_error, BotApp, BotAppBuilder, GENERIC_ERROR_MESSAGE, RATE_LIMIT_MESSAGE};
pub use commands::{KeywordCommands, RESET_MESSAGE};
pub use handler::AssistantTurnHandler;
pub use pipeline::{
    BeforeTurn, TurnHandler, TurnOutcome, TurnPipeline, CONTINUE_CONVERSATION_EVENT,
    PLEASE_WAIT_MESSAGE,
};
