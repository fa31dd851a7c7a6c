//! 规划层：计划模型、DO/SAY 交换、计划解析与 Planner

pub mod plan;
pub mod prompt;

pub use plan::{parse_plan, swap_do_and_say, DoCommand, Plan, PredictedCommand, SayCommand};
pub use prompt::{
    LlmPlanner, Planner, PromptResponse, PromptStatus, CHAT_GPT_PROMPT, CHAT_PROMPT, PLAN_PROMPT,
    QUESTION_DOCUMENT_PROMPT,
};
