//! 关键字命令处理：/chatDocument /chatGPT /document /debug /forget /history /reset /welcome /me

use crate::actions::control::forget_documents;
use crate::activity::{BotMessageKeyword, TurnContext};
use crate::core::BotError;
use crate::planner::{CHAT_GPT_PROMPT, QUESTION_DOCUMENT_PROMPT};
use crate::state::SharedTurnState;

pub const RESET_MESSAGE: &str = "The conversation has been reset. Let's start over.";

pub struct KeywordCommands {
    welcome_message: String,
}

impl KeywordCommands {
    pub fn new(welcome_message: impl Into<String>) -> Self {
        Self {
            welcome_message: welcome_message.into(),
        }
    }

    pub fn welcome_message(&self) -> &str {
        &self.welcome_message
    }

    pub async fn handle(
        &self,
        keyword: BotMessageKeyword,
        ctx: &TurnContext,
        state: &SharedTurnState,
    ) -> Result<(), BotError> {
        let args = ctx.input()[keyword.as_str().len()..].trim().to_lowercase();
        tracing::info!(target: "bot.pipeline", keyword = keyword.as_str(), "Keyword command");

        let reply = match keyword {
            BotMessageKeyword::ChatGpt => {
                state.lock().await.conversation.prompt_folder = Some(CHAT_GPT_PROMPT.to_string());
                "AI Copilot Skills are set to ChatGPT".to_string()
            }
            BotMessageKeyword::ChatDocument => {
                state.lock().await.conversation.prompt_folder =
                    Some(QUESTION_DOCUMENT_PROMPT.to_string());
                "AI Copilot Skills are set to QuestionDocument".to_string()
            }
            BotMessageKeyword::Document => {
                let state = state.lock().await;
                if state.conversation.documents.is_empty() {
                    "There are currently no uploaded document.".to_string()
                } else {
                    let names = state
                        .conversation
                        .documents
                        .iter()
                        .map(|d| d.file_name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!(
                        "The current uploaded document(s) are {}. Use \"forget documents\" to forget the document(s).",
                        names
                    )
                }
            }
            BotMessageKeyword::Debug => {
                let mut state = state.lock().await;
                match args.as_str() {
                    "on" => state.conversation.debug = true,
                    "off" => state.conversation.debug = false,
                    _ => {}
                }
                if state.conversation.debug {
                    "debug mode is on".to_string()
                } else {
                    "debug mode is off".to_string()
                }
            }
            BotMessageKeyword::Forget => {
                forget_documents(ctx, state).await?;
                return Ok(());
            }
            BotMessageKeyword::History => {
                let state = state.lock().await;
                if state.conversation.history.is_empty() {
                    "There is nothing stored in the conversation history".to_string()
                } else {
                    state.conversation.history.render()
                }
            }
            BotMessageKeyword::Reset => {
                state.lock().await.conversation.reset();
                tracing::info!(target: "bot.pipeline", key = %ctx.conversation_key(), "Conversation state has been reset");
                RESET_MESSAGE.to_string()
            }
            BotMessageKeyword::Welcome => {
                state.lock().await.conversation.welcomed = true;
                self.welcome_message.clone()
            }
            BotMessageKeyword::Me => {
                let from = &ctx.activity().from;
                format!(
                    "Name: {}\nId: {}",
                    from.name.as_deref().unwrap_or("(unknown)"),
                    from.id
                )
            }
        };
        ctx.send_text(reply).await
    }
}
