//! webRetrieval：抓取用户给出的网页（逗号分隔），提取正文后回答问题
//!
//! 网页经 RetryableHttpClient 获取，HTML 用 html2text 转为文本并按 max_chars 截断。
//! 网页会记入会话的上传文档列表，之后可用 forgetDocuments 忘记。

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::registry::TypedAction;
use crate::activity::TurnContext;
use crate::core::{ActionError, DocumentError};
use crate::http::RetryableHttpClient;
use crate::planner::{Planner, QUESTION_DOCUMENT_PROMPT};
use crate::state::{Message, SharedTurnState, UploadedDocument};

pub const WEB_RETRIEVAL: &str = "webRetrieval";

/// 原始网页体积上限
pub const MAX_DOCUMENT_BYTES: u64 = 5 * 1024 * 1024;
/// 按每页 3000 字符折算的页数上限
pub const MAX_PAGES: u32 = 100;
const CHARS_PER_PAGE: usize = 3000;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WebRetrievalParams {
    /// 一个或多个网页地址，逗号分隔
    pub entity: String,
    #[serde(flatten)]
    #[schemars(skip)]
    pub prior_outputs: BTreeMap<String, Value>,
}

pub struct WebRetrieval {
    http: Arc<RetryableHttpClient>,
    planner: Arc<dyn Planner>,
    max_chars: usize,
}

impl WebRetrieval {
    pub fn new(http: Arc<RetryableHttpClient>, planner: Arc<dyn Planner>, max_chars: usize) -> Self {
        Self {
            http,
            planner,
            max_chars: max_chars.max(1),
        }
    }

    /// 抓取并转为纯文本；超过体积 / 页数上限返回 DocumentError
    async fn fetch_text(&self, url: &str) -> Result<String, ActionError> {
        let body = self.http.get_text(url).await?;
        let size = body.len() as u64;
        if size > MAX_DOCUMENT_BYTES {
            return Err(DocumentError::FileTooLarge {
                size,
                max: MAX_DOCUMENT_BYTES,
            }
            .into());
        }

        let text = html_to_text(body.trim_start_matches('\u{FEFF}'));
        let pages = text.chars().count().div_ceil(CHARS_PER_PAGE) as u32;
        if pages > MAX_PAGES {
            return Err(DocumentError::TooManyPages {
                pages,
                max: MAX_PAGES,
            }
            .into());
        }
        Ok(truncate_chars(&text, self.max_chars))
    }
}

fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    let lower = s.get(..s.len().min(512)).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("<!") || lower.starts_with("<html") || lower.contains("</")
}

fn html_to_text(body: &str) -> String {
    if !looks_like_html(body) {
        return body.to_string();
    }
    match html2text::from_read(body.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => body.to_string(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    format!("{}\n...[truncated]", text.chars().take(max).collect::<String>())
}

/// 去掉问题中的链接，否则模型会回答无法访问网址
fn strip_urls(input: &str) -> String {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| Regex::new(r"https?://\S+").unwrap());
    re.replace_all(input, "").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn document_error_reply(err: &DocumentError) -> String {
    match err {
        DocumentError::FileTooLarge { max, .. } => format!(
            "I'm sorry, I could not add the page to the index. It is larger than {} bytes.",
            max
        ),
        DocumentError::TooManyPages { max, .. } => format!(
            "I'm sorry, I could not add the page to the index. It has more than {} page(s).",
            max
        ),
    }
}

#[async_trait]
impl TypedAction for WebRetrieval {
    type Params = WebRetrievalParams;

    fn name(&self) -> &str {
        WEB_RETRIEVAL
    }

    fn description(&self) -> &str {
        "Read one or more web pages (comma separated urls in entity) and answer using their content"
    }

    async fn run_typed(
        &self,
        ctx: &TurnContext,
        state: &SharedTurnState,
        params: WebRetrievalParams,
    ) -> Result<String, ActionError> {
        ctx.start_typing();
        let send = |text: String| async move {
            ctx.send_text(text)
                .await
                .map_err(|e| ActionError::Failed(format!("send failed: {}", e)))
        };

        let docs = {
            let mut state = state.lock().await;
            for url in params.entity.split(',').map(str::trim).filter(|u| !u.is_empty()) {
                let file_name = url.split('#').next().unwrap_or(url).to_string();
                let documents = &mut state.conversation.documents;
                if !documents.iter().any(|d| d.file_name == file_name) {
                    documents.push(UploadedDocument {
                        file_name,
                        url: Some(url.to_string()),
                    });
                }
            }
            state.conversation.documents.clone()
        };

        let web_docs: Vec<_> = docs.into_iter().filter(|d| d.url.is_some()).collect();
        if web_docs.is_empty() {
            send("There are currently no uploaded document.".to_string()).await?;
            return Ok("No web pages provided.".to_string());
        }
        if web_docs.len() > 1 {
            send(format!(
                "You have uploaded {} document(s) or website(s). These will be processed now.",
                web_docs.len()
            ))
            .await?;
        }

        let question = strip_urls(ctx.input());
        for doc in &web_docs {
            let Some(url) = doc.url.as_deref() else {
                continue;
            };
            let text = match self.fetch_text(url).await {
                Ok(text) => text,
                Err(ActionError::Document(e)) => {
                    tracing::error!(target: "bot.coordinator", url, "Failed adding content: {}", e);
                    send(document_error_reply(&e)).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut context = format!("Content of {}:\n{}", doc.file_name, text);
            if !question.is_empty() {
                context.push_str(&format!("\n\nQuestion: {}", question));
            }
            let answer = self
                .planner
                .complete_with_context(ctx, state, QUESTION_DOCUMENT_PROMPT, &context)
                .await
                .into_result()
                .map_err(|e| ActionError::Planner(e.to_string()))?;

            send(format!("**{}**\n\n{}", url, answer)).await?;
            state
                .lock()
                .await
                .conversation
                .history
                .push(Message::assistant(answer));
        }
        Ok("Provided web details.".to_string())
    }
}
