//! 动作层：Action trait、类型化参数、注册表、内置动作与分发协调器

pub mod control;
pub mod coordinator;
pub mod registry;
pub mod semantic;
pub mod web;

use std::sync::Arc;

pub use control::{ForgetDocuments, SetDebug, UnknownAction};
pub use coordinator::{ActionDispatchCoordinator, CommandOutcome};
pub use registry::{Action, ActionRegistry, Typed, TypedAction};
pub use semantic::{GetSemanticInfo, SemanticInfoParams};
pub use web::{WebRetrieval, WebRetrievalParams};

use crate::http::RetryableHttpClient;
use crate::planner::Planner;

/// 内置动作名
pub mod names {
    pub use super::control::{DEBUG_OFF, DEBUG_ON, FORGET_DOCUMENTS, UNKNOWN};
    pub use super::semantic::GET_SEMANTIC_INFO;
    pub use super::web::WEB_RETRIEVAL;
}

/// 注册全部内置动作
pub fn register_builtin_actions(
    registry: &mut ActionRegistry,
    planner: Arc<dyn Planner>,
    http: Arc<RetryableHttpClient>,
    web_max_chars: usize,
) {
    registry.register_typed(GetSemanticInfo::new(Arc::clone(&planner)));
    registry.register_typed(WebRetrieval::new(http, planner, web_max_chars));
    registry.register(SetDebug::on());
    registry.register(SetDebug::off());
    registry.register(ForgetDocuments);
    registry.register(UnknownAction);
}
