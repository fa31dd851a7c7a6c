//! 出站 HTTP：传输抽象、认证头提供者与可重试客户端

pub mod auth;
pub mod error;
pub mod retry;
pub mod transport;

pub use auth::{ApiKeyAuth, AuthHeaderProvider, NoAuth, StaticBearer};
pub use error::{HttpError, TransportError};
pub use retry::{is_token_request, RetryPolicy, RetryableHttpClient, RETRYABLE_STATUS_CODES};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
