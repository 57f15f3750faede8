//! Deep Translate - 流式字幕翻译客户端核心
//!
//! 向后端提交一次 SRT 翻译任务，以增量事件流消费进度，
//! 每条字幕的译文到达后可交互地编辑或单条重试。
//!
//! 核心组成：
//! - [`sse_decoder::SseFrameDecoder`]：把任意边界的网络分块重组为完整事件
//! - [`translation_log::TranslationLog`]：每条字幕的 查看/编辑/重试 状态机
//! - [`credential_pool::CredentialPool`]：API Key 轮换池（持久化游标）
//! - [`session::SessionController`]：会话生命周期与协作式取消
//!
//! 渲染层通过 [`events::SessionEventSink`] 订阅状态变化；持久化通过
//! [`stores`] 中的窄接口注入，核心不直接触碰磁盘与窗口。

pub mod backend;
pub mod credential_pool;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod session;
pub mod sse_decoder;
pub mod stores;
pub mod translation_log;
pub mod types;


pub use backend::{BackendClient, HttpBackend};
pub use credential_pool::{CredentialPool, CredentialState};
pub use error::{TranslateError, TranslateResult};
pub use events::{NoticeLevel, SessionEventSink};
pub use session::{SessionController, SessionDeps};
pub use sse_decoder::SseFrameDecoder;
pub use stores::{
    CredentialStore, DictionaryStore, MemorySettings, PromptStore, SettingsFile, DEFAULT_PROMPT,
};
pub use translation_log::TranslationLog;
pub use types::{
    EntryMode, LogEntry, SessionOutcome, SessionState, SessionSummary, StreamEvent, TranslationJob,
};
