//! 统一错误类型
//!
//! 错误分级与传播策略：
//! - 解码级错误在解码器边界被完全吸收（单帧损坏不终止流）
//! - 流级错误向上传播并终止会话
//! - 单条重试错误只作用于该条目，不影响会话
//! - 取消是提示性终态，与失败区分呈现

use serde::Serialize;
use thiserror::Error;

/// 翻译会话统一错误类型
#[derive(Debug, Error, Serialize)]
pub enum TranslateError {
    /// 无法建立流式连接
    #[error("Connection failed: {0}")]
    Connection(String),

    /// 后端在流中途报告失败
    #[error("Stream error: {0}")]
    Stream(String),

    /// 单个事件帧损坏（调用方丢弃，不致命）
    #[error("Malformed event frame: {0}")]
    Decode(String),

    /// 单条重试失败
    #[error("Retry failed: {0}")]
    Retry(String),

    /// Key 池为空
    #[error("No API key available")]
    NoCredential,

    /// 用户主动取消
    #[error("Cancelled")]
    Cancelled,

    /// 已有会话在进行中
    #[error("Session already running")]
    AlreadyRunning,

    /// 日志条目未找到
    #[error("Log entry not found: {0}")]
    EntryNotFound(u64),

    /// 条目处于编辑或重试中，拒绝并发操作
    #[error("Log entry busy: {0}, current mode: {1}")]
    EntryBusy(u64, String),

    /// 同一序号的 progress 事件重复到达（append-only 不变量）
    #[error("Duplicate log entry: {0}")]
    DuplicateEntry(u64),

    /// 持久化存储错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// 序列化/反序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for TranslateError {
    fn from(e: serde_json::Error) -> Self {
        TranslateError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for TranslateError {
    fn from(e: std::io::Error) -> Self {
        TranslateError::Storage(e.to_string())
    }
}

// 前端呈现：序列化为结构化 JSON，便于按 code 差异化处理
impl From<TranslateError> for String {
    fn from(e: TranslateError) -> Self {
        let code = match &e {
            TranslateError::Connection(_) => "CONNECTION_ERROR",
            TranslateError::Stream(_) => "STREAM_ERROR",
            TranslateError::Decode(_) => "DECODE_ERROR",
            TranslateError::Retry(_) => "RETRY_ERROR",
            TranslateError::NoCredential => "NO_CREDENTIAL",
            TranslateError::Cancelled => "CANCELLED",
            TranslateError::AlreadyRunning => "ALREADY_RUNNING",
            TranslateError::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            TranslateError::EntryBusy(_, _) => "ENTRY_BUSY",
            TranslateError::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            TranslateError::Storage(_) => "STORAGE_ERROR",
            TranslateError::Serialization(_) => "SERIALIZATION_ERROR",
            TranslateError::InvalidInput(_) => "INVALID_INPUT",
        };
        let message = e.to_string();
        serde_json::json!({ "code": code, "message": message }).to_string()
    }
}

/// Result 类型别名
pub type TranslateResult<T> = Result<T, TranslateError>;
