//! 事件分发器
//!
//! 把解码出的流事件落到翻译日志上，并告诉会话循环下一步怎么走。
//! 分发本身只改日志，渲染通知由会话循环在锁外发出。

use crate::translation_log::TranslationLog;
use crate::types::{LogEntry, StreamEvent};

/// 配额类错误的专用提示（与通用流错误区分呈现）
pub const QUOTA_MESSAGE: &str =
    "API Key has exceeded its usage quota. Translation stopped. Please try another key.";

/// 单个事件的分发结果
#[derive(Debug)]
pub enum Dispatch {
    /// 新条目已追加（UI 渲染并滚动到该条目）
    Appended(LogEntry),
    /// 事件被忽略（重复序号等），会话继续
    Ignored,
    /// 任务完成
    Completed { filename: Option<String> },
    /// 后端报错，会话终止
    Failed { message: String },
}

/// 把一个流事件应用到日志
pub fn dispatch_event(event: StreamEvent, log: &mut TranslationLog) -> Dispatch {
    match event {
        StreamEvent::Progress(payload) => match log.append(payload) {
            Ok(entry) => Dispatch::Appended(entry.clone()),
            Err(e) => {
                // append 内部已告警，会话继续
                log::debug!("[Dispatcher] Progress event ignored: {}", e);
                Dispatch::Ignored
            }
        },
        StreamEvent::Error(payload) => Dispatch::Failed {
            message: classify_stream_error(&payload.message),
        },
        StreamEvent::Done(payload) => Dispatch::Completed {
            filename: payload.filename,
        },
    }
}

/// 流错误分类：配额/限流类消息映射到专用提示，其余原样透传
pub fn classify_stream_error(message: &str) -> String {
    if message.contains("429") || message.to_lowercase().contains("quota") {
        QUOTA_MESSAGE.to_string()
    } else {
        message.to_string()
    }
}
