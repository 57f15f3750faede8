//! 核心类型定义
//!
//! 线上事件格式与后端保持一致：每个事件携带 `type` 判别字段
//! （`progress` / `error` / `done`），负载字段因类型而异。

use serde::{Deserialize, Serialize};

/// 翻译任务（一次会话的用户输入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationJob {
    /// 上传的字幕文件名
    pub file_name: String,

    /// SRT 文件内容
    pub srt_content: String,

    /// 模型标识
    pub model: String,

    /// 自定义提示词模板（None 时使用激活的模板）
    #[serde(default)]
    pub prompt_override: Option<String>,
}

/// 流事件（帧解码产物，消费一次即弃）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// 单条字幕翻译完成
    Progress(ProgressPayload),
    /// 后端中途报错（终止会话）
    Error(StreamErrorPayload),
    /// 整个任务完成
    Done(DonePayload),
}

/// progress 事件负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// 字幕序号（后端以数字或数字字符串形式发送）
    #[serde(deserialize_with = "de_sequence_number")]
    pub number: u64,

    /// SRT 时间轴（如 "00:00:01,000 --> 00:00:04,000"）
    pub timestamp: String,

    /// 原文
    pub original_text: String,

    /// 译文
    pub translated_text: String,
}

/// error 事件负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamErrorPayload {
    /// 后端错误消息
    pub message: String,
}

/// done 事件负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonePayload {
    /// 服务端输出文件名
    #[serde(default)]
    pub filename: Option<String>,
}

/// 序号兼容解析：接受 JSON 数字与数字字符串两种形式
fn de_sequence_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom("sequence number must be a non-negative integer")),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| D::Error::custom(format!("invalid sequence number '{}': {}", s, e))),
        other => Err(D::Error::custom(format!(
            "unexpected sequence number value: {}",
            other
        ))),
    }
}

/// 日志条目的子状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EntryMode {
    /// 查看态
    Viewing,
    /// 编辑态，buffer 持有未提交的草稿
    Editing { buffer: String },
    /// 单条重试进行中（重试入口在此期间禁用）
    Retrying,
}

impl EntryMode {
    pub fn name(&self) -> &'static str {
        match self {
            EntryMode::Viewing => "viewing",
            EntryMode::Editing { .. } => "editing",
            EntryMode::Retrying => "retrying",
        }
    }
}

/// 翻译日志条目（每个字幕单元一条）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 序号（后端分配，会话期内稳定，客户端不重排）
    pub number: u64,

    /// SRT 时间轴
    pub timestamp: String,

    /// 原文（创建后不可变）
    pub original_text: String,

    /// 当前向用户展示的译文
    pub displayed_text: String,

    /// 子状态
    pub mode: EntryMode,
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Cancelled,
    Completed,
    Failed,
}

impl SessionState {
    /// 会话是否处于活跃阶段（存在在途请求）
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Streaming)
    }
}

/// 会话终态结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// 正常完成（filename 为服务端写出的译文文件名，可能缺省）
    Completed { filename: Option<String> },
    /// 用户取消
    Cancelled,
}

/// 会话结束摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// 会话 ID
    pub session_id: String,

    /// 终态结果
    pub outcome: SessionOutcome,

    /// 会话期内收到的条目数
    pub entry_count: usize,

    /// 结束时间（RFC3339）
    pub finished_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_with_string_number() {
        let json = r#"{"type":"progress","number":"17","timestamp":"00:01:02,000 --> 00:01:04,500","original_text":"hello","translated_text":"سلام"}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        match event {
            StreamEvent::Progress(p) => {
                assert_eq!(p.number, 17);
                assert_eq!(p.translated_text, "سلام");
            }
            other => panic!("expected progress, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_progress_with_integer_number() {
        let json = r#"{"type":"progress","number":3,"timestamp":"t","original_text":"a","translated_text":"b"}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, StreamEvent::Progress(p) if p.number == 3));
    }

    #[test]
    fn test_parse_error_event() {
        let json = r#"{"type":"error","message":"Invalid API Key. Please verify your key and permissions."}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, StreamEvent::Error(p) if p.message.starts_with("Invalid API Key")));
    }

    #[test]
    fn test_parse_done_with_and_without_filename() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"done","filename":"movie_fa.srt"}"#).unwrap();
        assert!(matches!(
            event,
            StreamEvent::Done(DonePayload { filename: Some(ref f) }) if f == "movie_fa.srt"
        ));

        let event: StreamEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert!(matches!(event, StreamEvent::Done(DonePayload { filename: None })));
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let result = serde_json::from_str::<StreamEvent>(r#"{"type":"heartbeat"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_sequence_number_is_rejected() {
        let json = r#"{"type":"progress","number":"abc","timestamp":"t","original_text":"a","translated_text":"b"}"#;
        assert!(serde_json::from_str::<StreamEvent>(json).is_err());
    }

    #[test]
    fn test_session_state_liveness() {
        assert!(SessionState::Connecting.is_live());
        assert!(SessionState::Streaming.is_live());
        assert!(!SessionState::Idle.is_live());
        assert!(!SessionState::Completed.is_live());
        assert!(!SessionState::Cancelled.is_live());
        assert!(!SessionState::Failed.is_live());
    }
}
