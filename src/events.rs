//! 会话事件订阅接口
//!
//! 渲染层通过实现 [`SessionEventSink`] 订阅核心状态变化，
//! 核心不持有任何窗口或 DOM 句柄。所有回调都在状态锁外触发，
//! 实现方可以安全地回调控制器。

use std::sync::Mutex;

use serde::Serialize;

use crate::types::{LogEntry, SessionState};

/// 提示条级别（对应前端 alert 样式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Danger,
}

/// 会话事件订阅者
pub trait SessionEventSink: Send + Sync {
    /// 新条目追加（渲染并滚动到最新一条）
    fn entry_appended(&self, entry: &LogEntry);

    /// 既有条目更新（编辑、重试状态与结果）
    fn entry_updated(&self, entry: &LogEntry);

    /// 会话状态变化
    fn session_changed(&self, state: SessionState);

    /// 用户可见提示
    fn notice(&self, level: NoticeLevel, message: &str);
}

/// 丢弃一切事件的空实现
pub struct NullSink;

impl SessionEventSink for NullSink {
    fn entry_appended(&self, _entry: &LogEntry) {}
    fn entry_updated(&self, _entry: &LogEntry) {}
    fn session_changed(&self, _state: SessionState) {}
    fn notice(&self, _level: NoticeLevel, _message: &str) {}
}

/// 录制到的事件（测试断言用）
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Appended(u64),
    Updated(u64),
    Session(SessionState),
    Notice(NoticeLevel, String),
}

/// 录制所有事件的测试替身
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: RecordedEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    /// 取走已录制的事件
    pub fn take(&self) -> Vec<RecordedEvent> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    /// 录制到的会话状态序列
    pub fn session_states(&self) -> Vec<SessionState> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Session(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// 录制到的提示消息
    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Notice(level, message) => Some((*level, message.clone())),
                _ => None,
            })
            .collect()
    }
}

impl SessionEventSink for RecordingSink {
    fn entry_appended(&self, entry: &LogEntry) {
        self.push(RecordedEvent::Appended(entry.number));
    }

    fn entry_updated(&self, entry: &LogEntry) {
        self.push(RecordedEvent::Updated(entry.number));
    }

    fn session_changed(&self, state: SessionState) {
        self.push(RecordedEvent::Session(state));
    }

    fn notice(&self, level: NoticeLevel, message: &str) {
        self.push(RecordedEvent::Notice(level, message.to_string()));
    }
}
