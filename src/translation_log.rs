//! 翻译日志状态机
//!
//! 持有本次会话的全部字幕条目及其 查看/编辑/重试 子状态。
//! 只由事件分发器和用户交互（编辑/保存/取消/重试）驱动；
//! 渲染层订阅变化，不作为状态来源。
//!
//! 条目按 progress 事件到达顺序追加，客户端不重排。
//! 同一序号最多存在一条（append-only 不变量），重复到达被拒绝。

use std::collections::HashMap;

use crate::error::{TranslateError, TranslateResult};
use crate::types::{EntryMode, LogEntry, ProgressPayload};

/// 翻译日志
#[derive(Debug, Default)]
pub struct TranslationLog {
    entries: Vec<LogEntry>,
    index: HashMap<u64, usize>,
}

impl TranslationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条 progress 结果
    ///
    /// 重复序号拒绝并告警：条目是 append-only 的，重连重放
    /// 不允许覆盖用户已提交的编辑。
    pub fn append(&mut self, payload: ProgressPayload) -> TranslateResult<&LogEntry> {
        if self.index.contains_key(&payload.number) {
            log::warn!(
                "[TranslationLog] Duplicate progress for entry {}, dropping",
                payload.number
            );
            return Err(TranslateError::DuplicateEntry(payload.number));
        }
        let entry = LogEntry {
            number: payload.number,
            timestamp: payload.timestamp,
            original_text: payload.original_text,
            displayed_text: payload.translated_text,
            mode: EntryMode::Viewing,
        };
        self.index.insert(entry.number, self.entries.len());
        self.entries.push(entry);
        Ok(self.entries.last().expect("entry pushed above"))
    }

    pub fn get(&self, number: u64) -> Option<&LogEntry> {
        self.index.get(&number).map(|&at| &self.entries[at])
    }

    fn entry_mut(&mut self, number: u64) -> TranslateResult<&mut LogEntry> {
        match self.index.get(&number) {
            Some(&at) => Ok(&mut self.entries[at]),
            None => Err(TranslateError::EntryNotFound(number)),
        }
    }

    /// 到达顺序的条目切片
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 清空（新会话开始时调用，会话期内条目从不删除）
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// 进入编辑态，草稿以当前展示文本初始化
    pub fn begin_edit(&mut self, number: u64) -> TranslateResult<&LogEntry> {
        let entry = self.entry_mut(number)?;
        match entry.mode {
            EntryMode::Viewing => {
                entry.mode = EntryMode::Editing {
                    buffer: entry.displayed_text.clone(),
                };
                Ok(&*entry)
            }
            ref other => Err(TranslateError::EntryBusy(number, other.name().to_string())),
        }
    }

    /// 更新未提交的草稿
    pub fn set_edit_buffer(&mut self, number: u64, text: &str) -> TranslateResult<()> {
        let entry = self.entry_mut(number)?;
        match entry.mode {
            EntryMode::Editing { ref mut buffer } => {
                buffer.clear();
                buffer.push_str(text);
                Ok(())
            }
            ref other => Err(TranslateError::EntryBusy(number, other.name().to_string())),
        }
    }

    /// 提交草稿到展示文本，回到查看态
    ///
    /// 纯本地编辑，不回传后端。
    pub fn save_edit(&mut self, number: u64) -> TranslateResult<&LogEntry> {
        let entry = self.entry_mut(number)?;
        match std::mem::replace(&mut entry.mode, EntryMode::Viewing) {
            EntryMode::Editing { buffer } => {
                entry.displayed_text = buffer;
                Ok(&*entry)
            }
            other => {
                entry.mode = other;
                let name = entry.mode.name().to_string();
                Err(TranslateError::EntryBusy(number, name))
            }
        }
    }

    /// 放弃草稿，展示文本保持编辑前的值
    pub fn cancel_edit(&mut self, number: u64) -> TranslateResult<&LogEntry> {
        let entry = self.entry_mut(number)?;
        match entry.mode {
            EntryMode::Editing { .. } => {
                entry.mode = EntryMode::Viewing;
                Ok(&*entry)
            }
            ref other => Err(TranslateError::EntryBusy(number, other.name().to_string())),
        }
    }

    /// 进入重试态
    ///
    /// 编辑中或已在重试中的条目拒绝，这是重试入口禁用的显式化。
    pub fn begin_retry(&mut self, number: u64) -> TranslateResult<&LogEntry> {
        let entry = self.entry_mut(number)?;
        match entry.mode {
            EntryMode::Viewing => {
                entry.mode = EntryMode::Retrying;
                Ok(&*entry)
            }
            ref other => Err(TranslateError::EntryBusy(number, other.name().to_string())),
        }
    }

    /// 重试成功：替换展示文本，回到查看态
    pub fn complete_retry(&mut self, number: u64, translated: String) -> TranslateResult<&LogEntry> {
        let entry = self.entry_mut(number)?;
        match entry.mode {
            EntryMode::Retrying => {
                entry.displayed_text = translated;
                entry.mode = EntryMode::Viewing;
                Ok(&*entry)
            }
            ref other => Err(TranslateError::EntryBusy(number, other.name().to_string())),
        }
    }

    /// 重试失败：展示文本保持不变，回到查看态
    pub fn fail_retry(&mut self, number: u64) -> TranslateResult<&LogEntry> {
        let entry = self.entry_mut(number)?;
        match entry.mode {
            EntryMode::Retrying => {
                entry.mode = EntryMode::Viewing;
                Ok(&*entry)
            }
            ref other => Err(TranslateError::EntryBusy(number, other.name().to_string())),
        }
    }

    /// 汇总完整译文文档
    ///
    /// 每条为 `序号\n时间轴\n展示文本`，条目间空行分隔。
    /// 使用展示文本，用户已提交的编辑会包含在内。
    pub fn assemble_translated(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}\n{}\n{}", e.number, e.timestamp, e.displayed_text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// 汇总完整原文文档
    pub fn assemble_original(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}\n{}\n{}", e.number, e.timestamp, e.original_text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn payload(number: u64, original: &str, translated: &str) -> ProgressPayload {
        ProgressPayload {
            number,
            timestamp: format!("00:00:0{0},000 --> 00:00:0{0},900", number),
            original_text: original.to_string(),
            translated_text: translated.to_string(),
        }
    }

    #[test]
    fn test_entries_appear_in_arrival_order() {
        let mut log = TranslationLog::new();
        log.append(payload(3, "c", "C")).unwrap();
        log.append(payload(1, "a", "A")).unwrap();
        log.append(payload(2, "b", "B")).unwrap();

        let numbers: Vec<u64> = log.entries().iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![3, 1, 2]);
    }

    #[test]
    fn test_one_entry_per_number() {
        let mut log = TranslationLog::new();
        log.append(payload(1, "a", "A")).unwrap();
        // 用户先提交一次编辑
        log.begin_edit(1).unwrap();
        log.set_edit_buffer(1, "edited").unwrap();
        log.save_edit(1).unwrap();

        // 重复序号被拒，已有条目（含编辑）不受影响
        let result = log.append(payload(1, "a", "replayed"));
        assert_matches!(result, Err(TranslateError::DuplicateEntry(1)));
        assert_eq!(log.len(), 1);
        assert_eq!(log.get(1).unwrap().displayed_text, "edited");
    }

    #[test]
    fn test_edit_save_commits_exactly_the_buffer() {
        let mut log = TranslationLog::new();
        log.append(payload(1, "hello", "salam")).unwrap();

        log.begin_edit(1).unwrap();
        log.set_edit_buffer(1, "dorood").unwrap();
        let entry = log.save_edit(1).unwrap();

        assert_eq!(entry.displayed_text, "dorood");
        assert_eq!(entry.mode, EntryMode::Viewing);
        // 原文不受编辑影响
        assert_eq!(entry.original_text, "hello");
    }

    #[test]
    fn test_edit_cancel_restores_previous_text() {
        let mut log = TranslationLog::new();
        log.append(payload(1, "hello", "salam")).unwrap();

        log.begin_edit(1).unwrap();
        log.set_edit_buffer(1, "scribble").unwrap();
        let entry = log.cancel_edit(1).unwrap();

        assert_eq!(entry.displayed_text, "salam");
        assert_eq!(entry.mode, EntryMode::Viewing);
    }

    #[test]
    fn test_edit_buffer_starts_from_displayed_text() {
        let mut log = TranslationLog::new();
        log.append(payload(1, "hello", "salam")).unwrap();

        let entry = log.begin_edit(1).unwrap();
        assert_matches!(&entry.mode, EntryMode::Editing { buffer } if buffer == "salam");
    }

    #[test]
    fn test_retry_success_replaces_displayed_text() {
        let mut log = TranslationLog::new();
        log.append(payload(5, "hello", "first try")).unwrap();

        log.begin_retry(5).unwrap();
        assert_eq!(log.get(5).unwrap().mode, EntryMode::Retrying);

        let entry = log.complete_retry(5, "second try".to_string()).unwrap();
        assert_eq!(entry.displayed_text, "second try");
        assert_eq!(entry.mode, EntryMode::Viewing);
    }

    #[test]
    fn test_retry_failure_keeps_displayed_text() {
        let mut log = TranslationLog::new();
        log.append(payload(5, "hello", "first try")).unwrap();

        log.begin_retry(5).unwrap();
        let entry = log.fail_retry(5).unwrap();
        assert_eq!(entry.displayed_text, "first try");
        assert_eq!(entry.mode, EntryMode::Viewing);
    }

    #[test]
    fn test_concurrent_retry_on_same_entry_is_rejected() {
        let mut log = TranslationLog::new();
        log.append(payload(5, "a", "b")).unwrap();

        log.begin_retry(5).unwrap();
        assert_matches!(
            log.begin_retry(5),
            Err(TranslateError::EntryBusy(5, mode)) if mode == "retrying"
        );
    }

    #[test]
    fn test_retry_while_editing_is_rejected() {
        let mut log = TranslationLog::new();
        log.append(payload(5, "a", "b")).unwrap();

        log.begin_edit(5).unwrap();
        assert_matches!(
            log.begin_retry(5),
            Err(TranslateError::EntryBusy(5, mode)) if mode == "editing"
        );
    }

    #[test]
    fn test_operations_on_unknown_entry() {
        let mut log = TranslationLog::new();
        assert_matches!(log.begin_edit(9), Err(TranslateError::EntryNotFound(9)));
        assert_matches!(log.begin_retry(9), Err(TranslateError::EntryNotFound(9)));
    }

    #[test]
    fn test_save_edit_outside_editing_is_rejected() {
        let mut log = TranslationLog::new();
        log.append(payload(1, "a", "b")).unwrap();
        assert_matches!(log.save_edit(1), Err(TranslateError::EntryBusy(1, _)));
    }

    #[test]
    fn test_clear_for_new_session() {
        let mut log = TranslationLog::new();
        log.append(payload(1, "a", "b")).unwrap();
        log.clear();
        assert!(log.is_empty());
        assert!(log.get(1).is_none());
        // 清空后同一序号可以重新出现
        log.append(payload(1, "a", "b")).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_assemble_translated_includes_committed_edits() {
        let mut log = TranslationLog::new();
        log.append(payload(1, "one", "yek")).unwrap();
        log.append(payload(2, "two", "do")).unwrap();

        log.begin_edit(2).unwrap();
        log.set_edit_buffer(2, "DO").unwrap();
        log.save_edit(2).unwrap();

        let assembled = log.assemble_translated();
        let blocks: Vec<&str> = assembled.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("1\n"));
        assert!(blocks[0].ends_with("\nyek"));
        assert!(blocks[1].ends_with("\nDO"));

        let original = log.assemble_original();
        assert!(original.contains("\ntwo"));
        assert!(!original.contains("DO"));
    }
}
