//! API Key 轮换池
//!
//! 维护插入序去重的 Key 列表和取模游标。每次出借后立即推进并持久化
//! 游标，崩溃重放时同一个 Key 至多被跳过一次（at-most-once 公平，
//! 不保证 exactly-once）。
//!
//! 池本身从不发起网络请求，也从不阻塞；空池返回 `None`，不编造凭据。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TranslateError, TranslateResult};
use crate::stores::CredentialStore;

/// 持久化的池状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialState {
    /// Key 列表（插入序，插入时去重）
    #[serde(default)]
    pub keys: Vec<String>,

    /// 轮换游标（对 keys.len() 取模）
    #[serde(default)]
    pub cursor: usize,
}

/// Key 轮换池
///
/// 状态在首次使用时从注入的存储惰性加载，之后所有变更同步写回。
pub struct CredentialPool {
    store: Arc<dyn CredentialStore>,
    state: Option<CredentialState>,
}

impl CredentialPool {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store, state: None }
    }

    fn state_mut(&mut self) -> TranslateResult<&mut CredentialState> {
        if self.state.is_none() {
            let mut loaded = self.store.load()?;
            // 持久化的游标可能指向已删除的位置，归一化到有效范围
            if loaded.keys.is_empty() {
                loaded.cursor = 0;
            } else {
                loaded.cursor %= loaded.keys.len();
            }
            log::debug!(
                "[CredentialPool] Loaded {} key(s), cursor at {}",
                loaded.keys.len(),
                loaded.cursor
            );
            self.state = Some(loaded);
        }
        Ok(self.state.as_mut().expect("state loaded above"))
    }

    fn persist(&mut self) -> TranslateResult<()> {
        let snapshot = self
            .state
            .clone()
            .expect("persist is only called after state_mut");
        self.store.save(&snapshot)
    }

    /// 新增 Key；重复或空白时为无操作，返回是否实际插入
    pub fn add(&mut self, key: &str) -> TranslateResult<bool> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(false);
        }
        let state = self.state_mut()?;
        if state.keys.iter().any(|existing| existing == key) {
            log::debug!("[CredentialPool] Ignoring duplicate key {}", mask_key(key));
            return Ok(false);
        }
        state.keys.push(key.to_string());
        let total = state.keys.len();
        self.persist()?;
        log::info!("[CredentialPool] Added key {} (total: {})", mask_key(key), total);
        Ok(true)
    }

    /// 按位置删除，返回被删除的 Key
    ///
    /// 删除点在游标之前时游标前移一位，保持剩余 Key 的轮换顺序不变。
    pub fn remove(&mut self, index: usize) -> TranslateResult<String> {
        let state = self.state_mut()?;
        if index >= state.keys.len() {
            return Err(TranslateError::InvalidInput(format!(
                "key index out of range: {} (pool size: {})",
                index,
                state.keys.len()
            )));
        }
        let removed = state.keys.remove(index);
        if index < state.cursor {
            state.cursor -= 1;
        }
        if state.keys.is_empty() {
            state.cursor = 0;
        } else {
            state.cursor %= state.keys.len();
        }
        self.persist()?;
        log::info!("[CredentialPool] Removed key {}", mask_key(&removed));
        Ok(removed)
    }

    /// 取下一个 Key 并推进游标
    ///
    /// 空池返回 `None`。游标推进与持久化在同一步内完成，
    /// 调用方拿到 Key 时新游标已经落盘。
    pub fn next(&mut self) -> TranslateResult<Option<String>> {
        let state = self.state_mut()?;
        if state.keys.is_empty() {
            return Ok(None);
        }
        let cursor = state.cursor % state.keys.len();
        let key = state.keys[cursor].clone();
        state.cursor = (cursor + 1) % state.keys.len();
        self.persist()?;
        log::debug!(
            "[CredentialPool] Using key index {} ({})",
            cursor,
            mask_key(&key)
        );
        Ok(Some(key))
    }

    pub fn len(&mut self) -> TranslateResult<usize> {
        Ok(self.state_mut()?.keys.len())
    }

    pub fn is_empty(&mut self) -> TranslateResult<bool> {
        Ok(self.state_mut()?.keys.is_empty())
    }

    /// 掩码后的 Key 列表（侧边栏展示用）
    pub fn masked(&mut self) -> TranslateResult<Vec<String>> {
        Ok(self.state_mut()?.keys.iter().map(|k| mask_key(k)).collect())
    }
}

/// 日志与展示用 Key 掩码：仅保留前 4 后 4 字符
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
