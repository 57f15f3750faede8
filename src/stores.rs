//! 持久化协作者
//!
//! 核心从不直接触碰磁盘：Key 池状态、激活的提示词模板、术语表
//! 都通过这里的窄接口注入。[`SettingsFile`] 是 JSON 文件实现，
//! [`MemorySettings`] 供测试替换。

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::credential_pool::CredentialState;
use crate::error::{TranslateError, TranslateResult};

/// 内置默认提示词模板（`{chunk}` 为待译文本占位符）
pub const DEFAULT_PROMPT: &str = r#"**ROLE:** You are a hyper-professional translator specializing in financial and forex trading content.

**TASK:** Translate the provided English SRT subtitle chunk into flawless, professional Persian.

**CRITICAL RULES:**
1.  **PERSIAN ONLY:** The final output MUST be exclusively in Persian. Do not include any English words or phrases unless they are part of the specialized dictionary.
2.  **TRANSLITERATE ABBREVIATIONS:** For English abbreviations and acronyms (like FVG, BOS, POI), you MUST transliterate them by spelling them out phonetically in Persian. For example:
    - "FVG" becomes "اف‌وی‌جی"
    - "BOS" becomes "بی‌او‌اس"
    - "SMT" becomes "اس‌ام‌تی"
    - "M1" becomes "ام یک"
3.  **NATURAL TONE:** The translation must sound natural and fluid to a professional Persian-speaking trader.
4.  **DICTIONARY IS KING:** Adhere strictly to the provided specialized dictionary for key terms.
5.  **NO EXTRA TEXT:** Output ONLY the translated text. Do not add any introductions, explanations, or apologies.

**CONTENT TO TRANSLATE:**
{chunk}"#;

/// Key 池持久化接口
pub trait CredentialStore: Send + Sync {
    /// 读取持久化的 Key 池状态
    fn load(&self) -> TranslateResult<CredentialState>;

    /// 覆盖写入 Key 池状态
    fn save(&self, state: &CredentialState) -> TranslateResult<()>;
}

/// 提示词模板持久化接口
pub trait PromptStore: Send + Sync {
    /// 当前激活的提示词模板（未设置时为内置默认模板）
    fn get_active_prompt(&self) -> TranslateResult<String>;

    fn set_active_prompt(&self, prompt: &str) -> TranslateResult<()>;
}

/// 术语表持久化接口
pub trait DictionaryStore: Send + Sync {
    /// 术语表键值对（保持保存时的顺序）
    fn entries(&self) -> TranslateResult<Vec<(String, String)>>;

    fn save_entries(&self, entries: &[(String, String)]) -> TranslateResult<()>;
}

/// 设置文件的磁盘格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsDocument {
    /// API Key 列表（插入序）
    #[serde(default)]
    api_keys: Vec<String>,

    /// Key 轮换游标
    #[serde(default)]
    api_key_cursor: usize,

    /// 自定义提示词模板（None 时回落到内置默认）
    #[serde(default)]
    custom_prompt: Option<String>,

    /// 术语表
    #[serde(default)]
    dictionary: Vec<(String, String)>,
}

/// JSON 设置文件存储
///
/// 单文件承载全部客户端设置。写入走临时文件加重命名，
/// 崩溃时文件要么是旧版本要么是新版本，不会出现半截内容。
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认位置：用户配置目录下 `deep-translate/settings.json`
    pub fn default_location() -> TranslateResult<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| TranslateError::Storage("no user config directory".to_string()))?;
        Ok(Self::new(dir.join("deep-translate").join("settings.json")))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read(&self) -> TranslateResult<SettingsDocument> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let doc = serde_json::from_str(&content).map_err(|e| {
                    TranslateError::Storage(format!(
                        "settings file {} is corrupt: {}",
                        self.path.display(),
                        e
                    ))
                })?;
                Ok(doc)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsDocument::default()),
            Err(e) => Err(TranslateError::Storage(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write(&self, doc: &SettingsDocument) -> TranslateResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut SettingsDocument)) -> TranslateResult<()> {
        let mut doc = self.read()?;
        apply(&mut doc);
        self.write(&doc)
    }
}

impl CredentialStore for SettingsFile {
    fn load(&self) -> TranslateResult<CredentialState> {
        let doc = self.read()?;
        Ok(CredentialState {
            keys: doc.api_keys,
            cursor: doc.api_key_cursor,
        })
    }

    fn save(&self, state: &CredentialState) -> TranslateResult<()> {
        self.update(|doc| {
            doc.api_keys = state.keys.clone();
            doc.api_key_cursor = state.cursor;
        })
    }
}

impl PromptStore for SettingsFile {
    fn get_active_prompt(&self) -> TranslateResult<String> {
        let doc = self.read()?;
        Ok(doc
            .custom_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string()))
    }

    fn set_active_prompt(&self, prompt: &str) -> TranslateResult<()> {
        self.update(|doc| {
            doc.custom_prompt = Some(prompt.to_string());
        })
    }
}

impl DictionaryStore for SettingsFile {
    fn entries(&self) -> TranslateResult<Vec<(String, String)>> {
        Ok(self.read()?.dictionary)
    }

    fn save_entries(&self, entries: &[(String, String)]) -> TranslateResult<()> {
        self.update(|doc| {
            doc.dictionary = entries.to_vec();
        })
    }
}

/// 内存设置存储（测试替身）
#[derive(Default)]
pub struct MemorySettings {
    inner: Mutex<SettingsDocument>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 Key 列表的便捷构造
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut doc = store.lock();
            doc.api_keys = keys.into_iter().map(Into::into).collect();
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SettingsDocument> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            log::error!("[MemorySettings] Mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl CredentialStore for MemorySettings {
    fn load(&self) -> TranslateResult<CredentialState> {
        let doc = self.lock();
        Ok(CredentialState {
            keys: doc.api_keys.clone(),
            cursor: doc.api_key_cursor,
        })
    }

    fn save(&self, state: &CredentialState) -> TranslateResult<()> {
        let mut doc = self.lock();
        doc.api_keys = state.keys.clone();
        doc.api_key_cursor = state.cursor;
        Ok(())
    }
}

impl PromptStore for MemorySettings {
    fn get_active_prompt(&self) -> TranslateResult<String> {
        let doc = self.lock();
        Ok(doc
            .custom_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string()))
    }

    fn set_active_prompt(&self, prompt: &str) -> TranslateResult<()> {
        self.lock().custom_prompt = Some(prompt.to_string());
        Ok(())
    }
}

impl DictionaryStore for MemorySettings {
    fn entries(&self) -> TranslateResult<Vec<(String, String)>> {
        Ok(self.lock().dictionary.clone())
    }

    fn save_entries(&self, entries: &[(String, String)]) -> TranslateResult<()> {
        self.lock().dictionary = entries.to_vec();
        Ok(())
    }
}
