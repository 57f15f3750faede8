//! 会话控制器
//!
//! 一次翻译会话的生命周期：启动、驱动事件流到终态、取消、单条重试。
//!
//! 取消是协作式的：取消令牌触发后，驱动循环停止拉取后续分块，
//! 传输层请求随之中止。取消是用户要求的终态，按提示而非失败呈现。
//!
//! 所有共享状态都在锁内短暂访问，锁从不跨越 await 点；
//! 事件回调一律在锁外发出，订阅方可以安全地回调控制器。

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::credential_pool::{mask_key, CredentialPool};
use crate::dispatcher::{classify_stream_error, dispatch_event, Dispatch};
use crate::error::{TranslateError, TranslateResult};
use crate::events::{NoticeLevel, SessionEventSink};
use crate::sse_decoder::SseFrameDecoder;
use crate::stores::{CredentialStore, PromptStore};
use crate::translation_log::TranslationLog;
use crate::types::{LogEntry, SessionOutcome, SessionState, SessionSummary, TranslationJob};

use futures_util::StreamExt;

/// 控制器依赖（注入的协作者）
pub struct SessionDeps {
    pub backend: Arc<dyn BackendClient>,
    pub credentials: Arc<dyn CredentialStore>,
    pub prompts: Arc<dyn PromptStore>,
    pub sink: Arc<dyn SessionEventSink>,
}

/// 会话控制器
pub struct SessionController {
    deps: SessionDeps,
    pool: Mutex<CredentialPool>,
    log: Mutex<TranslationLog>,
    state: Mutex<SessionState>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SessionController {
    pub fn new(deps: SessionDeps) -> Self {
        let pool = CredentialPool::new(deps.credentials.clone());
        Self {
            deps,
            pool: Mutex::new(pool),
            log: Mutex::new(TranslationLog::new()),
            state: Mutex::new(SessionState::Idle),
            cancel: Mutex::new(None),
        }
    }

    /// 当前会话状态（只读，供 UI 反映）
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// 当前日志条目快照（到达顺序）
    pub fn entries(&self) -> Vec<LogEntry> {
        lock(&self.log).entries().to_vec()
    }

    /// 汇总完整译文文档（含用户已提交的编辑）
    pub fn assemble_translated(&self) -> String {
        lock(&self.log).assemble_translated()
    }

    /// 汇总完整原文文档
    pub fn assemble_original(&self) -> String {
        lock(&self.log).assemble_original()
    }

    // ------------------------------------------------------------
    // Key 池管理（侧边栏交互）
    // ------------------------------------------------------------

    pub fn add_credential(&self, key: &str) -> TranslateResult<bool> {
        lock(&self.pool).add(key)
    }

    pub fn remove_credential(&self, index: usize) -> TranslateResult<String> {
        lock(&self.pool).remove(index)
    }

    pub fn credential_count(&self) -> TranslateResult<usize> {
        lock(&self.pool).len()
    }

    /// 掩码后的 Key 列表（展示用，不暴露完整 Key）
    pub fn masked_credentials(&self) -> TranslateResult<Vec<String>> {
        lock(&self.pool).masked()
    }

    // ------------------------------------------------------------
    // 条目编辑（纯本地，不回传后端）
    // ------------------------------------------------------------

    pub fn begin_edit(&self, number: u64) -> TranslateResult<()> {
        let entry = lock(&self.log).begin_edit(number)?.clone();
        self.deps.sink.entry_updated(&entry);
        Ok(())
    }

    pub fn set_edit_buffer(&self, number: u64, text: &str) -> TranslateResult<()> {
        lock(&self.log).set_edit_buffer(number, text)
    }

    pub fn save_edit(&self, number: u64) -> TranslateResult<()> {
        let entry = lock(&self.log).save_edit(number)?.clone();
        self.deps.sink.entry_updated(&entry);
        Ok(())
    }

    pub fn cancel_edit(&self, number: u64) -> TranslateResult<()> {
        let entry = lock(&self.log).cancel_edit(number)?.clone();
        self.deps.sink.entry_updated(&entry);
        Ok(())
    }

    // ------------------------------------------------------------
    // 会话生命周期
    // ------------------------------------------------------------

    /// 启动一次翻译会话并驱动到终态
    ///
    /// 活跃会话存在时拒绝；Key 池为空时在任何网络调用前失败，
    /// 此时会话状态保持不变。终态（完成/取消/失败）后允许再次启动，
    /// 新会话开始时清空上一轮日志。
    pub async fn start(&self, job: TranslationJob) -> TranslateResult<SessionSummary> {
        if self.state().is_live() {
            return Err(TranslateError::AlreadyRunning);
        }

        let next_credential = lock(&self.pool).next()?;
        let credential = match next_credential {
            Some(credential) => credential,
            None => {
                self.deps.sink.notice(
                    NoticeLevel::Danger,
                    "Please add at least one API key before starting a translation.",
                );
                return Err(TranslateError::NoCredential);
            }
        };

        let prompt = match &job.prompt_override {
            Some(prompt) => prompt.clone(),
            None => self.deps.prompts.get_active_prompt()?,
        };

        let session_id = Uuid::new_v4().to_string();
        log::info!(
            "[Session] {} starting: file={}, model={}, key={}",
            session_id,
            job.file_name,
            job.model,
            mask_key(&credential)
        );

        lock(&self.log).clear();

        // 令牌先于 Connecting 就位，cancel() 在整个活跃期内都能命中
        let token = CancellationToken::new();
        *lock(&self.cancel) = Some(token.clone());
        // 无论循环正常结束、提前返回还是 panic，令牌槽都会被清空
        let _guard = CancelSlotGuard { slot: &self.cancel };

        self.set_state(SessionState::Connecting);
        self.deps.sink.notice(NoticeLevel::Info, "Connecting to stream...");

        let result = self.drive_stream(&session_id, &job, &credential, &prompt, &token).await;

        match result {
            Ok(outcome) => {
                let entry_count = lock(&self.log).len();
                match &outcome {
                    SessionOutcome::Completed { filename } => {
                        self.set_state(SessionState::Completed);
                        self.deps
                            .sink
                            .notice(NoticeLevel::Success, "Translation completed.");
                        log::info!(
                            "[Session] {} completed: {} entr(ies), output={:?}",
                            session_id,
                            entry_count,
                            filename
                        );
                    }
                    SessionOutcome::Cancelled => {
                        self.set_state(SessionState::Cancelled);
                        self.deps
                            .sink
                            .notice(NoticeLevel::Warning, "Translation stopped by user.");
                        log::info!("[Session] {} cancelled by user", session_id);
                    }
                }
                Ok(SessionSummary {
                    session_id,
                    outcome,
                    entry_count,
                    finished_at: chrono::Utc::now().to_rfc3339(),
                })
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                log::warn!("[Session] {} failed: {}", session_id, e);
                Err(e)
            }
        }
    }

    /// 取消当前会话
    ///
    /// 仅在 Connecting/Streaming 阶段有效，返回是否实际触发了取消。
    pub fn cancel(&self) -> bool {
        if !self.state().is_live() {
            log::warn!(
                "[Session] Cancel requested but no live session (state: {:?})",
                self.state()
            );
            return false;
        }
        let slot = lock(&self.cancel);
        match slot.as_ref() {
            Some(token) => {
                token.cancel();
                log::info!("[Session] Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// 单条重试（独立于主流的旁路操作，只影响目标条目）
    ///
    /// 先将条目置为重试态（同条目的并发重试在这里被拒绝），
    /// Key 池为空时在任何网络调用前中止并把条目还原为查看态。
    pub async fn retry_entry(&self, number: u64, model: &str) -> TranslateResult<String> {
        let original_text = {
            let mut log = lock(&self.log);
            let entry = log.begin_retry(number)?.clone();
            drop(log);
            self.deps.sink.entry_updated(&entry);
            entry.original_text
        };

        let result = self.perform_retry(number, model, &original_text).await;

        match result {
            Ok(translated) => {
                let entry = lock(&self.log).complete_retry(number, translated.clone())?.clone();
                self.deps.sink.entry_updated(&entry);
                log::info!("[Session] Retry for entry {} succeeded", number);
                Ok(translated)
            }
            Err(e) => {
                let reverted = lock(&self.log).fail_retry(number).map(|entry| entry.clone());
                if let Ok(entry) = reverted {
                    self.deps.sink.entry_updated(&entry);
                }
                let message = match &e {
                    TranslateError::NoCredential => "No API key available for retry.".to_string(),
                    other => format!("Retry failed: {}", other),
                };
                self.deps.sink.notice(NoticeLevel::Danger, &message);
                Err(e)
            }
        }
    }

    async fn perform_retry(
        &self,
        number: u64,
        model: &str,
        original_text: &str,
    ) -> TranslateResult<String> {
        let next_credential = lock(&self.pool).next()?;
        let credential = match next_credential {
            Some(credential) => credential,
            None => {
                log::warn!(
                    "[Session] Retry for entry {} aborted: credential pool is empty",
                    number
                );
                return Err(TranslateError::NoCredential);
            }
        };
        let prompt = self.deps.prompts.get_active_prompt()?;
        log::info!(
            "[Session] Retrying entry {} with model {} (key {})",
            number,
            model,
            mask_key(&credential)
        );
        self.deps
            .backend
            .retry_chunk(&credential, model, original_text, &prompt)
            .await
    }

    // ------------------------------------------------------------
    // 内部：流驱动
    // ------------------------------------------------------------

    /// 建立连接并消费事件流直到终态
    async fn drive_stream(
        &self,
        session_id: &str,
        job: &TranslationJob,
        credential: &str,
        prompt: &str,
        token: &CancellationToken,
    ) -> TranslateResult<SessionOutcome> {
        let connect = tokio::select! {
            _ = token.cancelled() => return Ok(SessionOutcome::Cancelled),
            connect = self.deps.backend.start_stream(job, credential, prompt) => connect,
        };

        let mut stream = match connect {
            Ok(stream) => stream,
            Err(e) => {
                self.deps.sink.notice(
                    NoticeLevel::Danger,
                    &format!("Failed to start translation: {}", e),
                );
                return Err(e);
            }
        };

        let mut decoder = SseFrameDecoder::new();
        let mut first_chunk = true;

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => {
                    // 用户取消：停止拉取，丢弃流即中止传输层请求
                    return Ok(SessionOutcome::Cancelled);
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    if first_chunk {
                        first_chunk = false;
                        self.set_state(SessionState::Streaming);
                        self.deps.sink.notice(
                            NoticeLevel::Success,
                            "Connection successful. Receiving translation data...",
                        );
                    }
                    for event in decoder.feed(&bytes) {
                        let dispatch = {
                            let mut log = lock(&self.log);
                            dispatch_event(event, &mut log)
                        };
                        match dispatch {
                            Dispatch::Appended(entry) => self.deps.sink.entry_appended(&entry),
                            Dispatch::Ignored => {}
                            Dispatch::Completed { filename } => {
                                return Ok(SessionOutcome::Completed { filename });
                            }
                            Dispatch::Failed { message } => {
                                // 错误事件终止会话：中止在途请求并按失败呈现
                                token.cancel();
                                self.deps
                                    .sink
                                    .notice(NoticeLevel::Danger, &format!("Stream error: {}", message));
                                return Err(TranslateError::Stream(message));
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    // 传输层中断按流错误处理（同样做配额分类）
                    let message = classify_stream_error(&e.to_string());
                    self.deps
                        .sink
                        .notice(NoticeLevel::Danger, &format!("Stream error: {}", message));
                    return Err(TranslateError::Stream(message));
                }
                None => {
                    if let Some(residual) = decoder.finish() {
                        log::debug!(
                            "[Session] {} discarding incomplete trailing frame ({} byte(s))",
                            session_id,
                            residual.len()
                        );
                    }
                    // done 事件缺失但流正常收尾：按完成处理
                    log::debug!(
                        "[Session] {} stream ended without done event, treating as completed",
                        session_id
                    );
                    return Ok(SessionOutcome::Completed { filename: None });
                }
            }
        }
    }

    fn set_state(&self, next: SessionState) {
        *lock(&self.state) = next;
        self.deps.sink.session_changed(next);
    }
}

/// RAII：作用域结束时清空取消令牌槽
struct CancelSlotGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for CancelSlotGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

/// 带毒化恢复的加锁
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::error!("[Session] Mutex poisoned, recovering");
        poisoned.into_inner()
    })
}
