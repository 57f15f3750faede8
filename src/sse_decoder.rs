//! SSE 帧解码器
//!
//! 把任意边界的网络字节块重组为完整事件帧并解析为 [`StreamEvent`]。
//! 块边界可能落在帧内、空行分隔符内、甚至多字节字符内部；
//! 文本解码使用流式解码器，截断的 UTF-8 序列跨块续接。
//!
//! 单帧解析失败只丢弃该帧，流继续；流结束时残留的不完整帧直接丢弃。

use encoding_rs::{CoderResult, Decoder, UTF_8};

use crate::error::{TranslateError, TranslateResult};
use crate::types::StreamEvent;

/// 负载行前缀
const DATA_PREFIX: &str = "data: ";

/// SSE 帧解码器（单遍，不可重启）
pub struct SseFrameDecoder {
    decoder: Decoder,
    buffer: String,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self {
            decoder: UTF_8.new_decoder(),
            buffer: String::new(),
        }
    }

    /// 处理新到达的字节块，返回其中所有完整帧解析出的事件
    ///
    /// 末尾可能不完整的帧保留在缓冲区，等待后续块补齐。
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.decode_bytes(chunk, false);
        self.drain_complete_frames()
    }

    /// 流结束：丢弃残留的不完整帧，返回其内容供调用方记录日志
    pub fn finish(&mut self) -> Option<String> {
        self.decode_bytes(&[], true);
        if self.buffer.is_empty() {
            return None;
        }
        let residual = std::mem::take(&mut self.buffer);
        Some(residual)
    }

    /// 流式解码一个字节块并追加到帧缓冲区
    fn decode_bytes(&mut self, bytes: &[u8], last: bool) {
        let needed = self
            .decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 16);
        self.buffer.reserve(needed);
        let (result, read, _replaced) = self.decoder.decode_to_string(bytes, &mut self.buffer, last);
        // 容量已按 max_utf8_buffer_length 预留，单次调用必然消费完输入
        debug_assert_eq!(read, bytes.len());
        debug_assert!(matches!(result, CoderResult::InputEmpty));
    }

    /// 按空行分隔符切出所有完整帧并解析
    fn drain_complete_frames(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some((at, len)) = next_delimiter(&self.buffer) {
            let frame = self.buffer[..at].to_string();
            self.buffer.drain(..at + len);
            match parse_frame(&frame) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {
                    // 无负载行的帧（注释/心跳），忽略
                }
                Err(e) => {
                    // 单帧损坏不终止流
                    log::debug!("[SseDecoder] Dropping malformed frame: {}", e);
                }
            }
        }
        events
    }
}

impl Default for SseFrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// 查找最早出现的空行分隔符，返回 (位置, 分隔符长度)
///
/// 接受 `\n\n` 与 `\r\n\r\n` 两种写法（两个连续行终止符）。
fn next_delimiter(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|at| (at, 2));
    let crlf = buffer.find("\r\n\r\n").map(|at| (at, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => {
            if b.0 < a.0 {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, b) => a.or(b),
    }
}

/// 解析单个完整帧
///
/// 取所有 `data: ` 前缀行拼接为负载（多行以 `\n` 连接），其余行忽略。
/// 无负载行返回 `Ok(None)`；负载 JSON 非法返回 `Err`，由调用方丢弃。
fn parse_frame(frame: &str) -> TranslateResult<Option<StreamEvent>> {
    let mut payload = String::new();
    for line in frame.lines() {
        if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            if !payload.is_empty() {
                payload.push('\n');
            }
            payload.push_str(data);
        }
    }

    if payload.trim().is_empty() {
        return Ok(None);
    }

    let event = serde_json::from_str::<StreamEvent>(payload.trim()).map_err(|e| {
        TranslateError::Decode(format!("{} in payload: {}", e, preview(&payload)))
    })?;
    Ok(Some(event))
}

/// 日志用负载预览（截断，避免刷屏）
fn preview(payload: &str) -> String {
    const MAX: usize = 80;
    if payload.chars().count() <= MAX {
        payload.to_string()
    } else {
        let head: String = payload.chars().take(MAX).collect();
        format!("{}...", head)
    }
}
