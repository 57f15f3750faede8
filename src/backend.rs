//! 后端客户端
//!
//! 两个后端调用的唯一出口：流式任务提交（multipart 表单，返回 SSE
//! 字节流）与单条重试（JSON 单次请求/响应）。通过 trait 注入，
//! 管线可以用脚本化假实现离线测试。

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{TranslateError, TranslateResult};
use crate::types::TranslationJob;

/// SSE 响应体字节流
pub type ByteStream = Pin<Box<dyn Stream<Item = TranslateResult<Bytes>> + Send>>;

/// 后端调用接口
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// 提交翻译任务，返回事件流的原始字节流
    async fn start_stream(
        &self,
        job: &TranslationJob,
        credential: &str,
        prompt: &str,
    ) -> TranslateResult<ByteStream>;

    /// 单条重试，返回新译文
    async fn retry_chunk(
        &self,
        credential: &str,
        model: &str,
        original_text: &str,
        prompt: &str,
    ) -> TranslateResult<String>;
}

#[derive(Serialize)]
struct RetryRequest<'a> {
    api_key: &'a str,
    model_name: &'a str,
    original_text: &'a str,
    custom_prompt: &'a str,
}

#[derive(Deserialize)]
struct RetryResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    translated_text: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// reqwest 实现
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> TranslateResult<Self> {
        // 只限制连接建立：整体超时会截断长时间运行的事件流
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TranslateError::Connection(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn start_stream(
        &self,
        job: &TranslationJob,
        credential: &str,
        prompt: &str,
    ) -> TranslateResult<ByteStream> {
        let file_part = reqwest::multipart::Part::text(job.srt_content.clone())
            .file_name(job.file_name.clone())
            .mime_str("application/x-subrip")
            .map_err(|e| TranslateError::Connection(format!("invalid upload part: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("api_key", credential.to_string())
            .text("model_name", job.model.clone())
            .text("custom_prompt", prompt.to_string());

        let response = self
            .client
            .post(format!("{}/api/translate", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranslateError::Connection(format!("translate request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("[Backend] Translate request rejected: {} - {}", status, body);
            let user_message = match status.as_u16() {
                400 => "Missing required data in request",
                401 | 403 => "API key was rejected by the server",
                500..=599 => "Translation service is temporarily unavailable",
                _ => "Failed to start translation",
            };
            return Err(TranslateError::Connection(format!(
                "{} ({})",
                user_message, status
            )));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TranslateError::Stream(format!("stream read failed: {}", e))));
        Ok(Box::pin(stream))
    }

    async fn retry_chunk(
        &self,
        credential: &str,
        model: &str,
        original_text: &str,
        prompt: &str,
    ) -> TranslateResult<String> {
        let request = RetryRequest {
            api_key: credential,
            model_name: model,
            original_text,
            custom_prompt: prompt,
        };

        let response = self
            .client
            .post(format!("{}/api/retry-chunk", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslateError::Retry(format!("retry request failed: {}", e)))?;

        let status = response.status();
        let body: RetryResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Retry(format!("invalid retry response: {}", e)))?;

        if !status.is_success() || !body.success {
            let message = body
                .message
                .unwrap_or_else(|| format!("retry request failed ({})", status));
            return Err(TranslateError::Retry(message));
        }

        body.translated_text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| TranslateError::Retry("empty translation in retry response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse_decoder::SseFrameDecoder;
    use crate::types::StreamEvent;

    fn job() -> TranslationJob {
        TranslationJob {
            file_name: "movie.srt".to_string(),
            srt_content: "1\n00:00:01,000 --> 00:00:02,000\nhello\n".to_string(),
            model: "gemini-1.5-flash".to_string(),
            prompt_override: None,
        }
    }

    #[tokio::test]
    async fn test_retry_chunk_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/retry-chunk")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"success":true,"translated_text":"سلام دوباره"}"#)
            .create_async()
            .await;

        let backend = HttpBackend::new(server.url()).unwrap();
        let translated = backend
            .retry_chunk("key-1", "gemini-1.5-flash", "hello again", "prompt")
            .await
            .unwrap();

        assert_eq!(translated, "سلام دوباره");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_chunk_server_error_surfaces_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/retry-chunk")
            .with_status(500)
            .with_body(r#"{"success":false,"message":"model overloaded"}"#)
            .create_async()
            .await;

        let backend = HttpBackend::new(server.url()).unwrap();
        let result = backend.retry_chunk("key-1", "m", "text", "p").await;

        match result {
            Err(TranslateError::Retry(message)) => assert_eq!(message, "model overloaded"),
            other => panic!("expected retry error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_retry_chunk_empty_translation_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/retry-chunk")
            .with_status(200)
            .with_body(r#"{"success":true,"translated_text":"  "}"#)
            .create_async()
            .await;

        let backend = HttpBackend::new(server.url()).unwrap();
        assert!(matches!(
            backend.retry_chunk("k", "m", "t", "p").await,
            Err(TranslateError::Retry(_))
        ));
    }

    #[tokio::test]
    async fn test_start_stream_rejection_maps_to_connection_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/translate")
            .with_status(400)
            .with_body(r#"data: {"type":"error","message":"Missing required data in request."}"#)
            .create_async()
            .await;

        let backend = HttpBackend::new(server.url()).unwrap();
        let result = backend.start_stream(&job(), "key-1", "prompt").await;

        match result {
            Err(TranslateError::Connection(message)) => {
                assert!(message.contains("Missing required data"));
            }
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_start_stream_body_decodes_to_events() {
        let body = concat!(
            "data: {\"type\":\"progress\",\"number\":\"1\",\"timestamp\":\"00:00:01,000 --> 00:00:02,000\",\"original_text\":\"hello\",\"translated_text\":\"salam\"}\n\n",
            "data: {\"type\":\"done\",\"filename\":\"movie_fa.srt\"}\n\n",
        );
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/translate")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let backend = HttpBackend::new(server.url()).unwrap();
        let mut stream = backend.start_stream(&job(), "key-1", "prompt").await.unwrap();

        let mut decoder = SseFrameDecoder::new();
        let mut events = Vec::new();
        while let Some(chunk) = stream.next().await {
            events.extend(decoder.feed(&chunk.unwrap()));
        }

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Progress(p) if p.number == 1));
        assert!(matches!(&events[1], StreamEvent::Done(_)));
    }
}
