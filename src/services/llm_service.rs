//! LLM 服务 - 业务能力层
//!
//! 只负责"把提示词发给模型、拿回文本"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Gemini、Azure、Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};

/// 文本生成能力
///
/// 流程层只依赖这个 trait，测试时可以换成脚本化的实现
pub trait Generator: Send + Sync + 'static {
    /// 发送提示词（可附带文档/图片地址），返回模型的原始文本输出
    fn generate(
        &self,
        prompt: &str,
        attachments: &[String],
    ) -> impl Future<Output = AppResult<String>> + Send;
}

/// LLM 服务
///
/// 职责：
/// - 调用兼容 OpenAI 的 chat completion 接口
/// - 配额/频率限制时按线性退避重试
/// - 不解析输出，不关心批次
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    retry_delay: Duration,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            max_retries: config.llm_max_retries.max(1),
            retry_delay: Duration::from_millis(config.llm_retry_delay_ms),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 单次调用
    async fn send_once(&self, prompt: &str, attachments: &[String]) -> AppResult<String> {
        let build_failed = |e: async_openai::error::OpenAIError| LlmError::RequestBuildFailed {
            model: self.model_name.clone(),
            source: Box::new(e),
        };

        // 有附件时使用多部分内容：先文本，后附件
        let user_msg = if attachments.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(build_failed)?
        } else {
            let mut content_parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            )];
            for url in attachments {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }
            debug!("附带 {} 个附件", attachments.len());

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
                .map_err(build_failed)?
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(build_failed)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::llm_api_failed(&self.model_name, e))?;

        let choice = response.choices.first().ok_or_else(|| LlmError::EmptyResponse {
            model: self.model_name.clone(),
        })?;

        match choice.message.content.as_deref().map(str::trim) {
            Some(content) if !content.is_empty() => Ok(content.to_string()),
            _ => Err(LlmError::EmptyContent {
                model: self.model_name.clone(),
            }
            .into()),
        }
    }
}

impl Generator for LlmService {
    async fn generate(&self, prompt: &str, attachments: &[String]) -> AppResult<String> {
        debug!(
            "调用 LLM API，模型: {}，提示词长度: {} 字符",
            self.model_name,
            prompt.len()
        );

        let mut attempt = 1;
        loop {
            match self.send_once(prompt, attachments).await {
                Ok(content) => {
                    debug!("LLM API 调用成功 (第 {} 次尝试)", attempt);
                    return Ok(content);
                }
                Err(e) if is_rate_limit_message(&e.to_string()) => {
                    if attempt >= self.max_retries {
                        return Err(LlmError::RateLimited {
                            model: self.model_name.clone(),
                            attempts: attempt,
                            message: e.to_string(),
                        }
                        .into());
                    }
                    let wait = self.retry_delay * attempt;
                    warn!(
                        "⏳ 触发配额/频率限制，{:?} 后重试 ({}/{}): {}",
                        wait, attempt, self.max_retries, e
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("LLM API 调用失败: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

/// 错误信息是否表示配额或频率限制
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    message.contains("429")
        || message.contains("RESOURCE_EXHAUSTED")
        || lower.contains("quota")
        || lower.contains("rate limit")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> LlmService {
        let config = Config {
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            ..Config::default()
        };
        LlmService::new(&config)
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limit_message("HTTP 429 Too Many Requests"));
        assert!(is_rate_limit_message("status: RESOURCE_EXHAUSTED"));
        assert!(is_rate_limit_message("You exceeded your current Quota"));
        assert!(is_rate_limit_message("Rate limit reached for model"));
        assert!(!is_rate_limit_message("invalid api key"));
        assert!(!is_rate_limit_message("resource_exhausted"));
    }

    #[test]
    fn test_service_reads_config() {
        let service = create_test_service();
        assert_eq!(service.model_name(), Config::default().llm_model_name);
        assert_eq!(service.max_retries, 3);
        assert_eq!(service.retry_delay, Duration::from_millis(2000));
    }

    /// 测试真实 LLM 调用
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_generate_live -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_generate_live() {
        let _ = tracing_subscriber::fmt::try_init();

        let service = create_test_service();

        println!("\n========== 测试 LLM 生成 ==========");
        let result = service
            .generate("Write one short arithmetic question as a JSON object.", &[])
            .await;

        match result {
            Ok(response) => {
                println!("{}", response);
                println!("✅ LLM 调用成功！");
                assert!(!response.is_empty());
            }
            Err(e) => panic!("测试失败: {}", e),
        }
    }
}
