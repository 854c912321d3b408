//! 批次处理流程 - 流程层
//!
//! 核心职责：定义"一个批次"的完整处理流程
//!
//! 流程顺序：
//! 1. 渲染提示词 → 调用生成
//! 2. （可选）提取核心技能元数据
//! 3. 按分隔符切分片段
//! 4. （可选）逐题并发校验，失败时回退到原片段
//! 5. 逐题解析、规范化；单题失败不影响同批次其他题目

use futures::future::join_all;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{BatchError, FragmentError};
use crate::models::{question_key, Batch, CanonicalRecord, QuestionSpec, QuestionType};
use crate::services::{
    extract_core_skill_metadata, normalize_record, parse_fragment, split_fragments,
    CoreSkillMetadata, Generator, PromptBuilder,
};
use crate::utils::logging::truncate_text;
use crate::workflow::batch_ctx::BatchCtx;

/// 单道题的处理结果
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOutcome {
    /// 批次内题目键，如 "question2"
    pub key: String,
    /// 对应的请求下标；模型多输出的片段没有对应请求
    pub source_index: Option<usize>,
    /// 片段原文（重新生成时作为上下文）
    pub fragment: String,
    pub result: Result<CanonicalRecord, FragmentError>,
    /// 是否经过校验并采用了校验后的内容
    pub validated: bool,
}

impl QuestionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn record(&self) -> Option<&CanonicalRecord> {
        self.result.as_ref().ok()
    }
}

impl Serialize for QuestionOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("QuestionOutcome", 4)?;
        state.serialize_field("key", &self.key)?;
        state.serialize_field("source_index", &self.source_index)?;
        state.serialize_field("validated", &self.validated)?;
        match &self.result {
            Ok(record) => state.serialize_field("record", record)?,
            Err(e) => state.serialize_field("error", &e.to_string())?,
        }
        state.end()
    }
}

/// 单个批次的处理结果
///
/// 批次级错误（生成失败、任务异常）时 `questions` 为空，`error` 有值
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchOutcome {
    pub batch_key: String,
    pub question_type: QuestionType,
    pub source_indices: Vec<usize>,
    pub questions: Vec<QuestionOutcome>,
    #[serde(
        serialize_with = "serialize_batch_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<BatchError>,
    #[serde(skip_serializing_if = "CoreSkillMetadata::is_empty")]
    pub core_skill_metadata: CoreSkillMetadata,
}

impl BatchOutcome {
    /// 批次级失败
    pub fn failed(batch: &Batch, error: BatchError) -> Self {
        Self {
            batch_key: batch.key().to_string(),
            question_type: batch.question_type(),
            source_indices: batch.entries().iter().map(|e| e.source_index).collect(),
            questions: Vec::new(),
            error: Some(error),
            core_skill_metadata: CoreSkillMetadata::default(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 成功规范化的题目数
    pub fn succeeded(&self) -> usize {
        self.questions.iter().filter(|q| q.is_ok()).count()
    }

    /// 失败的题目数（批次级失败时为整批题目数）
    pub fn failed_count(&self) -> usize {
        if self.error.is_some() {
            self.source_indices.len()
        } else {
            self.questions.iter().filter(|q| !q.is_ok()).count()
        }
    }
}

fn serialize_batch_error<S: Serializer>(
    error: &Option<BatchError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// 批次处理流程
///
/// - 编排一个批次的完整处理流程
/// - 只依赖业务能力（services）
/// - 不返回错误：批次级失败记录在 [`BatchOutcome::error`] 中
pub struct BatchFlow<G: Generator> {
    generator: Arc<G>,
    prompts: Arc<PromptBuilder>,
    validation_enabled: bool,
    core_skill_enabled: bool,
    verbose_logging: bool,
}

impl<G: Generator> Clone for BatchFlow<G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            prompts: Arc::clone(&self.prompts),
            validation_enabled: self.validation_enabled,
            core_skill_enabled: self.core_skill_enabled,
            verbose_logging: self.verbose_logging,
        }
    }
}

impl<G: Generator> BatchFlow<G> {
    pub fn new(generator: Arc<G>, prompts: Arc<PromptBuilder>, config: &Config) -> Self {
        Self {
            generator,
            prompts,
            validation_enabled: config.validation_enabled,
            core_skill_enabled: config.core_skill_enabled,
            verbose_logging: config.verbose_logging,
        }
    }

    pub(crate) fn generator(&self) -> &G {
        &self.generator
    }

    pub(crate) fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub async fn run(
        &self,
        batch: &Batch,
        ctx: &BatchCtx,
        previous_metadata: Option<&CoreSkillMetadata>,
    ) -> BatchOutcome {
        info!("{} 📝 开始生成 {} 道题", ctx, batch.len());

        let prompt = self.prompts.render_batch(batch, previous_metadata);
        let raw = match self.generator.generate(&prompt.text, &prompt.attachments).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.is_rate_limited() {
                    error!("{} ❌ 配额/频率限制，重试后仍失败: {}", ctx, e);
                } else {
                    error!("{} ❌ 生成失败: {}", ctx, e);
                }
                return BatchOutcome::failed(
                    batch,
                    BatchError::GenerationFailed {
                        message: e.to_string(),
                    },
                );
            }
        };

        if self.verbose_logging {
            debug!("{} 原始输出: {}", ctx, truncate_text(&raw, 300));
        }

        let core_skill_metadata = if self.core_skill_enabled {
            extract_core_skill_metadata(&raw)
        } else {
            CoreSkillMetadata::default()
        };

        let questions = self.process_response(batch, ctx, &raw).await;

        let outcome = BatchOutcome {
            batch_key: batch.key().to_string(),
            question_type: batch.question_type(),
            source_indices: batch.entries().iter().map(|e| e.source_index).collect(),
            questions,
            error: None,
            core_skill_metadata,
        };

        info!(
            "{} ✓ 完成: 成功 {}/{}",
            ctx,
            outcome.succeeded(),
            outcome.questions.len()
        );

        outcome
    }

    /// 把一次生成的原始输出转换为逐题结果
    pub async fn process_response(
        &self,
        batch: &Batch,
        ctx: &BatchCtx,
        raw: &str,
    ) -> Vec<QuestionOutcome> {
        let fragments = split_fragments(raw);
        if fragments.len() != batch.len() {
            warn!(
                "{} ⚠️ 片段数 {} 与题目数 {} 不一致",
                ctx,
                fragments.len(),
                batch.len()
            );
        }

        let validated_texts: Vec<Option<String>> = if self.validation_enabled {
            let tasks = fragments.iter().enumerate().map(|(i, fragment)| {
                let spec = batch.entries().get(i).map(|e| &e.spec);
                self.validate_fragment(ctx, i, fragment, spec)
            });
            join_all(tasks).await
        } else {
            vec![None; fragments.len()]
        };

        let count = fragments.len().max(batch.len());
        (0..count)
            .map(|i| {
                let key = question_key(i);
                let source_index = batch.entries().get(i).map(|e| e.source_index);

                let Some(fragment) = fragments.get(i) else {
                    warn!("{} ⚠️ {} 缺失", ctx, key);
                    return QuestionOutcome {
                        key,
                        source_index,
                        fragment: String::new(),
                        result: Err(FragmentError::Missing),
                        validated: false,
                    };
                };

                let (parsed, validated) = match validated_texts[i].as_deref().map(parse_fragment) {
                    Some(Ok(map)) => (Ok(map), true),
                    Some(Err(e)) => {
                        warn!("{} ⚠️ {} 校验结果无法解析，使用原片段: {}", ctx, key, e);
                        (parse_fragment(fragment), false)
                    }
                    None => (parse_fragment(fragment), false),
                };

                let result = parsed.map(|map| normalize_record(&map));
                if let Err(e) = &result {
                    warn!("{} ⚠️ {} 解析失败: {}", ctx, key, e);
                }

                QuestionOutcome {
                    key,
                    source_index,
                    fragment: fragment.clone(),
                    result,
                    validated,
                }
            })
            .collect()
    }

    /// 校验单道题，调用失败返回 None
    async fn validate_fragment(
        &self,
        ctx: &BatchCtx,
        index: usize,
        fragment: &str,
        spec: Option<&QuestionSpec>,
    ) -> Option<String> {
        let prompt = self.prompts.render_validation(fragment, spec);
        match self.generator.generate(&prompt, &[]).await {
            Ok(text) => {
                debug!("{} {} 校验完成", ctx, question_key(index));
                Some(text)
            }
            Err(e) => {
                warn!(
                    "{} ⚠️ {} 校验调用失败，使用未校验内容: {}",
                    ctx,
                    question_key(index),
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::models::CanonicalField;
    use crate::services::batch_packer::pack;
    use crate::services::QUESTION_DELIMITER;
    use std::sync::Mutex;

    /// 按顺序返回预设响应的生成器
    struct ScriptedGenerator {
        responses: Mutex<Vec<AppResult<String>>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<AppResult<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
            }
        }
    }

    impl Generator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str, _attachments: &[String]) -> AppResult<String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(AppError::Other("没有更多预设响应".to_string())))
        }
    }

    fn mcq_batch(n: usize) -> Batch {
        let specs: Vec<QuestionSpec> = (0..n)
            .map(|_| QuestionSpec::new(QuestionType::Mcq, "ratios"))
            .collect();
        pack(&specs, 4).unwrap().remove(0)
    }

    fn flow(generator: ScriptedGenerator, config: &Config) -> BatchFlow<ScriptedGenerator> {
        BatchFlow::new(
            Arc::new(generator),
            Arc::new(PromptBuilder::new("", "")),
            config,
        )
    }

    fn response(fragments: &[&str]) -> String {
        fragments
            .iter()
            .map(|f| format!("{}\n{}\n", QUESTION_DELIMITER, f))
            .collect()
    }

    #[tokio::test]
    async fn test_bad_fragment_does_not_affect_siblings() {
        let raw = response(&[
            r#"{"Question": "Q1", "Correct_Answer": "A"}"#,
            r#"{"question_text": "Q2"}"#,
            r#"{"question": "Q3", "options": ["a", "b"#,
            r#"{"QUESTION": "Q4"}"#,
        ]);
        let flow = flow(ScriptedGenerator::new(vec![Ok(raw)]), &Config::default());
        let batch = mcq_batch(4);
        let outcome = flow.run(&batch, &BatchCtx::new(batch.key(), 1, 1), None).await;

        assert!(outcome.is_ok());
        assert_eq!(outcome.questions.len(), 4);
        assert_eq!(outcome.succeeded(), 3);
        assert!(matches!(
            outcome.questions[2].result,
            Err(FragmentError::Malformed { .. })
        ));
        assert_eq!(
            outcome.questions[3].record().unwrap().text(CanonicalField::Question).as_deref(),
            Some("Q4")
        );
        assert_eq!(outcome.questions[3].source_index, Some(3));
    }

    #[tokio::test]
    async fn test_missing_fragments_reported() {
        let raw = response(&[r#"{"question": "only one"}"#]);
        let flow = flow(ScriptedGenerator::new(vec![Ok(raw)]), &Config::default());
        let batch = mcq_batch(2);
        let outcome = flow.run(&batch, &BatchCtx::new(batch.key(), 1, 1), None).await;

        assert_eq!(outcome.questions.len(), 2);
        assert_eq!(outcome.questions[1].result, Err(FragmentError::Missing));
        assert_eq!(outcome.failed_count(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_fails_whole_batch() {
        let flow = flow(
            ScriptedGenerator::new(vec![Err(AppError::Other("boom".to_string()))]),
            &Config::default(),
        );
        let batch = mcq_batch(2);
        let outcome = flow.run(&batch, &BatchCtx::new(batch.key(), 1, 1), None).await;

        assert!(matches!(outcome.error, Some(BatchError::GenerationFailed { .. })));
        assert!(outcome.questions.is_empty());
        assert_eq!(outcome.failed_count(), 2);
    }

    #[tokio::test]
    async fn test_validation_replaces_and_falls_back() {
        let config = Config {
            validation_enabled: true,
            ..Config::default()
        };
        let raw = response(&[r#"{"question": "draft 1"}"#, r#"{"question": "draft 2"}"#]);
        // 生成、校验1成功、校验2失败（join_all 按顺序轮询，脚本按调用顺序弹出）
        let flow = flow(
            ScriptedGenerator::new(vec![
                Ok(raw),
                Ok(r#"{"question": "fixed 1"}"#.to_string()),
                Err(AppError::Other("quota".to_string())),
            ]),
            &config,
        );
        let batch = mcq_batch(2);
        let outcome = flow.run(&batch, &BatchCtx::new(batch.key(), 1, 1), None).await;

        let q1 = &outcome.questions[0];
        assert!(q1.validated);
        assert_eq!(q1.record().unwrap().text(CanonicalField::Question).as_deref(), Some("fixed 1"));

        let q2 = &outcome.questions[1];
        assert!(!q2.validated);
        assert_eq!(q2.record().unwrap().text(CanonicalField::Question).as_deref(), Some("draft 2"));
    }

    #[tokio::test]
    async fn test_core_skill_metadata_extracted() {
        let config = Config {
            core_skill_enabled: true,
            ..Config::default()
        };
        let raw = format!(
            "{}{}",
            response(&[r#"{"question": "Q1"}"#]),
            r#"{"batch_summary": "nth term"}"#
        );
        let flow = flow(ScriptedGenerator::new(vec![Ok(raw)]), &config);
        let batch = mcq_batch(1);
        let outcome = flow.run(&batch, &BatchCtx::new(batch.key(), 1, 1), None).await;

        assert_eq!(outcome.core_skill_metadata.get("batch_summary"), Some("nth term"));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = QuestionOutcome {
            key: "question1".to_string(),
            source_index: Some(0),
            fragment: "x".to_string(),
            result: Err(FragmentError::NoJsonObject),
            validated: false,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["key"], "question1");
        assert_eq!(value["error"], "片段中没有 JSON 对象");
        assert!(value.get("record").is_none());
    }
}
