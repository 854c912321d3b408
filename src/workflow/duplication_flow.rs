//! 题目复制流程 - 流程层
//!
//! 以一道已生成的题目为原题，生成若干变体：
//! 渲染复制提示词 → 调用生成 → 切分变体 → 逐个解析、规范化

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::BatchError;
use crate::services::{normalize_record, parse_fragment, split_variations, Generator};
use crate::workflow::batch_ctx::BatchCtx;
use crate::workflow::batch_flow::{BatchFlow, QuestionOutcome};

/// 一个复制任务
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicationJob {
    pub batch_key: String,
    /// 原题在批次内的题目键，如 "question1"
    pub question_key: String,
    pub source_index: usize,
    /// 原题内容（原片段）
    pub original: String,
    pub count: usize,
    pub notes: Option<String>,
    pub attachments: Vec<String>,
}

/// 一个复制任务的结果
#[derive(Debug, Clone, Serialize)]
pub struct DuplicationOutcome {
    pub batch_key: String,
    pub question_key: String,
    pub requested: usize,
    pub variations: Vec<QuestionOutcome>,
    #[serde(
        serialize_with = "serialize_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<BatchError>,
}

impl DuplicationOutcome {
    pub fn failed(job: &DuplicationJob, error: BatchError) -> Self {
        Self {
            batch_key: job.batch_key.clone(),
            question_key: job.question_key.clone(),
            requested: job.count,
            variations: Vec::new(),
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.variations.iter().filter(|v| v.is_ok()).count()
    }
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<BatchError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// 变体键，如 "variation2"
pub fn variation_key(index: usize) -> String {
    format!("variation{}", index + 1)
}

impl<G: Generator> BatchFlow<G> {
    /// 执行一个复制任务
    pub async fn run_duplication(&self, job: &DuplicationJob, ctx: &BatchCtx) -> DuplicationOutcome {
        info!("{} 🧬 {} 复制 {} 个变体", ctx, job.question_key, job.count);

        let prompt = self.prompts().render_duplication(
            &job.original,
            job.count,
            job.notes.as_deref(),
            !job.attachments.is_empty(),
        );

        let raw = match self.generator().generate(&prompt, &job.attachments).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("{} ❌ 复制失败: {}", ctx, e);
                return DuplicationOutcome::failed(
                    job,
                    BatchError::GenerationFailed {
                        message: e.to_string(),
                    },
                );
            }
        };

        let fragments = split_variations(&raw);
        if fragments.len() != job.count {
            warn!(
                "{} ⚠️ 变体数 {} 与要求的 {} 不一致",
                ctx,
                fragments.len(),
                job.count
            );
        }

        let variations: Vec<QuestionOutcome> = fragments
            .into_iter()
            .enumerate()
            .map(|(i, fragment)| {
                let key = variation_key(i);
                let result = parse_fragment(&fragment).map(|map| normalize_record(&map));
                if let Err(e) = &result {
                    warn!("{} ⚠️ {} 解析失败: {}", ctx, key, e);
                }
                QuestionOutcome {
                    key,
                    source_index: Some(job.source_index),
                    fragment,
                    result,
                    validated: false,
                }
            })
            .collect();

        let outcome = DuplicationOutcome {
            batch_key: job.batch_key.clone(),
            question_key: job.question_key.clone(),
            requested: job.count,
            variations,
            error: None,
        };
        info!(
            "{} ✓ 复制完成: 成功 {}/{}",
            ctx,
            outcome.succeeded(),
            outcome.variations.len()
        );
        outcome
    }
}
