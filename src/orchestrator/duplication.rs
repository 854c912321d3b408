//! 题目复制 - 编排层
//!
//! 按 (批次键, 批次内序号) 选出已成功生成的题目，组成复制任务

use tracing::{info, warn};

use crate::error::{AppResult, BatchError};
use crate::models::{question_key, DuplicationTarget, QuestionSpec};
use crate::workflow::{BatchOutcome, DuplicationJob};

/// 复制计划
#[derive(Debug, Clone, Default)]
pub struct DuplicationPlan {
    pub jobs: Vec<DuplicationJob>,
    /// 被跳过的目标及原因
    pub skipped: Vec<(DuplicationTarget, String)>,
}

/// 根据目标列表生成复制计划
///
/// 未知批次、越界序号、原题未成功生成的目标会被跳过；没有任何有效目标时返回
/// [`BatchError::NothingToDuplicate`]
pub fn plan_duplication(
    outcomes: &[BatchOutcome],
    specs: &[QuestionSpec],
    targets: &[DuplicationTarget],
) -> AppResult<DuplicationPlan> {
    let mut plan = DuplicationPlan::default();

    for target in targets {
        let Some(outcome) = outcomes.iter().find(|o| o.batch_key == target.batch_key) else {
            skip(&mut plan, target, "未知批次");
            continue;
        };
        let Some(position) = target.index.checked_sub(1) else {
            skip(&mut plan, target, "序号从 1 开始");
            continue;
        };
        let Some(&source_index) = outcome.source_indices.get(position) else {
            skip(&mut plan, target, "序号超出批次范围");
            continue;
        };
        let Some(question) = outcome.questions.get(position).filter(|q| q.is_ok()) else {
            skip(&mut plan, target, "原题未成功生成");
            continue;
        };

        let attachments = specs
            .get(source_index)
            .and_then(|spec| spec.concept_source.attachment())
            .map(|url| vec![url.to_string()])
            .unwrap_or_default();

        plan.jobs.push(DuplicationJob {
            batch_key: outcome.batch_key.clone(),
            question_key: question_key(position),
            source_index,
            original: question.fragment.clone(),
            count: target.count,
            notes: target.notes.clone(),
            attachments,
        });
    }

    if plan.jobs.is_empty() {
        return Err(BatchError::NothingToDuplicate.into());
    }

    info!("🧬 共 {} 个复制任务", plan.jobs.len());
    Ok(plan)
}

fn skip(plan: &mut DuplicationPlan, target: &DuplicationTarget, reason: &str) {
    warn!(
        "⚠️ 跳过复制 {} 第 {} 题: {}",
        target.batch_key, target.index, reason
    );
    plan.skipped.push((target.clone(), reason.to_string()));
}
