//! 重新生成 - 编排层
//!
//! 按 (批次键, 批次内序号) 选出已生成的题目，附上原题内容和修改原因，
//! 以原批次键组成新批次重新生成；新结果按位置替换旧结果。

use tracing::{info, warn};

use crate::error::{AppResult, BatchError, FragmentError};
use crate::models::{
    question_key, Batch, BatchEntry, QuestionSpec, RegenerationContext, RegenerationTarget,
};
use crate::workflow::{BatchOutcome, QuestionOutcome};

/// 一个待重新生成的批次
#[derive(Debug, Clone)]
pub struct PlannedBatch {
    /// 原批次在结果列表中的下标
    pub outcome_index: usize,
    /// 选中题目在原批次中的位置（从0开始），与新批次题目一一对应
    pub positions: Vec<usize>,
    pub batch: Batch,
}

/// 重新生成计划
#[derive(Debug, Clone, Default)]
pub struct RegenerationPlan {
    pub batches: Vec<PlannedBatch>,
    /// 被跳过的目标及原因
    pub skipped: Vec<(RegenerationTarget, String)>,
}

/// 根据目标列表生成重新生成计划
///
/// 未知批次键、越界序号、重复目标会被跳过并记录；没有任何有效目标时返回
/// [`BatchError::NothingToRegenerate`]
pub fn plan_regeneration(
    outcomes: &[BatchOutcome],
    specs: &[QuestionSpec],
    targets: &[RegenerationTarget],
) -> AppResult<RegenerationPlan> {
    let mut plan = RegenerationPlan::default();
    let mut grouped: Vec<(usize, Vec<usize>, Vec<BatchEntry>)> = Vec::new();

    for target in targets {
        let Some(outcome_index) = outcomes.iter().position(|o| o.batch_key == target.batch_key)
        else {
            skip(&mut plan, target, "未知批次");
            continue;
        };
        let outcome = &outcomes[outcome_index];

        let Some(position) = target.index.checked_sub(1) else {
            skip(&mut plan, target, "序号从 1 开始");
            continue;
        };
        let Some((source_index, spec)) = outcome
            .source_indices
            .get(position)
            .and_then(|&source_index| specs.get(source_index).map(|spec| (source_index, spec)))
        else {
            skip(&mut plan, target, "序号超出批次范围");
            continue;
        };

        let group_pos = match grouped.iter().position(|(idx, _, _)| *idx == outcome_index) {
            Some(pos) => pos,
            None => {
                grouped.push((outcome_index, Vec::new(), Vec::new()));
                grouped.len() - 1
            }
        };
        let (_, positions, entries) = &mut grouped[group_pos];
        if positions.contains(&position) {
            skip(&mut plan, target, "重复的目标");
            continue;
        }

        let original_text = outcome
            .questions
            .get(position)
            .map(|q| q.fragment.clone())
            .unwrap_or_default();

        let mut spec = spec.clone();
        spec.regeneration = Some(RegenerationContext {
            original_text,
            reason: target.reason.clone(),
        });

        positions.push(position);
        entries.push(BatchEntry { source_index, spec });
    }

    for (outcome_index, positions, entries) in grouped {
        let outcome = &outcomes[outcome_index];
        let batch =
            Batch::new(outcome.question_type, 1, entries).with_key(outcome.batch_key.clone());
        info!("🔄 {} 重新生成 {} 道题", outcome.batch_key, positions.len());
        plan.batches.push(PlannedBatch {
            outcome_index,
            positions,
            batch,
        });
    }

    if plan.batches.is_empty() {
        return Err(BatchError::NothingToRegenerate.into());
    }

    Ok(plan)
}

fn skip(plan: &mut RegenerationPlan, target: &RegenerationTarget, reason: &str) {
    warn!(
        "⚠️ 跳过重新生成 {} 第 {} 题: {}",
        target.batch_key, target.index, reason
    );
    plan.skipped.push((target.clone(), reason.to_string()));
}

/// 用新批次结果替换原批次中的对应题目，返回替换数量
///
/// 只有成功规范化的新题目会替换旧结果；原批次整体失败时先展开为逐题缺失
pub fn apply_regenerated(
    outcome: &mut BatchOutcome,
    positions: &[usize],
    regenerated: BatchOutcome,
) -> usize {
    if let Some(e) = &regenerated.error {
        warn!("⚠️ {} 重新生成失败: {}", outcome.batch_key, e);
        return 0;
    }

    if outcome.error.take().is_some() {
        outcome.questions = outcome
            .source_indices
            .iter()
            .enumerate()
            .map(|(i, &source_index)| QuestionOutcome {
                key: question_key(i),
                source_index: Some(source_index),
                fragment: String::new(),
                result: Err(FragmentError::Missing),
                validated: false,
            })
            .collect();
    }

    let mut replaced = 0;
    for (new_question, &position) in regenerated.questions.into_iter().zip(positions) {
        if !new_question.is_ok() {
            warn!(
                "⚠️ {} {} 重新生成结果无效，保留原结果",
                outcome.batch_key,
                question_key(position)
            );
            continue;
        }
        if let Some(slot) = outcome.questions.get_mut(position) {
            slot.fragment = new_question.fragment;
            slot.result = new_question.result;
            slot.validated = new_question.validated;
            replaced += 1;
        }
    }

    replaced
}
