//! 批次打包 - 业务能力层
//!
//! 把题目请求列表打包成有界大小的批次：
//!
//! 1. 按题型分组（保持题型首次出现顺序）
//! 2. 题型内按主题分组（保持主题首次出现顺序，空主题单独成组）
//! 3. 每个主题先切出满批次，不足一批的剩余题目暂存
//! 4. 同一题型的剩余题目按主题顺序拼接后再切批，最后一批可以不满
//! 5. 输出顺序：按题型，先同主题满批次，再剩余批次
//!
//! 纯函数，没有 I/O

use tracing::debug;

use crate::error::{AppResult, ConfigError};
use crate::models::{Batch, BatchEntry, QuestionSpec, QuestionType};

/// 按首次出现顺序分组
fn group_in_order<K: PartialEq, T>(items: Vec<T>, key_of: impl Fn(&T) -> K) -> Vec<(K, Vec<T>)> {
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();
    for item in items {
        let key = key_of(&item);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(item),
            None => groups.push((key, vec![item])),
        }
    }
    groups
}

/// 把题目请求打包成批次
///
/// `max_batch_size` 为 0 时返回配置错误；空输入返回空列表
pub fn pack(specs: &[QuestionSpec], max_batch_size: usize) -> AppResult<Vec<Batch>> {
    if max_batch_size == 0 {
        return Err(ConfigError::InvalidBatchSize {
            value: max_batch_size,
        }
        .into());
    }

    let entries: Vec<BatchEntry> = specs
        .iter()
        .enumerate()
        .map(|(source_index, spec)| BatchEntry {
            source_index,
            spec: spec.clone(),
        })
        .collect();

    let mut batches = Vec::new();
    for (question_type, type_entries) in group_in_order(entries, |e| e.spec.question_type) {
        batches.extend(pack_type(question_type, type_entries, max_batch_size));
    }

    debug!(
        "打包完成: {} 道题 → {} 个批次 (批次上限 {})",
        specs.len(),
        batches.len(),
        max_batch_size
    );

    Ok(batches)
}

/// 打包同一题型的题目
fn pack_type(
    question_type: QuestionType,
    entries: Vec<BatchEntry>,
    max_batch_size: usize,
) -> Vec<Batch> {
    let mut chunks: Vec<Vec<BatchEntry>> = Vec::new();
    let mut remainder: Vec<BatchEntry> = Vec::new();

    for (topic, mut members) in group_in_order(entries, |e| e.spec.topic_key()) {
        while members.len() >= max_batch_size {
            let rest = members.split_off(max_batch_size);
            chunks.push(std::mem::replace(&mut members, rest));
        }
        if !members.is_empty() {
            debug!(
                "[{}] 主题 '{}' 剩余 {} 道题，放入混合批次",
                question_type,
                topic,
                members.len()
            );
        }
        remainder.extend(members);
    }

    while !remainder.is_empty() {
        let take = remainder.len().min(max_batch_size);
        let rest = remainder.split_off(take);
        chunks.push(std::mem::replace(&mut remainder, rest));
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Batch::new(question_type, i + 1, chunk))
        .collect()
}
