use serde::Serialize;
use std::fmt;

use super::question_spec::{QuestionSpec, QuestionType};

/// 批次中的一道题：保留它在原始请求列表中的位置
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    /// 原始请求列表中的下标（从0开始）
    pub source_index: usize,
    pub spec: QuestionSpec,
}

/// 一个批次
///
/// 不变量：非空；所有题目题型相同；创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    key: String,
    question_type: QuestionType,
    entries: Vec<BatchEntry>,
}

impl Batch {
    /// 由打包器创建；调用方保证 `entries` 非空且题型一致
    pub(crate) fn new(question_type: QuestionType, number: usize, entries: Vec<BatchEntry>) -> Self {
        debug_assert!(!entries.is_empty());
        debug_assert!(entries.iter().all(|e| e.spec.question_type == question_type));
        Self {
            key: batch_key(question_type, number),
            question_type,
            entries,
        }
    }

    /// 批次键，如 "MCQ - Batch 2"
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn question_type(&self) -> QuestionType {
        self.question_type
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn specs(&self) -> impl Iterator<Item = &QuestionSpec> {
        self.entries.iter().map(|e| &e.spec)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 本批次所有文档附件（去重，保持首次出现顺序）
    pub fn attachments(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for url in self.specs().filter_map(|s| s.concept_source.attachment()) {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    /// 以新的批次键重建（用于重新生成时保持原批次键）
    pub(crate) fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} 题)", self.key, self.entries.len())
    }
}

/// 生成批次键
pub fn batch_key(question_type: QuestionType, number: usize) -> String {
    format!("{} - Batch {}", question_type.label(), number)
}

/// 批次内题目键，`index` 从0开始，生成的键从1开始
pub fn question_key(index: usize) -> String {
    format!("question{}", index + 1)
}
