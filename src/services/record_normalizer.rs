//! 题目记录规范化
//!
//! 把一个片段解析出的 JSON 对象转换为 [`CanonicalRecord`]：
//! - 按原始迭代顺序规范化每个键，冲突时后写覆盖先写
//! - 缺少 Q_TYPE 时根据特征字段推断题型
//! - 值原样透传，OPTION / SUBQ 的数组或对象保持原有顺序

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::LazyLock;
use tracing::debug;

use super::key_normalizer::{normalize_key, normalized_form, KeyMatch};
use crate::models::{CanonicalField, CanonicalRecord, FieldKey, QuestionType};

static FIB_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:fib|blanks?)\b").expect("填空字段正则无效"));

/// 规范化一个题目对象
pub fn normalize_record(raw: &Map<String, JsonValue>) -> CanonicalRecord {
    let mut record = CanonicalRecord::new();

    for (raw_key, value) in raw {
        let key = match normalize_key(raw_key) {
            KeyMatch::Matched(field) => FieldKey::Canonical(field),
            KeyMatch::Unmapped(original) => {
                debug!("未识别的字段名，原样保留: '{}'", original);
                FieldKey::Raw(original)
            }
        };
        if let Some(previous) = record.insert(key.clone(), value.clone()) {
            debug!("字段 {} 重复出现，覆盖旧值 {}", key, previous);
        }
    }

    if !record.contains(CanonicalField::QType) {
        if let Some(inferred) = infer_question_type(&record) {
            debug!("根据字段推断题型: {}", inferred);
            record.insert(CanonicalField::QType, JsonValue::String(inferred.label().to_string()));
        }
    }

    record
}

/// 根据特征字段推断题型，没有特征字段时返回 None
///
/// 按顺序检查：
/// 1. 出现填空特有字段（fib / blank / blanks）→ 填空题
/// 2. 同时出现 assertion 与 reason 字段 → 断言-理由题
/// 3. 出现 SUBQ → 多小问题
pub fn infer_question_type(record: &CanonicalRecord) -> Option<QuestionType> {
    let raw_forms: Vec<String> = record.unmapped_keys().map(normalized_form).collect();

    if raw_forms.iter().any(|form| FIB_KEY.is_match(form)) {
        return Some(QuestionType::FillInTheBlanks);
    }

    let has = |word: &str| raw_forms.iter().any(|form| form.split(' ').any(|w| w == word));
    if has("assertion") && has("reason") {
        return Some(QuestionType::AssertionReasoning);
    }

    if record.contains(CanonicalField::Subq) {
        return Some(QuestionType::MultiPart);
    }

    None
}
