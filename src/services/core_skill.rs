//! 核心技能元数据
//!
//! 启用后模型会在批次输出中附带一个 JSON 对象，概括本批题目用到的核心技能、
//! 方程、情境等。同题型后续批次把累计的元数据放进提示词，避免重复出题。

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::fragment_parser::scan_json_objects;

/// 元数据对象至少包含其中一个键
pub const CORE_SKILL_KEYS: [&str; 6] = [
    "batch_summary",
    "core_equation",
    "solution_pattern",
    "scenario_signature",
    "context_domain",
    "answer_form",
];

/// 核心技能元数据：键 → 逗号分隔的条目
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CoreSkillMetadata {
    entries: BTreeMap<String, String>,
}

impl CoreSkillMetadata {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// 所有键下的条目总数
    pub fn entry_count(&self) -> usize {
        self.entries
            .values()
            .map(|v| v.split(',').filter(|item| !item.trim().is_empty()).count())
            .sum()
    }

    /// 合并新批次的元数据：已有键追加，新键直接加入
    pub fn accumulate(&mut self, other: &CoreSkillMetadata) {
        for (key, new_value) in &other.entries {
            if new_value.trim().is_empty() {
                continue;
            }
            match self.entries.get_mut(key) {
                Some(current) if !current.trim().is_empty() => {
                    current.push_str(", ");
                    current.push_str(new_value);
                }
                _ => {
                    self.entries.insert(key.clone(), new_value.clone());
                }
            }
        }
    }

    /// 渲染成提示词片段
    pub fn to_prompt_text(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("- {}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 从批次响应中提取核心技能元数据，找不到时返回空元数据
pub fn extract_core_skill_metadata(response_text: &str) -> CoreSkillMetadata {
    let found = scan_json_objects(response_text)
        .into_iter()
        .find(|obj| CORE_SKILL_KEYS.iter().any(|key| obj.contains_key(*key)));

    let Some(object) = found else {
        warn!("未能从响应中提取核心技能元数据");
        return CoreSkillMetadata::default();
    };

    let entries = object
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                JsonValue::String(s) => s,
                JsonValue::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.to_string(),
            };
            (key, text)
        })
        .collect();

    let metadata = CoreSkillMetadata { entries };
    info!("提取到核心技能元数据，共约 {} 条", metadata.entry_count());
    metadata
}
