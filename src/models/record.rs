use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

/// 规范字段标识（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalField {
    Topic,
    Question,
    Option,
    AnswerKey,
    CorrectAnswer,
    Solution,
    DistractorAnalysis,
    KeyIdea,
    Subq,
    Scenario,
    DiagramPrompt,
    Dok,
    Taxonomy,
    Marks,
    QType,
    Type,
}

impl CanonicalField {
    /// 全部规范字段
    pub const ALL: [CanonicalField; 16] = [
        CanonicalField::Topic,
        CanonicalField::Question,
        CanonicalField::Option,
        CanonicalField::AnswerKey,
        CanonicalField::CorrectAnswer,
        CanonicalField::Solution,
        CanonicalField::DistractorAnalysis,
        CanonicalField::KeyIdea,
        CanonicalField::Subq,
        CanonicalField::Scenario,
        CanonicalField::DiagramPrompt,
        CanonicalField::Dok,
        CanonicalField::Taxonomy,
        CanonicalField::Marks,
        CanonicalField::QType,
        CanonicalField::Type,
    ];

    /// 标准拼写
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::Topic => "TOPIC",
            CanonicalField::Question => "QUESTION",
            CanonicalField::Option => "OPTION",
            CanonicalField::AnswerKey => "ANSWER_KEY",
            CanonicalField::CorrectAnswer => "CORRECT_ANSWER",
            CanonicalField::Solution => "SOLUTION",
            CanonicalField::DistractorAnalysis => "DISTRACTOR_ANALYSIS",
            CanonicalField::KeyIdea => "KEY_IDEA",
            CanonicalField::Subq => "SUBQ",
            CanonicalField::Scenario => "SCENARIO",
            CanonicalField::DiagramPrompt => "DIAGRAM_PROMPT",
            CanonicalField::Dok => "DOK",
            CanonicalField::Taxonomy => "TAXONOMY",
            CanonicalField::Marks => "MARKS",
            CanonicalField::QType => "Q_TYPE",
            CanonicalField::Type => "TYPE",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 记录中的字段键：规范字段，或无法识别时保留的原始键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Canonical(CanonicalField),
    Raw(String),
}

impl FieldKey {
    pub fn as_str(&self) -> &str {
        match self {
            FieldKey::Canonical(field) => field.as_str(),
            FieldKey::Raw(key) => key,
        }
    }
}

impl From<CanonicalField> for FieldKey {
    fn from(field: CanonicalField) -> Self {
        FieldKey::Canonical(field)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 规范化后的题目记录
///
/// 字段按首次出现顺序保存；同一键重复写入时后写覆盖先写
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRecord {
    fields: Vec<(FieldKey, JsonValue)>,
}

impl CanonicalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入字段，返回被覆盖的旧值
    pub fn insert(&mut self, key: impl Into<FieldKey>, value: JsonValue) -> Option<JsonValue> {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, field: CanonicalField) -> Option<&JsonValue> {
        self.get_key(&FieldKey::Canonical(field))
    }

    /// 读取未识别的原始键
    pub fn get_raw(&self, key: &str) -> Option<&JsonValue> {
        self.get_key(&FieldKey::Raw(key.to_string()))
    }

    fn get_key(&self, key: &FieldKey) -> Option<&JsonValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.get(field).is_some()
    }

    /// 字段的文本值（字符串原样返回，数字等转为字符串）
    pub fn text(&self, field: CanonicalField) -> Option<String> {
        self.get(field).map(|value| match value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &JsonValue)> {
        self.fields.iter().map(|(k, v)| (k, v))
    }

    /// 未识别的原始键
    pub fn unmapped_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|(k, _)| match k {
            FieldKey::Raw(raw) => Some(raw.as_str()),
            FieldKey::Canonical(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for CanonicalRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key.as_str(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_overwrites_in_place() {
        let mut record = CanonicalRecord::new();
        assert!(record.insert(CanonicalField::Topic, json!("A")).is_none());
        record.insert(CanonicalField::Question, json!("Q?"));
        let old = record.insert(CanonicalField::Topic, json!("B"));

        assert_eq!(old, Some(json!("A")));
        assert_eq!(record.len(), 2);
        assert_eq!(record.text(CanonicalField::Topic).as_deref(), Some("B"));
    }

    #[test]
    fn test_serializes_with_canonical_names() {
        let mut record = CanonicalRecord::new();
        record.insert(CanonicalField::QType, json!("MCQ"));
        record.insert(FieldKey::Raw("Hint".to_string()), json!("think"));
        record.insert(CanonicalField::Marks, json!(2));

        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"Q_TYPE":"MCQ","Hint":"think","MARKS":2}"#);
        assert_eq!(record.unmapped_keys().collect::<Vec<_>>(), vec!["Hint"]);
        assert_eq!(record.text(CanonicalField::Marks).as_deref(), Some("2"));
    }
}
