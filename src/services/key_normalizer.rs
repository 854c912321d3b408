//! 字段名规范化
//!
//! 模型输出的字段名大小写、分隔符都不固定（`Correct_Answer`、`correct-answer`、
//! `correctAnswer`……），这里把它们映射回固定的规范字段集合。
//!
//! 流程：去首尾空白 → 空白/下划线/连字符连续出现折叠为一个空格 → 转小写，
//! 得到"规范形式"；再按顺序逐条匹配规则表，第一条命中的规则生效。
//! 没有规则命中时原样返回原始键，不丢信息。

use regex::Regex;
use std::sync::LazyLock;

use crate::models::CanonicalField;

/// 字段名匹配结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    /// 命中规范字段
    Matched(CanonicalField),
    /// 未命中，保留原始键（大小写和分隔符不变）
    Unmapped(String),
}

impl KeyMatch {
    pub fn canonical(&self) -> Option<CanonicalField> {
        match self {
            KeyMatch::Matched(field) => Some(*field),
            KeyMatch::Unmapped(_) => None,
        }
    }
}

struct KeyRule {
    field: CanonicalField,
    pattern: Regex,
}

/// 有序规则表
///
/// 顺序即优先级。不变量：如果某条规则能匹配另一条规则所接受的名称，
/// 更具体的那条必须排在前面：
/// - OPTION 在 CORRECT_ANSWER 前（"option" 单独出现时是选项列表）
/// - ANSWER_KEY 在 CORRECT_ANSWER 前（后者也接受 "answer key"）
///
/// 所有规则都作用于规范形式，单词之间的空格可有可无
static KEY_RULES: LazyLock<Vec<KeyRule>> = LazyLock::new(|| {
    [
        (CanonicalField::Topic, r"^topic(?: ?(?:name|used))?$"),
        (CanonicalField::Question, r"^question(?: ?text)?$"),
        (CanonicalField::Option, r"^options?$"),
        (CanonicalField::AnswerKey, r"^answer ?key$"),
        (
            CanonicalField::CorrectAnswer,
            r"^(?:correct ?)?(?:answer|option)(?: ?key)?$",
        ),
        (CanonicalField::Solution, r"^solution(?: ?explanation)?$"),
        (CanonicalField::DistractorAnalysis, r"^distractor ?analysis$"),
        (CanonicalField::KeyIdea, r"^key ?idea$"),
        (CanonicalField::Subq, r"^(?:sub(?: ?(?:q|questions?))?|parts?)$"),
        (CanonicalField::Scenario, r"^(?:scenario(?: ?text)?|scene)$"),
        (CanonicalField::DiagramPrompt, r"^diagram ?prompt$"),
        (CanonicalField::Dok, r"^dok(?: ?level)?$"),
        (CanonicalField::Taxonomy, r"^tax(?:onomy)?$"),
        (CanonicalField::Marks, r"^(?:marks?|marking ?scheme)$"),
        (CanonicalField::QType, r"^(?:q|question) ?type$"),
        (CanonicalField::Type, r"^type$"),
    ]
    .into_iter()
    .map(|(field, pattern)| KeyRule {
        field,
        // 规则是编译期常量，无法编译属于程序错误
        pattern: Regex::new(&format!("(?i){}", pattern)).expect("字段规则正则无效"),
    })
    .collect()
});

static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_\-]+").expect("分隔符正则无效"));

/// 计算字段名的规范形式
pub fn normalized_form(raw_key: &str) -> String {
    SEPARATOR_RUN
        .replace_all(raw_key.trim(), " ")
        .trim()
        .to_lowercase()
}

/// 规范化一个字段名
pub fn normalize_key(raw_key: &str) -> KeyMatch {
    let form = normalized_form(raw_key);
    KEY_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(&form))
        .map(|rule| KeyMatch::Matched(rule.field))
        .unwrap_or_else(|| KeyMatch::Unmapped(raw_key.to_string()))
}
