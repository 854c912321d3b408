use serde::{Deserialize, Serialize};
use std::fmt;

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QuestionType {
    /// 单项选择题
    Mcq,
    /// 填空题
    FillInTheBlanks,
    /// 解答题
    Descriptive,
    /// 案例分析题
    CaseStudy,
    /// 多小问题
    MultiPart,
    /// 断言-理由题
    AssertionReasoning,
    /// 带小问的解答题
    DescriptiveWithSubquestions,
}

/// 题型名称查找表（键为小写、空白折叠后的名称，包含常用别名）
static QUESTION_TYPE_LOOKUP: phf::Map<&'static str, QuestionType> = phf::phf_map! {
    "mcq" => QuestionType::Mcq,
    "multiple choice" => QuestionType::Mcq,
    "fill in the blanks" => QuestionType::FillInTheBlanks,
    "fill in the blank" => QuestionType::FillInTheBlanks,
    "fib" => QuestionType::FillInTheBlanks,
    "descriptive" => QuestionType::Descriptive,
    "case study" => QuestionType::CaseStudy,
    "multi-part" => QuestionType::MultiPart,
    "multi part" => QuestionType::MultiPart,
    "multipart" => QuestionType::MultiPart,
    "assertion-reasoning" => QuestionType::AssertionReasoning,
    "assertion reasoning" => QuestionType::AssertionReasoning,
    "ar" => QuestionType::AssertionReasoning,
    "descriptive w/ subquestions" => QuestionType::DescriptiveWithSubquestions,
    "descriptive with subquestions" => QuestionType::DescriptiveWithSubquestions,
};

impl QuestionType {
    /// 获取标准名称（同时用作批次键前缀）
    pub fn label(self) -> &'static str {
        match self {
            QuestionType::Mcq => "MCQ",
            QuestionType::FillInTheBlanks => "Fill in the Blanks",
            QuestionType::Descriptive => "Descriptive",
            QuestionType::CaseStudy => "Case Study",
            QuestionType::MultiPart => "Multi-Part",
            QuestionType::AssertionReasoning => "Assertion-Reasoning",
            QuestionType::DescriptiveWithSubquestions => "Descriptive w/ Subquestions",
        }
    }

    /// 提示词模板键
    pub fn template_key(self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq_questions",
            QuestionType::FillInTheBlanks => "fib_questions",
            QuestionType::Descriptive => "descriptive_questions",
            QuestionType::CaseStudy => "case_study_questions",
            QuestionType::MultiPart => "multi_part_questions",
            QuestionType::AssertionReasoning => "assertion_reasoning_questions",
            QuestionType::DescriptiveWithSubquestions => "descriptive_subq_questions",
        }
    }

    /// 从名称解析题型（忽略大小写和多余空白）
    pub fn from_label(label: &str) -> Option<Self> {
        let key = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        QUESTION_TYPE_LOOKUP.get(key.as_str()).copied()
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<String> for QuestionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_label(&value).ok_or_else(|| format!("未知题型: {}", value))
    }
}

impl From<QuestionType> for String {
    fn from(value: QuestionType) -> Self {
        value.label().to_string()
    }
}

/// 布鲁姆认知层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Taxonomy {
    #[default]
    Remembering,
    Understanding,
    Applying,
    Analyzing,
    Evaluating,
    Creating,
}

impl fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Taxonomy::Remembering => "Remembering",
            Taxonomy::Understanding => "Understanding",
            Taxonomy::Applying => "Applying",
            Taxonomy::Analyzing => "Analyzing",
            Taxonomy::Evaluating => "Evaluating",
            Taxonomy::Creating => "Creating",
        };
        f.write_str(name)
    }
}

/// 知识深度（DOK），取值 1–3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DokLevel(u8);

impl DokLevel {
    pub fn new(level: u8) -> Option<Self> {
        (1..=3).contains(&level).then_some(Self(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for DokLevel {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for DokLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("DOK 必须在 1–3 之间 (当前值: {})", value))
    }
}

impl From<DokLevel> for u8 {
    fn from(value: DokLevel) -> Self {
        value.0
    }
}

impl fmt::Display for DokLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 新概念来源
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptSource {
    /// 引用请求文件中的共享概念文本
    #[default]
    Text,
    /// 附加文档（URL）
    Document(String),
}

impl ConceptSource {
    /// 附件地址（仅文档来源）
    pub fn attachment(&self) -> Option<&str> {
        match self {
            ConceptSource::Text => None,
            ConceptSource::Document(url) => Some(url),
        }
    }
}

/// 小问配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubpartSpec {
    pub part: String,
    #[serde(default)]
    pub dok: DokLevel,
    #[serde(default = "default_marks", deserialize_with = "deserialize_marks")]
    pub marks: f64,
    #[serde(default)]
    pub taxonomy: Taxonomy,
}

/// 重新生成时附带的上下文
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegenerationContext {
    /// 原题内容
    pub original_text: String,
    /// 用户给出的修改原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// 重新生成目标：批次键 + 批次内序号（从1开始）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationTarget {
    #[serde(rename = "batch")]
    pub batch_key: String,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RegenerationTarget {
    pub fn new(batch_key: impl Into<String>, index: usize) -> Self {
        Self {
            batch_key: batch_key.into(),
            index,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// 复制目标：以已生成的题目为原题生成若干变体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicationTarget {
    #[serde(rename = "batch")]
    pub batch_key: String,
    /// 批次内序号（从1开始）
    pub index: usize,
    /// 变体数量
    #[serde(default = "default_variation_count")]
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_variation_count() -> usize {
    1
}

impl DuplicationTarget {
    pub fn new(batch_key: impl Into<String>, index: usize, count: usize) -> Self {
        Self {
            batch_key: batch_key.into(),
            index,
            count,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// 一道待生成题目的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub dok: DokLevel,
    #[serde(default = "default_marks", deserialize_with = "deserialize_marks")]
    pub marks: f64,
    #[serde(default)]
    pub taxonomy: Taxonomy,
    #[serde(default)]
    pub concept_source: ConceptSource,
    /// 题型细分（如 MCQ Type / FIB Type），"Auto" 或缺省表示不限定
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subparts: Vec<SubpartSpec>,
    /// 明确声明为单问（填空题不再自动拆分小问）
    #[serde(default)]
    pub single_part: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regeneration: Option<RegenerationContext>,
}

impl QuestionSpec {
    pub fn new(question_type: QuestionType, topic: impl Into<String>) -> Self {
        Self {
            question_type,
            topic: topic.into(),
            dok: DokLevel::default(),
            marks: default_marks(),
            taxonomy: Taxonomy::default(),
            concept_source: ConceptSource::default(),
            variant: None,
            additional_notes: None,
            subparts: Vec::new(),
            single_part: false,
            regeneration: None,
        }
    }

    /// 用于分组的主题键：去首尾空白、折叠内部空白、转小写；空主题为 ""
    pub fn topic_key(&self) -> String {
        self.topic
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// 实际生效的小问配置
    ///
    /// 填空题未配置小问且未声明单问时，按分值自动拆分
    pub fn effective_subparts(&self) -> Vec<SubpartSpec> {
        if !self.subparts.is_empty() {
            return self.subparts.clone();
        }
        if self.question_type != QuestionType::FillInTheBlanks || self.single_part {
            return Vec::new();
        }

        let marks = self.marks.trunc();
        let part = |label: &str, marks: f64| SubpartSpec {
            part: label.to_string(),
            dok: self.dok,
            marks,
            taxonomy: self.taxonomy,
        };

        if marks >= 4.0 {
            vec![part("i", 1.0), part("ii", 1.0), part("iii", marks - 2.0)]
        } else if marks >= 3.0 {
            vec![part("i", 1.0), part("ii", 2.0)]
        } else if marks >= 2.0 {
            vec![part("i", 1.0), part("ii", 1.0)]
        } else {
            Vec::new()
        }
    }
}

fn default_marks() -> f64 {
    1.0
}

// 分值既可以写成数字也可以写成字符串（"1.5"）
fn deserialize_marks<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;

    struct MarksVisitor;

    impl<'de> Visitor<'de> for MarksVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number or numeric string representing marks")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("无法解析分值: {}", value)))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value as f64)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value as f64)
        }
    }

    let marks = deserializer.deserialize_any(MarksVisitor)?;
    if marks.is_finite() && marks >= 0.0 {
        Ok(marks)
    } else {
        Err(serde::de::Error::custom(format!("分值不合法: {}", marks)))
    }
}
