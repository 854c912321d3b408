//! 提示词构建 - 业务能力层
//!
//! 把一个批次渲染成发送给模型的提示词。模板按题型区分，可以从 TOML 文件覆盖，
//! 占位符用 `{{NAME}}` 形式做简单字符串替换。

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::core_skill::{CoreSkillMetadata, CORE_SKILL_KEYS};
use super::fragment_parser::QUESTION_DELIMITER;
use crate::error::{AppError, AppResult, FileError};
use crate::models::{Batch, ConceptSource, QuestionSpec, QuestionType};

/// 校验提示词的模板键
pub const VALIDATION_TEMPLATE_KEY: &str = "validation_prompt";

/// 题目复制提示词的模板键
pub const DUPLICATION_TEMPLATE_KEY: &str = "duplicate_question";

const DEFAULT_GENERATION_TEMPLATE: &str = r#"You are an expert question writer. Generate exactly {{TOTAL_QUESTIONS}} {{QUESTION_TYPE}} question(s).

## TOPICS
{{TOPICS_SECTION}}

## NEW CONCEPTS
{{New_Concept}}

## ADDITIONAL NOTES (apply to ALL questions)
{{Additional_Notes}}

{{PREVIOUS_METADATA}}

## OUTPUT FORMAT
Before EVERY question output the line {{QUESTION_DELIMITER}} on its own.
After the delimiter output a single JSON object for that question with the keys
"topic", "question", "options" (MCQ only), "correct_answer", "solution",
"distractor_analysis" (MCQ only), "key_idea", "dok", "taxonomy", "marks" and "q_type".
Do not output anything else between questions."#;

const DEFAULT_VALIDATION_TEMPLATE: &str = r#"You are reviewing a generated question for correctness and quality.

{{INPUT_CONTEXT}}

## GENERATED CONTENT
{{GENERATED_CONTENT}}

Check the answer, the solution steps, distractor diversity and that the DOK level matches.
Fix any problem you find and return the corrected question.

## OUTPUT
{{OUTPUT_FORMAT_RULES}}"#;

const DEFAULT_OUTPUT_FORMAT_RULES: &str =
    "Return a single valid JSON object with the same keys as the generated question.";

const DEFAULT_DUPLICATION_TEMPLATE: &str = r#"You are an expert question writer. Create {{VARIATION_COUNT}} NEW variation(s) of the question below.

## ORIGINAL QUESTION
{{ORIGINAL_QUESTION}}

## CUSTOM NOTES
{{CUSTOM_NOTES}}

## CONTEXT FILE
{{FILE_CONTEXT}}

Each variation must test the same skill at the same difficulty with different numbers, names or scenario.
Keep the original question's format and structure.

## OUTPUT FORMAT
Before EVERY variation output the line {{QUESTION_DELIMITER}} on its own.
After the delimiter output a single JSON object for that variation with the same keys as the original question."#;

/// 渲染结果：提示词文本和需要附带的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub text: String,
    pub attachments: Vec<String>,
}

/// 提示词构建器
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    templates: HashMap<String, String>,
    new_concept: String,
    additional_notes: String,
    core_skill_enabled: bool,
}

impl PromptBuilder {
    /// 使用内置模板创建
    pub fn new(new_concept: impl Into<String>, additional_notes: impl Into<String>) -> Self {
        Self {
            templates: HashMap::new(),
            new_concept: new_concept.into(),
            additional_notes: additional_notes.into(),
            core_skill_enabled: false,
        }
    }

    /// 开启后每个批次提示词都会要求模型输出核心技能元数据
    pub fn with_core_skill(mut self, enabled: bool) -> Self {
        self.core_skill_enabled = enabled;
        self
    }

    /// 覆盖模板（键为题型模板键或 `validation_prompt`）
    pub fn with_templates(mut self, templates: HashMap<String, String>) -> Self {
        self.templates.extend(templates);
        self
    }

    /// 从 TOML 文件加载模板覆盖
    pub async fn with_template_file(self, path: &Path) -> AppResult<Self> {
        let path_str = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::file_read_failed(&path_str, e))?;
        let templates: HashMap<String, String> =
            toml::from_str(&content).map_err(|e| FileError::TomlParseFailed {
                path: path_str.clone(),
                source: Box::new(e),
            })?;
        info!("从 {} 加载了 {} 个提示词模板", path_str, templates.len());
        Ok(self.with_templates(templates))
    }

    fn template(&self, key: &str, fallback: &'static str) -> &str {
        self.templates.get(key).map(String::as_str).unwrap_or(fallback)
    }

    /// 渲染一个批次的生成提示词
    pub fn render_batch(
        &self,
        batch: &Batch,
        previous_metadata: Option<&CoreSkillMetadata>,
    ) -> RenderedPrompt {
        let question_type = batch.question_type();
        let template = self.template(question_type.template_key(), DEFAULT_GENERATION_TEMPLATE);

        let metadata_section = match previous_metadata {
            Some(metadata) if !metadata.is_empty() => format!(
                "## PREVIOUSLY USED CORE SKILLS (avoid repeating)\n{}\n\nGenerate NEW questions that are distinct from the above.",
                metadata.to_prompt_text()
            ),
            _ => String::new(),
        };

        let text = template
            .replace("{{TOPICS_SECTION}}", &build_topics_section(batch))
            .replace("{{TOTAL_QUESTIONS}}", &batch.len().to_string())
            .replace("{{QUESTION_TYPE}}", question_type.label())
            .replace("{{QUESTION_DELIMITER}}", QUESTION_DELIMITER)
            .replace("{{New_Concept}}", &self.new_concept)
            .replace("{{Additional_Notes}}", &self.additional_notes)
            .replace("{{PREVIOUS_METADATA}}", &metadata_section);

        // 模板里没有写分隔符说明时追加一条，保证响应可以切分
        let mut text = if text.contains(QUESTION_DELIMITER) {
            text
        } else {
            format!(
                "{}\n\nBefore EVERY question output the line {} on its own.",
                text, QUESTION_DELIMITER
            )
        };

        if self.core_skill_enabled {
            text.push_str("\n\n");
            text.push_str(&core_skill_instruction());
            debug!("[{}] 已追加核心技能提取说明", batch.key());
        }

        let attachments = batch.attachments();
        debug!(
            "[{}] 提示词长度 {} 字符，附件 {} 个",
            batch.key(),
            text.len(),
            attachments.len()
        );

        RenderedPrompt { text, attachments }
    }

    /// 渲染单道题的校验提示词
    pub fn render_validation(&self, generated: &str, spec: Option<&QuestionSpec>) -> String {
        let context = match spec {
            Some(spec) => {
                let topic = if spec.topic.trim().is_empty() {
                    "Unknown"
                } else {
                    spec.topic.as_str()
                };
                let mut line = format!(
                    "Question Context: Topic='{}', Type='{}'",
                    topic,
                    spec.variant.as_deref().unwrap_or("Standard")
                );
                if let Some(notes) = spec.additional_notes.as_deref() {
                    line.push_str(&format!(", Notes='{}'", notes));
                }
                line
            }
            None => "Question Context: Unknown".to_string(),
        };

        self.template(VALIDATION_TEMPLATE_KEY, DEFAULT_VALIDATION_TEMPLATE)
            .replace("{{GENERATED_CONTENT}}", generated)
            .replace("{{INPUT_CONTEXT}}", &context)
            .replace("{{OUTPUT_FORMAT_RULES}}", DEFAULT_OUTPUT_FORMAT_RULES)
    }

    /// 渲染题目复制提示词
    ///
    /// `has_file` 表示原题附带了概念文件（文件本身作为附件另行发送）
    pub fn render_duplication(
        &self,
        original: &str,
        variation_count: usize,
        notes: Option<&str>,
        has_file: bool,
    ) -> String {
        let file_context = if has_file {
            "[File attached for context]"
        } else {
            "[No file provided]"
        };
        let notes = notes.filter(|n| !n.trim().is_empty()).unwrap_or("None");

        let text = self
            .template(DUPLICATION_TEMPLATE_KEY, DEFAULT_DUPLICATION_TEMPLATE)
            .replace("{{ORIGINAL_QUESTION}}", original)
            .replace("{{VARIATION_COUNT}}", &variation_count.to_string())
            .replace("{{CUSTOM_NOTES}}", notes)
            .replace("{{FILE_CONTEXT}}", file_context)
            .replace("{{QUESTION_DELIMITER}}", QUESTION_DELIMITER);

        if text.contains(QUESTION_DELIMITER) {
            text
        } else {
            format!(
                "{}\n\nBefore EVERY variation output the line {} on its own.",
                text, QUESTION_DELIMITER
            )
        }
    }
}

/// 核心技能提取说明：要求模型在第一道题之前输出本批次的元数据对象
fn core_skill_instruction() -> String {
    let keys = CORE_SKILL_KEYS
        .iter()
        .map(|key| format!("  \"{}\": \"...\"", key))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "## CORE SKILL SUMMARY (MANDATORY)\n\
Before the first {} line, output ONE JSON object that describes the CURRENT BATCH ONLY.\n\
For every key give exactly one comma-separated entry per question, in question order:\n\
```json\n{{\n{}\n}}\n```\n\
Only list new items. Never reuse a core equation, solution pattern or scenario listed as previously used.",
        QUESTION_DELIMITER, keys
    )
}

/// 构建 `{{TOPICS_SECTION}}`：每道题一行，附带重新生成上下文和题目备注
pub fn build_topics_section(batch: &Batch) -> String {
    let mut lines = Vec::new();
    for spec in batch.specs() {
        push_spec_lines(&mut lines, spec, batch.question_type());
    }
    lines.join("\n")
}

fn push_spec_lines(lines: &mut Vec<String>, spec: &QuestionSpec, question_type: QuestionType) {
    let topic = if spec.topic.trim().is_empty() {
        "Unnamed Topic"
    } else {
        spec.topic.trim()
    };
    let concept = match &spec.concept_source {
        ConceptSource::Text => "Text".to_string(),
        ConceptSource::Document(url) => format!("File ({})", url),
    };
    let variant = spec
        .variant
        .as_deref()
        .filter(|v| !v.eq_ignore_ascii_case("auto"))
        .map(|v| format!(", {} Type: {}", question_type.label(), v))
        .unwrap_or_default();
    let notes_source = if spec.additional_notes.is_some() { "Text" } else { "None" };

    let subparts = spec.effective_subparts();
    let line = if !subparts.is_empty() {
        let details: Vec<String> = subparts
            .iter()
            .map(|sp| format!("{}: DOK {}, Marks {}, Taxonomy {}", sp.part, sp.dok, sp.marks, sp.taxonomy))
            .collect();
        format!(
            "    - Topic: \"{}\" → Questions: 1{} | Sub-parts: {} [{}] | New Concept Source: {} | Additional Notes Source: {}",
            topic,
            variant,
            subparts.len(),
            details.join(", "),
            concept,
            notes_source
        )
    } else if question_type == QuestionType::AssertionReasoning {
        format!(
            "    - Topic: \"{}\" → Questions: 1, Marks: {} | New Concept Source: {} | Additional Notes Source: {}",
            topic, spec.marks, concept, notes_source
        )
    } else {
        format!(
            "    - Topic: \"{}\" → Questions: 1{}, DOK: {}, Marks: {}, Taxonomy: {} | New Concept Source: {} | Additional Notes Source: {}",
            topic, variant, spec.dok, spec.marks, spec.taxonomy, concept, notes_source
        )
    };

    if let Some(regen) = &spec.regeneration {
        lines.push("      [REGENERATION INSTRUCTION]:".to_string());
        lines.push("      \"You are regenerating an existing question. Improve it based on the feedback below but preserve its original format and structure.\"".to_string());
        if let Some(reason) = regen.reason.as_deref().filter(|r| !r.trim().is_empty()) {
            lines.push("      [USER FEEDBACK / REGENERATION REASON]:".to_string());
            lines.push(format!("      \"{}\"", reason));
        }
        if !regen.original_text.trim().is_empty() {
            lines.push("      [ORIGINAL QUESTION CONTENT for Context]:".to_string());
            lines.extend(regen.original_text.lines().map(|l| format!("      {}", l)));
            lines.push("      [END ORIGINAL CONTENT]".to_string());
        }
        lines.push(String::new());
    }

    lines.push(line);
    if let Some(notes) = &spec.additional_notes {
        lines.push(format!("      Additional Notes for this question: {}", notes));
    }
}
