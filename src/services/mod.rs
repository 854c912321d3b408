//! 业务能力层（Services Layer）
//!
//! 每个模块只提供一种能力，不关心流程顺序：
//!
//! - `batch_packer`：把题目请求打包成批次
//! - `prompt_builder`：把批次渲染成提示词
//! - `llm_service`：调用模型（[`Generator`] 抽象）
//! - `fragment_parser`：切分模型输出、解析单个片段
//! - `key_normalizer` / `record_normalizer`：字段名与记录规范化
//! - `core_skill`：核心技能元数据提取与累积
//! - `failure_writer`：失败记录
//! - `metadata_writer`：核心技能元数据记录

pub mod batch_packer;
pub mod core_skill;
pub mod failure_writer;
pub mod fragment_parser;
pub mod key_normalizer;
pub mod llm_service;
pub mod metadata_writer;
pub mod prompt_builder;
pub mod record_normalizer;

pub use batch_packer::pack;
pub use core_skill::{extract_core_skill_metadata, CoreSkillMetadata};
pub use failure_writer::FailureWriter;
pub use fragment_parser::{parse_fragment, split_fragments, split_variations, QUESTION_DELIMITER};
pub use key_normalizer::{normalize_key, KeyMatch};
pub use llm_service::{Generator, LlmService};
pub use metadata_writer::MetadataWriter;
pub use prompt_builder::{PromptBuilder, RenderedPrompt};
pub use record_normalizer::normalize_record;
