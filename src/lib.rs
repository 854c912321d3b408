//! # Question Forge
//!
//! 一个批量生成题目的 Rust 应用程序：把题目请求打包成批次，逐批调用大模型生成，
//! 再把模型输出切分、解析并规范化为固定字段的题目记录。
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 数据层（Models）
//! - `models/` - 题目请求、批次、规范化记录
//! - `models/loaders` - TOML 请求文件加载
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个模块一种能力
//! - `batch_packer` - 批次打包（纯函数）
//! - `key_normalizer` / `record_normalizer` - 字段名与记录规范化（纯函数）
//! - `fragment_parser` - 输出切分与片段解析
//! - `prompt_builder` - 提示词渲染
//! - `LlmService` - 模型调用（`Generator` 抽象）
//! - `FailureWriter` - 写失败记录
//! - `MetadataWriter` - 写核心技能元数据
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个批次"的完整处理流程
//! - `BatchCtx` - 上下文封装（批次键 + 位置）
//! - `BatchFlow` - 流程编排（render → generate → split → validate → normalize）
//! - `duplication_flow` - 单题复制流程（render → generate → split → normalize）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理器，管理并发、输出报告
//! - `orchestrator/regeneration` - 按位置重新生成指定题目
//! - `orchestrator/duplication` - 以指定题目为原题生成变体

pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{Batch, CanonicalField, CanonicalRecord, QuestionSpec, QuestionType};
pub use orchestrator::{App, RunReport, RunStats};
pub use services::{Generator, LlmService};
pub use workflow::{BatchCtx, BatchFlow, BatchOutcome, DuplicationOutcome, QuestionOutcome};
