//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次调度和结果汇总，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量处理器
//! - 管理应用生命周期（初始化、运行）
//! - 打包批次、控制并发数量（Semaphore）
//! - 核心技能模式下同题型串行
//! - 输出 JSON 报告、失败记录和全局统计
//!
//! ### `regeneration` - 重新生成
//! - 按 (批次键, 序号) 选出题目并附上原题上下文
//! - 新结果按位置替换旧结果
//!
//! ### `duplication` - 题目复制
//! - 按 (批次键, 序号) 选出已成功生成的题目作为原题
//! - 每个目标一个复制任务，变体单独解析、规范化
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Batch>)
//!     ↓
//! workflow::BatchFlow (处理单个 Batch)
//!     ↓
//! services (能力层：prompt / llm / parse / normalize)
//! ```

pub mod batch_processor;
pub mod duplication;
pub mod regeneration;

pub use batch_processor::{App, RunReport, RunStats};
pub use duplication::{plan_duplication, DuplicationPlan};
pub use regeneration::{apply_regenerated, plan_regeneration, PlannedBatch, RegenerationPlan};
