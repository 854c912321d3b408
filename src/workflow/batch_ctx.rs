//! 批次处理上下文
//!
//! 封装"我正在处理第几个批次、批次键是什么"这一信息

use std::fmt::Display;

/// 批次处理上下文
#[derive(Debug, Clone)]
pub struct BatchCtx {
    /// 批次键，如 "MCQ - Batch 2"
    pub batch_key: String,

    /// 批次在打包顺序中的位置（从1开始，仅用于日志显示）
    pub position: usize,

    /// 批次总数
    pub total: usize,
}

impl BatchCtx {
    pub fn new(batch_key: impl Into<String>, position: usize, total: usize) -> Self {
        Self {
            batch_key: batch_key.into(),
            position,
            total,
        }
    }
}

impl Display for BatchCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} #{}/{}]", self.batch_key, self.position, self.total)
    }
}
