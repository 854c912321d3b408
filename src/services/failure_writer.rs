//! 失败记录写入服务 - 业务能力层
//!
//! 只负责"把解析失败的题目片段追加到失败记录文件"能力，不关心流程

use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// 失败记录写入服务
///
/// 职责：
/// - 每次写入一道题（批次键 + 题目键 + 原因 + 片段原文）
/// - 追加写入，不覆盖之前的记录
pub struct FailureWriter {
    path: String,
}

impl FailureWriter {
    pub fn with_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 写入一条失败记录
    pub fn write(
        &self,
        batch_key: &str,
        question_key: &str,
        reason: &str,
        fragment: &str,
    ) -> AppResult<()> {
        debug!(
            "写入失败记录: {} | {} | 片段长度: {}",
            batch_key,
            question_key,
            fragment.len()
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::file_write_failed(&self.path, e))?;

        let entry = format!(
            "[{}] {} | {} | 原因: {}\n{}\n{}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            batch_key,
            question_key,
            reason,
            fragment.trim(),
            "-".repeat(60)
        );

        file.write_all(entry.as_bytes())
            .map_err(|e| AppError::file_write_failed(&self.path, e))?;

        Ok(())
    }
}

impl Default for FailureWriter {
    fn default() -> Self {
        Self::with_path("failed_questions.txt")
    }
}
