//! 核心技能元数据记录服务 - 业务能力层
//!
//! 只负责"把一个批次提取到的元数据写成文件"能力

use std::path::{Path, PathBuf};
use tracing::info;

use super::core_skill::CoreSkillMetadata;
use crate::error::{AppError, AppResult};

/// 元数据记录服务
///
/// 每个批次写一个 `metadata_<批次键>_<时间>.json`，空元数据不写
#[derive(Debug, Clone)]
pub struct MetadataWriter {
    dir: PathBuf,
}

impl MetadataWriter {
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 写入一个批次的元数据，返回文件路径
    pub fn write(
        &self,
        batch_key: &str,
        metadata: &CoreSkillMetadata,
    ) -> AppResult<Option<PathBuf>> {
        if metadata.is_empty() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| AppError::file_write_failed(self.dir.display().to_string(), e))?;

        let path = self.dir.join(format!(
            "metadata_{}_{}.json",
            file_safe_key(batch_key),
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ));
        let json = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&path, json)
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;

        info!("🧠 元数据已写入 {}", path.display());
        Ok(Some(path))
    }
}

/// 批次键中字母数字和 `._-` 以外的字符替换为下划线
fn file_safe_key(batch_key: &str) -> String {
    batch_key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
