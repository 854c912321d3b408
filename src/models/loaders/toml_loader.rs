use serde::Deserialize;
use std::path::Path;
use tokio::fs;

use crate::error::{AppError, AppResult, FileError};
use crate::models::question_spec::{DuplicationTarget, QuestionSpec, RegenerationTarget};

/// 一次生成请求：共享概念文本、全局备注和题目列表
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationRequest {
    /// 新概念文本（供 `concept_source = "text"` 的题目引用）
    #[serde(default)]
    pub new_concept: String,
    /// 对所有题目生效的补充说明
    #[serde(default)]
    pub additional_notes: String,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    /// 生成完成后需要重新生成的题目
    #[serde(default)]
    pub regenerate: Vec<RegenerationTarget>,
    /// 生成完成后需要复制出变体的题目
    #[serde(default)]
    pub duplicate: Vec<DuplicationTarget>,
}

/// 从 TOML 文件加载生成请求
pub async fn load_generation_request(toml_file_path: &Path) -> AppResult<GenerationRequest> {
    let path_str = toml_file_path.display().to_string();

    if !toml_file_path.exists() {
        return Err(FileError::NotFound { path: path_str }.into());
    }

    let content = fs::read_to_string(toml_file_path)
        .await
        .map_err(|e| AppError::file_read_failed(&path_str, e))?;

    let request = parse_generation_request(&content, &path_str)?;

    tracing::info!(
        "成功加载 {} 道题目配置: {}",
        request.questions.len(),
        toml_file_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
    );

    Ok(request)
}

/// 解析 TOML 文本；`path` 只用于错误信息
pub fn parse_generation_request(content: &str, path: &str) -> AppResult<GenerationRequest> {
    let request: GenerationRequest = toml::from_str(content).map_err(|e| FileError::TomlParseFailed {
        path: path.to_string(),
        source: Box::new(e),
    })?;

    if request.questions.is_empty() {
        tracing::warn!("请求文件 {} 中没有题目配置", path);
    }

    for (idx, spec) in request.questions.iter().enumerate() {
        if spec.subparts.iter().any(|sp| sp.part.trim().is_empty()) {
            return Err(AppError::invalid_request(
                path,
                format!("第 {} 道题存在空的小问编号", idx + 1),
            ));
        }
    }

    if let Some(target) = request.regenerate.iter().find(|t| t.index == 0) {
        return Err(AppError::invalid_request(
            path,
            format!("重新生成序号从 1 开始 (批次: {})", target.batch_key),
        ));
    }

    for target in &request.duplicate {
        if target.index == 0 {
            return Err(AppError::invalid_request(
                path,
                format!("复制序号从 1 开始 (批次: {})", target.batch_key),
            ));
        }
        if target.count == 0 {
            return Err(AppError::invalid_request(
                path,
                format!("变体数量必须大于 0 (批次: {}, 序号: {})", target.batch_key, target.index),
            ));
        }
    }

    Ok(request)
}
