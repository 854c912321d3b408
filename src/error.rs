use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 单个题目片段解析错误
    #[error("片段错误: {0}")]
    Fragment(#[from] FragmentError),
    /// 批次级错误
    #[error("批次错误: {0}")]
    Batch(#[from] BatchError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 批次大小必须为正整数
    #[error("批次大小必须大于 0 (当前值: {value})")]
    InvalidBatchSize { value: usize },
    /// 并发数必须为正整数
    #[error("最大并发批次数必须大于 0 (当前值: {value})")]
    InvalidConcurrency { value: usize },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求文件内容不合法
    #[error("请求文件内容不合法 ({path}): {reason}")]
    InvalidRequest { path: String, reason: String },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 构建请求失败
    #[error("构建 LLM 请求失败 (模型: {model}): {source}")]
    RequestBuildFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 配额或频率限制，重试后仍失败
    #[error("LLM 配额/频率限制 (模型: {model})，已尝试 {attempts} 次: {message}")]
    RateLimited {
        model: String,
        attempts: u32,
        message: String,
    },
    /// 返回结果为空
    #[error("LLM返回结果为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 单个题目片段错误
///
/// 只影响对应的题目，同批次其他题目照常规范化
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FragmentError {
    /// 片段中找不到 JSON 对象
    #[error("片段中没有 JSON 对象")]
    NoJsonObject,
    /// JSON 解析失败
    #[error("JSON解析失败: {message}")]
    Malformed { message: String },
    /// 解析结果不是对象
    #[error("片段内容不是 JSON 对象 (实际类型: {found})")]
    NotAnObject { found: String },
    /// 模型输出的片段数少于批次题目数
    #[error("模型输出中缺少该题")]
    Missing,
}

/// 批次级错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    /// 生成调用失败
    #[error("生成失败: {message}")]
    GenerationFailed { message: String },
    /// 任务被取消或异常退出
    #[error("批次任务异常退出: {message}")]
    TaskAborted { message: String },
    /// 没有可重新生成的题目
    #[error("没有可重新生成的题目")]
    NothingToRegenerate,
    /// 没有可复制的题目
    #[error("没有可复制的题目")]
    NothingToDuplicate,
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON处理失败: {}", err))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建请求文件内容错误
    pub fn invalid_request(path: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::File(FileError::InvalidRequest {
            path: path.into(),
            reason: reason.into(),
        })
    }

    /// 是否为配额/频率限制类错误（可重试）
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::Llm(LlmError::RateLimited { .. }))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err: AppError = ConfigError::InvalidBatchSize { value: 0 }.into();
        assert!(err.to_string().contains("批次大小"));
        assert!(matches!(
            err,
            AppError::Config(ConfigError::InvalidBatchSize { value: 0 })
        ));
    }

    #[test]
    fn test_fragment_error_is_comparable() {
        let a = FragmentError::Malformed {
            message: "eof".to_string(),
        };
        assert_eq!(a.clone(), a);
        assert_ne!(a, FragmentError::NoJsonObject);
    }
}
