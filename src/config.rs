use std::str::FromStr;

use crate::error::{AppResult, ConfigError};

/// 默认批次大小
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 每个批次最多包含的题目数量
    pub max_batch_size: usize,
    /// 同时处理的批次数量
    pub max_concurrent_batches: usize,
    /// 题目请求文件（TOML）
    pub request_file: String,
    /// 提示词模板文件（TOML，可选）
    pub prompt_file: Option<String>,
    /// 生成结果输出文件（JSON）
    pub output_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 解析失败题目记录文件
    pub failure_log_file: String,
    /// 核心技能元数据记录目录（每个批次一个文件）
    pub metadata_log_dir: String,
    /// 是否对每道题进行二次校验
    pub validation_enabled: bool,
    /// 是否启用核心技能元数据（同类型批次串行）
    pub core_skill_enabled: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    /// 配额/频率限制时的最大尝试次数
    pub llm_max_retries: u32,
    /// 重试基础等待时间（毫秒），第 n 次重试等待 n 倍
    pub llm_retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_batches: 8,
            request_file: "questions.toml".to_string(),
            prompt_file: None,
            output_file: "generated_questions.json".to_string(),
            output_log_file: "output.txt".to_string(),
            failure_log_file: "failed_questions.txt".to_string(),
            metadata_log_dir: "metadata_logs".to_string(),
            validation_enabled: false,
            core_skill_enabled: false,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-3-flash-preview".to_string(),
            llm_temperature: 0.7,
            llm_max_tokens: 8192,
            llm_max_retries: 3,
            llm_retry_delay_ms: 2000,
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    ///
    /// 设置了但无法解析的值会返回 [`ConfigError::EnvVarParseFailed`]
    pub fn from_env() -> AppResult<Self> {
        let default = Self::default();
        let config = Self {
            max_batch_size: env_parse("MAX_BATCH_SIZE", default.max_batch_size)?,
            max_concurrent_batches: env_parse(
                "MAX_CONCURRENT_BATCHES",
                default.max_concurrent_batches,
            )?,
            request_file: env_string("REQUEST_FILE", default.request_file),
            prompt_file: std::env::var("PROMPT_FILE").ok().or(default.prompt_file),
            output_file: env_string("OUTPUT_FILE", default.output_file),
            output_log_file: env_string("OUTPUT_LOG_FILE", default.output_log_file),
            failure_log_file: env_string("FAILURE_LOG_FILE", default.failure_log_file),
            metadata_log_dir: env_string("METADATA_LOG_DIR", default.metadata_log_dir),
            validation_enabled: env_parse("VALIDATION_ENABLED", default.validation_enabled)?,
            core_skill_enabled: env_parse("CORE_SKILL_ENABLED", default.core_skill_enabled)?,
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging)?,
            llm_api_key: env_string("LLM_API_KEY", default.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL", default.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME", default.llm_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE", default.llm_temperature)?,
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", default.llm_max_tokens)?,
            llm_max_retries: env_parse("LLM_MAX_RETRIES", default.llm_max_retries)?,
            llm_retry_delay_ms: env_parse("LLM_RETRY_DELAY_MS", default.llm_retry_delay_ms)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 检查配置是否合法
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize {
                value: self.max_batch_size,
            });
        }
        if self.max_concurrent_batches == 0 {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrent_batches,
            });
        }
        Ok(())
    }
}

fn env_string(var_name: &str, default: String) -> String {
    std::env::var(var_name).unwrap_or(default)
}

fn env_parse<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => parse_value(var_name, &value),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(var_name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value: value.to_string(),
            expected_type: std::any::type_name::<T>().to_string(),
        })
}
