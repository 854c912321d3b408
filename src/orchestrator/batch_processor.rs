//! 批量题目生成处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批次的调度和结果汇总。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：日志文件、加载请求文件和提示词模板、创建生成服务
//! 2. **打包**：把题目请求打包成批次
//! 3. **并发控制**：使用 Semaphore 限制同时进行的批次数
//! 4. **核心技能模式**：同题型批次串行并传递累计元数据，不同题型仍并行
//! 5. **重新生成**：按请求文件中的目标替换指定题目
//! 6. **题目复制**：以指定题目为原题生成变体
//! 7. **结果输出**：JSON 报告、失败记录、元数据记录、全局统计
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个批次的细节，委托 [`BatchFlow`]
//! - **批次隔离**：任务异常只影响对应批次，结果仍按打包顺序返回

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, BatchError};
use crate::models::{
    load_generation_request, Batch, DuplicationTarget, GenerationRequest, QuestionType,
    RegenerationTarget,
};
use crate::orchestrator::duplication::plan_duplication;
use crate::orchestrator::regeneration::{apply_regenerated, plan_regeneration};
use crate::services::{
    pack, CoreSkillMetadata, FailureWriter, Generator, LlmService, MetadataWriter, PromptBuilder,
};
use crate::utils::logging::{
    init_log_file, log_batch_complete, log_batch_start, log_batches_packed, log_startup,
    print_final_stats, truncate_text,
};
use crate::workflow::{BatchCtx, BatchFlow, BatchOutcome, DuplicationOutcome};

/// 失败记录中片段摘录的最大长度
const FAILURE_EXCERPT_LEN: usize = 500;

/// 处理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub batches_total: usize,
    pub batches_failed: usize,
    pub questions_ok: usize,
    pub questions_failed: usize,
}

impl RunStats {
    pub fn from_outcomes(outcomes: &[BatchOutcome]) -> Self {
        outcomes.iter().fold(
            Self {
                batches_total: outcomes.len(),
                ..Default::default()
            },
            |mut stats, outcome| {
                if !outcome.is_ok() {
                    stats.batches_failed += 1;
                }
                stats.questions_ok += outcome.succeeded();
                stats.questions_failed += outcome.failed_count();
                stats
            },
        )
    }
}

/// 一次运行的完整结果（即 JSON 报告内容）
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: String,
    pub model: String,
    pub stats: RunStats,
    pub batches: Vec<BatchOutcome>,
    /// 题目复制结果
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<DuplicationOutcome>,
}

impl RunReport {
    pub fn new(model: impl Into<String>, batches: Vec<BatchOutcome>) -> Self {
        Self {
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            model: model.into(),
            stats: RunStats::from_outcomes(&batches),
            batches,
            duplicates: Vec::new(),
        }
    }

    pub fn batch(&self, key: &str) -> Option<&BatchOutcome> {
        self.batches.iter().find(|b| b.batch_key == key)
    }
}

/// 应用主结构
pub struct App<G: Generator = LlmService> {
    config: Config,
    request: GenerationRequest,
    flow: BatchFlow<G>,
    failure_writer: FailureWriter,
    metadata_writer: MetadataWriter,
    model_name: String,
}

impl App<LlmService> {
    /// 初始化应用
    pub async fn initialize(config: Config) -> anyhow::Result<Self> {
        init_log_file(&config.output_log_file)?;

        log_startup(
            config.max_batch_size,
            config.max_concurrent_batches,
            &config.llm_model_name,
        );

        info!("\n📁 正在加载请求文件: {}", config.request_file);
        let request = load_generation_request(Path::new(&config.request_file)).await?;

        let mut prompts = PromptBuilder::new(&request.new_concept, &request.additional_notes);
        if let Some(prompt_file) = &config.prompt_file {
            prompts = prompts.with_template_file(Path::new(prompt_file)).await?;
        }

        let generator = LlmService::new(&config);
        Ok(Self::new(config, request, generator, prompts))
    }
}

impl<G: Generator> App<G> {
    /// 使用任意生成器创建应用
    pub fn new(config: Config, request: GenerationRequest, generator: G, prompts: PromptBuilder) -> Self {
        let model_name = config.llm_model_name.clone();
        let prompts = prompts.with_core_skill(config.core_skill_enabled);
        let flow = BatchFlow::new(Arc::new(generator), Arc::new(prompts), &config);
        let failure_writer = FailureWriter::with_path(&config.failure_log_file);
        let metadata_writer = MetadataWriter::with_dir(&config.metadata_log_dir);
        Self {
            config,
            request,
            flow,
            failure_writer,
            metadata_writer,
            model_name,
        }
    }

    /// 运行应用主逻辑：生成 → 重新生成（如有）→ 复制（如有）→ 写失败记录和报告 → 统计
    pub async fn run(&self) -> anyhow::Result<RunReport> {
        let mut report = self.generate_all().await?;

        if !self.request.regenerate.is_empty() {
            match self.regenerate(&mut report, &self.request.regenerate).await {
                Ok(replaced) => info!("🔄 重新生成完成，替换了 {} 道题", replaced),
                Err(e) => warn!("⚠️ 重新生成未执行: {}", e),
            }
        }

        if !self.request.duplicate.is_empty() {
            match self.duplicate(&report, &self.request.duplicate).await {
                Ok(duplicates) => {
                    let generated: usize = duplicates.iter().map(|d| d.succeeded()).sum();
                    info!("🧬 复制完成，共生成 {} 个变体", generated);
                    report.duplicates = duplicates;
                }
                Err(e) => warn!("⚠️ 题目复制未执行: {}", e),
            }
        }

        self.write_failure_log(&report)?;
        self.write_report(&report).await?;

        print_final_stats(
            report.stats.batches_total - report.stats.batches_failed,
            report.stats.batches_total,
            report.stats.questions_ok,
            report.stats.questions_failed,
            &self.config.output_file,
        );

        Ok(report)
    }

    /// 打包并生成所有批次
    pub async fn generate_all(&self) -> AppResult<RunReport> {
        let batches = pack(&self.request.questions, self.config.max_batch_size)?;

        if batches.is_empty() {
            warn!("⚠️ 请求中没有题目，程序结束");
            return Ok(RunReport::new(&self.model_name, Vec::new()));
        }

        log_batches_packed(self.request.questions.len(), batches.len());

        let outcomes = self.process_batches(batches).await?;
        Ok(RunReport::new(&self.model_name, outcomes))
    }

    /// 处理批次，结果按输入顺序返回
    pub async fn process_batches(&self, batches: Vec<Batch>) -> AppResult<Vec<BatchOutcome>> {
        if self.config.core_skill_enabled {
            Ok(self.process_by_type_sequentially(batches).await)
        } else {
            self.process_concurrently(batches).await
        }
    }

    /// 所有批次并发处理
    async fn process_concurrently(&self, batches: Vec<Batch>) -> AppResult<Vec<BatchOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_batches));
        let total = batches.len();
        let mut handles = Vec::with_capacity(total);

        for (idx, batch) in batches.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Other(format!("获取并发许可失败: {}", e)))?;

            log_batch_start(idx + 1, total, batch.key(), batch.len());

            let flow = self.flow.clone();
            let batch_clone = batch.clone();
            let ctx = BatchCtx::new(batch.key(), idx + 1, total);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                flow.run(&batch_clone, &ctx, None).await
            });
            handles.push(handle);
        }

        let mut outcomes = Vec::with_capacity(total);
        for (batch, handle) in batches.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("[{}] 任务执行失败: {}", batch.key(), e);
                    BatchOutcome::failed(
                        batch,
                        BatchError::TaskAborted {
                            message: e.to_string(),
                        },
                    )
                }
            };
            log_batch_complete(
                &outcome.batch_key,
                outcome.succeeded(),
                outcome.source_indices.len(),
            );
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// 同题型批次串行（传递累计的核心技能元数据），不同题型并行
    async fn process_by_type_sequentially(&self, batches: Vec<Batch>) -> Vec<BatchOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_batches));
        let total = batches.len();

        let mut groups: Vec<(QuestionType, Vec<(usize, Batch)>)> = Vec::new();
        for (position, batch) in batches.into_iter().enumerate() {
            let question_type = batch.question_type();
            match groups.iter_mut().find(|(ty, _)| *ty == question_type) {
                Some((_, members)) => members.push((position, batch)),
                None => groups.push((question_type, vec![(position, batch)])),
            }
        }

        let mut handles = Vec::with_capacity(groups.len());
        for (question_type, members) in groups {
            info!("🧠 {} 共 {} 个批次，按顺序生成", question_type, members.len());

            let flow = self.flow.clone();
            let semaphore = semaphore.clone();
            let metadata_writer = self.metadata_writer.clone();
            let task_members = members.clone();

            let handle = tokio::spawn(async move {
                let mut metadata = CoreSkillMetadata::default();
                let mut results = Vec::with_capacity(task_members.len());

                for (position, batch) in task_members {
                    log_batch_start(position + 1, total, batch.key(), batch.len());
                    let ctx = BatchCtx::new(batch.key(), position + 1, total);

                    let outcome = match semaphore.clone().acquire_owned().await {
                        Ok(_permit) => flow.run(&batch, &ctx, Some(&metadata)).await,
                        Err(e) => BatchOutcome::failed(
                            &batch,
                            BatchError::TaskAborted {
                                message: e.to_string(),
                            },
                        ),
                    };

                    if let Err(e) =
                        metadata_writer.write(&outcome.batch_key, &outcome.core_skill_metadata)
                    {
                        warn!("[{}] ⚠️ 元数据写入失败: {}", outcome.batch_key, e);
                    }
                    metadata.accumulate(&outcome.core_skill_metadata);
                    log_batch_complete(
                        &outcome.batch_key,
                        outcome.succeeded(),
                        outcome.source_indices.len(),
                    );
                    results.push((position, outcome));
                }

                results
            });
            handles.push((members, handle));
        }

        let mut slots: Vec<Option<BatchOutcome>> = vec![None; total];
        for (members, handle) in handles {
            match handle.await {
                Ok(results) => {
                    for (position, outcome) in results {
                        slots[position] = Some(outcome);
                    }
                }
                Err(e) => {
                    error!("题型任务执行失败: {}", e);
                    for (position, batch) in members {
                        slots[position] = Some(BatchOutcome::failed(
                            &batch,
                            BatchError::TaskAborted {
                                message: e.to_string(),
                            },
                        ));
                    }
                }
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// 重新生成指定题目，就地更新报告，返回替换的题目数
    pub async fn regenerate(
        &self,
        report: &mut RunReport,
        targets: &[RegenerationTarget],
    ) -> AppResult<usize> {
        let plan = plan_regeneration(&report.batches, &self.request.questions, targets)?;

        let planned_batches: Vec<Batch> = plan.batches.iter().map(|p| p.batch.clone()).collect();
        let regenerated = self.process_concurrently(planned_batches).await?;

        let mut replaced = 0;
        for (planned, outcome) in plan.batches.iter().zip(regenerated) {
            if let Some(original) = report.batches.get_mut(planned.outcome_index) {
                replaced += apply_regenerated(original, &planned.positions, outcome);
            }
        }

        report.stats = RunStats::from_outcomes(&report.batches);
        Ok(replaced)
    }

    /// 以指定题目为原题生成变体，结果按目标顺序返回
    pub async fn duplicate(
        &self,
        report: &RunReport,
        targets: &[DuplicationTarget],
    ) -> AppResult<Vec<DuplicationOutcome>> {
        let plan = plan_duplication(&report.batches, &self.request.questions, targets)?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_batches));
        let total = plan.jobs.len();
        let mut handles = Vec::with_capacity(total);

        for (idx, job) in plan.jobs.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Other(format!("获取并发许可失败: {}", e)))?;

            let flow = self.flow.clone();
            let job_clone = job.clone();
            let ctx = BatchCtx::new(
                format!("{} {}", job.batch_key, job.question_key),
                idx + 1,
                total,
            );

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                flow.run_duplication(&job_clone, &ctx).await
            }));
        }

        let mut outcomes = Vec::with_capacity(total);
        for (job, handle) in plan.jobs.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("[{} {}] 复制任务执行失败: {}", job.batch_key, job.question_key, e);
                    DuplicationOutcome::failed(
                        job,
                        BatchError::TaskAborted {
                            message: e.to_string(),
                        },
                    )
                }
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// 写入 JSON 报告
    pub async fn write_report(&self, report: &RunReport) -> AppResult<()> {
        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&self.config.output_file, json)
            .await
            .map_err(|e| AppError::file_write_failed(&self.config.output_file, e))?;
        info!("💾 结果已写入 {}", self.config.output_file);
        Ok(())
    }

    /// 把失败的批次和题目追加到失败记录文件
    pub fn write_failure_log(&self, report: &RunReport) -> AppResult<usize> {
        let mut written = 0;
        for outcome in &report.batches {
            if let Some(e) = &outcome.error {
                self.failure_writer
                    .write(&outcome.batch_key, "-", &e.to_string(), "")?;
                written += 1;
                continue;
            }
            for question in outcome.questions.iter().filter(|q| !q.is_ok()) {
                let reason = question
                    .result
                    .as_ref()
                    .err()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.failure_writer.write(
                    &outcome.batch_key,
                    &question.key,
                    &reason,
                    &truncate_text(&question.fragment, FAILURE_EXCERPT_LEN),
                )?;
                written += 1;
            }
        }

        for duplicate in &report.duplicates {
            let question = format!("{} 复制", duplicate.question_key);
            if let Some(e) = &duplicate.error {
                self.failure_writer
                    .write(&duplicate.batch_key, &question, &e.to_string(), "")?;
                written += 1;
                continue;
            }
            for variation in duplicate.variations.iter().filter(|v| !v.is_ok()) {
                let reason = variation
                    .result
                    .as_ref()
                    .err()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.failure_writer.write(
                    &duplicate.batch_key,
                    &format!("{} {}", question, variation.key),
                    &reason,
                    &truncate_text(&variation.fragment, FAILURE_EXCERPT_LEN),
                )?;
                written += 1;
            }
        }

        if written > 0 {
            warn!(
                "⚠️ {} 条失败记录已写入 {}",
                written,
                self.failure_writer.path()
            );
        }
        Ok(written)
    }
}
