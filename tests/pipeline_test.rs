use question_forge::error::{AppError, AppResult, BatchError, FragmentError};
use question_forge::models::loaders::parse_generation_request;
use question_forge::models::{DuplicationTarget, GenerationRequest, RegenerationTarget};
use question_forge::services::{PromptBuilder, QUESTION_DELIMITER};
use question_forge::{App, CanonicalField, Config, Generator, QuestionSpec, QuestionType};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// 根据提示词中的主题行回显题目的生成器
///
/// - 主题 "explode"：整批生成失败
/// - 主题 "garbled"：该题输出非 JSON
/// - 含重新生成说明时，题目文本为 "regenerated <topic>"
/// - 提示词要求核心技能摘要时，在前言中输出 batch_summary
/// - 复制提示词：按要求数量输出 "Variation i: <notes>"
#[derive(Default)]
struct EchoGenerator {
    prompts: Mutex<Vec<String>>,
}

impl EchoGenerator {
    fn topics(prompt: &str) -> Vec<String> {
        prompt
            .lines()
            .filter_map(|line| line.trim().strip_prefix("- Topic: \""))
            .map(|rest| rest.split('"').next().unwrap_or_default().to_string())
            .collect()
    }

    fn duplicate(prompt: &str) -> String {
        let count: usize = prompt
            .split("Create ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(1);
        let notes = prompt
            .split("## CUSTOM NOTES\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default();

        (1..=count)
            .map(|i| {
                let fragment = serde_json::json!({
                    "question": format!("Variation {}: {}", i, notes),
                    "answer": "B",
                });
                format!("{}\n{}\n", QUESTION_DELIMITER, fragment)
            })
            .collect()
    }
}

impl Generator for EchoGenerator {
    async fn generate(&self, prompt: &str, attachments: &[String]) -> AppResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if prompt.contains("## ORIGINAL QUESTION") {
            return Ok(Self::duplicate(prompt));
        }

        let topics = Self::topics(prompt);
        if topics.iter().any(|t| t == "explode") {
            return Err(AppError::Other("模型不可用".to_string()));
        }

        let regenerating = prompt.contains("[REGENERATION INSTRUCTION]");
        let mut out = "Sure! Here are the questions.\n".to_string();
        if prompt.contains("CORE SKILL SUMMARY") {
            out.push_str(&format!("{{\"batch_summary\": \"{}\"}}\n", topics.join(" + ")));
        }
        for (i, topic) in topics.iter().enumerate() {
            out.push_str(QUESTION_DELIMITER);
            out.push('\n');
            if topic == "garbled" {
                out.push_str("Sorry, I could not format this one.\n");
                continue;
            }
            let text = if regenerating {
                format!("regenerated {}", topic)
            } else {
                format!("Q{} on {}", i + 1, topic)
            };
            let fragment = serde_json::json!({
                "Topic_Name": topic,
                "Question Text": text,
                "correct-answer": "A",
                "attachment_count": attachments.len(),
            });
            out.push_str(&format!("```json\n{}\n```\n", fragment));
        }
        Ok(out)
    }
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("question_forge_{}_{}", std::process::id(), name))
}

fn test_config(name: &str) -> Config {
    Config {
        output_file: temp_path(&format!("{}.json", name)).display().to_string(),
        failure_log_file: temp_path(&format!("{}_failed.txt", name)).display().to_string(),
        metadata_log_dir: temp_path(&format!("{}_metadata", name)).display().to_string(),
        ..Config::default()
    }
}

fn request(specs: Vec<QuestionSpec>) -> GenerationRequest {
    GenerationRequest {
        new_concept: "Arithmetic progressions".to_string(),
        questions: specs,
        ..GenerationRequest::default()
    }
}

fn spec(question_type: QuestionType, topic: &str) -> QuestionSpec {
    QuestionSpec::new(question_type, topic)
}

fn app(config: Config, request: GenerationRequest) -> App<EchoGenerator> {
    let prompts = PromptBuilder::new(&request.new_concept, &request.additional_notes);
    App::new(config, request, EchoGenerator::default(), prompts)
}

/// 共享同一个生成器，便于在运行后检查提示词
struct Shared(Arc<EchoGenerator>);

impl Generator for Shared {
    async fn generate(&self, prompt: &str, attachments: &[String]) -> AppResult<String> {
        self.0.generate(prompt, attachments).await
    }
}

fn shared_app(config: Config, request: GenerationRequest) -> (App<Shared>, Arc<EchoGenerator>) {
    let prompts = PromptBuilder::new(&request.new_concept, &request.additional_notes);
    let generator = Arc::new(EchoGenerator::default());
    let app = App::new(config, request, Shared(generator.clone()), prompts);
    (app, generator)
}

fn question_text(report: &question_forge::RunReport, batch: &str, index: usize) -> Option<String> {
    report.batch(batch)?.questions.get(index)?.record()?.text(CanonicalField::Question)
}

#[tokio::test]
async fn test_batches_and_records_follow_packed_order() {
    let specs = vec![
        spec(QuestionType::Mcq, "a"),
        spec(QuestionType::Mcq, "a"),
        spec(QuestionType::Mcq, "a"),
        spec(QuestionType::Mcq, "a"),
        spec(QuestionType::Mcq, "a"),
        spec(QuestionType::FillInTheBlanks, "b"),
        spec(QuestionType::Mcq, "c"),
    ];
    let report = app(test_config("order"), request(specs))
        .generate_all()
        .await
        .unwrap();

    let keys: Vec<&str> = report.batches.iter().map(|b| b.batch_key.as_str()).collect();
    assert_eq!(keys, vec!["MCQ - Batch 1", "MCQ - Batch 2", "Fill in the Blanks - Batch 1"]);
    assert_eq!(report.batches[0].source_indices, vec![0, 1, 2, 3]);
    assert_eq!(report.batches[1].source_indices, vec![4, 6]);
    assert_eq!(report.batches[2].source_indices, vec![5]);

    let second = &report.batches[1];
    assert_eq!(second.questions[0].key, "question1");
    assert_eq!(second.questions[1].key, "question2");
    assert_eq!(question_text(&report, "MCQ - Batch 2", 1).as_deref(), Some("Q2 on c"));

    let record = second.questions[1].record().unwrap();
    assert_eq!(record.text(CanonicalField::Topic).as_deref(), Some("c"));
    assert_eq!(record.text(CanonicalField::CorrectAnswer).as_deref(), Some("A"));
    assert!(record.get_raw("attachment_count").is_some());

    assert_eq!(report.stats.batches_total, 3);
    assert_eq!(report.stats.questions_ok, 7);
    assert_eq!(report.stats.questions_failed, 0);
}

#[tokio::test]
async fn test_failed_batch_does_not_affect_other_batches() {
    let specs = vec![
        spec(QuestionType::Mcq, "explode"),
        spec(QuestionType::FillInTheBlanks, "fine"),
    ];
    let report = app(test_config("isolation"), request(specs))
        .generate_all()
        .await
        .unwrap();

    let failed = report.batch("MCQ - Batch 1").unwrap();
    assert!(matches!(failed.error, Some(BatchError::GenerationFailed { .. })));
    assert_eq!(
        question_text(&report, "Fill in the Blanks - Batch 1", 0).as_deref(),
        Some("Q1 on fine")
    );
    assert_eq!(report.stats.batches_failed, 1);
    assert_eq!(report.stats.questions_ok, 1);
    assert_eq!(report.stats.questions_failed, 1);
}

#[tokio::test]
async fn test_unparseable_fragment_isolated_within_batch() {
    let specs = vec![
        spec(QuestionType::Mcq, "x"),
        spec(QuestionType::Mcq, "garbled"),
        spec(QuestionType::Mcq, "x"),
    ];
    let report = app(test_config("fragment"), request(specs))
        .generate_all()
        .await
        .unwrap();

    let batch = report.batch("MCQ - Batch 1").unwrap();
    // 剩余题目按主题首次出现顺序拼接：x, x, garbled
    assert_eq!(batch.source_indices, vec![0, 2, 1]);
    assert!(batch.is_ok());
    assert!(batch.questions[0].is_ok());
    assert!(batch.questions[1].is_ok());
    assert_eq!(batch.questions[2].source_index, Some(1));
    assert_eq!(batch.questions[2].result, Err(FragmentError::NoJsonObject));
}

#[tokio::test]
async fn test_regeneration_replaces_question_in_place() {
    let specs = vec![spec(QuestionType::Mcq, "a"), spec(QuestionType::Mcq, "a")];
    let app = app(test_config("regen"), request(specs));
    let mut report = app.generate_all().await.unwrap();
    assert_eq!(question_text(&report, "MCQ - Batch 1", 1).as_deref(), Some("Q2 on a"));

    let targets = vec![RegenerationTarget::new("MCQ - Batch 1", 2).with_reason("Make it harder")];
    let replaced = app.regenerate(&mut report, &targets).await.unwrap();

    assert_eq!(replaced, 1);
    assert_eq!(question_text(&report, "MCQ - Batch 1", 0).as_deref(), Some("Q1 on a"));
    assert_eq!(
        question_text(&report, "MCQ - Batch 1", 1).as_deref(),
        Some("regenerated a")
    );
    assert_eq!(report.batches[0].questions[1].key, "question2");
    assert_eq!(report.stats.questions_ok, 2);
}

#[tokio::test]
async fn test_regeneration_with_no_valid_target_is_error() {
    let app = app(test_config("regen_none"), request(vec![spec(QuestionType::Mcq, "a")]));
    let mut report = app.generate_all().await.unwrap();

    let err = app
        .regenerate(&mut report, &[RegenerationTarget::new("Case Study - Batch 1", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Batch(BatchError::NothingToRegenerate)));
}

#[tokio::test]
async fn test_core_skill_metadata_carried_between_batches_of_same_type() {
    let config = Config {
        core_skill_enabled: true,
        max_batch_size: 1,
        ..test_config("core_skill")
    };
    let specs = vec![
        spec(QuestionType::Mcq, "first"),
        spec(QuestionType::Mcq, "second"),
        spec(QuestionType::Descriptive, "other"),
    ];
    let report = app(config, request(specs)).generate_all().await.unwrap();

    assert_eq!(report.batches.len(), 3);
    assert_eq!(
        report.batches[0].core_skill_metadata.get("batch_summary"),
        Some("first")
    );
    assert_eq!(question_text(&report, "MCQ - Batch 2", 0).as_deref(), Some("Q1 on second"));
    assert_eq!(report.batches[2].batch_key, "Descriptive - Batch 1");
}

#[tokio::test]
async fn test_core_skill_prompt_contains_previous_metadata() {
    let config = Config {
        core_skill_enabled: true,
        max_batch_size: 1,
        ..test_config("core_skill_prompt")
    };
    let metadata_dir = PathBuf::from(&config.metadata_log_dir);
    let _ = std::fs::remove_dir_all(&metadata_dir);
    let specs = vec![spec(QuestionType::Mcq, "first"), spec(QuestionType::Mcq, "second")];
    let (app, generator) = shared_app(config, request(specs));
    app.generate_all().await.unwrap();

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    // 第一个批次就要求模型输出元数据
    assert!(prompts[0].contains("\"batch_summary\""));
    assert!(!prompts[0].contains("PREVIOUSLY USED CORE SKILLS"));
    assert!(prompts[1].contains("PREVIOUSLY USED CORE SKILLS"));
    assert!(prompts[1].contains("batch_summary: first"));

    let files: Vec<_> = std::fs::read_dir(&metadata_dir).unwrap().collect();
    assert_eq!(files.len(), 2);
    let _ = std::fs::remove_dir_all(&metadata_dir);
}

#[tokio::test]
async fn test_prompts_omit_core_skill_request_when_disabled() {
    let config = test_config("no_core_skill");
    let metadata_dir = PathBuf::from(&config.metadata_log_dir);
    let (app, generator) = shared_app(config, request(vec![spec(QuestionType::Mcq, "a")]));
    let report = app.generate_all().await.unwrap();

    let prompts = generator.prompts.lock().unwrap();
    assert!(!prompts[0].contains("batch_summary"));
    assert!(report.batches[0].core_skill_metadata.is_empty());
    assert!(!metadata_dir.exists());
}

#[tokio::test]
async fn test_duplication_generates_variations_of_existing_question() {
    let specs = vec![spec(QuestionType::Mcq, "a"), spec(QuestionType::Mcq, "garbled")];
    let (app, generator) = shared_app(test_config("duplicate"), request(specs));
    let report = app.generate_all().await.unwrap();

    let targets = vec![
        DuplicationTarget::new("MCQ - Batch 1", 1, 3).with_notes("Use money"),
        // 原题解析失败，跳过
        DuplicationTarget::new("MCQ - Batch 1", 2, 1),
    ];
    let duplicates = app.duplicate(&report, &targets).await.unwrap();

    assert_eq!(duplicates.len(), 1);
    let dup = &duplicates[0];
    assert_eq!(dup.batch_key, "MCQ - Batch 1");
    assert_eq!(dup.question_key, "question1");
    assert_eq!(dup.requested, 3);
    assert_eq!(dup.succeeded(), 3);
    assert_eq!(dup.variations[2].key, "variation3");
    let record = dup.variations[2].record().unwrap();
    assert_eq!(record.text(CanonicalField::Question).as_deref(), Some("Variation 3: Use money"));
    assert_eq!(record.text(CanonicalField::CorrectAnswer).as_deref(), Some("B"));

    {
        let prompts = generator.prompts.lock().unwrap();
        let dup_prompt = prompts.last().unwrap();
        assert!(dup_prompt.contains("Q1 on a"));
        assert!(dup_prompt.contains("[No file provided]"));
    }

    let err = app
        .duplicate(&report, &[DuplicationTarget::new("MCQ - Batch 1", 2, 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Batch(BatchError::NothingToDuplicate)));
}

#[tokio::test]
async fn test_run_from_request_file_writes_report_and_failures() {
    let content = r#"
new_concept = "Sequences"

[[questions]]
type = "MCQ"
topic = "a"

[[questions]]
type = "MCQ"
topic = "garbled"

[[regenerate]]
batch = "MCQ - Batch 1"
index = 1
reason = "Too easy"

[[duplicate]]
batch = "MCQ - Batch 1"
index = 1
count = 2
"#;
    let request = parse_generation_request(content, "inline.toml").unwrap();
    let config = test_config("run");
    let output_file = config.output_file.clone();
    let failure_file = config.failure_log_file.clone();
    let _ = std::fs::remove_file(&failure_file);

    let report = app(config, request).run().await.unwrap();
    assert_eq!(
        question_text(&report, "MCQ - Batch 1", 0).as_deref(),
        Some("regenerated a")
    );

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output_file).unwrap()).unwrap();
    let batch = &json["batches"][0];
    assert_eq!(batch["batch_key"], "MCQ - Batch 1");
    assert_eq!(batch["question_type"], "MCQ");
    assert_eq!(batch["questions"][0]["record"]["QUESTION"], "regenerated a");
    assert_eq!(batch["questions"][1]["error"], "片段中没有 JSON 对象");
    assert_eq!(json["stats"]["questions_failed"], 1);

    let duplicate = &json["duplicates"][0];
    assert_eq!(duplicate["question_key"], "question1");
    assert_eq!(duplicate["variations"].as_array().unwrap().len(), 2);
    assert_eq!(duplicate["variations"][1]["record"]["QUESTION"], "Variation 2: None");

    let failures = std::fs::read_to_string(&failure_file).unwrap();
    assert!(failures.contains("MCQ - Batch 1 | question2"));
    assert!(failures.contains("Sorry, I could not format this one."));

    let _ = std::fs::remove_file(&output_file);
    let _ = std::fs::remove_file(&failure_file);
}
