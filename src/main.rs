use anyhow::Result;
use question_forge::utils::logging;
use question_forge::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env()?;

    // 初始化日志
    logging::init_tracing(config.verbose_logging);

    // 初始化并运行应用
    let report = App::initialize(config).await?.run().await?;

    if report.stats.questions_failed > 0 {
        tracing::warn!("⚠️ 有 {} 道题生成失败，详见失败记录", report.stats.questions_failed);
    }

    Ok(())
}
