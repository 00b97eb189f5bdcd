use anyhow::Result;
use chat_pilot::utils::logging;
use chat_pilot::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let mut config = Config::load()?;

    // 第一个参数可以直接指定任务文件
    if let Some(jobs_file) = std::env::args().nth(1) {
        config.jobs_file = Some(jobs_file);
    }

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
