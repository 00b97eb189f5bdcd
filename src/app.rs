use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::ChromeSession;
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::models::job::JobSpec;
use crate::models::loaders::{load_jobs_from_file, load_jobs_from_stdin};
use crate::models::outcome::JobOutcome;
use crate::orchestrator::BatchOrchestrator;
use crate::services::{HtmdConverter, OutputWriter};
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::workflow::{ChatFlow, FlowSettings, UiMap};

/// 应用主结构
pub struct App {
    config: Config,
    orchestrator: BatchOrchestrator,
    writer: OutputWriter,
}

impl App {
    /// 初始化应用：日志文件 → 浏览器会话 → 流程
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;

        log_startup(config.max_concurrent_jobs, &config.target_url);

        let ui = UiMap::gemini();
        let session = ChromeSession::start(&config, ui.login_probe())
            .await
            .context("无法获取浏览器会话")?;

        let flow = ChatFlow::new(
            ui,
            FlowSettings::from_config(&config),
            Arc::new(HtmdConverter::new()),
        );
        let orchestrator =
            BatchOrchestrator::new(Arc::new(session), Arc::new(flow), config.max_concurrent_jobs);

        Ok(Self {
            config,
            orchestrator,
            writer: OutputWriter::new(),
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let jobs = self.load_jobs().await?;

        if jobs.is_empty() {
            warn!("⚠️ 没有待处理的任务，程序结束");
            return Ok(());
        }

        let output_paths: Vec<Option<String>> = jobs
            .iter()
            .map(|job| job.output_path().map(String::from))
            .collect();

        let cancel = CancellationToken::new();
        let ctrl_c = spawn_ctrl_c_handler(cancel.clone());

        let result = self.orchestrator.run(jobs, cancel).await;
        ctrl_c.abort();

        let (mut report, cancelled) = match result {
            Ok(report) => (report, false),
            Err(OrchestratorError::Cancelled { report }) => (report, true),
            Err(e) => return Err(e).context("批次执行失败"),
        };

        self.write_outputs(&mut report.outcomes, &output_paths).await;

        let summary =
            serde_json::to_string_pretty(&report.outcomes).context("序列化结果失败")?;
        println!("{}", summary);

        print_final_stats(&report.outcomes, &self.config.output_log_file);
        if cancelled {
            warn!("⚠️ 批次被中断，未完成的任务已标记为取消");
        }

        Ok(())
    }

    /// 加载任务：配置了文件就读文件，否则读 stdin
    async fn load_jobs(&self) -> Result<Vec<JobSpec>> {
        let default_timeout = self.config.default_timeout_secs;
        let jobs = match &self.config.jobs_file {
            Some(path) => {
                info!("\n📁 正在读取任务文件: {}", path);
                load_jobs_from_file(Path::new(path), default_timeout).await?
            }
            None => {
                info!("\n📥 正在从 stdin 读取任务...");
                load_jobs_from_stdin(default_timeout).await?
            }
        };
        Ok(jobs)
    }

    /// 成功任务写入各自的 output_path，写入失败只记日志
    async fn write_outputs(&self, outcomes: &mut [JobOutcome], output_paths: &[Option<String>]) {
        for (outcome, path) in outcomes.iter_mut().zip(output_paths) {
            let (Some(path), Some(content)) = (path, outcome.content.as_deref()) else {
                continue;
            };
            match self.writer.write(&outcome.id, path, content).await {
                Ok(()) => {
                    info!("💾 任务 {} 的结果已写入: {}", outcome.id, path);
                    outcome.output_path = Some(path.clone());
                }
                Err(e) => error!("任务 {} 的结果写入失败: {}", outcome.id, e),
            }
        }
    }
}

/// Ctrl-C 取消整个批次
fn spawn_ctrl_c_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到 Ctrl-C，正在取消批次...");
            cancel.cancel();
        }
    })
}
