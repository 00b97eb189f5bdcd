//! 对话处理流程 - 流程层
//!
//! 核心职责：定义"一个任务"的完整处理流程
//!
//! 流程顺序：
//! 1. 输入提示词
//! 2. 切换模式（深度研究 / 深度思考 / 图片生成）
//! 3. 提交
//! 4. 确认（仅深度研究，对话框不出现时跳过）
//! 5. 等待完成（使用任务剩余时间）
//! 6. 提取结果
//!
//! 任何阶段失败都直接进入 `Failed`，生成该任务的结果，不影响其他任务。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{DriverError, FileError};
use crate::infrastructure::{Condition, Lookup, Matched, PageDriver};
use crate::models::job::{timeout_from_secs, JobMode};
use crate::models::outcome::{FailureKind, JobOutcome, Stage, StageFailure, StageResult};
use crate::services::{relocate, DownloadWatcher, TextConverter};
use crate::utils::truncate_text;
use crate::workflow::job_ctx::WorkflowContext;
use crate::workflow::ui_map::UiMap;

/// 流程中各阶段的等待时间
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub input_ready: Duration,
    pub control_ready: Duration,
    pub toggle_verify: Duration,
    pub confirm_widget: Duration,
    pub confirm_button: Duration,
    pub extras_probe: Duration,
    /// 深度研究完成后等待最终内容渲染
    pub research_settle: Duration,
    pub poll_interval: Duration,
    /// 图片任务默认监听的下载目录
    pub download_dir: PathBuf,
    /// 图片任务默认的目标目录
    pub output_dir: PathBuf,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        let stages = &config.stage_timeouts;
        Self {
            input_ready: timeout_from_secs(stages.input_ready_secs),
            control_ready: timeout_from_secs(stages.control_ready_secs),
            toggle_verify: timeout_from_secs(stages.toggle_verify_secs),
            confirm_widget: timeout_from_secs(stages.confirm_widget_secs),
            confirm_button: timeout_from_secs(stages.confirm_button_secs),
            extras_probe: timeout_from_secs(stages.extras_probe_secs),
            research_settle: timeout_from_secs(stages.research_settle_secs),
            poll_interval: config.poll_interval(),
            download_dir: config.resolved_download_dir(),
            output_dir: PathBuf::from(&config.output_dir),
        }
    }
}

/// 一个阶段成功后的去向
struct Advance {
    next: Stage,
    detail: Option<String>,
    content: Option<String>,
}

impl Advance {
    fn to(next: Stage, detail: impl Into<String>) -> Self {
        Self {
            next,
            detail: Some(detail.into()),
            content: None,
        }
    }

    fn with_content(mut self, content: String) -> Self {
        self.content = Some(content);
        self
    }
}

type StageOutcome = Result<Advance, StageFailure>;

/// 对话处理流程
///
/// - 驱动单个任务走完状态机
/// - 不持有页面（页面在上下文里）
/// - 可以被所有任务共享
pub struct ChatFlow {
    ui: UiMap,
    settings: FlowSettings,
    converter: Arc<dyn TextConverter>,
}

impl ChatFlow {
    pub fn new(ui: UiMap, settings: FlowSettings, converter: Arc<dyn TextConverter>) -> Self {
        Self { ui, settings, converter }
    }

    pub fn ui(&self) -> &UiMap {
        &self.ui
    }

    /// 执行完整流程，总是返回一个结果
    pub async fn run(&self, ctx: &mut WorkflowContext) -> JobOutcome {
        info!(
            "{} ✏️ 提示词: {}",
            ctx,
            truncate_text(&ctx.job.prompt.replace('\n', " "), 60)
        );

        let mut content: Option<String> = None;
        loop {
            let stage = ctx.stage;
            let step = match stage {
                Stage::Entering => self.enter_prompt(ctx).await,
                Stage::ModeToggling => self.toggle_mode(ctx).await,
                Stage::Submitting => self.submit(ctx).await,
                Stage::Confirming => self.confirm(ctx).await,
                Stage::AwaitingCompletion => self.await_completion(ctx).await,
                Stage::Extracting => self.extract(ctx, content.take()).await,
                Stage::Done => {
                    let content = content.take().unwrap_or_default();
                    info!("{} ✅ 完成，内容 {} 字符", ctx, content.chars().count());
                    return ctx.finish(content);
                }
                Stage::Failed(kind) => {
                    return ctx.fail(StageFailure::new(stage, kind, "流程已处于失败状态"));
                }
            };

            match step {
                Ok(advance) => {
                    if advance.content.is_some() {
                        content = advance.content;
                    }
                    ctx.advance(StageResult::ok(stage, advance.detail), advance.next);
                }
                Err(failure) => return ctx.fail(failure),
            }
        }
    }

    // ========== 各阶段 ==========

    async fn enter_prompt(&self, ctx: &WorkflowContext) -> StageOutcome {
        let stage = Stage::Entering;
        let page = ctx.page();

        let input = page
            .await_ready(&self.ui.prompt_input, self.settings.input_ready)
            .await
            .map_err(|e| driver_failure(stage, e))?;
        page.type_text(&input, &ctx.job.prompt)
            .await
            .map_err(|e| driver_failure(stage, e))?;

        let next = if ctx.job.mode.needs_toggle() {
            Stage::ModeToggling
        } else {
            Stage::Submitting
        };
        Ok(Advance::to(
            next,
            format!("{} 已输入 {} 字符", input.locator_name, ctx.job.prompt.chars().count()),
        ))
    }

    async fn toggle_mode(&self, ctx: &WorkflowContext) -> StageOutcome {
        let stage = Stage::ModeToggling;
        let mode = ctx.job.mode;
        let (Some(item), Some(active)) = (self.ui.mode_item(mode), self.ui.mode_active(mode)) else {
            return Ok(Advance::to(Stage::Submitting, "无需切换模式"));
        };
        let page = ctx.page();

        info!("{} 🔧 切换到{}模式", ctx, mode);
        let tools = page
            .await_ready(&self.ui.tools_button, self.settings.control_ready)
            .await
            .map_err(|e| driver_failure(stage, e))?;
        page.click(&tools, None).await.map_err(|e| driver_failure(stage, e))?;

        let control = page
            .await_ready(&item, self.settings.control_ready)
            .await
            .map_err(|e| driver_failure(stage, e))?;
        let activated = page
            .click(&control, Some((&active, self.settings.toggle_verify)))
            .await
            .map_err(|e| driver_failure(stage, e))?;

        if !activated {
            return Err(StageFailure::new(
                stage,
                FailureKind::UiChanged,
                format!("{}模式未激活，未观察到: {}", mode, active.describe()),
            ));
        }
        Ok(Advance::to(Stage::Submitting, format!("{}模式已激活", mode)))
    }

    async fn submit(&self, ctx: &WorkflowContext) -> StageOutcome {
        let stage = Stage::Submitting;
        let page = ctx.page();

        let send = page
            .await_ready(&self.ui.send_button, self.settings.control_ready)
            .await
            .map_err(|e| driver_failure(stage, e))?;
        page.click(&send, None).await.map_err(|e| driver_failure(stage, e))?;
        info!("{} 📤 已提交", ctx);

        let next = if ctx.job.mode.needs_confirmation() {
            Stage::Confirming
        } else {
            Stage::AwaitingCompletion
        };
        Ok(Advance::to(next, send.locator_name))
    }

    async fn confirm(&self, ctx: &WorkflowContext) -> StageOutcome {
        let stage = Stage::Confirming;
        let page = ctx.page();

        let widget = Condition::Visible(self.ui.confirm_widget.clone());
        let widget_wait = self.settings.confirm_widget.min(ctx.remaining());
        let appeared = page
            .wait_for_condition(&widget, widget_wait)
            .await
            .map_err(|e| driver_failure(stage, e))?;
        if !appeared {
            info!("{} 未出现确认对话框，直接等待完成", ctx);
            return Ok(Advance::to(Stage::AwaitingCompletion, "未出现确认对话框"));
        }

        let ready = page
            .await_ready(&self.ui.confirm_button, self.settings.confirm_button)
            .await;
        let button = match ready {
            Ok(button) => button,
            Err(DriverError::UiChanged { locator }) => {
                warn!("{} 确认对话框已出现，但没有可点击的确认按钮 ({})", ctx, locator);
                let detail = format!("确认按钮未找到: {}", locator);
                return Ok(Advance::to(Stage::AwaitingCompletion, detail));
            }
            Err(e) => return Err(driver_failure(stage, e)),
        };

        let which = match button.matched {
            Matched::Primary => "主定位器",
            Matched::Fallback => "备用定位器",
        };
        info!("{} ✔ 确认按钮命中{}: {}", ctx, which, button.locator_name);
        page.click(&button, None).await.map_err(|e| driver_failure(stage, e))?;

        Ok(Advance::to(
            Stage::AwaitingCompletion,
            format!("{}: {}", which, button.locator_name),
        ))
    }

    async fn await_completion(&self, ctx: &WorkflowContext) -> StageOutcome {
        if ctx.job.mode == JobMode::ImageGeneration {
            return self.await_image(ctx).await;
        }

        let stage = Stage::AwaitingCompletion;
        let condition = self.ui.completion(ctx.job.mode);
        let remaining = ctx.remaining();
        info!("{} ⏳ 等待完成，剩余 {}s", ctx, remaining.as_secs());

        let page = ctx.page();
        let mut completed = page
            .wait_for_condition(&condition, remaining)
            .await
            .map_err(|e| driver_failure(stage, e))?;

        // 兜底条件只在期限到达后检查一次
        if !completed {
            if let Some(fallback) = self.ui.completion_fallback(ctx.job.mode) {
                completed = page
                    .wait_for_condition(&fallback, Duration::ZERO)
                    .await
                    .map_err(|e| driver_failure(stage, e))?;
                if completed {
                    info!("{} 未出现完成标志，但页面内容满足 {}", ctx, fallback.describe());
                }
            }
        }
        if !completed {
            return Err(timeout_failure(stage, ctx, &condition.describe()));
        }

        if ctx.job.mode == JobMode::DeepResearch && !self.settings.research_settle.is_zero() {
            let settle = self.settings.research_settle;
            debug!("{} 等待 {}s 让内容渲染完成", ctx, settle.as_secs());
            sleep(settle).await;
        }

        Ok(Advance::to(
            Stage::Extracting,
            format!("完成信号出现，用时 {:.1}s", ctx.elapsed().as_secs_f64()),
        ))
    }

    /// 图片任务：等下载按钮 → 点击 → 等下载目录出现新文件 → 移动到目标目录
    async fn await_image(&self, ctx: &WorkflowContext) -> StageOutcome {
        let stage = Stage::AwaitingCompletion;
        let page = ctx.page();

        let download = match page.await_ready(&self.ui.image_download, ctx.remaining()).await {
            Ok(download) => download,
            Err(DriverError::UiChanged { locator }) => {
                return Err(timeout_failure(stage, ctx, &locator))
            }
            Err(e) => return Err(driver_failure(stage, e)),
        };

        let watch_dir = ctx
            .job
            .watch_dir()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.settings.download_dir.clone());
        let destination = ctx
            .job
            .destination()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.settings.output_dir.clone());

        let watcher = DownloadWatcher::snapshot(&watch_dir, self.settings.poll_interval)
            .await
            .map_err(|e| file_failure(stage, e))?;
        page.click(&download, None).await.map_err(|e| driver_failure(stage, e))?;
        info!("{} 🖼 已点击下载，监听 {}", ctx, watcher.dir().display());

        let Some(file) = watcher
            .wait_for_new_file(ctx.remaining())
            .await
            .map_err(|e| file_failure(stage, e))?
        else {
            return Err(timeout_failure(stage, ctx, "下载目录中未出现新文件"));
        };

        let moved = relocate(&file, &destination)
            .await
            .map_err(|e| file_failure(stage, e))?;
        let path = moved.display().to_string();
        Ok(Advance::to(Stage::Extracting, format!("图片已保存: {}", path)).with_content(path))
    }

    async fn extract(&self, ctx: &WorkflowContext, ready: Option<String>) -> StageOutcome {
        let stage = Stage::Extracting;

        if let Some(path) = ready {
            return Ok(Advance::to(Stage::Done, "使用已保存的文件路径").with_content(path));
        }

        let content = match ctx.job.mode {
            JobMode::DeepResearch => {
                self.read_converted(ctx.page(), &self.ui.research_content, stage)
                    .await?
            }
            _ => self.extract_enhanced(ctx).await?,
        };

        if content.trim().is_empty() {
            return Err(StageFailure::new(stage, FailureKind::Error, "响应内容为空"));
        }
        let detail = format!("{} 字符", content.chars().count());
        Ok(Advance::to(Stage::Done, detail).with_content(content))
    }

    /// 主输出 + 可选的思考过程和来源
    async fn extract_enhanced(&self, ctx: &WorkflowContext) -> Result<String, StageFailure> {
        let page = ctx.page();
        let output = self.read_converted(page, &self.ui.response, Stage::Extracting).await?;

        let thinking = self
            .read_extra(page, &self.ui.thinking_button, &self.ui.thinking_content)
            .await;
        let sources = self
            .read_extra(page, &self.ui.sources_button, &self.ui.sources_panel)
            .await;
        debug!(
            "{} 思考过程: {}，来源: {}",
            ctx,
            thinking.is_some(),
            sources.is_some()
        );

        Ok(format_enhanced(thinking.as_deref(), &output, sources.as_deref()))
    }

    async fn read_converted(
        &self,
        page: &dyn PageDriver,
        lookup: &Lookup,
        stage: Stage,
    ) -> Result<String, StageFailure> {
        let element = page
            .await_ready(lookup, self.settings.control_ready)
            .await
            .map_err(|e| driver_failure(stage, e))?;
        let html = page
            .extract_text(&element)
            .await
            .map_err(|e| driver_failure(stage, e))?;
        Ok(self.converter.to_markdown(&html))
    }

    /// 点开折叠面板读取内容，任何一步失败都视为没有
    async fn read_extra(
        &self,
        page: &dyn PageDriver,
        button: &Lookup,
        panel: &Lookup,
    ) -> Option<String> {
        let wait = self.settings.extras_probe;
        let toggle = page.await_ready(button, wait).await.ok()?;
        page.click(&toggle, None).await.ok()?;
        let element = page.await_ready(panel, wait).await.ok()?;
        let html = page.extract_text(&element).await.ok()?;
        let text = self.converter.to_markdown(&html);
        (!text.trim().is_empty()).then_some(text)
    }
}

/// 组合输出；没有思考过程和来源时只返回主输出
pub fn format_enhanced(thinking: Option<&str>, output: &str, sources: Option<&str>) -> String {
    if thinking.is_none() && sources.is_none() {
        return output.to_string();
    }

    let mut parts = Vec::new();
    if let Some(thinking) = thinking {
        parts.push(format!("<thinking>\n{}\n</thinking>", thinking));
    }
    parts.push(format!("<output>\n{}\n</output>", output));
    if let Some(sources) = sources {
        parts.push(format!("<sources>\n{}\n</sources>", sources));
    }
    parts.join("\n\n")
}

fn driver_failure(stage: Stage, error: DriverError) -> StageFailure {
    let kind = match error {
        DriverError::UiChanged { .. } => FailureKind::UiChanged,
        _ => FailureKind::Error,
    };
    StageFailure::new(stage, kind, error.to_string())
}

fn file_failure(stage: Stage, error: FileError) -> StageFailure {
    StageFailure::new(stage, FailureKind::Error, error.to_string())
}

fn timeout_failure(stage: Stage, ctx: &WorkflowContext, waiting_for: &str) -> StageFailure {
    StageFailure::new(
        stage,
        FailureKind::Timeout,
        format!("{}s 内未完成: {}", ctx.job.timeout_secs, waiting_for),
    )
}
