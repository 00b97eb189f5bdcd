//! 任务处理上下文
//!
//! 封装"我正在处理哪个任务、走到哪一步、还剩多少时间"这一信息。
//! 上下文独占自己的页面，流程结束后页面随之关闭。

use std::fmt::Display;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::infrastructure::PageDriver;
use crate::models::job::{deadline_after, JobSpec};
use crate::models::outcome::{FailureKind, JobOutcome, Stage, StageFailure, StageResult};

/// 任务处理上下文
pub struct WorkflowContext {
    /// 任务定义
    pub job: JobSpec,

    /// 任务在批次中的序号（从1开始，仅用于日志显示）
    pub index: usize,

    page: Box<dyn PageDriver>,

    /// 当前阶段
    pub stage: Stage,

    pub started_at: Instant,
    pub deadline: Instant,

    /// 已经走过的阶段
    pub trace: Vec<StageResult>,
}

impl WorkflowContext {
    /// 创建新的任务上下文，期限从现在开始计算
    pub fn new(job: JobSpec, index: usize, page: Box<dyn PageDriver>) -> Self {
        let started_at = Instant::now();
        let deadline = deadline_after(started_at, job.timeout);
        Self {
            job,
            index,
            page,
            stage: Stage::Entering,
            started_at,
            deadline,
            trace: Vec::new(),
        }
    }

    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    /// 距离期限还剩多少时间（已过期时为 0）
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 记录当前阶段结果并进入下一阶段
    pub fn advance(&mut self, result: StageResult, next: Stage) {
        debug!("{} {} → {}", self, result.stage, next);
        self.trace.push(result);
        self.stage = next;
    }

    /// 进入失败终态，生成结果
    pub fn fail(&mut self, failure: StageFailure) -> JobOutcome {
        warn!("[任务 {}] ❌ {}", self.index, failure);
        self.trace.push(StageResult::failed(failure.stage, failure.detail.clone()));
        self.stage = Stage::Failed(failure.kind);
        JobOutcome::failed(
            self.job.id.clone(),
            failure.kind,
            failure.detail,
            self.elapsed(),
            self.trace.clone(),
        )
    }

    /// 进入完成终态，生成结果
    pub fn finish(&mut self, content: String) -> JobOutcome {
        self.trace.push(StageResult::ok(Stage::Done, None));
        self.stage = Stage::Done;
        JobOutcome::success(self.job.id.clone(), content, self.elapsed(), self.trace.clone())
    }

    /// 运行中被取消时的结果
    pub fn cancelled_outcome(&mut self) -> JobOutcome {
        let stage = self.stage;
        self.fail(StageFailure::new(
            stage,
            FailureKind::Cancelled,
            format!("批次已取消（中断于{}阶段）", stage),
        ))
    }

    /// 关闭页面，失败只记日志
    pub async fn close_page(&self) {
        if let Err(e) = self.page.close().await {
            warn!("[任务 {}] 关闭页面失败: {}", self.index, e);
        }
    }
}

impl Display for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[任务 {} ID#{} 模式#{} 阶段#{}]",
            self.index, self.job.id, self.job.mode, self.stage
        )
    }
}
