//! 批量任务处理器 - 编排层
//!
//! ## 职责
//!
//! 接收一批任务，在并发上限内逐个调度，收集每个任务的结果。
//!
//! ## 核心功能
//!
//! 1. **健康检查**：调度前确认浏览器可用，不可用时整批失败
//! 2. **并发控制**：使用 Semaphore 限制同时打开的页面数量
//! 3. **顺序调度**：按提交顺序获取槽位，槽位在页面关闭后才释放
//! 4. **失败隔离**：单个任务失败只影响它自己的结果
//! 5. **取消**：运行中的任务被中断并关闭页面，未开始的任务直接标记取消
//!
//! ## 设计特点
//!
//! - **不处理单个任务的细节**：委托给 `ChatFlow`
//! - **结果有序**：通过 `ResultAggregator` 按提交位置汇总

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::SessionProvider;
use crate::error::{OrchestratorError, SessionError};
use crate::models::job::JobSpec;
use crate::models::outcome::{FailureKind, JobOutcome, Stage, StageResult};
use crate::orchestrator::aggregator::ResultAggregator;
use crate::utils::logging::{log_job_complete, log_job_start, log_jobs_loaded};
use crate::workflow::{ChatFlow, WorkflowContext};

/// 一批任务的结果
#[derive(Debug)]
pub struct BatchReport {
    /// 按提交顺序排列，数量与提交的任务数相同
    pub outcomes: Vec<JobOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }
}

/// 批量任务处理器
pub struct BatchOrchestrator {
    sessions: Arc<dyn SessionProvider>,
    flow: Arc<ChatFlow>,
    max_concurrent: usize,
}

impl BatchOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        flow: Arc<ChatFlow>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            sessions,
            flow,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 运行一批任务
    ///
    /// 单个任务的失败体现在它的 `JobOutcome` 里；只有浏览器不可用或整批被取消时返回错误，
    /// 取消时错误里仍然带着每个任务的结果。
    pub async fn run(
        &self,
        jobs: Vec<JobSpec>,
        cancel: CancellationToken,
    ) -> Result<BatchReport, OrchestratorError> {
        let started = Instant::now();

        self.sessions
            .health_check()
            .await
            .map_err(OrchestratorError::SessionUnavailable)?;

        let total = jobs.len();
        log_jobs_loaded(total, self.max_concurrent);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut aggregator = ResultAggregator::new(total);
        let mut running = FuturesUnordered::new();
        let mut pending = jobs.into_iter().enumerate();

        'schedule: while let Some((index, job)) = pending.next() {
            // 按提交顺序等待槽位，同时收集已经结束的任务
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let outcome = JobOutcome::cancelled_before_start(job.id.clone());
                        aggregator.insert(index, outcome)?;
                        break 'schedule;
                    }
                    Some((finished, outcome)) = running.next(), if !running.is_empty() => {
                        aggregator.insert(finished, outcome)?;
                    }
                    acquired = semaphore.clone().acquire_owned() => match acquired {
                        Ok(permit) => break permit,
                        Err(e) => {
                            error!("[任务 {}] 获取槽位失败: {}", index + 1, e);
                            let outcome = JobOutcome::cancelled_before_start(job.id.clone());
                            aggregator.insert(index, outcome)?;
                            break 'schedule;
                        }
                    },
                }
            };

            let job_id = job.id.clone();
            let handle = tokio::spawn(run_job(
                self.sessions.clone(),
                self.flow.clone(),
                job,
                index,
                total,
                cancel.clone(),
                permit,
            ));
            running.push(async move {
                match handle.await {
                    Ok(outcome) => (index, outcome),
                    Err(e) => {
                        error!("[任务 {}] 任务执行失败: {}", index + 1, e);
                        let detail = format!("任务执行失败: {}", e);
                        let outcome = JobOutcome::failed(
                            job_id,
                            FailureKind::Error,
                            detail,
                            Duration::ZERO,
                            Vec::new(),
                        );
                        (index, outcome)
                    }
                }
            });
        }

        // 取消后剩下的任务不占用槽位
        for (index, job) in pending {
            aggregator.insert(index, JobOutcome::cancelled_before_start(job.id))?;
        }

        while let Some((finished, outcome)) = running.next().await {
            aggregator.insert(finished, outcome)?;
        }

        if !aggregator.is_complete() {
            let missing = aggregator.len() - aggregator.filled();
            warn!("有 {} 个任务没有结果，标记为错误", missing);
            aggregator.fill_missing(|index| {
                JobOutcome::failed(
                    format!("job-{}", index + 1),
                    FailureKind::Error,
                    "任务没有产生结果",
                    Duration::ZERO,
                    Vec::new(),
                )
            });
        }

        let report = BatchReport {
            outcomes: aggregator.into_outcomes(),
            elapsed: started.elapsed(),
        };

        if cancel.is_cancelled() {
            warn!(
                "⚠️ 批次已取消: 成功 {} / 共 {}",
                report.success_count(),
                report.outcomes.len()
            );
            return Err(OrchestratorError::Cancelled { report });
        }

        info!(
            "✓ 批次完成: 成功 {}/{}，耗时 {:.1}s",
            report.success_count(),
            report.outcomes.len(),
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }
}

/// 处理单个任务：打开页面 → 运行流程 → 关闭页面 → 释放槽位
async fn run_job(
    sessions: Arc<dyn SessionProvider>,
    flow: Arc<ChatFlow>,
    job: JobSpec,
    index: usize,
    total: usize,
    cancel: CancellationToken,
    permit: OwnedSemaphorePermit,
) -> JobOutcome {
    let started = Instant::now();
    let display_index = index + 1;
    log_job_start(display_index, total, &job.id, job.mode.label());

    // 取消时会话自行关闭已创建的页面
    let outcome = match sessions.open_page(&cancel).await {
        Err(SessionError::Cancelled) => JobOutcome::failed(
            job.id,
            FailureKind::Cancelled,
            "批次已取消（等待页面时）",
            started.elapsed(),
            Vec::new(),
        ),
        Err(e) => {
            let kind = match e {
                SessionError::AuthFailure(_) => FailureKind::AuthFailure,
                _ => FailureKind::Error,
            };
            error!("[任务 {}] ❌ 无法获取页面: {}", display_index, e);
            JobOutcome::failed(
                job.id,
                kind,
                e.to_string(),
                started.elapsed(),
                vec![StageResult::failed(Stage::Entering, e.to_string())],
            )
        }
        Ok(page) => {
            let mut ctx = WorkflowContext::new(job, display_index, page);
            let finished = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = flow.run(&mut ctx) => Some(outcome),
            };
            let outcome = match finished {
                Some(outcome) => outcome,
                None => ctx.cancelled_outcome(),
            };
            ctx.close_page().await;
            outcome
        }
    };

    // 页面关闭之后才释放槽位
    drop(permit);
    log_job_complete(display_index, &outcome);
    outcome
}
