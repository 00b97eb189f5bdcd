//! 流程阶段与任务结果

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// 预期的元素或状态没有出现（界面可能改版）
    UiChanged,
    /// 等待阶段或整体完成时超过期限
    Timeout,
    /// 会话获取失败
    AuthFailure,
    /// 调用方取消
    Cancelled,
    /// 其他操作错误
    Error,
}

/// 流程阶段（状态机的状态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Entering,
    ModeToggling,
    Submitting,
    Confirming,
    AwaitingCompletion,
    Extracting,
    Done,
    Failed(FailureKind),
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Entering => "输入提示词",
            Stage::ModeToggling => "切换模式",
            Stage::Submitting => "提交",
            Stage::Confirming => "确认",
            Stage::AwaitingCompletion => "等待完成",
            Stage::Extracting => "提取结果",
            Stage::Done => "完成",
            Stage::Failed(_) => "失败",
        };
        f.write_str(name)
    }
}

/// 单个阶段的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
    pub stage: Stage,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageResult {
    pub fn ok(stage: Stage, detail: Option<String>) -> Self {
        Self { stage, ok: true, detail }
    }

    pub fn failed(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

/// 阶段失败（流程内部使用，最终转成 `JobOutcome`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub detail: String,
}

impl StageFailure {
    pub fn new(stage: Stage, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}: {}", self.stage, self.kind, self.detail)
    }
}

/// 任务最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Success,
    Timeout,
    UiChanged,
    AuthFailure,
    Cancelled,
    Error,
}

impl From<FailureKind> for JobStatus {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::UiChanged => JobStatus::UiChanged,
            FailureKind::Timeout => JobStatus::Timeout,
            FailureKind::AuthFailure => JobStatus::AuthFailure,
            FailureKind::Cancelled => JobStatus::Cancelled,
            FailureKind::Error => JobStatus::Error,
        }
    }
}

/// 单个任务的最终结果，生成后不再修改
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// 内容被写入的文件（任务指定了 output_path 时）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageResult>,
}

impl JobOutcome {
    pub fn success(
        id: impl Into<String>,
        content: String,
        duration: Duration,
        stages: Vec<StageResult>,
    ) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Success,
            content: Some(content),
            error_detail: None,
            output_path: None,
            duration,
            stages,
        }
    }

    pub fn failed(
        id: impl Into<String>,
        kind: FailureKind,
        detail: impl Into<String>,
        duration: Duration,
        stages: Vec<StageResult>,
    ) -> Self {
        Self {
            id: id.into(),
            status: kind.into(),
            content: None,
            error_detail: Some(detail.into()),
            output_path: None,
            duration,
            stages,
        }
    }

    /// 未开始就被取消的任务（从未占用并发槽位）
    pub fn cancelled_before_start(id: impl Into<String>) -> Self {
        Self::failed(
            id,
            FailureKind::Cancelled,
            "批次已取消，任务未开始",
            Duration::ZERO,
            Vec::new(),
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
