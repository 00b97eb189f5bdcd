//! 任务定义
//!
//! 调用方提交的原始请求（`JobRequest`）在调度前统一校验为 `JobSpec`，
//! 校验失败的批次不会进入调度。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::time::Instant;

use crate::error::JobError;

/// 任务默认超时（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// 任务超时上限（秒），7 天
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// 时长溢出时使用的截止距离
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// 秒 → 等待时长
///
/// 对外的超时一律是整数秒，这里是唯一的换算点。
pub fn timeout_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// `start` 之后 `timeout` 的截止时间，溢出时取一个足够远的时间
pub fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// 任务模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum JobMode {
    #[default]
    Standard,
    DeepResearch,
    DeepThink,
    ImageGeneration,
}

impl JobMode {
    /// 是否需要先在工具菜单里切换模式
    pub fn needs_toggle(self) -> bool {
        !matches!(self, JobMode::Standard)
    }

    /// 是否会弹出确认对话框
    pub fn needs_confirmation(self) -> bool {
        matches!(self, JobMode::DeepResearch)
    }

    pub fn label(self) -> &'static str {
        match self {
            JobMode::Standard => "标准",
            JobMode::DeepResearch => "深度研究",
            JobMode::DeepThink => "深度思考",
            JobMode::ImageGeneration => "图片生成",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for JobMode {
    type Err = ();

    /// 大小写、下划线、连字符都不敏感：`DeepResearch` / `deep_research` / `deep-research`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "" | "standard" | "ask" => Ok(JobMode::Standard),
            "deepresearch" | "research" => Ok(JobMode::DeepResearch),
            "deepthink" | "think" => Ok(JobMode::DeepThink),
            "imagegeneration" | "image" | "images" => Ok(JobMode::ImageGeneration),
            _ => Err(()),
        }
    }
}

/// 调用方提交的原始任务
///
/// 未知字段全部收进 `extra`，调度时忽略，只有模式相关的选项会被读取。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub prompt_path: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(flatten)]
    pub extra: HashMap<String, JsonValue>,
}

impl JobRequest {
    /// 校验并转换为 `JobSpec`
    ///
    /// `prompt_path` 需要在此之前由加载器合并进 `prompt`。
    pub fn into_spec(self, index: usize, default_timeout_secs: u64) -> Result<JobSpec, JobError> {
        let prompt = self
            .prompt
            .filter(|p| !p.trim().is_empty())
            .ok_or(JobError::MissingPrompt { index })?;

        let mode = match self.mode.as_deref() {
            Some(raw) => raw.parse().map_err(|_| JobError::UnknownMode {
                index,
                mode: raw.to_string(),
            })?,
            None => JobMode::Standard,
        };

        let timeout_secs = self.timeout.unwrap_or(default_timeout_secs);
        if timeout_secs == 0 || timeout_secs > MAX_TIMEOUT_SECS {
            return Err(JobError::InvalidTimeout {
                index,
                timeout: timeout_secs,
            });
        }

        let mut extra_options = self.extra;
        if let Some(path) = self.prompt_path {
            extra_options.insert("prompt_path".to_string(), JsonValue::String(path));
        }

        Ok(JobSpec {
            id: self.id.unwrap_or_else(|| format!("job-{}", index + 1)),
            prompt,
            mode,
            timeout_secs,
            timeout: timeout_from_secs(timeout_secs),
            extra_options,
        })
    }
}

/// 校验后的任务，提交后不再修改
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: String,
    pub prompt: String,
    pub mode: JobMode,
    /// 对外的超时（秒）
    pub timeout_secs: u64,
    /// 换算后的等待时长
    pub timeout: Duration,
    pub extra_options: HashMap<String, JsonValue>,
}

impl JobSpec {
    /// 直接构造（测试和库调用方使用），超时使用整数秒
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        mode: JobMode,
        timeout_secs: u64,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            mode,
            timeout_secs,
            timeout: timeout_from_secs(timeout_secs),
            extra_options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra_options.insert(key.into(), value.into());
        self
    }

    /// 读取字符串类型的额外选项
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.extra_options.get(key).and_then(|v| v.as_str())
    }

    /// 成功后写入结果的文件
    pub fn output_path(&self) -> Option<&str> {
        self.option_str("output_path")
    }

    /// 图片任务：监听的下载目录
    pub fn watch_dir(&self) -> Option<&str> {
        self.option_str("watch_dir")
    }

    /// 图片任务：移动到的目标目录
    pub fn destination(&self) -> Option<&str> {
        self.option_str("destination").or_else(|| self.option_str("download_path"))
    }
}

/// 校验整个批次
///
/// 任意一个任务不合法，整个批次在调度前被拒绝。
pub fn validate_batch(
    requests: Vec<JobRequest>,
    default_timeout_secs: u64,
) -> Result<Vec<JobSpec>, JobError> {
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(requests.len());

    for (index, request) in requests.into_iter().enumerate() {
        let spec = request.into_spec(index, default_timeout_secs)?;
        if !seen.insert(spec.id.clone()) {
            return Err(JobError::DuplicateId { id: spec.id });
        }
        specs.push(spec);
    }

    Ok(specs)
}
