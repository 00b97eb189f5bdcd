use std::path::Path;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::error::{AppError, FileError, JobError};
use crate::models::job::{validate_batch, JobRequest, JobSpec};

/// TOML 批次文件格式：
///
/// ```toml
/// [[jobs]]
/// prompt = "..."
/// mode = "DeepResearch"
/// ```
#[derive(Debug, Deserialize)]
struct TomlBatch {
    #[serde(default)]
    jobs: Vec<JobRequest>,
}

/// 从文件加载任务批次（按扩展名区分 JSON / TOML），并完成校验
pub async fn load_jobs_from_file(
    path: &Path,
    default_timeout_secs: u64,
) -> Result<Vec<JobSpec>, AppError> {
    if !path.exists() {
        return Err(FileError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let requests = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => parse_toml_batch(&content).map_err(|e| FileError::TomlParseFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?,
        _ => parse_json_batch(&content, &path.display().to_string())?,
    };

    info!("✓ 从 {} 读取到 {} 个任务", path.display(), requests.len());
    prepare_batch(requests, default_timeout_secs).await
}

/// 从 stdin 读取 JSON 批次
pub async fn load_jobs_from_stdin(default_timeout_secs: u64) -> Result<Vec<JobSpec>, AppError> {
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .map_err(|e| AppError::file_read_failed("<stdin>", e))?;

    if raw.trim().is_empty() {
        return Err(JobError::MalformedBatch {
            detail: "stdin 中没有任务 JSON".to_string(),
        }
        .into());
    }

    let requests = parse_json_batch(&raw, "<stdin>")?;
    prepare_batch(requests, default_timeout_secs).await
}

/// 解析 JSON 批次：数组，或者单个对象（视为只有一个任务的批次）
pub fn parse_json_batch(raw: &str, origin: &str) -> Result<Vec<JobRequest>, AppError> {
    let value: JsonValue = serde_json::from_str(raw).map_err(|e| FileError::JsonParseFailed {
        path: origin.to_string(),
        source: Box::new(e),
    })?;

    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(_) => vec![value],
        other => {
            return Err(JobError::MalformedBatch {
                detail: format!("任务批次必须是数组或对象，实际为: {}", other),
            }
            .into())
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(AppError::Job(JobError::MalformedBatch {
                    detail: format!("第 {} 个任务不是对象", index),
                }));
            }
            serde_json::from_value(item).map_err(|e| {
                AppError::Job(JobError::MalformedBatch {
                    detail: format!("第 {} 个任务: {}", index, e),
                })
            })
        })
        .collect()
}

fn parse_toml_batch(raw: &str) -> Result<Vec<JobRequest>, toml::de::Error> {
    let batch: TomlBatch = toml::from_str(raw)?;
    Ok(batch.jobs)
}

/// 合并提示词文件，然后统一校验
async fn prepare_batch(
    mut requests: Vec<JobRequest>,
    default_timeout_secs: u64,
) -> Result<Vec<JobSpec>, AppError> {
    for request in requests.iter_mut() {
        merge_prompt_file(request).await?;
    }
    Ok(validate_batch(requests, default_timeout_secs)?)
}

/// 文件提示词在前，追加的 prompt 在后，用换行连接
pub async fn merge_prompt_file(request: &mut JobRequest) -> Result<(), AppError> {
    let Some(prompt_path) = request.prompt_path.as_deref() else {
        return Ok(());
    };

    let from_file = fs::read_to_string(prompt_path)
        .await
        .map_err(|e| AppError::file_read_failed(prompt_path, e))?;
    let from_file = from_file.trim_end();
    debug!("合并提示词文件: {} ({} 字符)", prompt_path, from_file.chars().count());

    request.prompt = Some(merge_prompts(from_file, request.prompt.as_deref()));
    Ok(())
}

pub fn merge_prompts(from_file: &str, appended: Option<&str>) -> String {
    match appended {
        Some(extra) if !extra.is_empty() => format!("{}\n{}", from_file, extra),
        _ => from_file.to_string(),
    }
}
