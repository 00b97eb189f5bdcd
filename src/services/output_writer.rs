//! 结果写入服务 - 业务能力层
//!
//! 只负责"把成功任务的内容写到文件"能力，不关心流程

use std::path::Path;

use tokio::fs;
use tracing::debug;

use crate::error::FileError;

/// 结果写入服务
///
/// 职责：
/// - 把单个任务的内容写到它指定的 output_path
/// - 自动创建父目录
/// - 失败只影响这一个文件
pub struct OutputWriter;

impl OutputWriter {
    pub fn new() -> Self {
        Self
    }

    /// 写入结果内容
    ///
    /// # 参数
    /// - `job_id`: 任务 ID（仅用于日志）
    /// - `output_path`: 目标文件
    /// - `content`: 内容
    pub async fn write(
        &self,
        job_id: &str,
        output_path: &str,
        content: &str,
    ) -> Result<(), FileError> {
        debug!(
            "写入结果: 任务 {} | 文件 {} | 长度: {}",
            job_id,
            output_path,
            content.len()
        );

        let parent = Path::new(output_path).parent();
        if let Some(parent) = parent.filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FileError::write_failed(parent.display().to_string(), e))?;
        }

        fs::write(output_path, content)
            .await
            .map_err(|e| FileError::write_failed(output_path, e))?;
        Ok(())
    }
}

impl Default for OutputWriter {
    fn default() -> Self {
        Self::new()
    }
}
