use thiserror::Error;

use crate::orchestrator::BatchReport;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 任务输入错误
    #[error("任务错误: {0}")]
    Job(#[from] JobError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 批次级别错误
    #[error("批次错误: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {detail}")]
    LaunchFailed { detail: String },
    /// 浏览器配置失败
    #[error("浏览器配置失败: {detail}")]
    ConfigurationFailed { detail: String },
}

/// 页面驱动错误
///
/// 只描述"页面上发生了什么"，由流程层翻译成任务状态
#[derive(Debug, Error)]
pub enum DriverError {
    /// 元素在等待时间内未就绪（主定位器和备用定位器都失败）
    #[error("界面元素未就绪: {locator}")]
    UiChanged { locator: String },
    /// 元素已标记但无法再次找到（页面重新渲染）
    #[error("元素已失效: {locator}")]
    StaleElement { locator: String },
    /// 执行脚本失败
    #[error("执行脚本失败: {detail}")]
    Script { detail: String },
    /// CDP 协议错误
    #[error("CDP 错误: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
}

/// 会话获取错误
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// 未登录或登录超时
    #[error("认证失败: {0}")]
    AuthFailure(String),
    /// 浏览器不可用（无法创建页面）
    #[error("会话不可用: {0}")]
    Unavailable(String),
    /// 等待页面时批次被取消（页面已关闭）
    #[error("批次已取消")]
    Cancelled,
}

/// 任务输入校验错误
#[derive(Debug, Error)]
pub enum JobError {
    /// 缺少 prompt（且没有 prompt_path）
    #[error("第 {index} 个任务缺少 prompt")]
    MissingPrompt { index: usize },
    /// 未知模式
    #[error("第 {index} 个任务的模式无法识别: {mode}")]
    UnknownMode { index: usize, mode: String },
    /// 超时必须为正整数秒，且不超过上限
    #[error(
        "第 {index} 个任务的超时无效: {timeout}（应在 1 到 {max} 秒之间）",
        max = crate::models::job::MAX_TIMEOUT_SECS
    )]
    InvalidTimeout { index: usize, timeout: u64 },
    /// 任务 ID 重复
    #[error("任务 ID 重复: {id}")]
    DuplicateId { id: String },
    /// 批次格式错误
    #[error("任务批次格式错误: {detail}")]
    MalformedBatch { detail: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 移动文件失败
    #[error("移动文件失败 ({from} -> {to}): {source}")]
    MoveFailed {
        from: String,
        to: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值无效
    #[error("配置项 {field} 无效: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 批次级别错误
///
/// 单个任务的失败不会出现在这里，只有整批被取消或完全拿不到会话时才会返回
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// 无法获取任何会话
    #[error("无法获取浏览器会话: {0}")]
    SessionUnavailable(SessionError),
    /// 批次被调用方取消（携带已汇总的结果）
    #[error("批次已取消 ({} 个任务)", .report.outcomes.len())]
    Cancelled { report: BatchReport },
    /// 同一位置写入了两次结果
    #[error("任务 {index} 的结果重复写入")]
    DuplicateOutcome { index: usize },
    /// 结果位置越界
    #[error("结果位置 {index} 超出范围 [0, {len})")]
    SlotOutOfRange { index: usize, len: usize },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            detail: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::File(FileError::JsonParseFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

impl FileError {
    /// 创建文件写入错误
    pub fn write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// 创建文件读取错误
    pub fn read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

impl DriverError {
    /// 创建脚本执行错误
    pub fn script(detail: impl Into<String>) -> Self {
        DriverError::Script {
            detail: detail.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 页面驱动结果类型
pub type DriverResult<T> = Result<T, DriverError>;
