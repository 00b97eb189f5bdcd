use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, ConfigError, FileError};
use crate::models::job::{timeout_from_secs, MAX_TIMEOUT_SECS};

/// 默认配置文件名（可用 CHAT_PILOT_CONFIG 覆盖）
pub const DEFAULT_CONFIG_FILE: &str = "chat_pilot.toml";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时运行的任务数量（同时打开的标签页上限）
    pub max_concurrent_jobs: usize,
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// true: 连接已经运行的浏览器；false: 自行启动
    pub connect_existing: bool,
    /// 自行启动时是否无头
    pub headless: bool,
    /// 自行启动时使用的浏览器路径
    pub chrome_executable: Option<String>,
    /// 聊天应用地址
    pub target_url: String,
    /// 任务批次文件（.json / .toml），为空时从 stdin 读取 JSON
    pub jobs_file: Option<String>,
    /// 浏览器下载目录（图片任务监听此目录）
    pub download_dir: Option<String>,
    /// 图片任务默认的目标目录
    pub output_dir: String,
    /// 任务默认超时（秒）
    pub default_timeout_secs: u64,
    /// 等待用户登录的最长时间（秒）
    pub login_wait_secs: u64,
    /// 各阶段等待时间（秒）
    pub stage_timeouts: StageTimeoutsConfig,
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

/// 各阶段等待时间（秒）
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StageTimeoutsConfig {
    pub input_ready_secs: u64,
    pub control_ready_secs: u64,
    pub toggle_verify_secs: u64,
    pub confirm_widget_secs: u64,
    pub confirm_button_secs: u64,
    pub extras_probe_secs: u64,
    /// 深度研究完成后、提取前的等待
    pub research_settle_secs: u64,
}

impl Default for StageTimeoutsConfig {
    fn default() -> Self {
        Self {
            input_ready_secs: 15,
            control_ready_secs: 10,
            toggle_verify_secs: 5,
            confirm_widget_secs: 20,
            confirm_button_secs: 5,
            extras_probe_secs: 3,
            research_settle_secs: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            browser_debug_port: 9222,
            connect_existing: true,
            headless: false,
            chrome_executable: None,
            target_url: "https://gemini.google.com/app".to_string(),
            jobs_file: None,
            download_dir: None,
            output_dir: ".".to_string(),
            default_timeout_secs: 600,
            login_wait_secs: 60,
            stage_timeouts: StageTimeoutsConfig::default(),
            poll_interval_ms: 500,
            verbose_logging: false,
            output_log_file: "chat_pilot.log".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：TOML 文件（可选） → 环境变量覆盖 → 校验
    pub fn load() -> Result<Self, AppError> {
        let path = std::env::var("CHAT_PILOT_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let base = if Path::new(&path).exists() {
            Self::from_toml_file(Path::new(&path))?
        } else {
            Self::default()
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 只使用默认值和环境变量
    pub fn from_env() -> Result<Self, AppError> {
        let config = Self::default().with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取配置，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            AppError::File(FileError::TomlParseFailed { source, .. }) => {
                AppError::File(FileError::TomlParseFailed {
                    path: path.display().to_string(),
                    source,
                })
            }
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, AppError> {
        Ok(toml::from_str(content)?)
    }

    fn with_env_overrides(self) -> Result<Self, AppError> {
        Ok(Self {
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS", "usize")?
                .unwrap_or(self.max_concurrent_jobs),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", "u16")?
                .unwrap_or(self.browser_debug_port),
            connect_existing: env_parse("CONNECT_EXISTING", "bool")?
                .unwrap_or(self.connect_existing),
            headless: env_parse("HEADLESS", "bool")?.unwrap_or(self.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(self.chrome_executable),
            target_url: std::env::var("TARGET_URL").unwrap_or(self.target_url),
            jobs_file: std::env::var("JOBS_FILE").ok().or(self.jobs_file),
            download_dir: std::env::var("DOWNLOAD_DIR").ok().or(self.download_dir),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(self.output_dir),
            default_timeout_secs: env_parse("DEFAULT_TIMEOUT_SECS", "u64")?
                .unwrap_or(self.default_timeout_secs),
            login_wait_secs: env_parse("LOGIN_WAIT_SECS", "u64")?.unwrap_or(self.login_wait_secs),
            stage_timeouts: self.stage_timeouts,
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", "u64")?
                .unwrap_or(self.poll_interval_ms),
            verbose_logging: env_parse("VERBOSE_LOGGING", "bool")?.unwrap_or(self.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_jobs".to_string(),
                reason: "并发数至少为 1".to_string(),
            });
        }
        if self.default_timeout_secs == 0 || self.default_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "default_timeout_secs".to_string(),
                reason: format!("超时必须在 1 到 {} 秒之间", MAX_TIMEOUT_SECS),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_ms".to_string(),
                reason: "轮询间隔必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    /// 浏览器下载目录，未配置时使用系统下载目录
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn login_wait(&self) -> Duration {
        timeout_from_secs(self.login_wait_secs)
    }
}

fn env_parse<T: std::str::FromStr>(
    var_name: &str,
    expected_type: &str,
) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
