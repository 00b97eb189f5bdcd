//! # Chat Pilot
//!
//! 通过浏览器驱动网页版对话应用，批量提交提示词并取回回答
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `PageDriver` - 等待元素、输入、点击、等待条件、读取内容
//! - `browser/` - 连接或启动浏览器，每个任务一个新页面（`SessionProvider`）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `HtmdConverter` - HTML → Markdown
//! - `DownloadWatcher` - 监听下载目录
//! - `OutputWriter` - 写结果文件
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的完整处理流程
//! - `WorkflowContext` - 上下文封装（任务 + 页面 + 阶段 + 期限）
//! - `ChatFlow` - 状态机（输入 → 切换模式 → 提交 → 确认 → 等待完成 → 提取）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量任务处理器，管理并发和取消
//! - `orchestrator/aggregator` - 按提交顺序汇总结果
//!
//! ## 模块结构

pub mod app;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use browser::{ChromeSession, SessionProvider};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::PageDriver;
pub use models::{JobMode, JobOutcome, JobSpec, JobStatus};
pub use orchestrator::{BatchOrchestrator, BatchReport};
pub use workflow::{ChatFlow, FlowSettings, UiMap, WorkflowContext};
