//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量任务处理器
//! - 调度前检查浏览器是否可用
//! - 控制并发数量（Semaphore，每个槽位对应一个页面）
//! - 把取消信号传给运行中的任务
//!
//! ### `aggregator` - 结果汇总
//! - 按提交位置收集结果
//! - 保证每个任务恰好一个结果
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<JobSpec>)
//!     ↓
//! workflow::ChatFlow (处理单个任务)
//!     ↓
//! infrastructure::PageDriver (单个页面)
//! ```

pub mod aggregator;
pub mod batch_processor;

pub use aggregator::ResultAggregator;
pub use batch_processor::{BatchOrchestrator, BatchReport};
