pub mod chat_flow;
pub mod job_ctx;
pub mod ui_map;

pub use chat_flow::{format_enhanced, ChatFlow, FlowSettings};
pub use job_ctx::WorkflowContext;
pub use ui_map::UiMap;
