//! 界面定位表
//!
//! 聊天页面上每个阶段要找的元素、要等的条件都集中在这里，
//! 界面改版时只需要改这一个文件。

use crate::infrastructure::{Condition, Locator, Lookup};
use crate::models::job::JobMode;

/// 定位器名字（日志里显示，测试用的假页面也按名字响应）
pub mod names {
    pub const PROMPT_INPUT: &str = "prompt_input";
    pub const PROMPT_INPUT_FALLBACK: &str = "prompt_input_fallback";
    pub const TOOLS_BUTTON: &str = "tools_button";
    pub const SEND_BUTTON: &str = "send_button";
    pub const SEND_BUTTON_FALLBACK: &str = "send_button_fallback";
    pub const MODE_ITEM: &str = "mode_item";
    pub const MODE_ITEM_FALLBACK: &str = "mode_item_fallback";
    pub const MODE_DESELECT: &str = "mode_deselect";
    pub const MODE_PRESSED: &str = "mode_pressed";
    pub const CONFIRM_WIDGET: &str = "confirm_widget";
    pub const CONFIRM_BUTTON: &str = "confirm_button";
    pub const CONFIRM_BUTTON_FALLBACK: &str = "confirm_button_fallback";
    pub const RESPONSE: &str = "response";
    pub const RESPONSE_FALLBACK: &str = "response_fallback";
    pub const RESEARCH_CONTENT: &str = "research_content";
    pub const SOURCES_DONE: &str = "sources_done";
    pub const COPY_DONE: &str = "copy_done";
    pub const EXPORT_DONE: &str = "export_done";
    pub const THINKING_BUTTON: &str = "thinking_button";
    pub const THINKING_CONTENT: &str = "thinking_content";
    pub const SOURCES_BUTTON: &str = "sources_button";
    pub const SOURCES_PANEL: &str = "sources_panel";
    pub const IMAGE_DOWNLOAD: &str = "image_download";
}

/// 深度研究页面内容超过这个长度也视为完成
pub const RESEARCH_CONTENT_THRESHOLD: usize = 50_000;

/// 聊天页面的定位表
#[derive(Debug, Clone)]
pub struct UiMap {
    pub prompt_input: Lookup,
    pub tools_button: Lookup,
    pub send_button: Lookup,
    pub confirm_widget: Locator,
    pub confirm_button: Lookup,
    pub response: Lookup,
    pub research_content: Lookup,
    pub thinking_button: Lookup,
    pub thinking_content: Lookup,
    pub sources_button: Lookup,
    pub sources_panel: Lookup,
    pub image_download: Lookup,
}

impl UiMap {
    /// Gemini 网页版
    pub fn gemini() -> Self {
        let confirm_widget =
            Locator::css(names::CONFIRM_WIDGET, "deep-research-confirmation-widget");

        Self {
            prompt_input: Lookup::new(Locator::role(
                names::PROMPT_INPUT,
                "textbox",
                "Enter a prompt here",
            ))
            .with_fallback(Locator::css(
                names::PROMPT_INPUT_FALLBACK,
                "rich-textarea .ql-editor",
            )),
            tools_button: Lookup::new(Locator::role(names::TOOLS_BUTTON, "button", "Tools")),
            send_button: Lookup::new(Locator::css(
                names::SEND_BUTTON,
                r#".send-button-container button[data-test-id="send-button"]"#,
            ))
            .with_fallback(Locator::role(names::SEND_BUTTON_FALLBACK, "button", "Send message")),
            confirm_button: Lookup::new(
                Locator::css(names::CONFIRM_BUTTON, r#"[data-test-id="confirm-button"]"#)
                    .within(&confirm_widget),
            )
            .with_fallback(
                Locator::text(names::CONFIRM_BUTTON_FALLBACK, "button", "Start research")
                    .within(&confirm_widget),
            ),
            confirm_widget,
            response: Lookup::new(
                Locator::css(names::RESPONSE, "message-content.model-response-text").last(),
            )
            .with_fallback(Locator::css(names::RESPONSE_FALLBACK, "message-content").last()),
            research_content: Lookup::new(Locator::css(
                names::RESEARCH_CONTENT,
                r#"[data-test-id="scroll-container"]"#,
            ))
            .with_fallback(Locator::css(names::RESPONSE_FALLBACK, "message-content").last()),
            thinking_button: Lookup::new(Locator::css(
                names::THINKING_BUTTON,
                r#"[data-test-id="thoughts-header-button"]"#,
            )),
            thinking_content: Lookup::new(Locator::css(
                names::THINKING_CONTENT,
                r#"[data-test-id="thoughts-content"]"#,
            )),
            sources_button: Lookup::new(Locator::text(names::SOURCES_BUTTON, "button", "Sources")),
            sources_panel: Lookup::new(Locator::css(names::SOURCES_PANEL, "context-sidebar")),
            image_download: Lookup::new(Locator::css(
                names::IMAGE_DOWNLOAD,
                r#"[data-test-id="download-generated-image-button"]"#,
            )),
        }
    }

    /// 页面已登录的标志：聊天输入框可见
    pub fn login_probe(&self) -> Condition {
        let mut probes = vec![Condition::Visible(self.prompt_input.primary.clone())];
        if let Some(fallback) = &self.prompt_input.fallback {
            probes.push(Condition::Visible(fallback.clone()));
        }
        Condition::Any(probes)
    }

    /// 工具菜单里的模式按钮，标准模式不需要
    pub fn mode_item(&self, mode: JobMode) -> Option<Lookup> {
        let (primary_css, text) = match mode {
            JobMode::Standard => return None,
            JobMode::DeepResearch => ("toolbox-drawer-item button", "Deep Research"),
            JobMode::DeepThink => ("toolbox-drawer-item button", "Deep Think"),
            JobMode::ImageGeneration => ("toolbox-drawer-item button", "Create images"),
        };
        Some(
            Lookup::new(Locator::text(names::MODE_ITEM, primary_css, text))
                .with_fallback(Locator::text(names::MODE_ITEM_FALLBACK, "button", text)),
        )
    }

    /// 模式已激活的标志：出现"取消选择"按钮，或菜单项处于按下状态
    pub fn mode_active(&self, mode: JobMode) -> Option<Condition> {
        let (chip_label, item_text) = match mode {
            JobMode::Standard => return None,
            JobMode::DeepResearch => ("Deep Research", "Deep Research"),
            JobMode::DeepThink => ("Deep Think", "Deep Think"),
            JobMode::ImageGeneration => ("Image", "Create images"),
        };
        Some(Condition::Any(vec![
            Condition::Visible(Locator::css(
                names::MODE_DESELECT,
                format!(r#"button[aria-label*="Deselect {}"]"#, chip_label),
            )),
            Condition::Attribute {
                locator: Locator::text(
                    names::MODE_PRESSED,
                    "toolbox-drawer-item button",
                    item_text,
                ),
                attribute: "aria-pressed".to_string(),
                expected: "true".to_string(),
            },
        ]))
    }

    /// 各模式的完成信号（等待期间轮询）
    pub fn completion(&self, mode: JobMode) -> Condition {
        match mode {
            JobMode::DeepResearch => Condition::Any(vec![
                Condition::Visible(Locator::css(
                    names::EXPORT_DONE,
                    r#"[data-test-id="export-menu-button"]"#,
                )),
                Condition::Visible(Locator::text(names::EXPORT_DONE, "button", "Export")),
                Condition::Visible(Locator::text(names::COPY_DONE, "button", "Copy")),
            ]),
            JobMode::ImageGeneration => Condition::Visible(self.image_download.primary.clone()),
            JobMode::Standard | JobMode::DeepThink => Condition::Any(vec![
                Condition::Visible(Locator::css(
                    names::SOURCES_DONE,
                    "button[data-testid='sources-button']",
                )),
                Condition::Visible(Locator::css(names::SOURCES_DONE, ".response-footer.complete")),
                Condition::Visible(Locator::css(names::COPY_DONE, "[data-testid='copy-button']")),
                Condition::Visible(Locator::css(names::COPY_DONE, ".message-actions button")),
            ]),
        }
    }

    /// 期限到达后只检查一次的兜底条件
    ///
    /// 页面框架本身就很大，不能在等待期间轮询。
    pub fn completion_fallback(&self, mode: JobMode) -> Option<Condition> {
        match mode {
            JobMode::DeepResearch => Some(Condition::ContentLongerThan(RESEARCH_CONTENT_THRESHOLD)),
            _ => None,
        }
    }
}
