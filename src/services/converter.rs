//! HTML → Markdown 转换 - 业务能力层
//!
//! 只负责"把响应 HTML 转成文本"能力，不关心从哪里读到的

use htmd::HtmlToMarkdown;
use regex::Regex;
use tracing::debug;

/// 文本转换能力
pub trait TextConverter: Send + Sync {
    fn to_markdown(&self, html: &str) -> String;
}

/// 基于 htmd 的转换器
///
/// 去掉脚本、样式和界面按钮，保留标题、列表、表格、代码块、链接。
pub struct HtmdConverter {
    skip_tags: Vec<&'static str>,
}

impl HtmdConverter {
    pub fn new() -> Self {
        Self {
            skip_tags: vec!["script", "style", "noscript", "button", "mat-icon", "svg", "iframe"],
        }
    }
}

impl Default for HtmdConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl TextConverter for HtmdConverter {
    fn to_markdown(&self, html: &str) -> String {
        let converter = HtmlToMarkdown::builder().skip_tags(self.skip_tags.clone()).build();
        match converter.convert(html) {
            Ok(md) => clean_markdown(&md),
            Err(e) => {
                debug!("htmd 转换失败，退回纯文本: {}", e);
                strip_tags(html)
            }
        }
    }
}

/// 合并连续空行，去掉首尾空白
pub fn clean_markdown(md: &str) -> String {
    let mut result = String::with_capacity(md.len());
    let mut blank_run: usize = 0;

    for line in md.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !result.is_empty() {
            result.push('\n');
            if blank_run > 0 {
                result.push('\n');
            }
        }
        blank_run = 0;
        result.push_str(line.trim_end());
    }

    result.trim().to_string()
}

/// 去掉所有标签，只保留文本
fn strip_tags(html: &str) -> String {
    let text = match Regex::new(r"(?s)<[^>]*>") {
        Ok(tag) => tag.replace_all(html, " ").into_owned(),
        Err(_) => html.to_string(),
    };
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    clean_markdown(&text)
}
