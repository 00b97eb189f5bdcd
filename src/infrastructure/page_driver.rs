//! 页面驱动 - 基础设施层
//!
//! 流程层对页面的所有操作都经过 `PageDriver`：
//! 等待元素就绪、输入、点击、等待条件、读取内容。
//! 每个实例只对应一个页面，不跨页面操作。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{DriverError, DriverResult};
use crate::infrastructure::js_executor::JsExecutor;
use crate::infrastructure::locator::{
    js_string, Condition, ElementHandle, Locator, Lookup, Matched,
};
use crate::models::job::deadline_after;

/// 页面驱动
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 导航到 URL
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// 当前 URL
    async fn current_url(&self) -> DriverResult<String>;

    /// 等待主定位器就绪，超时后再尝试一次备用定位器
    ///
    /// 两者都失败时返回 `DriverError::UiChanged`
    async fn await_ready(&self, lookup: &Lookup, timeout: Duration) -> DriverResult<ElementHandle>;

    /// 聚焦、清空，然后一次性输入全部文本
    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    /// 真实点击；给了 verify 时等待该条件成立并返回结果
    async fn click(
        &self,
        element: &ElementHandle,
        verify: Option<(&Condition, Duration)>,
    ) -> DriverResult<bool>;

    /// 轮询条件直到成立或超时；超时返回 false 而不是错误
    async fn wait_for_condition(
        &self,
        condition: &Condition,
        timeout: Duration,
    ) -> DriverResult<bool>;

    /// 读取元素的内部 HTML
    async fn extract_text(&self, element: &ElementHandle) -> DriverResult<String>;

    /// 关闭页面
    async fn close(&self) -> DriverResult<()>;
}

/// 基于 chromiumoxide 的页面驱动
pub struct ChromePageDriver {
    executor: JsExecutor,
    poll_interval: Duration,
    next_ref: AtomicU64,
}

impl ChromePageDriver {
    pub fn new(page: Page, poll_interval: Duration) -> Self {
        Self {
            executor: JsExecutor::new(page),
            poll_interval,
            next_ref: AtomicU64::new(1),
        }
    }

    fn new_ref_id(&self) -> String {
        format!("pilot-{}", self.next_ref.fetch_add(1, Ordering::Relaxed))
    }

    /// 轮询脚本直到返回 true；页面切换导致的脚本错误视为"尚未成立"
    async fn poll_script(&self, script: &str, timeout: Duration) -> bool {
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            match self.executor.eval_bool(script).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => debug!("轮询脚本出错，继续等待: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn probe(&self, locator: &Locator, timeout: Duration) -> Option<String> {
        let ref_id = self.new_ref_id();
        let script = locator.mark_ready_js(&ref_id);
        self.poll_script(&script, timeout).await.then_some(ref_id)
    }

    async fn find(&self, element: &ElementHandle) -> DriverResult<Element> {
        self.executor
            .page()
            .find_element(element.css())
            .await
            .map_err(|_| DriverError::StaleElement {
                locator: element.locator_name.clone(),
            })
    }
}

#[async_trait]
impl PageDriver for ChromePageDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        debug!("导航到: {}", url);
        self.executor.page().goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.executor.page().url().await?.unwrap_or_default())
    }

    async fn await_ready(&self, lookup: &Lookup, timeout: Duration) -> DriverResult<ElementHandle> {
        if let Some(ref_id) = self.probe(&lookup.primary, timeout).await {
            return Ok(ElementHandle {
                ref_id,
                locator_name: lookup.primary.name.clone(),
                matched: Matched::Primary,
            });
        }

        let Some(fallback) = &lookup.fallback else {
            return Err(DriverError::UiChanged {
                locator: lookup.primary.name.clone(),
            });
        };

        debug!("主定位器 {} 超时，尝试备用定位器 {}", lookup.primary, fallback);
        match self.probe(fallback, timeout).await {
            Some(ref_id) => Ok(ElementHandle {
                ref_id,
                locator_name: fallback.name.clone(),
                matched: Matched::Fallback,
            }),
            None => Err(DriverError::UiChanged {
                locator: format!("{} / {}", lookup.primary.name, fallback.name),
            }),
        }
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let target = self.find(element).await?;
        target.click().await?;

        let clear_script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.focus();
                if (el.tagName === 'TEXTAREA' || el.tagName === 'INPUT') {{
                    el.value = '';
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                }} else {{
                    const range = document.createRange();
                    range.selectNodeContents(el);
                    const selection = window.getSelection();
                    selection.removeAllRanges();
                    selection.addRange(range);
                    document.execCommand('delete');
                }}
                return true;
            }})()"#,
            selector = js_string(&element.css())
        );
        if !self.executor.eval_bool(clear_script).await? {
            return Err(DriverError::StaleElement {
                locator: element.locator_name.clone(),
            });
        }

        self.executor.page().execute(InsertTextParams::new(text)).await?;
        Ok(())
    }

    async fn click(
        &self,
        element: &ElementHandle,
        verify: Option<(&Condition, Duration)>,
    ) -> DriverResult<bool> {
        let target = self.find(element).await?;
        target.click().await?;

        match verify {
            Some((condition, timeout)) => {
                let confirmed = self.wait_for_condition(condition, timeout).await?;
                if !confirmed {
                    warn!("点击 {} 后未观察到: {}", element.locator_name, condition.describe());
                }
                Ok(confirmed)
            }
            None => Ok(true),
        }
    }

    async fn wait_for_condition(
        &self,
        condition: &Condition,
        timeout: Duration,
    ) -> DriverResult<bool> {
        Ok(self.poll_script(&condition.to_js(), timeout).await)
    }

    async fn extract_text(&self, element: &ElementHandle) -> DriverResult<String> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.innerHTML : null; }})()",
            js_string(&element.css())
        );
        let html: Option<String> = self.executor.eval_as(script).await?;
        html.ok_or_else(|| DriverError::StaleElement {
            locator: element.locator_name.clone(),
        })
    }

    async fn close(&self) -> DriverResult<()> {
        self.executor.page().clone().close().await?;
        Ok(())
    }
}
