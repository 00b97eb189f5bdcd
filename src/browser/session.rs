//! 会话提供者
//!
//! 每个任务从这里拿到一个独立的、已登录的页面。
//! 所有页面共用同一个浏览器（同一份登录状态）。

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Browser;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::{connect_to_browser, launch_browser};
use crate::config::Config;
use crate::error::{AppError, SessionError};
use crate::infrastructure::{ChromePageDriver, Condition, PageDriver};

/// 会话提供者
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// 批次开始前的检查：浏览器是否可用
    async fn health_check(&self) -> Result<(), SessionError>;

    /// 打开一个新页面并确认已登录
    ///
    /// 取消时返回 `SessionError::Cancelled`，已经创建的页面必须先关闭。
    async fn open_page(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn PageDriver>, SessionError>;
}

/// 基于 chromiumoxide 浏览器的会话
pub struct ChromeSession {
    browser: Mutex<Browser>,
    target_url: String,
    login_probe: Condition,
    login_wait: Duration,
    poll_interval: Duration,
}

impl ChromeSession {
    /// 连接已有浏览器或自行启动，取决于 `connect_existing`
    ///
    /// `login_probe` 成立即视为已登录（通常是输入框可见）。
    pub async fn start(config: &Config, login_probe: Condition) -> Result<Self, AppError> {
        let browser = if config.connect_existing {
            connect_to_browser(config.browser_debug_port).await?
        } else {
            launch_browser(config).await?
        };

        Ok(Self {
            browser: Mutex::new(browser),
            target_url: config.target_url.clone(),
            login_probe,
            login_wait: config.login_wait(),
            poll_interval: config.poll_interval(),
        })
    }
}

#[async_trait]
impl SessionProvider for ChromeSession {
    async fn health_check(&self) -> Result<(), SessionError> {
        let browser = self.browser.lock().await;
        let version = browser
            .version()
            .await
            .map_err(|e| SessionError::Unavailable(format!("浏览器无响应: {}", e)))?;
        info!("✓ 浏览器可用: {}", version.product);
        Ok(())
    }

    async fn open_page(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn PageDriver>, SessionError> {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| SessionError::Unavailable(format!("创建页面失败: {}", e)))?
        };

        let driver = ChromePageDriver::new(page, self.poll_interval);
        prepare_page(
            Box::new(driver),
            &self.target_url,
            &self.login_probe,
            self.login_wait,
            cancel,
        )
        .await
    }
}

/// 新页面导航到应用并等待登录
///
/// 失败或被取消时先关闭页面再返回错误，页面不会泄漏。
pub async fn prepare_page(
    page: Box<dyn PageDriver>,
    target_url: &str,
    login_probe: &Condition,
    login_wait: Duration,
    cancel: &CancellationToken,
) -> Result<Box<dyn PageDriver>, SessionError> {
    let ready = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SessionError::Cancelled),
        result = enter_app(page.as_ref(), target_url, login_probe, login_wait) => result,
    };

    match ready {
        Ok(()) => {
            debug!("新页面已就绪: {}", target_url);
            Ok(page)
        }
        Err(e) => {
            if let Err(close_err) = page.close().await {
                warn!("关闭页面失败: {}", close_err);
            }
            Err(e)
        }
    }
}

async fn enter_app(
    page: &dyn PageDriver,
    target_url: &str,
    login_probe: &Condition,
    login_wait: Duration,
) -> Result<(), SessionError> {
    page.navigate(target_url)
        .await
        .map_err(|e| SessionError::Unavailable(format!("导航到 {} 失败: {}", target_url, e)))?;
    ensure_authenticated(page, login_probe, login_wait).await
}

/// 等待页面进入已登录状态
///
/// 停留在登录页时提示用户手动登录，超过 `login_wait` 仍未登录则返回 `AuthFailure`。
pub async fn ensure_authenticated(
    page: &dyn PageDriver,
    login_probe: &Condition,
    login_wait: Duration,
) -> Result<(), SessionError> {
    let url = page.current_url().await.unwrap_or_default();
    if is_login_url(&url) {
        warn!(
            "检测到登录页面 ({})，请在浏览器中完成登录，最多等待 {}s",
            url,
            login_wait.as_secs()
        );
    }

    match page.wait_for_condition(login_probe, login_wait).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            let url = page.current_url().await.unwrap_or_default();
            let detail = if is_login_url(&url) {
                format!("{}s 内未完成登录: {}", login_wait.as_secs(), url)
            } else {
                format!("{}s 内未出现输入框: {}", login_wait.as_secs(), url)
            };
            Err(SessionError::AuthFailure(detail))
        }
        Err(e) => Err(SessionError::Unavailable(e.to_string())),
    }
}

/// 是否是登录页面
pub fn is_login_url(url: &str) -> bool {
    url.contains("accounts.google.com") || url.contains("signin")
}
