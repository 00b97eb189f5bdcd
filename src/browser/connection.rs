use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::AppError;

/// 连接到已经运行的浏览器（需要以 --remote-debugging-port 启动）
///
/// 用户在这个浏览器里已经登录，所有任务共用它的登录状态。
pub async fn connect_to_browser(port: u16) -> Result<Browser, AppError> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::browser_connection_failed(port, e)
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await.map_err(|e| AppError::browser_connection_failed(port, e))?;
    debug!("浏览器中已有 {} 个页面", pages.len());

    Ok(browser)
}
