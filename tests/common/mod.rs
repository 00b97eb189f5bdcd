//! 测试用的假页面和假会话
//!
//! 假页面按定位器名字响应；具体行为由输入的提示词选择脚本决定，
//! 所以同一批次里的不同任务可以有不同的表现。

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chat_pilot::browser::{prepare_page, SessionProvider};
use chat_pilot::config::Config;
use chat_pilot::error::{DriverError, DriverResult, SessionError};
use chat_pilot::infrastructure::{Condition, ElementHandle, Lookup, Matched, PageDriver};
use chat_pilot::services::HtmdConverter;
use chat_pilot::workflow::ui_map::names;
use chat_pilot::workflow::{ChatFlow, FlowSettings, UiMap};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// 单个任务页面的行为
#[derive(Clone)]
pub struct PageScript {
    /// 永远不会就绪的定位器
    pub missing: HashSet<&'static str>,
    /// 切换模式后激活标志是否出现
    pub toggle_activates: bool,
    /// 深度研究确认对话框是否出现
    pub confirm_widget: bool,
    /// 完成信号是否出现
    pub completes: bool,
    /// 完成信号出现前的耗时
    pub completion_delay: Duration,
    /// 页面 HTML 超过长度阈值（但没有完成标志）
    pub long_content: bool,
    /// 响应 HTML，为空时使用 `<p>answer to {prompt}</p>`
    pub response_html: Option<String>,
    /// 关闭页面时取消整个批次
    pub cancel_on_close: Option<CancellationToken>,
    /// 点击下载按钮时写入文件的目录
    pub download_to: Option<PathBuf>,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            missing: [names::THINKING_BUTTON, names::SOURCES_BUTTON].into_iter().collect(),
            toggle_activates: true,
            confirm_widget: true,
            completes: true,
            completion_delay: Duration::ZERO,
            long_content: false,
            response_html: None,
            cancel_on_close: None,
            download_to: None,
        }
    }
}

impl PageScript {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            completion_delay: delay,
            ..Self::default()
        }
    }

    pub fn never_completes() -> Self {
        Self {
            completes: false,
            ..Self::default()
        }
    }

    pub fn with_missing(mut self, name: &'static str) -> Self {
        self.missing.insert(name);
        self
    }

    pub fn with_extras(mut self) -> Self {
        self.missing.remove(names::THINKING_BUTTON);
        self.missing.remove(names::SOURCES_BUTTON);
        self
    }
}

/// 一次条件等待的记录
#[derive(Debug, Clone)]
pub struct WaitRecord {
    pub prompt: Option<String>,
    pub condition: Condition,
    pub timeout: Duration,
}

/// 所有页面共享的记录
#[derive(Default)]
pub struct Recorder {
    pub waits: Mutex<Vec<WaitRecord>>,
    pub clicks: Mutex<Vec<(Option<String>, String)>>,
    pub typed: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn waits_for(&self, prompt: &str) -> Vec<WaitRecord> {
        self.waits
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.prompt.as_deref() == Some(prompt))
            .cloned()
            .collect()
    }

    pub fn clicked(&self, prompt: &str) -> Vec<String> {
        self.clicks
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.as_deref() == Some(prompt))
            .map(|(_, name)| name.clone())
            .collect()
    }
}

/// 页面数量统计
#[derive(Default)]
pub struct SessionStats {
    pub open_now: AtomicUsize,
    pub max_open: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl SessionStats {
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn open_now(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// 假页面
pub struct FakeDriver {
    scripts: Arc<HashMap<String, PageScript>>,
    stats: Arc<SessionStats>,
    recorder: Arc<Recorder>,
    prompt: Mutex<Option<String>>,
    /// 提示词没有对应脚本时使用
    pub default_script: PageScript,
    pub url: String,
    pub logged_in: bool,
}

impl FakeDriver {
    pub fn new(
        scripts: Arc<HashMap<String, PageScript>>,
        stats: Arc<SessionStats>,
        recorder: Arc<Recorder>,
    ) -> Self {
        Self {
            scripts,
            stats,
            recorder,
            prompt: Mutex::new(None),
            default_script: PageScript::default(),
            url: "https://chat.example/app".to_string(),
            logged_in: true,
        }
    }

    fn prompt(&self) -> Option<String> {
        self.prompt.lock().unwrap().clone()
    }

    fn script(&self) -> PageScript {
        self.prompt()
            .and_then(|p| self.scripts.get(&p).cloned())
            .unwrap_or_else(|| self.default_script.clone())
    }

    fn is_ready(&self, script: &PageScript, name: &str) -> bool {
        !script.missing.contains(name)
    }

    /// 条件是否（最终）成立，以及成立前的耗时
    fn evaluate(&self, script: &PageScript, condition: &Condition) -> Option<Duration> {
        if let Condition::ContentLongerThan(_) = condition {
            return script.long_content.then_some(Duration::ZERO);
        }
        let referenced = condition.locator_names();

        if mentions(&referenced, &[names::PROMPT_INPUT, names::PROMPT_INPUT_FALLBACK]) {
            return self.logged_in.then_some(Duration::ZERO);
        }
        if mentions(&referenced, &[names::MODE_DESELECT, names::MODE_PRESSED]) {
            return script.toggle_activates.then_some(Duration::ZERO);
        }
        if mentions(&referenced, &[names::CONFIRM_WIDGET]) {
            return script.confirm_widget.then_some(Duration::ZERO);
        }
        let completion = [
            names::EXPORT_DONE,
            names::COPY_DONE,
            names::SOURCES_DONE,
            names::IMAGE_DOWNLOAD,
        ];
        if mentions(&referenced, &completion) {
            return script.completes.then_some(script.completion_delay);
        }
        Some(Duration::ZERO)
    }

    async fn settle(&self, script: &PageScript, condition: &Condition, timeout: Duration) -> bool {
        match self.evaluate(script, condition) {
            Some(delay) if delay <= timeout => {
                sleep(delay).await;
                true
            }
            _ => {
                sleep(timeout).await;
                false
            }
        }
    }
}

fn mentions<'a>(referenced: &[&'a str], wanted: &[&'a str]) -> bool {
    referenced.iter().any(|name| wanted.contains(name))
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, _url: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.url.clone())
    }

    async fn await_ready(&self, lookup: &Lookup, timeout: Duration) -> DriverResult<ElementHandle> {
        let script = self.script();

        // 下载按钮就是图片任务的完成信号
        if lookup.primary.name == names::IMAGE_DOWNLOAD {
            let ready = Condition::Visible(lookup.primary.clone());
            if !self.settle(&script, &ready, timeout).await {
                return Err(DriverError::UiChanged {
                    locator: lookup.primary.name.clone(),
                });
            }
        }

        let candidates = std::iter::once((&lookup.primary, Matched::Primary))
            .chain(lookup.fallback.iter().map(|f| (f, Matched::Fallback)));
        for (locator, matched) in candidates {
            if self.is_ready(&script, &locator.name) {
                return Ok(ElementHandle {
                    ref_id: format!("fake-{}", locator.name),
                    locator_name: locator.name.clone(),
                    matched,
                });
            }
            sleep(timeout).await;
        }
        Err(DriverError::UiChanged {
            locator: lookup.primary.name.clone(),
        })
    }

    async fn type_text(&self, _element: &ElementHandle, text: &str) -> DriverResult<()> {
        *self.prompt.lock().unwrap() = Some(text.to_string());
        self.recorder.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn click(
        &self,
        element: &ElementHandle,
        verify: Option<(&Condition, Duration)>,
    ) -> DriverResult<bool> {
        self.recorder
            .clicks
            .lock()
            .unwrap()
            .push((self.prompt(), element.locator_name.clone()));

        let script = self.script();
        if element.locator_name == names::IMAGE_DOWNLOAD {
            if let Some(dir) = &script.download_to {
                std::fs::write(dir.join("generated.png"), b"png")
                    .map_err(|e| DriverError::script(e.to_string()))?;
            }
        }

        match verify {
            Some((condition, timeout)) => Ok(self.settle(&script, condition, timeout).await),
            None => Ok(true),
        }
    }

    async fn wait_for_condition(
        &self,
        condition: &Condition,
        timeout: Duration,
    ) -> DriverResult<bool> {
        self.recorder.waits.lock().unwrap().push(WaitRecord {
            prompt: self.prompt(),
            condition: condition.clone(),
            timeout,
        });
        let script = self.script();
        Ok(self.settle(&script, condition, timeout).await)
    }

    async fn extract_text(&self, element: &ElementHandle) -> DriverResult<String> {
        let script = self.script();
        let html = match element.locator_name.as_str() {
            names::THINKING_CONTENT => "<p>step by step</p>".to_string(),
            names::SOURCES_PANEL => {
                r#"<ul><li><a href="https://source.example">Source</a></li></ul>"#.to_string()
            }
            _ => script.response_html.clone().unwrap_or_else(|| {
                format!("<p>answer to {}</p>", self.prompt().unwrap_or_default())
            }),
        };
        Ok(html)
    }

    async fn close(&self) -> DriverResult<()> {
        self.stats.open_now.fetch_sub(1, Ordering::SeqCst);
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.script().cancel_on_close {
            token.cancel();
        }
        Ok(())
    }
}

/// 假会话：统计同时打开的页面数量
pub struct FakeSession {
    scripts: Arc<HashMap<String, PageScript>>,
    default_script: PageScript,
    pub stats: Arc<SessionStats>,
    pub recorder: Arc<Recorder>,
    healthy: bool,
    auth_failure: bool,
    open_delay: Duration,
    /// 页面创建后停在登录页
    login_stalls: bool,
    login_wait: Duration,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(HashMap::new()),
            default_script: PageScript::default(),
            stats: Arc::new(SessionStats::default()),
            recorder: Arc::new(Recorder::default()),
            healthy: true,
            auth_failure: false,
            open_delay: Duration::ZERO,
            login_stalls: false,
            login_wait: Duration::from_secs(60),
        }
    }

    pub fn with_script(mut self, prompt: &str, script: PageScript) -> Self {
        Arc::make_mut(&mut self.scripts).insert(prompt.to_string(), script);
        self
    }

    pub fn with_default_script(mut self, script: PageScript) -> Self {
        self.default_script = script;
        self
    }

    /// 直接构造一个页面（不计入打开数量）
    pub fn driver(&self) -> FakeDriver {
        let mut driver =
            FakeDriver::new(self.scripts.clone(), self.stats.clone(), self.recorder.clone());
        driver.default_script = self.default_script.clone();
        driver
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn with_auth_failure(mut self) -> Self {
        self.auth_failure = true;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// 页面创建后一直等不到登录完成
    pub fn with_stalled_login(mut self, login_wait: Duration) -> Self {
        self.login_stalls = true;
        self.login_wait = login_wait;
        self
    }
}

#[async_trait]
impl SessionProvider for FakeSession {
    async fn health_check(&self) -> Result<(), SessionError> {
        if self.healthy {
            Ok(())
        } else {
            Err(SessionError::Unavailable("browser is gone".to_string()))
        }
    }

    async fn open_page(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn PageDriver>, SessionError> {
        if !self.open_delay.is_zero() {
            sleep(self.open_delay).await;
        }
        if self.auth_failure {
            return Err(SessionError::AuthFailure("still on sign-in page".to_string()));
        }

        let now = self.stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_open.fetch_max(now, Ordering::SeqCst);
        self.stats.opened.fetch_add(1, Ordering::SeqCst);

        let mut driver = self.driver();
        driver.logged_in = !self.login_stalls;
        prepare_page(
            Box::new(driver),
            "https://chat.example/app",
            &UiMap::gemini().login_probe(),
            self.login_wait,
            cancel,
        )
        .await
    }
}

/// 使用默认配置的流程
pub fn test_flow() -> Arc<ChatFlow> {
    test_flow_with(&Config::default())
}

pub fn test_flow_with(config: &Config) -> Arc<ChatFlow> {
    Arc::new(ChatFlow::new(
        UiMap::gemini(),
        FlowSettings::from_config(config),
        Arc::new(HtmdConverter::new()),
    ))
}
