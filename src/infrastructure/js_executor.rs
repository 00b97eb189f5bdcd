//! JS 执行器 - 基础设施层
//!
//! 持有一个 page，只暴露"执行 JS"的能力

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{DriverError, DriverResult};

/// JS 执行器
///
/// 职责：
/// - 持有一个 Page 资源
/// - 暴露 eval() 能力
/// - 不认识任务和流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// 脚本返回 undefined 时得到 `JsonValue::Null`
    pub async fn eval(&self, js_code: impl Into<String>) -> DriverResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
    ) -> DriverResult<T> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value)
            .map_err(|e| DriverError::script(format!("脚本返回值无法解析: {}", e)))
    }

    /// 执行返回布尔值的 JS，非布尔值视为 false
    pub async fn eval_bool(&self, js_code: impl Into<String>) -> DriverResult<bool> {
        Ok(self.eval(js_code).await?.as_bool().unwrap_or(false))
    }
}
