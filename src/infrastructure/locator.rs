//! 定位器与页面条件
//!
//! 流程层只描述"找什么"（`Locator`）和"等什么"（`Condition`），
//! 这里负责把它们编译成在页面里执行的 JS 表达式。

use std::fmt;

/// 标记属性：找到的元素会被打上这个属性，后续点击/输入通过它重新定位
pub const REF_ATTRIBUTE: &str = "data-pilot-ref";

/// 元素选择方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// CSS 选择器
    Css(String),
    /// ARIA 角色 + 可访问名称（aria-label 或文本包含 name）
    Role { role: String, name: String },
    /// CSS 匹配且文本包含 text
    Text { css: String, text: String },
    /// 在 scope 匹配到的元素内部继续查找 inner
    Within { scope: Box<Selector>, inner: Box<Selector> },
}

/// 多个匹配时取哪一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pick {
    #[default]
    First,
    Last,
}

/// 带名字的定位器，名字只用于日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub name: String,
    pub selector: Selector,
    pub pick: Pick,
}

impl Locator {
    pub fn css(name: impl Into<String>, css: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: Selector::Css(css.into()),
            pick: Pick::First,
        }
    }

    pub fn role(
        name: impl Into<String>,
        role: impl Into<String>,
        accessible_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            selector: Selector::Role {
                role: role.into(),
                name: accessible_name.into(),
            },
            pick: Pick::First,
        }
    }

    pub fn text(name: impl Into<String>, css: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: Selector::Text {
                css: css.into(),
                text: text.into(),
            },
            pick: Pick::First,
        }
    }

    /// 限定在 scope 内查找
    pub fn within(mut self, scope: &Locator) -> Self {
        self.selector = Selector::Within {
            scope: Box::new(scope.selector.clone()),
            inner: Box::new(self.selector),
        };
        self
    }

    pub fn last(mut self) -> Self {
        self.pick = Pick::Last;
        self
    }

    /// 求值为元素或 null 的 JS 表达式
    pub fn element_js(&self) -> String {
        let pick = match self.pick {
            Pick::First => "c[0]",
            Pick::Last => "c[c.length - 1]",
        };
        format!(
            "(() => {{ const c = {}; return c.length ? {} : null; }})()",
            self.selector.candidates_js("document", 0),
            pick
        )
    }

    /// 等待就绪用的脚本：元素可见且可用时打上标记并返回 true
    pub fn mark_ready_js(&self, ref_id: &str) -> String {
        format!(
            r#"(() => {{
                const el = {element};
                if (!el || !{visible}(el)) return false;
                if (el.disabled || el.getAttribute('aria-disabled') === 'true') return false;
                el.setAttribute({attr}, {ref_id});
                return true;
            }})()"#,
            element = self.element_js(),
            visible = VISIBLE_FN,
            attr = js_string(REF_ATTRIBUTE),
            ref_id = js_string(ref_id),
        )
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Selector {
    /// 求值为候选元素数组的 JS 表达式
    fn candidates_js(&self, root: &str, depth: usize) -> String {
        match self {
            Selector::Css(css) => {
                format!("Array.from({}.querySelectorAll({}))", root, js_string(css))
            }
            Selector::Role { role, name } => format!(
                "Array.from({root}.querySelectorAll({css})).filter(el => ((el.getAttribute('aria-label') || '') + ' ' + (el.textContent || '')).includes({name}))",
                root = root,
                css = js_string(&role_css(role)),
                name = js_string(name),
            ),
            Selector::Text { css, text } => format!(
                "Array.from({}.querySelectorAll({})).filter(el => (el.textContent || '').includes({}))",
                root,
                js_string(css),
                js_string(text)
            ),
            Selector::Within { scope, inner } => {
                let var = format!("s{}", depth);
                format!(
                    "{}.flatMap({} => {})",
                    scope.candidates_js(root, depth + 1),
                    var,
                    inner.candidates_js(&var, depth + 1)
                )
            }
        }
    }
}

/// ARIA 角色对应的 CSS（包含原生元素）
fn role_css(role: &str) -> String {
    match role {
        "button" => "button, [role=\"button\"]".to_string(),
        "textbox" => {
            "textarea, input[type=\"text\"], [role=\"textbox\"], [contenteditable=\"true\"]".to_string()
        }
        "link" => "a[href], [role=\"link\"]".to_string(),
        other => format!("[role=\"{}\"]", other),
    }
}

const VISIBLE_FN: &str =
    "((el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length))";

/// 安全地嵌入 JS 字符串字面量
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// 页面级条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// 元素存在且可见
    Visible(Locator),
    /// 元素不存在或不可见
    Absent(Locator),
    /// 元素属性等于期望值（例如 aria-pressed="true"）
    Attribute {
        locator: Locator,
        attribute: String,
        expected: String,
    },
    /// 页面 HTML 长度超过阈值
    ContentLongerThan(usize),
    /// 任一条件成立
    Any(Vec<Condition>),
}

impl Condition {
    /// 求值为布尔值的 JS 表达式
    pub fn to_js(&self) -> String {
        match self {
            Condition::Visible(locator) => format!(
                "((el) => !!el && {}(el))({})",
                VISIBLE_FN,
                locator.element_js()
            ),
            Condition::Absent(locator) => format!(
                "((el) => !el || !{}(el))({})",
                VISIBLE_FN,
                locator.element_js()
            ),
            Condition::Attribute {
                locator,
                attribute,
                expected,
            } => format!(
                "((el) => !!el && el.getAttribute({}) === {})({})",
                js_string(attribute),
                js_string(expected),
                locator.element_js()
            ),
            Condition::ContentLongerThan(len) => {
                format!("(document.documentElement.outerHTML.length > {})", len)
            }
            Condition::Any(conditions) if conditions.is_empty() => "false".to_string(),
            Condition::Any(conditions) => conditions
                .iter()
                .map(|c| format!("({})", c.to_js()))
                .collect::<Vec<_>>()
                .join(" || "),
        }
    }

    /// 日志用的描述
    pub fn describe(&self) -> String {
        match self {
            Condition::Visible(locator) => format!("可见({})", locator.name),
            Condition::Absent(locator) => format!("消失({})", locator.name),
            Condition::Attribute {
                locator, attribute, ..
            } => format!("属性({}.{})", locator.name, attribute),
            Condition::ContentLongerThan(len) => format!("内容长度>{}", len),
            Condition::Any(conditions) => conditions
                .iter()
                .map(Condition::describe)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    /// 条件里引用到的所有定位器名字
    pub fn locator_names(&self) -> Vec<&str> {
        match self {
            Condition::Visible(locator) | Condition::Absent(locator) => vec![locator.name.as_str()],
            Condition::Attribute { locator, .. } => vec![locator.name.as_str()],
            Condition::ContentLongerThan(_) => Vec::new(),
            Condition::Any(conditions) => {
                conditions.iter().flat_map(Condition::locator_names).collect()
            }
        }
    }
}

/// 主定位器 + 一个备用定位器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub primary: Locator,
    pub fallback: Option<Locator>,
}

impl Lookup {
    pub fn new(primary: Locator) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Locator) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// 命中的是哪个定位器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matched {
    Primary,
    Fallback,
}

/// 已就绪元素的句柄
///
/// 只在创建它的页面上有效。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub ref_id: String,
    pub locator_name: String,
    pub matched: Matched,
}

impl ElementHandle {
    /// 重新定位该元素的 CSS 选择器
    pub fn css(&self) -> String {
        format!("[{}=\"{}\"]", REF_ATTRIBUTE, self.ref_id)
    }
}
