pub mod js_executor;
pub mod locator;
pub mod page_driver;

pub use js_executor::JsExecutor;
pub use locator::{Condition, ElementHandle, Locator, Lookup, Matched};
pub use page_driver::{ChromePageDriver, PageDriver};
