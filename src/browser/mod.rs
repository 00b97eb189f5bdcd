pub mod connection;
pub mod headless;
pub mod session;

pub use connection::connect_to_browser;
pub use headless::launch_browser;
pub use session::{ensure_authenticated, is_login_url, prepare_page, ChromeSession, SessionProvider};
