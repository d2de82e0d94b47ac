//! Concrete [`Authenticator`](super::Authenticator) implementations.

mod google;
mod webdriver;

pub use google::GoogleAuthenticator;
pub use webdriver::WebDriverAuthenticator;
