//! Message formatting and delivery

pub mod formatter;
pub mod telegram;

pub use formatter::{CliFormatter, Channel, Formatter, FormatterFactory, TelegramFormatter};
pub use telegram::{TelegramNotifier, split_message};

use crate::error::Result;
use async_trait::async_trait;

/// Delivers formatted messages to a user
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Channel the notifier's messages should be formatted for
    fn channel(&self) -> Channel;

    async fn send_message(&self, text: &str) -> Result<()>;

    /// Verify credentials; returns a description of the connected account
    async fn test_connection(&self) -> Result<String>;
}

/// Prints messages to stdout, for dry runs without Telegram
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &'static str {
        "console"
    }

    fn channel(&self) -> Channel {
        Channel::Cli
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        println!("{text}\n");
        Ok(())
    }

    async fn test_connection(&self) -> Result<String> {
        Ok("stdout".to_string())
    }
}
