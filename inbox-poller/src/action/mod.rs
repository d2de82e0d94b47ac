//! Poll action: ordered strategies and their resolution.
//!
//! - [`ActionStrategy`]: one candidate way of performing the action
//! - [`resolver::perform`]: tries candidates in order until one succeeds
//! - [`GmailQueryStrategy`] / [`BrowserClickStrategy`]: concrete candidates

mod browser;
mod gmail;
pub mod resolver;
mod strategy;

use std::sync::Arc;

use mail_transport::gmail::GmailClient;
use mail_transport::webdriver::{Locator, WebDriverClient};

pub use browser::BrowserClickStrategy;
pub use gmail::{GmailQueryStrategy, GmailReporter};
pub use resolver::{AttemptOutcome, AttemptRecord, Resolution, ResolveError, perform};
pub use strategy::{ActionOutput, ActionStrategy, StrategyError};

use crate::config::StrategyDescriptor;
use crate::{Error, Result};

/// Build Gmail API strategies in descriptor order.
pub fn gmail_strategies(
    descriptors: &[StrategyDescriptor],
    gmail: &GmailClient,
    labels: &[String],
    max_messages: u32,
) -> Result<Vec<Arc<dyn ActionStrategy>>> {
    descriptors
        .iter()
        .map(|descriptor| {
            let id = descriptor.to_string();
            let strategy: Arc<dyn ActionStrategy> = match descriptor {
                StrategyDescriptor::Labels => Arc::new(GmailQueryStrategy::by_labels(
                    id,
                    gmail.clone(),
                    labels,
                    max_messages,
                )),
                StrategyDescriptor::Query(q) => Arc::new(GmailQueryStrategy::by_search(
                    id,
                    gmail.clone(),
                    q.clone(),
                    max_messages,
                )),
                other => {
                    return Err(Error::config(format!(
                        "strategy {} is not usable in api mode",
                        other
                    )));
                }
            };
            Ok(strategy)
        })
        .collect()
}

/// Build browser click strategies in descriptor order.
pub fn browser_strategies(
    descriptors: &[StrategyDescriptor],
    driver: &WebDriverClient,
    target_url: &str,
) -> Result<Vec<Arc<dyn ActionStrategy>>> {
    descriptors
        .iter()
        .map(|descriptor| {
            let locator = match descriptor {
                StrategyDescriptor::Css(v) => Locator::Css(v.clone()),
                StrategyDescriptor::XPath(v) => Locator::XPath(v.clone()),
                StrategyDescriptor::Text(v) => Locator::LinkText(v.clone()),
                StrategyDescriptor::Partial(v) => Locator::PartialLinkText(v.clone()),
                other => {
                    return Err(Error::config(format!(
                        "strategy {} is not usable in browser mode",
                        other
                    )));
                }
            };
            let strategy: Arc<dyn ActionStrategy> = Arc::new(BrowserClickStrategy::new(
                descriptor.to_string(),
                driver.clone(),
                locator,
                target_url,
            ));
            Ok(strategy)
        })
        .collect()
}
