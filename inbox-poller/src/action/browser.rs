//! Browser click strategy.

use async_trait::async_trait;
use mail_transport::webdriver::{Locator, WebDriverClient, WebDriverError};
use tracing::debug;

use super::strategy::{ActionOutput, ActionStrategy, StrategyError};
use crate::credentials::AuthContext;

fn map_webdriver_error(err: WebDriverError) -> StrategyError {
    if err.is_invalid_session() {
        StrategyError::Unauthorized(err.to_string())
    } else {
        StrategyError::Failed(err.to_string())
    }
}

/// Clicks one locator on the target page.
pub struct BrowserClickStrategy {
    id: String,
    driver: WebDriverClient,
    locator: Locator,
    target_url: String,
}

impl BrowserClickStrategy {
    pub fn new(
        id: impl Into<String>,
        driver: WebDriverClient,
        locator: Locator,
        target_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            driver,
            locator,
            target_url: target_url.into(),
        }
    }

    async fn ensure_on_target(&self, session_id: &str) -> Result<(), WebDriverError> {
        let current = self.driver.current_url(session_id).await?;
        if current != self.target_url {
            debug!(%current, target = %self.target_url, "Navigating to target page");
            self.driver.navigate(session_id, &self.target_url).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ActionStrategy for BrowserClickStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, context: &AuthContext) -> Result<ActionOutput, StrategyError> {
        let session_id = context.token();
        self.ensure_on_target(session_id)
            .await
            .map_err(map_webdriver_error)?;

        let element = self
            .driver
            .find_element(session_id, &self.locator)
            .await
            .map_err(map_webdriver_error)?
            .ok_or_else(|| StrategyError::NotApplicable(format!("{} not found", self.locator)))?;

        self.driver
            .click(session_id, &element)
            .await
            .map_err(map_webdriver_error)?;

        Ok(ActionOutput::Triggered {
            locator: self.locator.to_string(),
        })
    }
}
