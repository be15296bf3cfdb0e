//! `utilities_http`: a fetch whose result is kept in state.

use crate::resource::{Applied, Keepers, Resource, ResourceResult, import_not_implemented};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use utilities_http::{FetchEngine, FetchRequest, FetchResult};

/// A [`FetchRequest`] plus keepers, as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(flatten)]
    pub request: FetchRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepers: Option<Keepers>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpState {
    /// The requested URL
    pub id: String,
    #[serde(flatten)]
    pub request: FetchRequest,
    #[serde(flatten)]
    pub result: FetchResult,
    /// Deprecated mirror of `response_body`
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepers: Option<Keepers>,
}

#[derive(Clone, Default)]
pub struct HttpResource {
    engine: FetchEngine,
}

impl HttpResource {
    #[must_use]
    pub fn new(engine: FetchEngine) -> Self {
        Self { engine }
    }

    async fn apply(
        &self,
        config: HttpConfig,
        cancel: &CancellationToken,
    ) -> ResourceResult<HttpState> {
        let outcome = self.engine.fetch(&config.request, cancel).await?;
        let result = outcome.result;

        Ok(Applied::with_diagnostics(
            HttpState {
                id: config.request.url.clone(),
                body: result.response_body.clone(),
                request: config.request,
                result,
                keepers: config.keepers,
            },
            outcome.warnings,
        ))
    }
}

#[async_trait]
impl Resource for HttpResource {
    const TYPE_NAME: &'static str = "utilities_http";

    type Config = HttpConfig;
    type State = HttpState;

    async fn create(
        &self,
        config: HttpConfig,
        cancel: &CancellationToken,
    ) -> ResourceResult<HttpState> {
        self.apply(config, cancel).await
    }

    /// Fetch again with the new configuration.
    async fn update(
        &self,
        config: HttpConfig,
        _prior: HttpState,
        cancel: &CancellationToken,
    ) -> ResourceResult<HttpState> {
        self.apply(config, cancel).await
    }

    async fn import(&self, _id: &str) -> ResourceResult<HttpState> {
        Err(import_not_implemented())
    }
}
