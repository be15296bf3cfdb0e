//! `utilities_file`: the body of a URL, downloaded once on create.

use crate::resource::{Applied, Keepers, Resource, ResourceResult, import_not_implemented};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use utilities_http::{FetchEngine, FetchOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub url: String,
    #[serde(default)]
    pub keepers: Option<Keepers>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Random UUID v4 assigned on create
    pub id: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub keepers: Option<Keepers>,
}

#[derive(Clone, Default)]
pub struct FileResource {
    engine: FetchEngine,
}

impl FileResource {
    #[must_use]
    pub fn new(engine: FetchEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Resource for FileResource {
    const TYPE_NAME: &'static str = "utilities_file";

    type Config = FileConfig;
    type State = FileState;

    async fn create(
        &self,
        config: FileConfig,
        cancel: &CancellationToken,
    ) -> ResourceResult<FileState> {
        let result = self.engine.download(&config.url, cancel).await?;
        let FetchOutcome { result, warnings } = FetchOutcome::new(result);

        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(%id, url = %config.url, status = result.status_code, "file downloaded");

        Ok(Applied::with_diagnostics(
            FileState {
                id,
                url: config.url,
                content: result.response_body,
                keepers: config.keepers,
            },
            warnings,
        ))
    }

    async fn import(&self, _id: &str) -> ResourceResult<FileState> {
        Err(import_not_implemented())
    }
}
