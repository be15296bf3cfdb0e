//! Lifecycle contract shared by every managed resource.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use utilities_http::{Diagnostic, DiagnosticKind, Diagnostics};

/// Arbitrary values carried through state; a change forces replacement,
/// which the host decides on.
pub type Keepers = BTreeMap<String, String>;

/// New state of a resource plus the warnings produced while computing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<S> {
    pub state: S,
    pub diagnostics: Diagnostics,
}

impl<S> Applied<S> {
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            state,
            diagnostics: Diagnostics::new(),
        }
    }

    #[must_use]
    pub fn with_diagnostics(state: S, diagnostics: Diagnostics) -> Self {
        Self { state, diagnostics }
    }
}

/// Outcome of a lifecycle operation: state and warnings, or the diagnostics
/// explaining why no state was produced.
pub type ResourceResult<S> = Result<Applied<S>, Diagnostics>;

/// A managed resource with typed configuration and state.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Name the host knows the resource by, e.g. `utilities_nanoid`.
    const TYPE_NAME: &'static str;

    type Config: DeserializeOwned + Send + 'static;
    type State: Serialize + DeserializeOwned + Send + 'static;

    async fn create(
        &self,
        config: Self::Config,
        cancel: &CancellationToken,
    ) -> ResourceResult<Self::State>;

    /// Refresh from the outside world. Defaults to returning the prior state.
    async fn read(&self, state: Self::State) -> ResourceResult<Self::State> {
        Ok(Applied::new(state))
    }

    /// Apply an in-place change. Defaults to keeping the prior state.
    async fn update(
        &self,
        _config: Self::Config,
        prior: Self::State,
        _cancel: &CancellationToken,
    ) -> ResourceResult<Self::State> {
        Ok(Applied::new(prior))
    }

    /// Forget the resource. Nothing exists remotely, so this only drops state.
    async fn delete(&self, _state: Self::State) -> Result<Diagnostics, Diagnostics> {
        Ok(Diagnostics::new())
    }

    async fn import(&self, id: &str) -> ResourceResult<Self::State>;
}

/// Failure to move configuration or state across the JSON boundary.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {resource} configuration: {source}")]
    Config {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {resource} state: {source}")]
    State {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {resource} state: {source}")]
    Encode {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl From<ConfigError> for Diagnostic {
    fn from(err: ConfigError) -> Self {
        Diagnostic::error(
            DiagnosticKind::InvalidConfiguration,
            "Invalid configuration",
            err.to_string(),
        )
    }
}

impl From<ConfigError> for Diagnostics {
    fn from(err: ConfigError) -> Self {
        Diagnostic::from(err).into()
    }
}

/// Object-safe view of a [`Resource`] working on JSON values.
#[async_trait]
pub trait DynResource: Send + Sync {
    fn type_name(&self) -> &'static str;

    async fn create(&self, config: Value, cancel: &CancellationToken) -> ResourceResult<Value>;

    async fn read(&self, state: Value) -> ResourceResult<Value>;

    async fn update(
        &self,
        config: Value,
        prior: Value,
        cancel: &CancellationToken,
    ) -> ResourceResult<Value>;

    async fn delete(&self, state: Value) -> Result<Diagnostics, Diagnostics>;

    async fn import(&self, id: &str) -> ResourceResult<Value>;
}

/// Adapts a typed [`Resource`] to [`DynResource`].
pub struct Erased<R>(pub R);

fn decode_config<R: Resource>(value: Value) -> Result<R::Config, ConfigError> {
    serde_json::from_value(value).map_err(|source| ConfigError::Config {
        resource: R::TYPE_NAME,
        source,
    })
}

fn decode_state<R: Resource>(value: Value) -> Result<R::State, ConfigError> {
    serde_json::from_value(value).map_err(|source| ConfigError::State {
        resource: R::TYPE_NAME,
        source,
    })
}

fn encode<R: Resource>(applied: Applied<R::State>) -> ResourceResult<Value> {
    let state = serde_json::to_value(&applied.state).map_err(|source| ConfigError::Encode {
        resource: R::TYPE_NAME,
        source,
    })?;
    Ok(Applied::with_diagnostics(state, applied.diagnostics))
}

#[async_trait]
impl<R: Resource> DynResource for Erased<R> {
    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    async fn create(&self, config: Value, cancel: &CancellationToken) -> ResourceResult<Value> {
        let config = decode_config::<R>(config)?;
        encode::<R>(self.0.create(config, cancel).await?)
    }

    async fn read(&self, state: Value) -> ResourceResult<Value> {
        let state = decode_state::<R>(state)?;
        encode::<R>(self.0.read(state).await?)
    }

    async fn update(
        &self,
        config: Value,
        prior: Value,
        cancel: &CancellationToken,
    ) -> ResourceResult<Value> {
        let config = decode_config::<R>(config)?;
        let prior = decode_state::<R>(prior)?;
        encode::<R>(self.0.update(config, prior, cancel).await?)
    }

    async fn delete(&self, state: Value) -> Result<Diagnostics, Diagnostics> {
        let state = decode_state::<R>(state)?;
        self.0.delete(state).await
    }

    async fn import(&self, id: &str) -> ResourceResult<Value> {
        encode::<R>(self.0.import(id).await?)
    }
}

/// The diagnostic every resource without import support returns.
#[must_use]
pub fn import_not_implemented() -> Diagnostics {
    Diagnostic::error(
        DiagnosticKind::ImportError,
        "Not Implemented.",
        "Not implemented.",
    )
    .into()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct EchoConfig {
        value: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct EchoState {
        id: String,
        value: String,
    }

    struct Echo;

    #[async_trait]
    impl Resource for Echo {
        const TYPE_NAME: &'static str = "test_echo";
        type Config = EchoConfig;
        type State = EchoState;

        async fn create(
            &self,
            config: EchoConfig,
            _cancel: &CancellationToken,
        ) -> ResourceResult<EchoState> {
            Ok(Applied::new(EchoState {
                id: "echo".to_owned(),
                value: config.value,
            }))
        }

        async fn import(&self, _id: &str) -> ResourceResult<EchoState> {
            Err(import_not_implemented())
        }
    }

    #[tokio::test]
    async fn test_erased_create_round_trips_json() {
        let erased = Erased(Echo);
        assert_eq!(erased.type_name(), "test_echo");

        let applied = DynResource::create(&erased, json!({"value": "v"}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(applied.state, json!({"id": "echo", "value": "v"}));
        assert!(applied.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_erased_rejects_bad_config_as_invalid_configuration() {
        let erased = Erased(Echo);
        let diags = DynResource::create(&erased, json!({"other": 1}), &CancellationToken::new())
            .await
            .unwrap_err();
        let diag = diags.find(DiagnosticKind::InvalidConfiguration).unwrap();
        assert!(diag.detail.starts_with("invalid test_echo configuration"));
    }

    #[tokio::test]
    async fn test_default_read_update_delete_keep_state() {
        let erased = Erased(Echo);
        let state = json!({"id": "echo", "value": "old"});

        let read = DynResource::read(&erased, state.clone()).await.unwrap();
        assert_eq!(read.state, state);

        let updated = DynResource::update(
            &erased,
            json!({"value": "new"}),
            state.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(updated.state, state);

        assert!(DynResource::delete(&erased, state).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_state_rejected() {
        let erased = Erased(Echo);
        let diags = DynResource::read(&erased, json!("not an object"))
            .await
            .unwrap_err();
        assert!(diags.has_error());
    }
}
