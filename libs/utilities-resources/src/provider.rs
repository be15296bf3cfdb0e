use crate::file::FileResource;
use crate::http::HttpResource;
use crate::nanoid::NanoidResource;
use crate::resource::{DynResource, Erased, Resource};
use std::collections::BTreeMap;
use std::sync::Arc;
use utilities_http::FetchEngine;

pub const PROVIDER_TYPE_NAME: &str = "utilities";

/// Catalogue of the resources this provider manages.
///
/// All network-backed resources share one [`FetchEngine`].
pub struct Provider {
    version: String,
    resources: BTreeMap<&'static str, Arc<dyn DynResource>>,
}

impl Provider {
    #[must_use]
    pub fn new(version: impl Into<String>, engine: FetchEngine) -> Self {
        let mut provider = Self {
            version: version.into(),
            resources: BTreeMap::new(),
        };
        provider.register(FileResource::new(engine.clone()));
        provider.register(HttpResource::new(engine));
        provider.register(NanoidResource);
        provider
    }

    fn register<R: Resource>(&mut self, resource: R) {
        self.resources.insert(R::TYPE_NAME, Arc::new(Erased(resource)));
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        PROVIDER_TYPE_NAME
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resource type names, sorted.
    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    #[must_use]
    pub fn resource(&self, type_name: &str) -> Option<Arc<dyn DynResource>> {
        self.resources.get(type_name).cloned()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_catalogue() {
        let provider = Provider::new("1.2.3", FetchEngine::default());
        assert_eq!(provider.type_name(), "utilities");
        assert_eq!(provider.version(), "1.2.3");
        assert_eq!(
            provider.resource_types().collect::<Vec<_>>(),
            vec!["utilities_file", "utilities_http", "utilities_nanoid"]
        );
        assert!(provider.resource("utilities_unknown").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_by_type_name() {
        let provider = Provider::new("dev", FetchEngine::default());
        let nanoid = provider.resource("utilities_nanoid").unwrap();
        assert_eq!(nanoid.type_name(), "utilities_nanoid");

        let applied = nanoid
            .create(json!({"length": 8}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(applied.state["length"], 8);
        assert_eq!(applied.state["id"].as_str().unwrap().len(), 8);
    }
}
