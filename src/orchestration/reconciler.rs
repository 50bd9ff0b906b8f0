//! Status Reconciler - does a previously published object still exist?
//!
//! Resolves the input id first, then probes existence. Platforms answer
//! "deleted" and "access revoked" the same way often enough that the
//! reconciler keeps a third state, [`Existence::Unknown`], and never
//! guesses between the other two.

use crate::core::error::PublishError;
use crate::core::model::{Channel, Existence, ReconciliationRecord, ResolutionStrategy};
use crate::core::store::PublishStore;
use crate::core::traits::ProviderAdapter;
use crate::orchestration::identifier_resolver::IdentifierResolver;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub struct StatusReconciler {
    resolver: IdentifierResolver,
    store: Arc<dyn PublishStore>,
}

impl StatusReconciler {
    pub fn new(resolver: IdentifierResolver, store: Arc<dyn PublishStore>) -> Self {
        Self { resolver, store }
    }

    /// Check `input` on the adapter's platform and append the outcome to
    /// the store
    ///
    /// Credential, rate limit and network errors are returned as errors;
    /// they say nothing about the object.
    pub async fn check(
        &self,
        adapter: &dyn ProviderAdapter,
        input: &str,
        channel: &Channel,
    ) -> Result<ReconciliationRecord, PublishError> {
        let platform = adapter.platform();

        let (canonical_id, state, detail) =
            match self.resolver.resolve(adapter, input, channel).await {
                Ok(resolution) => {
                    let check = match adapter.check_exists(&resolution.canonical_id, channel).await {
                        Ok(check) => Ok(check.exists),
                        Err(PublishError::AmbiguousState { message, .. }) => Err(message),
                        Err(e) => return Err(e),
                    };

                    let (state, detail) = match check {
                        Ok(true) => (Existence::Exists, None),
                        // Listed by the platform but not fetchable by id yet
                        Ok(false) if resolution.strategy == ResolutionStrategy::ListingFallback => (
                            Existence::Exists,
                            Some("listed but not yet retrievable by id".to_string()),
                        ),
                        Ok(false) => (Existence::Deleted, None),
                        Err(message) => (Existence::Unknown, Some(message)),
                    };
                    (Some(resolution.canonical_id), state, detail)
                }
                Err(e @ PublishError::NotFound { .. }) => {
                    (None, Existence::Deleted, Some(e.to_string()))
                }
                Err(PublishError::AmbiguousState { message, .. }) => {
                    (None, Existence::Unknown, Some(message))
                }
                Err(e) => return Err(e),
            };

        let record = ReconciliationRecord {
            platform,
            input_id: input.to_string(),
            canonical_id,
            state,
            detail,
            checked_at: Utc::now(),
        };
        self.store.record_reconciliation(record.clone()).await?;

        info!(%platform, input, state = %record.state, "status reconciled");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Platform;
    use crate::core::store::{MemoryStore, PostStore};
    use crate::core::traits::{FieldSet, PlatformObject};
    use crate::plugins::sandbox_plugin::{SandboxOperation, SandboxPlugin};

    fn channel() -> Channel {
        Channel::new("sandbox-1", Platform::Sandbox, "PAGE42", "sandbox-token")
    }

    fn reconciler(store: Arc<MemoryStore>) -> StatusReconciler {
        StatusReconciler::new(IdentifierResolver::default(), store)
    }

    #[tokio::test]
    async fn test_existing_object() {
        let store = Arc::new(MemoryStore::new());
        let sandbox = SandboxPlugin::with_scheme("PAGE42", "_");
        sandbox.insert_object("PAGE42_7", "still here");

        let record = reconciler(store)
            .check(&sandbox, "7", &channel())
            .await
            .unwrap();

        assert_eq!(record.state, Existence::Exists);
        assert_eq!(record.canonical_id.as_deref(), Some("PAGE42_7"));
    }

    #[tokio::test]
    async fn test_deleted_object() {
        let store = Arc::new(MemoryStore::new());
        let sandbox = SandboxPlugin::with_scheme("PAGE42", "_");

        let record = reconciler(store.clone())
            .check(&sandbox, "PAGE42_7", &channel())
            .await
            .unwrap();

        assert_eq!(record.state, Existence::Deleted);
        assert!(record.detail.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_access_denied_is_unknown_and_stored() {
        let store = Arc::new(MemoryStore::new());
        let sandbox = SandboxPlugin::with_scheme("PAGE42", "_");
        sandbox.insert_object("PAGE42_9", "restricted");
        sandbox.deny_access("PAGE42_9");

        let record = reconciler(store.clone())
            .check(&sandbox, "PAGE42_9", &channel())
            .await
            .unwrap();

        assert_eq!(record.state, Existence::Unknown);
        assert_ne!(record.state, Existence::Exists);
        assert_ne!(record.state, Existence::Deleted);

        let stored = store
            .reconciliations(Platform::Sandbox, "PAGE42_9")
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].state, Existence::Unknown);
    }

    /// Answers full lookups but refuses the minimal existence probe
    struct ProbeDenied;

    #[async_trait::async_trait]
    impl ProviderAdapter for ProbeDenied {
        fn platform(&self) -> Platform {
            Platform::Sandbox
        }

        fn capabilities(&self) -> crate::core::traits::ProviderCapabilities {
            SandboxPlugin::default().capabilities()
        }

        fn id_scheme(&self, _channel: &Channel) -> Option<crate::core::traits::IdScheme> {
            None
        }

        async fn authenticate(
            &self,
            _channel: &Channel,
        ) -> Result<crate::core::traits::AccountInfo, PublishError> {
            unimplemented!()
        }

        async fn publish(
            &self,
            _post: &crate::core::model::Post,
            _channel: &Channel,
        ) -> Result<crate::core::traits::PublishOutcome, PublishError> {
            unimplemented!()
        }

        async fn fetch_by_id(
            &self,
            id: &str,
            _channel: &Channel,
            fields: FieldSet,
        ) -> Result<PlatformObject, PublishError> {
            match fields {
                FieldSet::Standard => Ok(PlatformObject::with_id(id)),
                FieldSet::Minimal => Err(PublishError::AmbiguousState {
                    platform: "sandbox".to_string(),
                    id: id.to_string(),
                    message: "(#100) Tried accessing nonexisting field".to_string(),
                }),
            }
        }

        async fn delete_by_id(
            &self,
            _id: &str,
            _channel: &Channel,
        ) -> Result<crate::core::traits::DeleteOutcome, PublishError> {
            unimplemented!()
        }

        async fn get_analytics(
            &self,
            _id: &str,
            _channel: &Channel,
        ) -> Result<crate::core::traits::ProviderAnalytics, PublishError> {
            unimplemented!()
        }

        async fn list_recent(
            &self,
            _channel: &Channel,
            _limit: usize,
        ) -> Result<Vec<PlatformObject>, PublishError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_ambiguous_existence_probe_is_unknown() {
        let store = Arc::new(MemoryStore::new());

        let record = reconciler(store)
            .check(&ProbeDenied, "123", &channel())
            .await
            .unwrap();

        assert_eq!(record.state, Existence::Unknown);
        assert_eq!(record.canonical_id.as_deref(), Some("123"));
        assert!(record.detail.unwrap().contains("#100"));
    }

    #[tokio::test]
    async fn test_listed_object_during_propagation_exists() {
        let store = Arc::new(MemoryStore::new());
        let sandbox = SandboxPlugin::with_scheme("PAGE42", "_")
            .with_propagation_delay(std::time::Duration::from_secs(3600));
        let post = crate::core::model::Post::new(
            crate::core::model::PostContent {
                text: "fresh".to_string(),
                ..Default::default()
            },
            [Platform::Sandbox],
        );
        let outcome = sandbox.publish(&post, &channel()).await.unwrap();

        let record = reconciler(store)
            .check(&sandbox, &outcome.canonical_id, &channel())
            .await
            .unwrap();

        assert_eq!(record.state, Existence::Exists);
        assert!(record.detail.is_some());
    }

    #[tokio::test]
    async fn test_network_error_propagates() {
        let store = Arc::new(MemoryStore::new());
        let sandbox = SandboxPlugin::with_scheme("PAGE42", "_");
        sandbox.insert_object("PAGE42_4", "visible");
        sandbox.fail_next(
            SandboxOperation::Fetch,
            PublishError::TransientNetwork {
                platform: "sandbox".to_string(),
                message: "reset".to_string(),
            },
        );

        let error = reconciler(store.clone())
            .check(&sandbox, "PAGE42_4", &channel())
            .await
            .unwrap_err();

        assert_eq!(error.code(), "NETWORK_ERROR");
        assert!(
            store
                .reconciliations(Platform::Sandbox, "PAGE42_4")
                .await
                .unwrap()
                .is_empty()
        );
    }
}
