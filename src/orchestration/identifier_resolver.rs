//! Identifier Resolver - finds the platform's canonical id for an input id
//!
//! Platforms expose one object under several textual ids (`123` and
//! `PAGE_123` on Facebook, `123` and `urn:li:share:123` on LinkedIn), and
//! freshly created objects may be listed before they are fetchable. The
//! resolver tries, in order and stopping at the first hit:
//!
//! 1. direct lookup of the input
//! 2. lookup of `parent + separator + input` (input not compound)
//! 3. lookup of the input without our parent prefix (input prefixed)
//! 4. one page of the account's recent objects, scanned for a match
//!
//! At most three point lookups and one listing call per resolution.

use crate::core::config::ResolverConfig;
use crate::core::error::PublishError;
use crate::core::model::{Channel, ResolutionStrategy};
use crate::core::traits::{FieldSet, IdScheme, PlatformObject, ProviderAdapter};
use serde::Serialize;
use tracing::{debug, info};

/// Successful resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub canonical_id: String,
    /// Strategy that matched
    pub strategy: ResolutionStrategy,
    /// Strategies tried, including the matching one
    pub attempted: Vec<ResolutionStrategy>,
    pub object: PlatformObject,
}

/// Ordered-strategy identifier resolver
#[derive(Debug, Clone)]
pub struct IdentifierResolver {
    page_size: usize,
}

impl Default for IdentifierResolver {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

/// Bookkeeping shared by the strategies of one resolution
struct Attempts {
    attempted: Vec<ResolutionStrategy>,
    ambiguous: Option<String>,
}

impl IdentifierResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            page_size: config.page_size(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Resolve `input` to the id the platform uses for it
    ///
    /// Not-found and ambiguous answers move on to the next strategy;
    /// credential, rate limit and network errors abort the resolution.
    /// When nothing matches the error is `AmbiguousState` if any strategy
    /// got an ambiguous answer, `NotFound` listing the attempts otherwise.
    pub async fn resolve(
        &self,
        adapter: &dyn ProviderAdapter,
        input: &str,
        channel: &Channel,
    ) -> Result<Resolution, PublishError> {
        let platform = adapter.platform();
        let input = input.trim();
        if input.is_empty() {
            return Err(PublishError::Validation {
                platform: platform.to_string(),
                message: "identifier is empty".to_string(),
            });
        }

        let scheme = adapter.id_scheme(channel);
        let compound = scheme.as_ref().and_then(|s| s.compound(input));
        let stripped = scheme.as_ref().and_then(|s| s.strip(input));

        let mut attempts = Attempts {
            attempted: Vec::with_capacity(4),
            ambiguous: None,
        };

        let lookups = [
            (ResolutionStrategy::Direct, Some(input.to_string())),
            (ResolutionStrategy::CompoundPrefixed, compound.clone()),
            (ResolutionStrategy::Stripped, stripped.clone()),
        ];

        for (strategy, candidate) in lookups {
            let Some(candidate) = candidate else {
                continue;
            };
            if let Some(object) = self
                .lookup(adapter, &candidate, channel, strategy, &mut attempts)
                .await?
            {
                let canonical_id = if object.id.is_empty() {
                    candidate
                } else {
                    object.id.clone()
                };
                return Ok(self.finish(input, canonical_id, strategy, attempts, object));
            }
        }

        let variants: Vec<&str> = [Some(input), compound.as_deref(), stripped.as_deref()]
            .into_iter()
            .flatten()
            .filter(|v| !v.is_empty())
            .collect();
        if let Some(object) = self
            .scan_listing(adapter, channel, &variants, scheme.as_ref(), &mut attempts)
            .await?
        {
            let canonical_id = object.id.clone();
            return Ok(self.finish(
                input,
                canonical_id,
                ResolutionStrategy::ListingFallback,
                attempts,
                object,
            ));
        }

        match attempts.ambiguous {
            Some(message) => Err(PublishError::AmbiguousState {
                platform: platform.to_string(),
                id: input.to_string(),
                message,
            }),
            None => Err(PublishError::NotFound {
                platform: platform.to_string(),
                id: input.to_string(),
                attempted: attempts.attempted,
            }),
        }
    }

    async fn lookup(
        &self,
        adapter: &dyn ProviderAdapter,
        id: &str,
        channel: &Channel,
        strategy: ResolutionStrategy,
        attempts: &mut Attempts,
    ) -> Result<Option<PlatformObject>, PublishError> {
        attempts.attempted.push(strategy);
        debug!(platform = %adapter.platform(), strategy = strategy.as_str(), id, "resolver lookup");

        match adapter.fetch_by_id(id, channel, FieldSet::Standard).await {
            Ok(object) => Ok(Some(object)),
            Err(PublishError::NotFound { .. }) => Ok(None),
            Err(PublishError::AmbiguousState { message, .. }) => {
                attempts.ambiguous = Some(message);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// One listing page; exact id matches win over partial ones
    async fn scan_listing(
        &self,
        adapter: &dyn ProviderAdapter,
        channel: &Channel,
        variants: &[&str],
        scheme: Option<&IdScheme>,
        attempts: &mut Attempts,
    ) -> Result<Option<PlatformObject>, PublishError> {
        attempts.attempted.push(ResolutionStrategy::ListingFallback);
        debug!(platform = %adapter.platform(), page_size = self.page_size, "resolver listing fallback");

        let listing = match adapter.list_recent(channel, self.page_size).await {
            Ok(listing) => listing,
            Err(PublishError::NotFound { .. }) => return Ok(None),
            Err(PublishError::AmbiguousState { message, .. }) => {
                attempts.ambiguous = Some(message);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let page = &listing[..listing.len().min(self.page_size)];

        let exact = page.iter().find(|object| {
            object_ids(object, scheme)
                .iter()
                .any(|id| variants.contains(&id.as_str()))
        });
        if let Some(object) = exact {
            return Ok(Some(object.clone()));
        }

        let partial = page.iter().find(|object| {
            !object.id.is_empty()
                && variants
                    .iter()
                    .any(|v| object.id.contains(v) || v.contains(object.id.as_str()))
        });
        Ok(partial.cloned())
    }

    fn finish(
        &self,
        input: &str,
        canonical_id: String,
        strategy: ResolutionStrategy,
        attempts: Attempts,
        object: PlatformObject,
    ) -> Resolution {
        info!(
            input,
            canonical_id = %canonical_id,
            strategy = strategy.as_str(),
            attempts = attempts.attempted.len(),
            "identifier resolved"
        );
        Resolution {
            canonical_id,
            strategy,
            attempted: attempts.attempted,
            object,
        }
    }
}

/// A listed object's id plus its prefix variant
fn object_ids(object: &PlatformObject, scheme: Option<&IdScheme>) -> Vec<String> {
    let mut ids = vec![object.id.clone()];
    if let Some(scheme) = scheme
        && let Some(stripped) = scheme.strip(&object.id)
    {
        ids.push(stripped);
    }
    ids
}
