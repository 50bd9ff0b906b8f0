//! Secure token store with memory-safe handling and masking capabilities
//!
//! This module supplies the scheduler and resolver with the active
//! [`Channel`] for each platform. Access tokens are held as
//! `secrecy::SecretString` so they never end up in logs or debug output.

use crate::core::error::PublishError;
use crate::core::model::{Channel, ConnectionStatus, Platform};
use regex::Regex;
use secrecy::ExposeSecret;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::sync::RwLock;
use tracing::{debug, info};

/// Environment variables read by [`SecureTokenStore::from_env`]
///
/// `(platform, token variable, account id variable)`
const CHANNEL_ENV_VARS: &[(Platform, &str, &str)] = &[
    (Platform::Facebook, "FACEBOOK_PAGE_TOKEN", "FACEBOOK_PAGE_ID"),
    (
        Platform::LinkedIn,
        "LINKEDIN_ACCESS_TOKEN",
        "LINKEDIN_ORGANIZATION_ID",
    ),
];

/// Source of channels for the orchestration core
///
/// Token issuance and refresh happen outside this crate; implementations
/// only hand out what they currently hold.
pub trait TokenStore: Send + Sync {
    /// Channel by its id
    fn channel(&self, channel_id: &str) -> Option<Channel>;

    /// The channel used for new publishes on a platform
    fn active_channel(&self, platform: Platform) -> Result<Channel, PublishError>;

    /// All known channels
    fn channels(&self) -> Vec<Channel>;

    /// Text safe to store or send, with held credentials masked
    fn redact(&self, text: &str) -> String {
        text.to_string()
    }
}

/// In-process token store
///
/// # Examples
///
/// ```
/// use social_publisher::core::model::{Channel, Platform};
/// use social_publisher::security::{SecureTokenStore, TokenStore};
///
/// let store = SecureTokenStore::new();
/// store.insert(Channel::new("fb-main", Platform::Facebook, "PAGE42", "page-token-123456"));
///
/// let channel = store.active_channel(Platform::Facebook).unwrap();
/// assert_eq!(channel.account_id, "PAGE42");
/// ```
#[derive(Default)]
pub struct SecureTokenStore {
    channels: RwLock<BTreeMap<String, Channel>>,
}

impl SecureTokenStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from the process environment
    ///
    /// See [`SecureTokenStore::from_env_map`].
    pub fn from_env() -> Self {
        Self::from_env_map(&env::vars().collect())
    }

    /// Creates a store from environment-style variables
    ///
    /// A channel is created for every platform whose token and account id
    /// variables are both set and non-empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use social_publisher::core::model::Platform;
    /// use social_publisher::security::{SecureTokenStore, TokenStore};
    /// use std::collections::HashMap;
    ///
    /// let vars = HashMap::from([
    ///     ("LINKEDIN_ACCESS_TOKEN".to_string(), "li-token-abcdef".to_string()),
    ///     ("LINKEDIN_ORGANIZATION_ID".to_string(), "2414183".to_string()),
    /// ]);
    /// let store = SecureTokenStore::from_env_map(&vars);
    /// assert!(store.active_channel(Platform::LinkedIn).is_ok());
    /// assert!(store.active_channel(Platform::Facebook).is_err());
    /// ```
    pub fn from_env_map(vars: &HashMap<String, String>) -> Self {
        let store = Self::new();

        for (platform, token_var, account_var) in CHANNEL_ENV_VARS {
            let token = vars.get(*token_var).filter(|value| !value.is_empty());
            let account = vars.get(*account_var).filter(|value| !value.is_empty());

            if let (Some(token), Some(account)) = (token, account) {
                debug!(%platform, token = %store.mask_token(token), "channel loaded from environment");
                store.insert(Channel::new(
                    format!("{}-{}", platform, account),
                    *platform,
                    account.clone(),
                    token.clone(),
                ));
            }
        }

        store
    }

    /// Adds or replaces a channel
    pub fn insert(&self, channel: Channel) {
        info!(channel_id = %channel.id, platform = %channel.provider, "channel registered");
        self.write().insert(channel.id.clone(), channel);
    }

    /// Checks if any channel is held for the platform
    pub fn has_channel(&self, platform: Platform) -> bool {
        self.read().values().any(|channel| channel.provider == platform)
    }

    /// Masks a token for safe logging
    ///
    /// Shows only the first 3 and last 3 characters for identification purposes.
    /// Tokens shorter than 10 characters are fully masked as "****".
    ///
    /// # Examples
    ///
    /// ```
    /// use social_publisher::security::SecureTokenStore;
    ///
    /// let store = SecureTokenStore::new();
    /// assert_eq!(store.mask_token("abcdef123456"), "abc...456");
    /// assert_eq!(store.mask_token("short"), "****");
    /// ```
    pub fn mask_token(&self, token: &str) -> String {
        mask_token(token)
    }

    /// Masks every held access token in a string
    ///
    /// Provider error bodies occasionally echo the request; messages are
    /// passed through this before being stored or sent anywhere.
    pub fn mask_tokens_in_string(&self, text: &str) -> String {
        let mut masked = text.to_string();

        for channel in self.read().values() {
            let token = channel.oauth_tokens.access_token.expose_secret();
            if token.is_empty() {
                continue;
            }
            if let Ok(regex) = Regex::new(&regex::escape(token)) {
                let masked_token = mask_token(token);
                masked = regex
                    .replace_all(&masked, masked_token.as_str())
                    .to_string();
            }
        }

        masked
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Channel>> {
        self.channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Channel>> {
        self.channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for SecureTokenStore {
    fn channel(&self, channel_id: &str) -> Option<Channel> {
        self.read().get(channel_id).cloned()
    }

    /// First connected channel of the platform, in channel id order
    fn active_channel(&self, platform: Platform) -> Result<Channel, PublishError> {
        let channels = self.read();
        let candidates: Vec<&Channel> = channels
            .values()
            .filter(|channel| channel.provider == platform)
            .collect();

        // An unusable channel is still handed back so the caller reports its exact state
        candidates
            .iter()
            .find(|channel| channel.connection_status == ConnectionStatus::Connected)
            .or_else(|| candidates.first())
            .map(|channel| (*channel).clone())
            .ok_or_else(|| PublishError::ChannelUnavailable {
                platform: platform.to_string(),
                reason: "no channel configured".to_string(),
            })
    }

    fn channels(&self) -> Vec<Channel> {
        self.read().values().cloned().collect()
    }

    fn redact(&self, text: &str) -> String {
        self.mask_tokens_in_string(text)
    }
}

/// Masks a token, see [`SecureTokenStore::mask_token`]
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }

    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = SecureTokenStore::new();
        assert!(store.channels().is_empty());
        assert!(!store.has_channel(Platform::Facebook));
    }

    #[test]
    fn test_from_env_map_loads_both_platforms() {
        let store = SecureTokenStore::from_env_map(&vars(&[
            ("FACEBOOK_PAGE_TOKEN", "fb-page-token-12345"),
            ("FACEBOOK_PAGE_ID", "PAGE42"),
            ("LINKEDIN_ACCESS_TOKEN", "li-token-67890"),
            ("LINKEDIN_ORGANIZATION_ID", "2414183"),
        ]));

        let facebook = store.active_channel(Platform::Facebook).unwrap();
        assert_eq!(facebook.id, "facebook-PAGE42");
        assert_eq!(facebook.account_id, "PAGE42");

        let linkedin = store.active_channel(Platform::LinkedIn).unwrap();
        assert_eq!(linkedin.account_id, "2414183");
    }

    #[test]
    fn test_from_env_map_requires_token_and_account() {
        let store = SecureTokenStore::from_env_map(&vars(&[
            ("FACEBOOK_PAGE_TOKEN", "fb-page-token-12345"),
            ("LINKEDIN_ACCESS_TOKEN", ""),
            ("LINKEDIN_ORGANIZATION_ID", "2414183"),
        ]));

        assert!(store.channels().is_empty());
    }

    #[test]
    fn test_active_channel_missing_platform() {
        let store = SecureTokenStore::new();
        let error = store.active_channel(Platform::LinkedIn).unwrap_err();
        assert_eq!(error.code(), "CHANNEL_UNAVAILABLE");
    }

    #[test]
    fn test_active_channel_prefers_connected() {
        let store = SecureTokenStore::new();
        let mut disconnected = Channel::new("a-old", Platform::Facebook, "PAGE1", "token-one-123456");
        disconnected.connection_status = ConnectionStatus::Disconnected;
        store.insert(disconnected);
        store.insert(Channel::new("b-new", Platform::Facebook, "PAGE2", "token-two-123456"));

        let channel = store.active_channel(Platform::Facebook).unwrap();
        assert_eq!(channel.id, "b-new");
    }

    #[test]
    fn test_active_channel_returns_expired_channel_for_reporting() {
        let store = SecureTokenStore::new();
        let expired = Channel::new("fb", Platform::Facebook, "PAGE1", "token-one-123456")
            .with_expiry(Utc::now() - Duration::hours(1));
        store.insert(expired);

        let channel = store.active_channel(Platform::Facebook).unwrap();
        let error = channel.bearer(Utc::now()).unwrap_err();
        assert_eq!(error.code(), "CHANNEL_UNAVAILABLE");
    }

    #[test]
    fn test_channel_lookup_by_id() {
        let store = SecureTokenStore::new();
        store.insert(Channel::new("li", Platform::LinkedIn, "2414183", "token-li-123456"));

        assert!(store.channel("li").is_some());
        assert!(store.channel("missing").is_none());
    }

    #[test]
    fn test_mask_token_with_short_token() {
        let store = SecureTokenStore::new();
        assert_eq!(store.mask_token("short"), "****");
        assert_eq!(store.mask_token(""), "****");
    }

    #[test]
    fn test_mask_token_with_long_token() {
        let store = SecureTokenStore::new();
        assert_eq!(store.mask_token("abcdef123456"), "abc...456");
        assert_eq!(store.mask_token("very-long-token-string"), "ver...ing");
    }

    #[test]
    fn test_mask_tokens_in_string_no_tokens() {
        let store = SecureTokenStore::new();
        let input = "This is a safe string with no tokens";
        assert_eq!(store.mask_tokens_in_string(input), input);
    }

    #[test]
    fn test_mask_tokens_in_string_with_token() {
        let store = SecureTokenStore::new();
        store.insert(Channel::new(
            "fb",
            Platform::Facebook,
            "PAGE42",
            "secret.page+token-12345",
        ));

        let output = store.mask_tokens_in_string("GET /me?access_token=secret.page+token-12345 failed");
        assert!(output.contains("sec...345"));
        assert!(!output.contains("secret.page+token-12345"));
    }
}
