//! Error handling for social publishing
//!
//! This module provides the classified error taxonomy used across the
//! provider adapters, the identifier resolver and the scheduler, with
//! recovery guidance using the thiserror crate for ergonomic error handling.

use crate::core::model::ResolutionStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Coarse classification the scheduler pattern-matches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    TransientNetwork,
    RateLimit,
    NotFound,
    AmbiguousState,
    PartialPlatformFailure,
    Rejected,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AmbiguousState => "ambiguous_state",
            ErrorKind::PartialPlatformFailure => "partial_platform_failure",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for social publishing operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    // Credential errors
    #[error("[{platform}] authentication failed: {message}")]
    Authentication { platform: String, message: String },

    #[error("[{platform}] channel unavailable: {reason}")]
    ChannelUnavailable { platform: String, reason: String },

    // Transport errors
    #[error("[{platform}] network error: {message}")]
    TransientNetwork { platform: String, message: String },

    #[error("[{platform}] request timed out after {seconds}s")]
    Timeout { platform: String, seconds: u64 },

    #[error("[{platform}] rate limited: {message}")]
    RateLimited {
        platform: String,
        message: String,
        retry_after: Option<Duration>,
    },

    // Lookup errors
    #[error("[{platform}] object {id} not found (attempted: {})", format_attempts(.attempted))]
    NotFound {
        platform: String,
        id: String,
        attempted: Vec<ResolutionStrategy>,
    },

    #[error("[{platform}] cannot tell whether {id} was deleted or is inaccessible: {message}")]
    AmbiguousState {
        platform: String,
        id: String,
        message: String,
    },

    #[error("post {post_id} published partially; failed platforms: {}", .failed.join(", "))]
    PartialPlatformFailure { post_id: String, failed: Vec<String> },

    // Request errors
    #[error("[{platform}] request rejected: {message}")]
    Rejected { platform: String, message: String },

    #[error("[{platform}] unexpected response: {message}")]
    InvalidResponse { platform: String, message: String },

    #[error("[{platform}] content validation failed: {message}")]
    Validation { platform: String, message: String },

    #[error("[{platform}] operation not supported: {operation}")]
    UnsupportedOperation { platform: String, operation: String },

    // Scheduling errors
    #[error("task {task_id} could not be claimed (status: {status})")]
    TaskConflict { task_id: String, status: String },

    #[error("task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: String,
        to: String,
    },

    // Infrastructure errors
    #[error("store error: {message}")]
    Store { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

fn format_attempts(attempted: &[ResolutionStrategy]) -> String {
    if attempted.is_empty() {
        return "direct lookup".to_string();
    }
    attempted
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl PublishError {
    /// Get the platform name associated with this error, if any
    pub fn platform(&self) -> Option<&str> {
        match self {
            Self::Authentication { platform, .. }
            | Self::ChannelUnavailable { platform, .. }
            | Self::TransientNetwork { platform, .. }
            | Self::Timeout { platform, .. }
            | Self::RateLimited { platform, .. }
            | Self::NotFound { platform, .. }
            | Self::AmbiguousState { platform, .. }
            | Self::Rejected { platform, .. }
            | Self::InvalidResponse { platform, .. }
            | Self::Validation { platform, .. }
            | Self::UnsupportedOperation { platform, .. } => Some(platform),
            Self::PartialPlatformFailure { .. }
            | Self::TaskConflict { .. }
            | Self::InvalidTransition { .. }
            | Self::Store { .. }
            | Self::Config { .. } => None,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } | Self::ChannelUnavailable { .. } => ErrorKind::Auth,
            Self::TransientNetwork { .. } | Self::Timeout { .. } => ErrorKind::TransientNetwork,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AmbiguousState { .. } => ErrorKind::AmbiguousState,
            Self::PartialPlatformFailure { .. } => ErrorKind::PartialPlatformFailure,
            Self::Rejected { .. }
            | Self::InvalidResponse { .. }
            | Self::Validation { .. }
            | Self::UnsupportedOperation { .. } => ErrorKind::Rejected,
            Self::TaskConflict { .. }
            | Self::InvalidTransition { .. }
            | Self::Store { .. }
            | Self::Config { .. } => ErrorKind::Internal,
        }
    }

    /// Check if the scheduler should requeue after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientNetwork | ErrorKind::RateLimit
        )
    }

    /// Platform-advertised delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::Authentication { .. } => vec![
                "Reconnect the channel to issue a fresh access token",
                "Check that the token has publish permissions for the account",
            ],
            Self::ChannelUnavailable { .. } => vec![
                "Reconnect the channel",
                "Check the channel's token expiry",
            ],
            Self::TransientNetwork { .. } | Self::Timeout { .. } => vec![
                "The task is retried automatically with backoff",
                "Check the platform status page if failures persist",
            ],
            Self::RateLimited { .. } => vec![
                "The task is retried after the advertised delay",
                "Lower requestsPerMinute for this platform",
            ],
            Self::NotFound { .. } => vec![
                "Verify the identifier belongs to the connected account",
                "The object may have been deleted on the platform",
            ],
            Self::AmbiguousState { .. } => vec![
                "Check the object manually on the platform",
                "Verify the token still has read access to the account",
            ],
            Self::PartialPlatformFailure { .. } => {
                vec!["Inspect each failed platform task and retry it individually"]
            }
            Self::Rejected { .. } | Self::InvalidResponse { .. } => vec![
                "Inspect the platform message",
                "Adjust the content and schedule it again",
            ],
            Self::Validation { .. } => {
                vec!["Shorten the text or reduce attachments to fit the platform limits"]
            }
            Self::UnsupportedOperation { .. } => {
                vec!["Perform this operation directly on the platform"]
            }
            Self::TaskConflict { .. } | Self::InvalidTransition { .. } => {
                vec!["Another scheduler instance owns this task; no action needed"]
            }
            Self::Store { .. } => vec!["Check the store path and its permissions"],
            Self::Config { .. } => vec!["Run `social-publisher check` to validate the configuration"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "AUTHENTICATION_FAILED",
            Self::ChannelUnavailable { .. } => "CHANNEL_UNAVAILABLE",
            Self::TransientNetwork { .. } => "NETWORK_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AmbiguousState { .. } => "AMBIGUOUS_STATE",
            Self::PartialPlatformFailure { .. } => "PARTIAL_PLATFORM_FAILURE",
            Self::Rejected { .. } => "REJECTED",
            Self::InvalidResponse { .. } => "INVALID_RESPONSE",
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            Self::TaskConflict { .. } => "TASK_CONFLICT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Store { .. } => "STORE_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }
}
