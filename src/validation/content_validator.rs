//! Content Validator - Validates post content against provider capabilities
//!
//! Every adapter publishes static [`ProviderCapabilities`]; this module
//! checks a [`PostContent`] against them before a task is scheduled, so
//! oversized or unsupported content is rejected without a network call.
//!
//! # Example
//!
//! ```
//! use social_publisher::core::model::{Platform, PostContent};
//! use social_publisher::core::traits::ProviderCapabilities;
//! use social_publisher::core::model::MediaKind;
//! use social_publisher::validation::ContentValidator;
//!
//! let capabilities = ProviderCapabilities {
//!     max_content_length: 280,
//!     max_attachments: 4,
//!     media_kinds: vec![MediaKind::Image],
//!     supports_delete: true,
//! };
//! let content = PostContent {
//!     text: "Launch day!".to_string(),
//!     ..Default::default()
//! };
//!
//! let result = ContentValidator::new().validate(Platform::Sandbox, &content, &capabilities);
//! assert!(result.valid);
//! ```

use crate::core::error::PublishError;
use crate::core::model::{Platform, PostContent};
use crate::core::traits::{ProviderCapabilities, ValidationError, ValidationResult, ValidationWarning};

/// Share of the length limit above which a warning is raised
const LENGTH_WARNING_RATIO: f64 = 0.9;

/// Validator for post content
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentValidator;

impl ContentValidator {
    /// Create a new ContentValidator
    pub fn new() -> Self {
        Self
    }

    /// Validate content for one platform
    ///
    /// Text length is counted in characters, not bytes.
    pub fn validate(
        &self,
        platform: Platform,
        content: &PostContent,
        capabilities: &ProviderCapabilities,
    ) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Text
        let length = content.text.chars().count();
        if content.text.trim().is_empty() && content.media.is_empty() && content.link.is_none() {
            errors.push(error("text", "Post has no text, link or media"));
        }
        if length > capabilities.max_content_length {
            errors.push(error(
                "text",
                format!(
                    "Text is {} characters, {} allows at most {}",
                    length, platform, capabilities.max_content_length
                ),
            ));
        } else if length as f64 > capabilities.max_content_length as f64 * LENGTH_WARNING_RATIO {
            warnings.push(ValidationWarning {
                field: "text".to_string(),
                message: format!(
                    "Text uses {} of {} characters",
                    length, capabilities.max_content_length
                ),
            });
        }

        // Link
        if let Some(link) = &content.link
            && !(link.starts_with("https://") || link.starts_with("http://"))
        {
            errors.push(error("link", format!("Link must be an http(s) URL: {}", link)));
        }

        // Media
        if content.media.len() > capabilities.max_attachments {
            errors.push(error(
                "media",
                format!(
                    "{} attachments given, {} allows at most {}",
                    content.media.len(),
                    platform,
                    capabilities.max_attachments
                ),
            ));
        }

        for (index, attachment) in content.media.iter().enumerate() {
            let field = format!("media[{}]", index);
            if attachment.url.trim().is_empty() {
                errors.push(error(&field, "Attachment URL is empty"));
            }
            if !capabilities.supports_media(attachment.kind) {
                errors.push(error(
                    &field,
                    format!(
                        "{} does not accept {} attachments",
                        platform,
                        attachment.kind.as_str()
                    ),
                ));
            }
            if attachment.alt_text.is_none() {
                warnings.push(ValidationWarning {
                    field,
                    message: "Missing recommended field: altText".to_string(),
                });
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            platform,
            errors,
            warnings,
        }
    }

    /// Validate and turn a failed result into a [`PublishError::Validation`]
    pub fn ensure_valid(
        &self,
        platform: Platform,
        content: &PostContent,
        capabilities: &ProviderCapabilities,
    ) -> Result<ValidationResult, PublishError> {
        let result = self.validate(platform, content, capabilities);
        if result.valid {
            return Ok(result);
        }

        let message = result
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(PublishError::Validation {
            platform: platform.to_string(),
            message,
        })
    }
}

fn error(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}
