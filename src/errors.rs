//! Error types shared by the ingestion and bank modules.

/// Failures while obtaining raw candidate problems from a content source.
///
/// All of these are recoverable at the batch level: the batch yields zero
/// records and the run moves on to the next topic/difficulty pair.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The provider call itself failed (network, HTTP status, auth, empty reply).
    #[error("content source '{provider}' unavailable: {reason}")]
    SourceUnavailable { provider: String, reason: String },

    /// The reply did not parse as a JSON array (or object) after fence stripping.
    #[error("malformed content: {reason}\n  preview: {preview}")]
    MalformedContent { reason: String, preview: String },

    /// A credential the provider needs is not set. Raised before any network call.
    #[error("missing credential for provider '{provider}': set {}", .variables.join(" and "))]
    MissingCredential {
        provider: String,
        variables: Vec<String>,
    },

    #[error("unsupported provider '{requested}' (supported: {supported})")]
    UnknownProvider { requested: String, supported: String },
}

/// Structural problems with the bank itself that stop a merge or split.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("record {position} has id {id:?}, which has no numeric suffix to continue from")]
    UnparsableId { position: usize, id: String },

    #[error("id {last:?} is the largest sequence number; no further ids can be assigned")]
    IdExhausted { last: String },

    #[error("topics {first:?} and {second:?} both map to shard file '{file}'")]
    ShardNameCollision {
        first: String,
        second: String,
        file: String,
    },
}

/// Cuts raw content down to a short preview for error messages.
pub fn content_preview(content: &str) -> String {
    const PREVIEW_CHARS: usize = 500;

    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

use thiserror::Error;
