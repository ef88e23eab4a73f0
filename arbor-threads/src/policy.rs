//! Trust promotion and moderation policies.

use arbor_core::{ArborConfig, ArborResult, AuthorId, TrustError};
use arbor_storage::TreeStore;

use crate::trust::AuthorTrustStore;

/// Result of one promotion check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// The comment has no author.
    Anonymous,
    AlreadyTrusted,
    BelowThreshold { approved_count: u64, threshold: u32 },
    Promoted { approved_count: u64 },
    /// The check failed; the approval still stands.
    Failed { reason: String },
}

impl PromotionOutcome {
    pub fn promoted(&self) -> bool {
        matches!(self, PromotionOutcome::Promoted { .. })
    }
}

/// Grants sticky trust once an author's approved comments reach `threshold`.
///
/// The count and the trust write are not atomic. Two concurrent approvals
/// may both see the threshold reached and both call `set_trusted`, which is
/// idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionPolicy {
    threshold: u32,
}

impl PromotionPolicy {
    /// `threshold` is clamped to at least 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn from_config(config: &ArborConfig) -> Self {
        Self::new(config.promotion.threshold)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Run the check for `author_id`.
    ///
    /// Errors from the count query or trust store are returned as
    /// `TrustError`; callers decide whether they block anything.
    pub fn evaluate(
        &self,
        author_id: AuthorId,
        store: &dyn TreeStore,
        trust: &dyn AuthorTrustStore,
    ) -> ArborResult<PromotionOutcome> {
        let query_failed = |reason: String| TrustError::QueryFailed { author_id, reason };

        if trust
            .get_trust(author_id)
            .map_err(|e| query_failed(e.to_string()))?
        {
            return Ok(PromotionOutcome::AlreadyTrusted);
        }

        let approved_count = store
            .count_approved_comments(author_id)
            .map_err(|e| query_failed(e.to_string()))?;
        if let Err(e) = trust.record_approved_count(author_id, approved_count) {
            tracing::warn!(author_id = %author_id, error = %e, "failed to record approved count");
        }

        if approved_count < u64::from(self.threshold) {
            return Ok(PromotionOutcome::BelowThreshold {
                approved_count,
                threshold: self.threshold,
            });
        }

        trust
            .set_trusted(author_id)
            .map_err(|e| TrustError::WriteFailed {
                author_id,
                reason: e.to_string(),
            })?;
        tracing::info!(
            author_id = %author_id,
            approved_count,
            threshold = self.threshold,
            "author promoted to trusted"
        );
        Ok(PromotionOutcome::Promoted { approved_count })
    }
}

/// Caller-supplied rule deciding whether a new comment is approved on submit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModerationPolicy {
    /// Every comment waits for a moderator.
    #[default]
    Moderated,
    /// Every comment is approved immediately.
    AutoApproveAll,
    /// Comments from trusted authors are approved immediately.
    TrustedAuthors,
}

impl ModerationPolicy {
    /// Whether a comment by `author_id` should be approved right after submit.
    /// A failing trust lookup counts as untrusted.
    pub fn auto_approves(&self, author_id: Option<AuthorId>, trust: &dyn AuthorTrustStore) -> bool {
        match self {
            ModerationPolicy::Moderated => false,
            ModerationPolicy::AutoApproveAll => true,
            ModerationPolicy::TrustedAuthors => match author_id {
                None => false,
                Some(author) => trust.get_trust(author).unwrap_or_else(|e| {
                    tracing::warn!(author_id = %author, error = %e, "trust lookup failed");
                    false
                }),
            },
        }
    }
}
