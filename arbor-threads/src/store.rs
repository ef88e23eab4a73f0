//! Comment threads with a pending/approved state machine.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arbor_core::{
    order_key_from_timestamp, ArborResult, AuthorId, NewNode, Node, NodeId, NodeKind, TreeError,
    TreeId,
};
use arbor_storage::TreeStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::policy::{ModerationPolicy, PromotionOutcome, PromotionPolicy};
use crate::trust::AuthorTrustStore;

/// Moderation state of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentState {
    Pending,
    Approved,
}

impl CommentState {
    pub fn from_approved(approved: bool) -> Self {
        if approved {
            CommentState::Approved
        } else {
            CommentState::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommentState::Pending => "pending",
            CommentState::Approved => "approved",
        }
    }
}

impl fmt::Display for CommentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an `approve` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOutcome {
    pub node: Node,
    /// True only when this call moved the comment from pending to approved.
    pub transitioned: bool,
    /// Set when the promotion check ran.
    pub promotion: Option<PromotionOutcome>,
}

/// A comment being submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub thread_id: TreeId,
    /// Comment being replied to, if any.
    pub parent_id: Option<NodeId>,
    pub author_id: Option<AuthorId>,
    pub payload: serde_json::Value,
}

impl NewComment {
    pub fn new(thread_id: TreeId, author_id: Option<AuthorId>) -> Self {
        Self {
            thread_id,
            parent_id: None,
            author_id,
            payload: serde_json::Value::Null,
        }
    }

    pub fn reply_to(mut self, parent_id: NodeId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Threaded comment store layered on a [`TreeStore`].
///
/// Comments are ordered by submission time. Promotion runs only on the
/// pending to approved transition and never fails the approval.
pub struct ThreadedApprovalStore {
    store: Arc<dyn TreeStore>,
    trust: Arc<dyn AuthorTrustStore>,
    policy: PromotionPolicy,
}

impl ThreadedApprovalStore {
    pub fn new(
        store: Arc<dyn TreeStore>,
        trust: Arc<dyn AuthorTrustStore>,
        policy: PromotionPolicy,
    ) -> Self {
        Self {
            store,
            trust,
            policy,
        }
    }

    pub fn policy(&self) -> PromotionPolicy {
        self.policy
    }

    /// Create a pending comment.
    pub fn submit(&self, comment: NewComment) -> ArborResult<Node> {
        let new = NewNode {
            tree_id: comment.thread_id,
            parent_id: comment.parent_id,
            order_key: order_key_from_timestamp(Utc::now()),
            kind: NodeKind::pending_comment(comment.author_id),
            payload: comment.payload,
        };
        let node = self.store.create_node(new)?;
        tracing::debug!(comment_id = %node.id, thread_id = %node.tree_id, "comment submitted");
        Ok(node)
    }

    /// `submit`, then `approve` if `moderation` says so.
    pub fn submit_with_policy(
        &self,
        comment: NewComment,
        moderation: ModerationPolicy,
    ) -> ArborResult<ApprovalOutcome> {
        let author_id = comment.author_id;
        let node = self.submit(comment)?;
        if moderation.auto_approves(author_id, self.trust.as_ref()) {
            return self.approve(node.id);
        }
        Ok(ApprovalOutcome {
            node,
            transitioned: false,
            promotion: None,
        })
    }

    /// Approve a comment. Idempotent; the promotion check runs only when
    /// the comment was pending.
    pub fn approve(&self, id: NodeId) -> ArborResult<ApprovalOutcome> {
        let change = self.store.set_comment_approval(id, true)?;
        if !change.became_approved() {
            return Ok(ApprovalOutcome {
                node: change.node,
                transitioned: false,
                promotion: None,
            });
        }

        let promotion = change.node.kind.author_id().map(|author_id| {
            self.policy
                .evaluate(author_id, self.store.as_ref(), self.trust.as_ref())
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        comment_id = %id,
                        author_id = %author_id,
                        error = %e,
                        "promotion check failed, approval kept"
                    );
                    PromotionOutcome::Failed {
                        reason: e.to_string(),
                    }
                })
        });

        Ok(ApprovalOutcome {
            node: change.node,
            transitioned: true,
            promotion: Some(promotion.unwrap_or(PromotionOutcome::Anonymous)),
        })
    }

    /// Moderator rejects a comment: it returns to (or stays) pending.
    pub fn reject(&self, id: NodeId) -> ArborResult<Node> {
        self.set_pending(id, "rejected")
    }

    /// Withdraw a previous approval. Trust already granted is kept.
    pub fn unapprove(&self, id: NodeId) -> ArborResult<Node> {
        self.set_pending(id, "unapproved")
    }

    fn set_pending(&self, id: NodeId, action: &'static str) -> ArborResult<Node> {
        let change = self.store.set_comment_approval(id, false)?;
        if change.previously_approved {
            tracing::info!(comment_id = %id, action, "comment returned to pending");
        }
        Ok(change.node)
    }

    pub fn state(&self, id: NodeId) -> ArborResult<CommentState> {
        let node = self
            .store
            .get_node(id)?
            .ok_or(TreeError::NodeNotFound { id })?;
        node.kind
            .approved()
            .map(CommentState::from_approved)
            .ok_or_else(|| TreeError::NotAComment { id }.into())
    }

    /// Every comment of a thread, pending included, oldest first per level.
    pub fn list_thread(&self, thread_id: &TreeId) -> ArborResult<Vec<Node>> {
        self.store.list_tree(thread_id)
    }

    /// Approved comments of a thread in rendering order.
    pub fn approved_in_thread(&self, thread_id: &TreeId) -> ArborResult<Vec<Node>> {
        let mut hidden: HashSet<NodeId> = HashSet::new();
        let mut visible = Vec::new();
        for node in self.store.list_tree(thread_id)? {
            let under_hidden = node.parent_id.is_some_and(|p| hidden.contains(&p));
            if under_hidden || node.kind.approved() == Some(false) {
                hidden.insert(node.id);
            } else {
                visible.push(node);
            }
        }
        Ok(visible)
    }
}

impl fmt::Debug for ThreadedApprovalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedApprovalStore")
            .field("policy", &self.policy)
            .finish()
    }
}
