//! Arbor Threads - Comment Moderation and Author Trust
//!
//! Discussion threads are trees of comment nodes (tree id
//! `comments:<document>`). Each comment is pending or approved; the first
//! approval of a comment runs the promotion policy, which marks its author
//! trusted once their approved comments reach the configured threshold.
//! Trust is sticky and never revoked here.

mod policy;
mod store;
mod trust;

pub use policy::{ModerationPolicy, PromotionOutcome, PromotionPolicy};
pub use store::{ApprovalOutcome, CommentState, NewComment, ThreadedApprovalStore};
pub use trust::{AuthorTrustState, AuthorTrustStore, InMemoryTrustStore};
