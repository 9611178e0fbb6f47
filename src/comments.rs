//! Comment threads.
//!
//! A post's comments form a forest: top-level comments are roots and each
//! comment lists its direct replies. Threads are walked depth-first with an
//! explicit stack, so depth is bounded by data rather than call depth, and a
//! visited set keeps a malformed reply list from looping.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{Comment, CommentId, PostId, Principal};

/// Replies may be nested this deep; a comment at this depth offers no reply.
pub const MAX_REPLY_DEPTH: usize = 3;

/// Pre-order depth-first walk over comment ids.
///
/// The caller resolves each id yielded by [`next`](Self::next) and hands its
/// replies back through [`descend`](Self::descend). Ids that cannot be
/// resolved are simply not descended into.
#[derive(Debug)]
pub struct ThreadWalk {
    stack: Vec<(CommentId, usize)>,
    visited: HashSet<CommentId>,
}

impl ThreadWalk {
    pub fn new(roots: &[CommentId]) -> Self {
        let stack = roots.iter().rev().map(|id| (*id, 0)).collect();
        Self {
            stack,
            visited: HashSet::new(),
        }
    }

    /// Next unvisited id with its depth.
    pub fn next(&mut self) -> Option<(CommentId, usize)> {
        while let Some((id, depth)) = self.stack.pop() {
            if self.visited.insert(id) {
                return Some((id, depth));
            }
            tracing::debug!("Comment {} reached twice; skipping", id);
        }
        None
    }

    /// Queue the replies of a comment found at `depth`.
    pub fn descend(&mut self, replies: &[CommentId], depth: usize) {
        for id in replies.iter().rev() {
            if !self.visited.contains(id) {
                self.stack.push((*id, depth + 1));
            }
        }
    }
}

/// One comment as shown in a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub id: CommentId,
    pub post_id: PostId,
    pub depth: usize,
    pub author: Principal,
    pub author_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub reply_ids: Vec<CommentId>,
    pub can_reply: bool,
    pub can_delete: bool,
}

impl CommentView {
    pub fn new(comment: Comment, depth: usize, author_name: String, is_admin: bool) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            depth,
            author: comment.author,
            author_name,
            content: comment.content,
            timestamp: comment.timestamp,
            reply_ids: comment.replies,
            can_reply: depth < MAX_REPLY_DEPTH,
            can_delete: is_admin,
        }
    }

    pub fn reply_target(&self) -> Option<ReplyTarget> {
        self.can_reply.then(|| ReplyTarget {
            post_id: self.post_id,
            comment_id: self.id,
            depth: self.depth,
        })
    }
}

/// A comment that can be replied to. Only obtainable from a resolved thread,
/// so the depth is the one the comment was actually shown at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTarget {
    post_id: PostId,
    comment_id: CommentId,
    depth: usize,
}

impl ReplyTarget {
    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn comment_id(&self) -> CommentId {
        self.comment_id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// All comments of a post, loaded up front.
#[derive(Debug, Clone, Default)]
pub struct CommentForest {
    comments: HashMap<CommentId, Comment>,
    roots: Vec<CommentId>,
}

impl CommentForest {
    /// Roots are the top-level comments in id order.
    pub fn new(comments: Vec<Comment>) -> Self {
        let mut roots: Vec<CommentId> = comments
            .iter()
            .filter(|c| c.is_top_level())
            .map(|c| c.id)
            .collect();
        roots.sort();
        Self::with_roots(comments, roots)
    }

    /// Use the root order the post itself records.
    pub fn with_roots(comments: Vec<Comment>, roots: Vec<CommentId>) -> Self {
        Self {
            comments: comments.into_iter().map(|c| (c.id, c)).collect(),
            roots,
        }
    }

    pub fn get(&self, id: CommentId) -> Option<&Comment> {
        self.comments.get(&id)
    }

    pub fn roots(&self) -> &[CommentId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Every reachable comment with its depth, in display order.
    pub fn walk(&self) -> Vec<(&Comment, usize)> {
        let mut walk = ThreadWalk::new(&self.roots);
        let mut out = Vec::with_capacity(self.comments.len());
        while let Some((id, depth)) = walk.next() {
            let Some(comment) = self.comments.get(&id) else {
                tracing::debug!("Comment {} missing from thread", id);
                continue;
            };
            walk.descend(&comment.replies, depth);
            out.push((comment, depth));
        }
        out
    }

    /// Thread views, naming authors through `name_of`.
    pub fn views<F>(&self, is_admin: bool, mut name_of: F) -> Vec<CommentView>
    where
        F: FnMut(&Principal) -> String,
    {
        self.walk()
            .into_iter()
            .map(|(comment, depth)| {
                let name = name_of(&comment.author);
                CommentView::new(comment.clone(), depth, name, is_admin)
            })
            .collect()
    }
}
