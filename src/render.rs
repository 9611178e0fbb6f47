//! Plain-text rendering for the terminal.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::comments::CommentView;
use crate::gallery::{comment_label, FeedState, PostCard};
use crate::linkify::{linkify, render_plain};
use crate::notify::{Notice, NoticeLevel};

/// "just now", "5 minutes ago", "2 days ago". Future times read as "just now".
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }
    let (n, unit) = match secs {
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s if s < 30 * 86_400 => (s / 86_400, "day"),
        s if s < 365 * 86_400 => (s / (30 * 86_400), "month"),
        s => (s / (365 * 86_400), "year"),
    };
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

pub fn post_card(card: &PostCard, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "#{} {} · {}",
        card.id,
        card.author_name,
        relative_time(card.timestamp, now)
    );
    for line in render_plain(&card.description).lines() {
        let _ = writeln!(out, "  {}", line);
    }
    for url in &card.images {
        let _ = writeln!(out, "  [image] {}", url);
    }

    let mut status = vec![card.like_label()];
    if card.liked {
        status.push("liked".to_string());
    }
    if card.comment_count > 0 {
        status.push(comment_label(card.comment_count));
    }
    if card.is_own_post {
        status.push("yours".to_string());
    } else if card.following_author {
        status.push("following".to_string());
    }
    if card.can_delete {
        status.push("deletable".to_string());
    }
    let _ = writeln!(out, "  {}", status.join(" · "));
    out
}

pub fn feed(state: &FeedState, cards: &[PostCard], now: DateTime<Utc>) -> String {
    if let Some((title, body)) = state.message() {
        return format!("{}\n{}\n", title, body);
    }
    cards
        .iter()
        .map(|card| post_card(card, now))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Indented thread; comments that can take a reply show their id for
/// `--reply-to`.
pub fn thread(views: &[CommentView], now: DateTime<Utc>) -> String {
    if views.is_empty() {
        return "No comments yet\n".to_string();
    }
    let mut out = String::new();
    for view in views {
        let indent = "  ".repeat(view.depth);
        let reply = if view.can_reply { " [reply]" } else { "" };
        let _ = writeln!(
            out,
            "{}#{} {} · {}{}",
            indent,
            view.id,
            view.author_name,
            relative_time(view.timestamp, now),
            reply
        );
        for line in render_plain(&linkify(&view.content)).lines() {
            let _ = writeln!(out, "{}  {}", indent, line);
        }
    }
    out
}

pub fn notice(notice: &Notice) -> String {
    match notice.level {
        NoticeLevel::Success => format!("✓ {}", notice.message),
        NoticeLevel::Error => format!("✗ {}", notice.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommentId, PostId, Principal};
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn relative_times() {
        let n = now();
        assert_eq!(relative_time(n - Duration::seconds(10), n), "just now");
        assert_eq!(relative_time(n + Duration::seconds(10), n), "just now");
        assert_eq!(relative_time(n - Duration::minutes(1), n), "1 minute ago");
        assert_eq!(relative_time(n - Duration::minutes(5), n), "5 minutes ago");
        assert_eq!(relative_time(n - Duration::hours(3), n), "3 hours ago");
        assert_eq!(relative_time(n - Duration::days(2), n), "2 days ago");
        assert_eq!(relative_time(n - Duration::days(400), n), "1 year ago");
    }

    #[test]
    fn empty_feed_shows_message() {
        let out = feed(&FeedState::NoFollows, &[], now());
        assert!(out.contains("Follow other users to see their posts here!"));
    }

    #[test]
    fn thread_is_indented_by_depth() {
        let n = now();
        let view = |id: u64, depth: usize| CommentView {
            id: CommentId(id),
            post_id: PostId(1),
            depth,
            author: Principal::from_text("alice").unwrap(),
            author_name: "alice".into(),
            content: "hi".into(),
            timestamp: n,
            reply_ids: vec![],
            can_reply: depth < 3,
            can_delete: false,
        };
        let out = thread(&[view(1, 0), view(2, 3)], n);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "#1 alice · just now [reply]");
        assert_eq!(lines[2], "      #2 alice · just now");
    }

    #[test]
    fn single_comment_is_singular() {
        let n = now();
        let card = PostCard {
            id: PostId(1),
            author: Principal::from_text("alice").unwrap(),
            author_name: "alice".into(),
            timestamp: n,
            description: linkify("gm"),
            images: vec![],
            likes: 1,
            liked: false,
            following_author: false,
            is_own_post: false,
            can_delete: false,
            comment_count: 1,
        };
        let out = post_card(&card, n);
        assert!(out.contains("1 Like · 1 comment"));
        assert!(!out.contains("comments"));
    }

    #[test]
    fn notices_are_marked() {
        let n = Notice {
            level: NoticeLevel::Error,
            message: "Failed to follow user: nope".into(),
        };
        assert_eq!(notice(&n), "✗ Failed to follow user: nope");
    }
}
