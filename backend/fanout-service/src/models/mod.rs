use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum characters of post body carried in a live notification
pub const PREVIEW_MAX_CHARS: usize = 140;

/// Account role. Only celebrities publish posts; everyone may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Celebrity,
    Public,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Celebrity => "celebrity",
            UserRole::Public => "public",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "celebrity" => Some(UserRole::Celebrity),
            "public" | "follower" => Some(UserRole::Public),
            _ => None,
        }
    }
}

/// An account as listed for discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub follower_count: i64,
}

/// A persisted post.
///
/// Immutable after creation except for the engagement counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Unix epoch milliseconds
    pub created_at: i64,
    /// Store-assigned insertion sequence, secondary sort key
    #[serde(default)]
    pub seq: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub comment_count: i64,
}

impl Post {
    /// Feed ordering key: newest first, later insertion wins ties.
    pub fn feed_order(a: &Post, b: &Post) -> std::cmp::Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.seq.cmp(&a.seq))
    }
}

/// Input to `PostStore::insert`
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub content: String,
    pub media_url: Option<String>,
    pub created_at: i64,
}

/// Payload pushed to live clients when a followed author posts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostNotification {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub preview: String,
}

impl PostNotification {
    pub fn from_post(post: &Post) -> Self {
        Self {
            post_id: post.id,
            author_id: post.author_id,
            preview: preview_of(&post.content),
        }
    }
}

/// Truncate `content` to `PREVIEW_MAX_CHARS` characters, appending an ellipsis when cut.
pub fn preview_of(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(PREVIEW_MAX_CHARS) {
        Some((byte_idx, _)) => format!("{}…", trimmed[..byte_idx].trim_end()),
        None => trimmed.to_string(),
    }
}

/// Message carried on the event bus for every created post.
///
/// `followers` is the follower set as read at publish time; edges created or
/// removed afterwards are not reflected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutEvent {
    pub event_id: Uuid,
    pub author_id: Uuid,
    pub post: Post,
    pub followers: Vec<Uuid>,
    /// Unix epoch milliseconds
    pub published_at: i64,
}

impl FanoutEvent {
    pub fn new(post: Post, followers: Vec<Uuid>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            author_id: post.author_id,
            post,
            followers,
            published_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn notification(&self) -> PostNotification {
        PostNotification::from_post(&self.post)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Stateless page selector. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Normalize raw query values: page 0 reads as page 1 and the size is
    /// clamped into `1..=max_page_size`.
    pub fn new(page: u32, page_size: u32, max_page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, max_page_size.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1).saturating_mul(u64::from(self.page_size))
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }
}

/// One page of a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub page: u32,
    pub page_size: u32,
    /// True iff the page came back full. A full page may still be the last one.
    pub has_more: bool,
}

impl FeedPage {
    pub fn from_posts(posts: Vec<Post>, request: PageRequest) -> Self {
        let has_more = posts.len() as u64 == u64::from(request.page_size);
        Self {
            posts,
            page: request.page,
            page_size: request.page_size,
            has_more,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self {
            posts: Vec::new(),
            page: request.page,
            page_size: request.page_size,
            has_more: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(created_at: i64, seq: i64) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            content: "hello".to_string(),
            media_url: None,
            created_at,
            seq,
            like_count: 0,
            comment_count: 0,
        }
    }

    #[test]
    fn test_preview_short_content_untouched() {
        assert_eq!(preview_of("  new album out  "), "new album out");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let content = "é".repeat(PREVIEW_MAX_CHARS + 10);
        let preview = preview_of(&content);
        assert!(preview.ends_with('…'));
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 1);
    }

    #[test]
    fn test_preview_exact_length_not_cut() {
        let content = "a".repeat(PREVIEW_MAX_CHARS);
        assert_eq!(preview_of(&content), content);
    }

    #[test]
    fn test_feed_order_newest_first_then_seq() {
        let mut posts = vec![post(10, 1), post(30, 2), post(30, 5), post(20, 3)];
        posts.sort_by(Post::feed_order);
        let keys: Vec<(i64, i64)> = posts.iter().map(|p| (p.created_at, p.seq)).collect();
        assert_eq!(keys, vec![(30, 5), (30, 2), (20, 3), (10, 1)]);
    }

    #[test]
    fn test_page_request_normalization() {
        let req = PageRequest::new(0, 0, 100);
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, 1);
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(3, 500, 100);
        assert_eq!(req.page_size, 100);
        assert_eq!(req.offset(), 200);
    }

    #[test]
    fn test_page_offset_saturates() {
        let req = PageRequest::new(u32::MAX, 100, 100);
        assert_eq!(req.offset(), u64::from(u32::MAX - 1) * 100);
    }

    #[test]
    fn test_feed_page_has_more_only_when_full() {
        let req = PageRequest::new(1, 2, 100);
        assert!(FeedPage::from_posts(vec![post(1, 1), post(2, 2)], req).has_more);
        assert!(!FeedPage::from_posts(vec![post(1, 1)], req).has_more);
        assert!(!FeedPage::empty(req).has_more);
    }

    #[test]
    fn test_fanout_event_json_roundtrip() {
        let p = post(42, 7);
        let followers = vec![Uuid::new_v4(), Uuid::new_v4()];
        let event = FanoutEvent::new(p.clone(), followers.clone());
        assert_eq!(event.author_id, p.author_id);

        let decoded = FanoutEvent::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.notification().post_id, p.id);
    }

    #[test]
    fn test_user_role_parse() {
        assert_eq!(UserRole::parse("celebrity"), Some(UserRole::Celebrity));
        assert_eq!(UserRole::parse("public"), Some(UserRole::Public));
        assert_eq!(UserRole::parse("admin"), None);
        assert_eq!(UserRole::Celebrity.as_str(), "celebrity");
    }
}
