use serde::{Deserialize, Serialize};

// ── Users ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
}

// ── Articles ──

/// Moderation state of an article. Only `Moderated` articles show up in the
/// public listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    New,
    Moderated,
    Rejected,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::New => "new",
            ArticleStatus::Moderated => "moderated",
            ArticleStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ArticleStatus::New),
            "moderated" => Some(ArticleStatus::Moderated),
            "rejected" => Some(ArticleStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub author: User,
    pub status: ArticleStatus,
    pub tags: Vec<Tag>,
    pub created_at: String,
    pub updated_at: String,
    pub like_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDetail {
    pub article: Article,
    /// Whether the caller has liked the article; `false` for anonymous callers.
    pub liked: bool,
    pub comments: Paginated<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateArticle {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateArticle {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Honoured for staff only.
    #[serde(default)]
    pub status: Option<ArticleStatus>,
}

// ── Comments ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub article_id: i64,
    pub author: User,
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
    pub comm_like_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateComment {
    pub text: String,
}

// ── Tags ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSummary {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub article_count: i64,
}

// ── Likes ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeResponse {
    pub like_count: i64,
    pub liked: bool,
}

// ── Pagination ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub num_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub is_paginated: bool,
}
