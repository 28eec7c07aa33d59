use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Gallery category of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Button,
    Header,
    Footer,
    Sidebar,
    Form,
    Modal,
    Animation,
    #[default]
    Others,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Html,
    Css,
    Js,
}

impl FileType {
    pub const ALL: [FileType; 3] = [FileType::Html, FileType::Css, FileType::Js];
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: String,
    pub public_id: String,
    pub user_id: String,
    pub title: String,
    #[sqlx(rename = "type")]
    pub project_type: ProjectType,
    pub visibility: Visibility,
    pub views: i64,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A project row joined with its owner's public fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectWithAuthor {
    #[sqlx(flatten)]
    pub project: Project,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRow {
    pub project_id: String,
    #[sqlx(rename = "type")]
    pub file_type: FileType,
    pub content: String,
}

/// A comment row joined with its author's public fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentWithAuthor {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub username: String,
    pub avatar_url: Option<String>,
}

// Response shapes

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileData {
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentData {
    pub id: String,
    pub is_owner: bool,
    pub user: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl CommentData {
    pub fn from_row(row: CommentWithAuthor, viewer_id: Option<&str>) -> Self {
        Self {
            is_owner: viewer_id == Some(row.user_id.as_str()),
            id: row.id,
            user: Author {
                username: row.username,
                avatar_url: row.avatar_url,
            },
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    pub public_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    pub visibility: Visibility,
    pub views: i64,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_owner: bool,
    pub user: Author,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<CommentData>>,
}

impl ProjectData {
    pub fn from_row(row: ProjectWithAuthor, viewer_id: Option<&str>) -> Self {
        let p = row.project;
        Self {
            is_owner: viewer_id == Some(p.user_id.as_str()),
            public_id: p.public_id,
            title: p.title,
            project_type: p.project_type,
            visibility: p.visibility,
            views: p.views,
            likes_count: p.likes_count,
            comments_count: p.comments_count,
            created_at: p.created_at,
            updated_at: p.updated_at,
            user: Author {
                username: row.username,
                avatar_url: row.avatar_url,
            },
            files: None,
            comments: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedProjects {
    pub most_viewed: Vec<ProjectData>,
    pub most_liked: Vec<ProjectData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub avatar_url: Option<String>,
    pub total_likes: i64,
    pub total_follows: i64,
    pub total_views: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminProjectRow {
    pub id: String,
    pub public_id: String,
    pub title: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    pub visibility: Visibility,
    pub views: i64,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
    pub username: String,
}
