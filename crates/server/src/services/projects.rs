//! Project reads and writes. Every read goes through the visibility filter.

use std::collections::HashMap;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::{
    authz::{self, visibility::push_visibility_filter, Action, Resource},
    db::models::{
        FeaturedProjects, FileData, FileRow, FileType, ProjectData, ProjectType,
        ProjectWithAuthor, Visibility,
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::interactions,
    validation::{self, SortOrder},
};

const PROJECT_WITH_AUTHOR: &str = "SELECT p.*, u.username, u.avatar_url \
     FROM projects p JOIN users u ON u.id = p.user_id";

const PUBLIC_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

const FEATURED_LIMIT: i64 = 4;

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub title: String,
    #[serde(rename = "type", default)]
    pub project_type: ProjectType,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedProject {
    pub username: String,
    pub public_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProject {
    pub new_title: String,
    pub new_type: ProjectType,
    pub html: String,
    pub css: String,
    pub javascript: String,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectSort {
    #[default]
    CreatedAt,
    Title,
    Type,
    Views,
    LikesCount,
}

impl ProjectSort {
    fn column(self) -> &'static str {
        match self {
            ProjectSort::CreatedAt => "p.created_at",
            ProjectSort::Title => "p.title",
            ProjectSort::Type => "p.type",
            ProjectSort::Views => "p.views",
            ProjectSort::LikesCount => "p.likes_count",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectQuery {
    pub order: Option<SortOrder>,
    pub sort_by: Option<ProjectSort>,
    pub username: Option<String>,
    pub search_text: Option<String>,
    #[serde(rename = "type")]
    pub project_type: Option<ProjectType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn generate_public_id() -> String {
    let mut rng = rand::thread_rng();
    (0..validation::PUBLIC_ID_LEN)
        .map(|_| PUBLIC_ID_ALPHABET[rng.gen_range(0..PUBLIC_ID_ALPHABET.len())] as char)
        .collect()
}

/// Looks up a project by public id, treating projects the viewer may not
/// see as missing.
pub(crate) async fn find_visible(
    pool: &SqlitePool,
    viewer: Option<&AuthUser>,
    public_id: &str,
) -> Result<ProjectWithAuthor> {
    validation::public_id(public_id)?;

    let mut qb = QueryBuilder::<Sqlite>::new(PROJECT_WITH_AUTHOR);
    qb.push(" WHERE p.public_id = ");
    qb.push_bind(public_id.to_string());
    qb.push(" AND ");
    push_visibility_filter(&mut qb, viewer);

    qb.build_query_as::<ProjectWithAuthor>()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn load_files(
    pool: &SqlitePool,
    project_ids: &[String],
) -> Result<HashMap<String, Vec<FileData>>> {
    let mut by_project: HashMap<String, Vec<FileData>> = HashMap::new();
    if project_ids.is_empty() {
        return Ok(by_project);
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT project_id, type, content FROM files WHERE project_id IN (",
    );
    let mut ids = qb.separated(", ");
    for id in project_ids {
        ids.push_bind(id.clone());
    }
    ids.push_unseparated(
        ") ORDER BY CASE type WHEN 'html' THEN 0 WHEN 'css' THEN 1 ELSE 2 END",
    );

    let rows = qb.build_query_as::<FileRow>().fetch_all(pool).await?;
    for row in rows {
        by_project.entry(row.project_id).or_default().push(FileData {
            file_type: row.file_type,
            content: row.content,
        });
    }

    Ok(by_project)
}

/// Turns joined rows into response items carrying their files.
async fn with_files(
    pool: &SqlitePool,
    rows: Vec<ProjectWithAuthor>,
    viewer: Option<&AuthUser>,
) -> Result<Vec<ProjectData>> {
    let ids: Vec<String> = rows.iter().map(|r| r.project.id.clone()).collect();
    let mut files = load_files(pool, &ids).await?;
    let viewer_id = viewer.map(|v| v.id.as_str());

    Ok(rows
        .into_iter()
        .map(|row| {
            let project_files = files.remove(&row.project.id).unwrap_or_default();
            let mut data = ProjectData::from_row(row, viewer_id);
            data.files = Some(project_files);
            data
        })
        .collect())
}

pub async fn create_project(
    pool: &SqlitePool,
    user: &AuthUser,
    input: CreateProject,
) -> Result<CreatedProject> {
    validation::title(&input.title)?;
    authz::authorize(user, Action::Create, Resource::Post, None)?;

    let project_id = Uuid::new_v4().to_string();
    let public_id = generate_public_id();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO projects (id, public_id, user_id, title, type, visibility, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&project_id)
    .bind(&public_id)
    .bind(&user.id)
    .bind(input.title.trim())
    .bind(input.project_type)
    .bind(input.visibility)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for file_type in FileType::ALL {
        sqlx::query(
            "INSERT INTO files (id, project_id, type, content, created_at, updated_at) VALUES (?, ?, ?, '', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&project_id)
        .bind(file_type)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(public_id = %public_id, user_id = %user.id, "project created");

    Ok(CreatedProject {
        username: user.username.clone(),
        public_id,
    })
}

pub async fn get_project(
    pool: &SqlitePool,
    viewer: Option<&AuthUser>,
    public_id: &str,
    include_files: bool,
    include_comments: bool,
) -> Result<ProjectData> {
    let row = find_visible(pool, viewer, public_id).await?;
    let project_id = row.project.id.clone();
    let viewer_id = viewer.map(|v| v.id.as_str());

    let mut data = ProjectData::from_row(row, viewer_id);

    if include_files {
        let mut files = load_files(pool, std::slice::from_ref(&project_id)).await?;
        data.files = Some(files.remove(&project_id).unwrap_or_default());
    }
    if include_comments {
        data.comments = Some(interactions::load_comments(pool, &project_id, viewer_id).await?);
    }

    Ok(data)
}

pub async fn list_projects(
    pool: &SqlitePool,
    viewer: Option<&AuthUser>,
    query: &ProjectQuery,
) -> Result<Vec<ProjectData>> {
    let limit = validation::limit(query.limit, 9, 50)?;
    let offset = validation::offset(query.offset)?;
    let order = query.order.unwrap_or(SortOrder::Desc);
    let sort = query.sort_by.unwrap_or_default();

    let mut qb = QueryBuilder::<Sqlite>::new(PROJECT_WITH_AUTHOR);
    qb.push(" WHERE ");
    push_visibility_filter(&mut qb, viewer);

    if let Some(text) = validation::non_blank(query.search_text.as_deref()) {
        qb.push(" AND p.title LIKE ");
        qb.push_bind(validation::like_pattern(text));
        qb.push(" ESCAPE '\\'");
    }
    if let Some(username) = validation::non_blank(query.username.as_deref()) {
        qb.push(" AND u.username = ");
        qb.push_bind(username.to_string());
    }
    if let Some(project_type) = query.project_type {
        qb.push(" AND p.type = ");
        qb.push_bind(project_type);
    }

    qb.push(format!(
        " ORDER BY {} {}, p.id ASC LIMIT ",
        sort.column(),
        order.as_sql()
    ));
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb.build_query_as::<ProjectWithAuthor>().fetch_all(pool).await?;
    with_files(pool, rows, viewer).await
}

pub async fn update_project(
    pool: &SqlitePool,
    user: &AuthUser,
    public_id: &str,
    input: UpdateProject,
) -> Result<()> {
    validation::title(&input.new_title)?;

    let row = find_visible(pool, Some(user), public_id).await?;
    let project = row.project;
    authz::authorize(user, Action::Update, Resource::Post, Some(&project.user_id))?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE projects SET title = ?, type = ?, visibility = ?, updated_at = ? WHERE id = ?",
    )
    .bind(input.new_title.trim())
    .bind(input.new_type)
    .bind(input.visibility)
    .bind(now)
    .bind(&project.id)
    .execute(&mut *tx)
    .await?;

    let contents = [
        (FileType::Html, &input.html),
        (FileType::Css, &input.css),
        (FileType::Js, &input.javascript),
    ];
    for (file_type, content) in contents {
        sqlx::query(
            "UPDATE files SET content = ?, updated_at = ? WHERE project_id = ? AND type = ?",
        )
        .bind(content)
        .bind(now)
        .bind(&project.id)
        .bind(file_type)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(public_id = %public_id, user_id = %user.id, "project updated");
    Ok(())
}

pub async fn delete_project(pool: &SqlitePool, user: &AuthUser, public_id: &str) -> Result<()> {
    let row = find_visible(pool, Some(user), public_id).await?;
    authz::authorize(
        user,
        Action::Delete,
        Resource::Post,
        Some(&row.project.user_id),
    )?;

    // Files, comments and likes go with it
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(&row.project.id)
        .execute(pool)
        .await?;

    tracing::info!(public_id = %public_id, user_id = %user.id, "project deleted");
    Ok(())
}

pub async fn increment_views(
    pool: &SqlitePool,
    viewer: Option<&AuthUser>,
    public_id: &str,
) -> Result<i64> {
    let row = find_visible(pool, viewer, public_id).await?;

    let views = sqlx::query_scalar::<_, i64>(
        "UPDATE projects SET views = views + 1 WHERE id = ? RETURNING views",
    )
    .bind(&row.project.id)
    .fetch_one(pool)
    .await?;

    Ok(views)
}

async fn top_public(pool: &SqlitePool, column: &str) -> Result<Vec<ProjectData>> {
    let mut qb = QueryBuilder::<Sqlite>::new(PROJECT_WITH_AUTHOR);
    qb.push(" WHERE ");
    push_visibility_filter(&mut qb, None);
    qb.push(format!(" ORDER BY {column} DESC, p.id ASC LIMIT "));
    qb.push_bind(FEATURED_LIMIT);

    let rows = qb.build_query_as::<ProjectWithAuthor>().fetch_all(pool).await?;
    with_files(pool, rows, None).await
}

/// The most viewed and most liked public projects.
pub async fn featured_projects(pool: &SqlitePool) -> Result<FeaturedProjects> {
    let (most_viewed, most_liked) = tokio::try_join!(
        top_public(pool, ProjectSort::Views.column()),
        top_public(pool, ProjectSort::LikesCount.column()),
    )?;

    Ok(FeaturedProjects {
        most_viewed,
        most_liked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{models::Role, test_support};

    fn new_project(title: &str, visibility: Visibility) -> CreateProject {
        CreateProject {
            title: title.to_string(),
            project_type: ProjectType::Button,
            visibility,
        }
    }

    fn edit(title: &str, visibility: Visibility) -> UpdateProject {
        UpdateProject {
            new_title: title.to_string(),
            new_type: ProjectType::Modal,
            html: "<button>hi</button>".to_string(),
            css: "button { color: red; }".to_string(),
            javascript: "console.log(1)".to_string(),
            visibility,
        }
    }

    fn file_content(project: &ProjectData, file_type: FileType) -> &str {
        project
            .files
            .iter()
            .flatten()
            .find(|f| f.file_type == file_type)
            .map(|f| f.content.as_str())
            .unwrap_or_default()
    }

    #[test]
    fn generated_public_ids_are_valid() {
        for _ in 0..100 {
            let id = generate_public_id();
            assert!(validation::public_id(&id).is_ok(), "{id}");
        }
    }

    #[tokio::test]
    async fn create_project_adds_three_empty_files() {
        let db = test_support::database().await;
        let alice = test_support::user(&db, "alice", Role::User).await;

        let created = create_project(&db.pool, &alice, new_project("Neon", Visibility::Public))
            .await
            .unwrap();
        assert_eq!(created.username, "alice");

        let project = get_project(&db.pool, None, &created.public_id, true, true)
            .await
            .unwrap();
        assert_eq!(project.title, "Neon");
        assert_eq!(project.project_type, ProjectType::Button);
        assert_eq!(project.likes_count, 0);
        assert!(!project.is_owner);

        let files = project.files.as_ref().unwrap();
        let types: Vec<FileType> = files.iter().map(|f| f.file_type).collect();
        assert_eq!(types, vec![FileType::Html, FileType::Css, FileType::Js]);
        assert!(files.iter().all(|f| f.content.is_empty()));
        assert!(project.comments.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_project_rejects_blank_title() {
        let db = test_support::database().await;
        let alice = test_support::user(&db, "alice", Role::User).await;

        let err = create_project(&db.pool, &alice, new_project("  ", Visibility::Public))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn private_project_is_hidden_from_others() {
        let db = test_support::database().await;
        let alice = test_support::user(&db, "alice", Role::User).await;
        let bob = test_support::user(&db, "bobby", Role::User).await;
        let root = test_support::user(&db, "admin", Role::Admin).await;

        let created = create_project(&db.pool, &alice, new_project("Secret", Visibility::Private))
            .await
            .unwrap();
        let id = created.public_id.as_str();

        for viewer in [None, Some(&bob)] {
            let err = get_project(&db.pool, viewer, id, false, false)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }

        let as_owner = get_project(&db.pool, Some(&alice), id, false, false)
            .await
            .unwrap();
        assert!(as_owner.is_owner);
        assert!(as_owner.files.is_none());

        let as_admin = get_project(&db.pool, Some(&root), id, false, false)
            .await
            .unwrap();
        assert!(!as_admin.is_owner);
    }

    #[tokio::test]
    async fn listing_applies_visibility() {
        let db = test_support::database().await;
        let alice = test_support::user(&db, "alice", Role::User).await;
        let bob = test_support::user(&db, "bobby", Role::User).await;
        let root = test_support::user(&db, "admin", Role::Admin).await;

        create_project(&db.pool, &alice, new_project("Open", Visibility::Public))
            .await
            .unwrap();
        create_project(&db.pool, &alice, new_project("Hidden", Visibility::Private))
            .await
            .unwrap();

        let query = ProjectQuery::default();
        let titles = |list: Vec<ProjectData>| {
            let mut t: Vec<String> = list.into_iter().map(|p| p.title).collect();
            t.sort();
            t
        };

        let anonymous = list_projects(&db.pool, None, &query).await.unwrap();
        assert_eq!(titles(anonymous), vec!["Open"]);

        let other = list_projects(&db.pool, Some(&bob), &query).await.unwrap();
        assert_eq!(titles(other), vec!["Open"]);

        let owner = list_projects(&db.pool, Some(&alice), &query).await.unwrap();
        assert_eq!(titles(owner), vec!["Hidden", "Open"]);

        let admin = list_projects(&db.pool, Some(&root), &query).await.unwrap();
        assert_eq!(titles(admin), vec!["Hidden", "Open"]);
    }

    #[tokio::test]
    async fn listing_filters_sorts_and_pages() {
        let db = test_support::database().await;
        let alice = test_support::user(&db, "alice", Role::User).await;
        let bob = test_support::user(&db, "bobby", Role::User).await;

        for title in ["Glow button", "Sticky header", "Button 100%"] {
            create_project(&db.pool, &alice, new_project(title, Visibility::Public))
                .await
                .unwrap();
        }
        create_project(
            &db.pool,
            &bob,
            CreateProject {
                title: "Footer links".to_string(),
                project_type: ProjectType::Footer,
                visibility: Visibility::Public,
            },
        )
        .await
        .unwrap();

        let search = ProjectQuery {
            search_text: Some("BUTTON".to_string()),
            sort_by: Some(ProjectSort::Title),
            order: Some(SortOrder::Asc),
            ..Default::default()
        };
        let found = list_projects(&db.pool, None, &search).await.unwrap();
        let titles: Vec<&str> = found.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Button 100%", "Glow button"]);
        assert!(found.iter().all(|p| p.files.as_ref().unwrap().len() == 3));

        // Wildcards in the search text match literally
        let percent = ProjectQuery {
            search_text: Some("%".to_string()),
            ..Default::default()
        };
        let found = list_projects(&db.pool, None, &percent).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Button 100%");

        let by_owner = ProjectQuery {
            username: Some("bobby".to_string()),
            ..Default::default()
        };
        let found = list_projects(&db.pool, None, &by_owner).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user.username, "bobby");

        let by_type = ProjectQuery {
            project_type: Some(ProjectType::Footer),
            ..Default::default()
        };
        assert_eq!(list_projects(&db.pool, None, &by_type).await.unwrap().len(), 1);

        let unknown_owner = ProjectQuery {
            username: Some("nobody".to_string()),
            ..Default::default()
        };
        assert!(list_projects(&db.pool, None, &unknown_owner)
            .await
            .unwrap()
            .is_empty());

        let paged = ProjectQuery {
            sort_by: Some(ProjectSort::Title),
            order: Some(SortOrder::Asc),
            limit: Some(2),
            offset: Some(2),
            ..Default::default()
        };
        let page: Vec<String> = list_projects(&db.pool, None, &paged)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(page, vec!["Glow button", "Sticky header"]);

        let too_many = ProjectQuery {
            limit: Some(51),
            ..Default::default()
        };
        assert!(matches!(
            list_projects(&db.pool, None, &too_many).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn only_owner_or_admin_can_update() {
        let db = test_support::database().await;
        let alice = test_support::user(&db, "alice", Role::User).await;
        let bob = test_support::user(&db, "bobby", Role::User).await;
        let root = test_support::user(&db, "admin", Role::Admin).await;

        let created = create_project(&db.pool, &alice, new_project("Draft", Visibility::Public))
            .await
            .unwrap();
        let id = created.public_id.as_str();

        let err = update_project(&db.pool, &bob, id, edit("Stolen", Visibility::Public))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        update_project(&db.pool, &alice, id, edit("Final", Visibility::Private))
            .await
            .unwrap();

        let project = get_project(&db.pool, Some(&alice), id, true, false)
            .await
            .unwrap();
        assert_eq!(project.title, "Final");
        assert_eq!(project.project_type, ProjectType::Modal);
        assert_eq!(project.visibility, Visibility::Private);
        assert_eq!(file_content(&project, FileType::Html), "<button>hi</button>");
        assert_eq!(file_content(&project, FileType::Css), "button { color: red; }");
        assert_eq!(file_content(&project, FileType::Js), "console.log(1)");

        // Now private, so another user cannot even find it
        let err = update_project(&db.pool, &bob, id, edit("Again", Visibility::Public))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        update_project(&db.pool, &root, id, edit("Moderated", Visibility::Public))
            .await
            .unwrap();
        let project = get_project(&db.pool, None, id, false, false).await.unwrap();
        assert_eq!(project.title, "Moderated");
    }

    #[tokio::test]
    async fn delete_cascades_and_respects_ownership() {
        let db = test_support::database().await;
        let alice = test_support::user(&db, "alice", Role::User).await;
        let bob = test_support::user(&db, "bobby", Role::User).await;
        let root = test_support::user(&db, "admin", Role::Admin).await;

        let created = create_project(&db.pool, &alice, new_project("Doomed", Visibility::Public))
            .await
            .unwrap();
        let id = created.public_id.as_str();

        interactions::like_project(&db.pool, &bob, id).await.unwrap();
        interactions::create_comment(&db.pool, &bob, id, "wow").await.unwrap();

        let err = delete_project(&db.pool, &bob, id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        delete_project(&db.pool, &root, id).await.unwrap();

        let err = get_project(&db.pool, Some(&alice), id, false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        for table in ["files", "comments", "project_likes"] {
            let remaining: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&db.pool)
                .await
                .unwrap();
            assert_eq!(remaining, 0, "{table}");
        }
    }

    #[tokio::test]
    async fn views_only_count_for_visible_projects() {
        let db = test_support::database().await;
        let alice = test_support::user(&db, "alice", Role::User).await;

        let open = create_project(&db.pool, &alice, new_project("Open", Visibility::Public))
            .await
            .unwrap();
        let hidden = create_project(&db.pool, &alice, new_project("Hidden", Visibility::Private))
            .await
            .unwrap();

        assert_eq!(increment_views(&db.pool, None, &open.public_id).await.unwrap(), 1);
        assert_eq!(increment_views(&db.pool, None, &open.public_id).await.unwrap(), 2);

        assert!(matches!(
            increment_views(&db.pool, None, &hidden.public_id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(
            increment_views(&db.pool, Some(&alice), &hidden.public_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn featured_excludes_private_projects() {
        let db = test_support::database().await;
        let alice = test_support::user(&db, "alice", Role::User).await;

        let mut public_ids = Vec::new();
        for n in 0..5 {
            let created = create_project(
                &db.pool,
                &alice,
                new_project(&format!("Public {n}"), Visibility::Public),
            )
            .await
            .unwrap();
            for _ in 0..n {
                increment_views(&db.pool, None, &created.public_id).await.unwrap();
            }
            public_ids.push(created.public_id);
        }

        let secret = create_project(&db.pool, &alice, new_project("Secret", Visibility::Private))
            .await
            .unwrap();
        for _ in 0..10 {
            increment_views(&db.pool, Some(&alice), &secret.public_id)
                .await
                .unwrap();
        }

        let featured = featured_projects(&db.pool).await.unwrap();
        let viewed: Vec<&str> = featured
            .most_viewed
            .iter()
            .map(|p| p.title.as_str())
            .collect();
        assert_eq!(viewed, vec!["Public 4", "Public 3", "Public 2", "Public 1"]);
        assert_eq!(featured.most_liked.len(), 4);
        assert!(featured
            .most_liked
            .iter()
            .all(|p| p.visibility == Visibility::Public));
    }
}
