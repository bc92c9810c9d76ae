use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::article::models::{Article, ArticleUser};
use crate::db::schema::{article_users, users};
use crate::profile::{viewer_follows, Profile};
use crate::types::ApiError;
use crate::users::models::User;
use crate::utils::{as_utc, serialize_date};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
    pub favorited: bool,
    pub favorites_count: i64,
    pub author: Profile<'static>,
}

#[derive(Debug, Serialize)]
pub struct ArticleResponse {
    pub article: ArticleView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlesResponse {
    pub articles: Vec<ArticleView>,
    pub articles_count: i64,
}

/// The user behind an `article_users` row.
pub fn load_author(connection: &mut SqliteConnection, author_id: i32) -> Result<User, ApiError> {
    article_users::table
        .inner_join(users::table)
        .filter(article_users::id.eq(author_id))
        .select(User::as_select())
        .first::<User>(connection)
        .map_err(|e| e.into())
}

/// The public profile of an `article_users` row, as seen by `viewer`.
pub fn author_profile(
    connection: &mut SqliteConnection,
    author_id: i32,
    viewer: Option<&ArticleUser>,
) -> Result<Profile<'static>, ApiError> {
    let author = load_author(connection, author_id)?;
    let following = viewer_follows(connection, viewer.map(|v| v.user_id), &author)?;
    Ok(author.into_profile(following))
}

pub fn render_article(
    connection: &mut SqliteConnection,
    article: &Article,
    viewer: Option<&ArticleUser>,
) -> Result<ArticleView, ApiError> {
    let favorited = match viewer {
        Some(viewer) => article.is_favorited_by(connection, viewer)?,
        None => false,
    };
    Ok(ArticleView {
        slug: article.slug.clone(),
        title: article.title.clone(),
        description: article.description.clone(),
        body: article.body.clone(),
        tag_list: article.tag_list(connection)?,
        created_at: as_utc(article.created_at),
        updated_at: as_utc(article.updated_at),
        favorited,
        favorites_count: article.favorites_count(connection)?,
        author: author_profile(connection, article.author_id, viewer)?,
    })
}

pub fn render_article_list(
    connection: &mut SqliteConnection,
    articles: &[Article],
    viewer: Option<&ArticleUser>,
) -> Result<Vec<ArticleView>, ApiError> {
    articles
        .iter()
        .map(|article| render_article(connection, article, viewer))
        .collect()
}
