//! Articles: authoring, listing, favorites and tags.
//!
//! Handlers resolve the caller to an [`ArticleUser`](models::ArticleUser) and hand
//! off to the aggregate in [`models`]; ownership is checked there, never here.

use rocket::serde::json::{Json, Value};
use rocket::{delete, get, post, put};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{CurrentUser, MaybeUser};
use crate::db::DbConnection;
use crate::types::{created, ApiResult, CreatedResult};

pub mod models;
pub mod views;

use self::models::{Article, ArticleDetails, ArticleFilter, ArticleUser, Tag, UpdateDetails};
use self::views::{render_article, render_article_list, ArticleResponse, ArticlesResponse};

#[derive(Debug, Deserialize)]
pub struct NewArticleRequest {
    article: ArticleDetails,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArticleRequest {
    article: UpdateDetails,
}

#[get("/?<tag>&<author>&<favorited>&<limit>&<offset>")]
pub fn list_articles(
    mut connection: DbConnection,
    current_user: MaybeUser,
    tag: Option<String>,
    author: Option<String>,
    favorited: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> ApiResult<ArticlesResponse> {
    let viewer = ArticleUser::for_viewer(&mut connection, current_user.as_ref())?;
    let filter = ArticleFilter {
        tag,
        author,
        favorited,
        followed_by: None,
        limit,
        offset,
    };
    let (page, count) = Article::list(&mut connection, &filter)?;
    Ok(Json(ArticlesResponse {
        articles: render_article_list(&mut connection, &page, viewer.as_ref())?,
        articles_count: count,
    }))
}

#[get("/feed?<limit>&<offset>")]
pub fn feed(
    mut connection: DbConnection,
    current_user: CurrentUser,
    limit: Option<i64>,
    offset: Option<i64>,
) -> ApiResult<ArticlesResponse> {
    let identity = current_user?;
    let viewer = ArticleUser::for_identity(&mut connection, &identity)?;
    let filter = ArticleFilter {
        followed_by: Some(identity.user_id),
        limit,
        offset,
        ..Default::default()
    };
    let (page, count) = Article::list(&mut connection, &filter)?;
    Ok(Json(ArticlesResponse {
        articles: render_article_list(&mut connection, &page, Some(&viewer))?,
        articles_count: count,
    }))
}

#[post("/", format = "json", data = "<new_article>")]
pub fn create_article(
    mut connection: DbConnection,
    current_user: CurrentUser,
    new_article: Json<NewArticleRequest>,
) -> CreatedResult<ArticleResponse> {
    let author = ArticleUser::for_identity(&mut connection, &current_user?)?;
    let article = Article::create(&mut connection, &author, &new_article.article)?;
    Ok(created(ArticleResponse {
        article: render_article(&mut connection, &article, Some(&author))?,
    }))
}

#[get("/<slug>")]
pub fn get_article(
    mut connection: DbConnection,
    current_user: MaybeUser,
    slug: &str,
) -> ApiResult<ArticleResponse> {
    let viewer = ArticleUser::for_viewer(&mut connection, current_user.as_ref())?;
    let article = Article::load_by_slug(&mut connection, slug)?;
    Ok(Json(ArticleResponse {
        article: render_article(&mut connection, &article, viewer.as_ref())?,
    }))
}

#[put("/<slug>", format = "json", data = "<changes>")]
pub fn update_article(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
    changes: Json<UpdateArticleRequest>,
) -> ApiResult<ArticleResponse> {
    let requester = ArticleUser::for_identity(&mut connection, &current_user?)?;
    let article = Article::update(&mut connection, &requester, slug, &changes.article)?;
    Ok(Json(ArticleResponse {
        article: render_article(&mut connection, &article, Some(&requester))?,
    }))
}

#[delete("/<slug>")]
pub fn delete_article(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
) -> ApiResult<Value> {
    let requester = ArticleUser::for_identity(&mut connection, &current_user?)?;
    Article::delete(&mut connection, &requester, slug)?;
    Ok(Json(json!({})))
}

#[post("/<slug>/favorite")]
pub fn favorite(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
) -> ApiResult<ArticleResponse> {
    let user = ArticleUser::for_identity(&mut connection, &current_user?)?;
    let article = Article::load_by_slug(&mut connection, slug)?;
    article.favorite_by(&mut connection, &user)?;
    Ok(Json(ArticleResponse {
        article: render_article(&mut connection, &article, Some(&user))?,
    }))
}

#[delete("/<slug>/favorite")]
pub fn unfavorite(
    mut connection: DbConnection,
    current_user: CurrentUser,
    slug: &str,
) -> ApiResult<ArticleResponse> {
    let user = ArticleUser::for_identity(&mut connection, &current_user?)?;
    let article = Article::load_by_slug(&mut connection, slug)?;
    article.unfavorite_by(&mut connection, &user)?;
    Ok(Json(ArticleResponse {
        article: render_article(&mut connection, &article, Some(&user))?,
    }))
}

#[get("/tags")]
pub fn tags(mut connection: DbConnection) -> ApiResult<Value> {
    let tags = Tag::in_use(&mut connection)?;
    Ok(Json(json!({ "tags": tags })))
}
