use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::{delete as diesel_delete, insert_into};
use rocket::serde::json::{Json, Value};
use rocket::{delete, get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::article::models::{Article, ArticleUser};
use crate::article::views::author_profile;
use crate::auth::{CurrentUser, MaybeUser};
use crate::db::schema::comments;
use crate::db::DbConnection;
use crate::ownership::{authorize, Owned};
use crate::profile::Profile;
use crate::types::{created, ApiError, ApiResult, CreatedResult, ValidationError};
use crate::utils::{self, as_utc, serialize_date};

pub const BODY_MAX: usize = 2048;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Associations)]
#[diesel(belongs_to(Article))]
#[diesel(table_name = comments)]
pub struct Comment {
    pub id: i32,
    pub article_id: i32,
    pub user_id: i32,
    pub body: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Owned for Comment {
    fn owner_id(&self) -> i32 {
        self.user_id
    }

    fn describe(&self) -> String {
        format!("comment {}", self.id)
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentView<'r> {
    id: i32,
    #[serde(serialize_with = "serialize_date")]
    created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    updated_at: DateTime<Utc>,
    body: String,
    author: Profile<'r>,
}

impl<'r> From<(Comment, Profile<'r>)> for CommentView<'r> {
    fn from((comment, author): (Comment, Profile<'r>)) -> Self {
        CommentView {
            id: comment.id,
            created_at: as_utc(comment.created_at),
            updated_at: as_utc(comment.updated_at),
            body: comment.body,
            author,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
struct NewComment<'a> {
    article_id: i32,
    user_id: i32,
    body: &'a str,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CommentBody {
    body: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CommentContainer<T> {
    comment: T,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CommentsContainer<T> {
    comments: T,
}

fn check_body(body: &str) -> Result<(), ValidationError> {
    if body.trim().is_empty() {
        Err(ValidationError::from("body", "can't be empty"))
    } else if body.chars().count() > BODY_MAX {
        Err(ValidationError::from(
            "body",
            format!("is too long (maximum is {} characters)", BODY_MAX),
        ))
    } else {
        Ok(())
    }
}

pub fn add_comment(
    connection: &mut SqliteConnection,
    author: &ArticleUser,
    article: &Article,
    body: &str,
) -> Result<Comment, ApiError> {
    check_body(body)?;
    let now = utils::now();
    let comment = insert_into(comments::table)
        .values(&NewComment {
            article_id: article.id,
            user_id: author.id,
            body,
            created_at: now,
            updated_at: now,
        })
        .get_result::<Comment>(connection)?;
    info!(comment = comment.id, article = %article.slug, "added comment");
    Ok(comment)
}

/// Comments of `article`, oldest first.
pub fn article_comments(
    connection: &mut SqliteConnection,
    article: &Article,
) -> Result<Vec<Comment>, ApiError> {
    Comment::belonging_to(article)
        .order(comments::id.asc())
        .load::<Comment>(connection)
        .map_err(|e| e.into())
}

/// Removes a comment for good. The comment must belong to `article`.
pub fn delete_comment(
    connection: &mut SqliteConnection,
    requester: &ArticleUser,
    article: &Article,
    comment_id: i32,
) -> Result<(), ApiError> {
    let comment = Comment::belonging_to(article)
        .filter(comments::id.eq(comment_id))
        .first::<Comment>(connection)
        .optional()?
        .ok_or(ApiError::NotFound)?;
    authorize(requester, &comment).require()?;

    diesel_delete(&comment).execute(connection)?;
    info!(comment = comment.id, article = %article.slug, "deleted comment");
    Ok(())
}

pub fn render_comment(
    connection: &mut SqliteConnection,
    comment: Comment,
    viewer: Option<&ArticleUser>,
) -> Result<CommentView<'static>, ApiError> {
    let author = author_profile(connection, comment.user_id, viewer)?;
    Ok((comment, author).into())
}

#[post("/<slug>/comments", data = "<details>", format = "json")]
pub fn add(
    mut conn: DbConnection,
    user: CurrentUser,
    slug: &str,
    details: Json<CommentContainer<CommentBody>>,
) -> CreatedResult<CommentContainer<CommentView<'static>>> {
    let author = ArticleUser::for_identity(&mut conn, &user?)?;
    let article = Article::load_by_slug(&mut conn, slug)?;
    let comment = add_comment(&mut conn, &author, &article, &details.comment.body)?;
    Ok(created(CommentContainer {
        comment: render_comment(&mut conn, comment, Some(&author))?,
    }))
}

#[get("/<slug>/comments")]
pub fn list(
    mut conn: DbConnection,
    user: MaybeUser,
    slug: &str,
) -> ApiResult<CommentsContainer<Vec<CommentView<'static>>>> {
    let viewer = ArticleUser::for_viewer(&mut conn, user.as_ref())?;
    let article = Article::load_by_slug(&mut conn, slug)?;
    let comments = article_comments(&mut conn, &article)?
        .into_iter()
        .map(|comment| render_comment(&mut conn, comment, viewer.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(CommentsContainer { comments }))
}

#[delete("/<slug>/comments/<id>")]
pub fn remove(mut conn: DbConnection, user: CurrentUser, slug: &str, id: i32) -> ApiResult<Value> {
    let requester = ArticleUser::for_identity(&mut conn, &user?)?;
    let article = Article::load_by_slug(&mut conn, slug)?;
    delete_comment(&mut conn, &requester, &article, id)?;
    Ok(Json(json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::models::tests::{connection, details, user};

    #[test]
    fn comment_body_is_validated() {
        let mut conn = connection();
        let (_, author) = user(&mut conn, "author1");
        let article = Article::create(&mut conn, &author, &details("Commented", &[])).unwrap();

        assert!(matches!(
            add_comment(&mut conn, &author, &article, "   "),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            add_comment(&mut conn, &author, &article, &"a".repeat(BODY_MAX + 1)),
            Err(ApiError::Validation(_))
        ));
        assert!(add_comment(&mut conn, &author, &article, &"a".repeat(BODY_MAX)).is_ok());
    }

    #[test]
    fn only_the_comment_author_may_delete() {
        let mut conn = connection();
        let (_, author) = user(&mut conn, "author1");
        let (_, other) = user(&mut conn, "intruder");
        let article = Article::create(&mut conn, &author, &details("Commented", &[])).unwrap();
        let comment = add_comment(&mut conn, &author, &article, "Test comment").unwrap();

        assert!(matches!(
            delete_comment(&mut conn, &other, &article, comment.id),
            Err(ApiError::Forbidden)
        ));
        delete_comment(&mut conn, &author, &article, comment.id).unwrap();
        assert!(article_comments(&mut conn, &article).unwrap().is_empty());
        assert!(matches!(
            delete_comment(&mut conn, &author, &article, comment.id),
            Err(ApiError::NotFound)
        ));
    }

    #[test]
    fn comment_must_belong_to_the_article() {
        let mut conn = connection();
        let (_, author) = user(&mut conn, "author1");
        let first = Article::create(&mut conn, &author, &details("First", &[])).unwrap();
        let second = Article::create(&mut conn, &author, &details("Second", &[])).unwrap();
        let comment = add_comment(&mut conn, &author, &first, "on the first").unwrap();

        assert!(matches!(
            delete_comment(&mut conn, &author, &second, comment.id),
            Err(ApiError::NotFound)
        ));
    }

    #[test]
    fn deleting_the_article_drops_its_comments() {
        let mut conn = connection();
        let (_, author) = user(&mut conn, "author1");
        let article = Article::create(&mut conn, &author, &details("Short Lived", &[])).unwrap();
        add_comment(&mut conn, &author, &article, "one").unwrap();
        add_comment(&mut conn, &author, &article, "two").unwrap();

        Article::delete(&mut conn, &author, &article.slug).unwrap();
        let left = comments::table.count().get_result::<i64>(&mut conn).unwrap();
        assert_eq!(left, 0);
    }

    #[test]
    fn rendered_comment_has_author_profile() {
        let mut conn = connection();
        let (_, author) = user(&mut conn, "author1");
        let article = Article::create(&mut conn, &author, &details("Rendered", &[])).unwrap();
        let comment = add_comment(&mut conn, &author, &article, "hello").unwrap();

        let json = serde_json::to_value(render_comment(&mut conn, comment, None).unwrap()).unwrap();
        assert_eq!(json["body"], "hello");
        assert_eq!(json["author"]["username"], "author1");
        assert_eq!(json["author"]["following"], false);
        assert!(json["createdAt"].as_str().unwrap().ends_with('Z'));
    }
}
