use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use diesel::{delete as diesel_delete, insert_into, update as diesel_update};
use serde::Deserialize;
use slug::slugify;
use std::collections::HashSet;
use tracing::info;

use crate::auth::Identity;
use crate::db::schema::{article_tags, article_users, articles, favorites, followers, tags, users};
use crate::ownership::{authorize, Owned, Participant};
use crate::types::{ApiError, ValidationError};
use crate::utils;

pub const TITLE_MIN: usize = 4;
pub const TITLE_MAX: usize = 255;
pub const DESCRIPTION_MAX: usize = 2048;
pub const BODY_MAX: usize = 2048;
pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// The authorship projection of a user. Articles, comments and favorites all
/// point here rather than at `users`.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = article_users)]
pub struct ArticleUser {
    pub id: i32,
    pub user_id: i32,
}

impl ArticleUser {
    /// Returns the single projection of `user_id`, creating it on first use.
    pub fn for_user(connection: &mut SqliteConnection, user_id: i32) -> Result<ArticleUser, ApiError> {
        insert_into(article_users::table)
            .values(article_users::user_id.eq(user_id))
            .on_conflict(article_users::user_id)
            .do_nothing()
            .execute(connection)?;

        article_users::table
            .filter(article_users::user_id.eq(user_id))
            .first::<ArticleUser>(connection)
            .map_err(|e| e.into())
    }

    /// Like `for_user`, but a token whose user no longer exists is unauthenticated.
    pub fn for_identity(
        connection: &mut SqliteConnection,
        identity: &Identity,
    ) -> Result<ArticleUser, ApiError> {
        let exists = users::table
            .find(identity.user_id)
            .select(users::id)
            .first::<i32>(connection)
            .optional()?;
        match exists {
            Some(user_id) => ArticleUser::for_user(connection, user_id),
            None => Err(ApiError::Unauthorized),
        }
    }

    /// Optional posture: a token for an unknown user reads as anonymous.
    pub fn for_viewer(
        connection: &mut SqliteConnection,
        viewer: Option<&Identity>,
    ) -> Result<Option<ArticleUser>, ApiError> {
        match viewer {
            Some(identity) => match ArticleUser::for_identity(connection, identity) {
                Ok(user) => Ok(Some(user)),
                Err(ApiError::Unauthorized) => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }
}

impl Participant for ArticleUser {
    fn participant_id(&self) -> i32 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Associations)]
#[diesel(belongs_to(ArticleUser, foreign_key = author_id))]
#[diesel(table_name = articles)]
pub struct Article {
    pub id: i32,
    pub author_id: i32,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

impl Owned for Article {
    fn owner_id(&self) -> i32 {
        self.author_id
    }

    fn describe(&self) -> String {
        format!("article {}", self.slug)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = articles)]
struct NewArticle<'a> {
    author_id: i32,
    slug: &'a str,
    title: &'a str,
    description: &'a str,
    body: &'a str,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = articles)]
struct ArticleChangeset<'a> {
    slug: Option<&'a str>,
    title: Option<&'a str>,
    description: Option<&'a str>,
    body: Option<&'a str>,
    updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = tags)]
pub struct Tag {
    pub id: i32,
    pub tag: String,
}

impl Tag {
    pub fn find_or_create(connection: &mut SqliteConnection, name: &str) -> Result<Tag, ApiError> {
        insert_into(tags::table)
            .values(tags::tag.eq(name))
            .on_conflict(tags::tag)
            .do_nothing()
            .execute(connection)?;

        tags::table
            .filter(tags::tag.eq(name))
            .first::<Tag>(connection)
            .map_err(|e| e.into())
    }

    /// Every tag attached to at least one live article.
    pub fn in_use(connection: &mut SqliteConnection) -> Result<Vec<String>, ApiError> {
        tags::table
            .inner_join(article_tags::table.inner_join(articles::table))
            .filter(articles::deleted_at.is_null())
            .select(tags::tag)
            .distinct()
            .order(tags::tag.asc())
            .load::<String>(connection)
            .map_err(|e| e.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDetails {
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(default)]
    pub tag_list: Vec<String>,
}

impl ArticleDetails {
    pub fn check(&self) -> Result<(), ValidationError> {
        let mut error = ValidationError::default();
        check_title(&self.title, &mut error);
        check_text("description", &self.description, DESCRIPTION_MAX, &mut error);
        check_text("body", &self.body, BODY_MAX, &mut error);
        if let Err(e) = tag_names(&self.tag_list) {
            error.merge(e);
        }
        error.into_result()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDetails {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub tag_list: Option<Vec<String>>,
}

impl UpdateDetails {
    pub fn check(&self) -> Result<(), ValidationError> {
        let mut error = ValidationError::default();
        if let Some(ref title) = self.title {
            check_title(title, &mut error);
        }
        if let Some(ref description) = self.description {
            check_text("description", description, DESCRIPTION_MAX, &mut error);
        }
        if let Some(ref body) = self.body {
            check_text("body", body, BODY_MAX, &mut error);
        }
        if let Some(ref tag_list) = self.tag_list {
            if let Err(e) = tag_names(tag_list) {
                error.merge(e);
            }
        }
        error.into_result()
    }
}

fn check_title(title: &str, error: &mut ValidationError) {
    let len = title.trim().chars().count();
    if len == 0 {
        error.add_error("title", "can't be empty");
    } else if len < TITLE_MIN {
        error.add_error("title", format!("is too short (minimum is {} characters)", TITLE_MIN));
    } else if title.chars().count() > TITLE_MAX {
        error.add_error("title", format!("is too long (maximum is {} characters)", TITLE_MAX));
    }
}

fn check_text(field: &str, value: &str, max: usize, error: &mut ValidationError) {
    if value.trim().is_empty() {
        error.add_error(field, "can't be empty");
    } else if value.chars().count() > max {
        error.add_error(field, format!("is too long (maximum is {} characters)", max));
    }
}

/// Tag names are kept verbatim; repeats collapse onto their first occurrence.
pub fn tag_names(names: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        if name.trim().is_empty() {
            return Err(ValidationError::from("tagList", "can't contain empty tags"));
        }
        if seen.insert(name.as_str()) {
            unique.push(name.clone());
        }
    }
    Ok(unique)
}

/// `slugify(title)`, or the first free `-N` suffix (N >= 2) when that is taken.
/// Soft-deleted rows still hold their slug.
pub fn unique_slug(
    connection: &mut SqliteConnection,
    title: &str,
    except: Option<i32>,
) -> Result<String, ApiError> {
    let base = match slugify(title) {
        ref s if s.is_empty() => "article".to_string(),
        s => s,
    };

    let taken = articles::table
        .select(articles::slug)
        .filter(
            articles::slug
                .eq(&base)
                .or(articles::slug.like(format!("{}-%", base))),
        )
        .filter(articles::id.ne(except.unwrap_or(0)))
        .load::<String>(connection)?
        .into_iter()
        .collect::<HashSet<_>>();

    if !taken.contains(&base) {
        return Ok(base);
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Listing filters. `followed_by` restricts to authors the given user follows.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub tag: Option<String>,
    pub author: Option<String>,
    pub favorited: Option<String>,
    pub followed_by: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ArticleFilter {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Live articles matching every set filter. Each filter is a subselect, so
    /// nothing is materialized before the final query.
    fn query(&self) -> articles::BoxedQuery<'_, Sqlite> {
        let mut query = articles::table
            .filter(articles::deleted_at.is_null())
            .into_boxed();

        if let Some(ref tag) = self.tag {
            query = query.filter(
                articles::id.eq_any(
                    article_tags::table
                        .inner_join(tags::table)
                        .filter(tags::tag.eq(tag))
                        .select(article_tags::article_id),
                ),
            );
        }

        if let Some(ref author) = self.author {
            query = query.filter(
                articles::author_id.eq_any(
                    article_users::table
                        .inner_join(users::table)
                        .filter(users::username.eq(author))
                        .select(article_users::id),
                ),
            );
        }

        if let Some(ref favoriter) = self.favorited {
            query = query.filter(
                articles::id.eq_any(
                    favorites::table
                        .inner_join(article_users::table.inner_join(users::table))
                        .filter(users::username.eq(favoriter))
                        .select(favorites::article_id),
                ),
            );
        }

        if let Some(follower) = self.followed_by {
            query = query.filter(
                articles::author_id.eq_any(
                    article_users::table
                        .filter(
                            article_users::user_id.eq_any(
                                followers::table
                                    .filter(followers::follower_id.eq(follower))
                                    .select(followers::user_id),
                            ),
                        )
                        .select(article_users::id),
                ),
            );
        }

        query
    }
}

impl Article {
    pub fn load_by_slug(connection: &mut SqliteConnection, slug_: &str) -> Result<Article, ApiError> {
        articles::table
            .filter(articles::slug.eq(slug_))
            .filter(articles::deleted_at.is_null())
            .first::<Article>(connection)
            .map_err(|e| e.into())
    }

    pub fn create(
        connection: &mut SqliteConnection,
        author: &ArticleUser,
        details: &ArticleDetails,
    ) -> Result<Article, ApiError> {
        details.check()?;
        let tag_list = tag_names(&details.tag_list)?;

        let article = connection.immediate_transaction::<_, ApiError, _>(|conn| {
            let slug = unique_slug(conn, &details.title, None)?;
            let now = utils::now();
            let new_article = NewArticle {
                author_id: author.id,
                slug: &slug,
                title: &details.title,
                description: &details.description,
                body: &details.body,
                created_at: now,
                updated_at: now,
            };
            let article = insert_into(articles::table)
                .values(&new_article)
                .get_result::<Article>(conn)
                .map_err(|e| ApiError::from(e).on_conflict("slug", "has already been taken"))?;
            article.replace_tags(conn, &tag_list)?;
            Ok(article)
        })?;

        info!(slug = %article.slug, author = author.id, "created article");
        Ok(article)
    }

    pub fn update(
        connection: &mut SqliteConnection,
        requester: &ArticleUser,
        slug_: &str,
        changes: &UpdateDetails,
    ) -> Result<Article, ApiError> {
        let article = Article::load_by_slug(connection, slug_)?;
        authorize(requester, &article).require()?;
        changes.check()?;

        let updated = connection.immediate_transaction::<_, ApiError, _>(|conn| {
            let new_slug = match changes.title {
                Some(ref title) if *title != article.title => {
                    Some(unique_slug(conn, title, Some(article.id))?)
                }
                _ => None,
            };
            let changeset = ArticleChangeset {
                slug: new_slug.as_deref(),
                title: changes.title.as_deref(),
                description: changes.description.as_deref(),
                body: changes.body.as_deref(),
                updated_at: utils::now(),
            };
            let updated = diesel_update(&article)
                .set(&changeset)
                .get_result::<Article>(conn)
                .map_err(|e| ApiError::from(e).on_conflict("slug", "has already been taken"))?;
            if let Some(ref tag_list) = changes.tag_list {
                updated.replace_tags(conn, &tag_names(tag_list)?)?;
            }
            Ok(updated)
        })?;

        info!(slug = %updated.slug, "updated article");
        Ok(updated)
    }

    /// Marks the article deleted and drops its comments.
    pub fn delete(
        connection: &mut SqliteConnection,
        requester: &ArticleUser,
        slug_: &str,
    ) -> Result<(), ApiError> {
        use crate::db::schema::comments;

        let article = Article::load_by_slug(connection, slug_)?;
        authorize(requester, &article).require()?;

        connection.immediate_transaction::<_, ApiError, _>(|conn| {
            diesel_delete(comments::table.filter(comments::article_id.eq(article.id)))
                .execute(conn)?;
            diesel_update(&article)
                .set(articles::deleted_at.eq(Some(utils::now())))
                .execute(conn)?;
            Ok(())
        })?;

        info!(slug = %article.slug, "deleted article");
        Ok(())
    }

    /// Idempotent: the (user, article) unique constraint absorbs repeats.
    pub fn favorite_by(&self, connection: &mut SqliteConnection, user: &ArticleUser) -> Result<(), ApiError> {
        insert_into(favorites::table)
            .values((
                favorites::user_id.eq(user.id),
                favorites::article_id.eq(self.id),
            ))
            .on_conflict((favorites::user_id, favorites::article_id))
            .do_nothing()
            .execute(connection)?;
        Ok(())
    }

    pub fn unfavorite_by(&self, connection: &mut SqliteConnection, user: &ArticleUser) -> Result<(), ApiError> {
        diesel_delete(
            favorites::table
                .filter(favorites::user_id.eq(user.id))
                .filter(favorites::article_id.eq(self.id)),
        )
        .execute(connection)?;
        Ok(())
    }

    pub fn favorites_count(&self, connection: &mut SqliteConnection) -> Result<i64, ApiError> {
        favorites::table
            .filter(favorites::article_id.eq(self.id))
            .count()
            .get_result::<i64>(connection)
            .map_err(|e| e.into())
    }

    pub fn is_favorited_by(&self, connection: &mut SqliteConnection, user: &ArticleUser) -> Result<bool, ApiError> {
        diesel::select(diesel::dsl::exists(
            favorites::table
                .filter(favorites::user_id.eq(user.id))
                .filter(favorites::article_id.eq(self.id)),
        ))
        .get_result::<bool>(connection)
        .map_err(|e| e.into())
    }

    /// Replaces the whole tag set.
    pub fn set_tags(&self, connection: &mut SqliteConnection, names: &[String]) -> Result<(), ApiError> {
        let names = tag_names(names)?;
        connection.immediate_transaction::<_, ApiError, _>(|conn| self.replace_tags(conn, &names))
    }

    /// `set_tags` without its own transaction; `names` must already be deduplicated.
    /// SQLite refuses to open an immediate transaction inside another one.
    fn replace_tags(&self, conn: &mut SqliteConnection, names: &[String]) -> Result<(), ApiError> {
        diesel_delete(article_tags::table.filter(article_tags::article_id.eq(self.id)))
            .execute(conn)?;
        for name in names {
            let tag = Tag::find_or_create(conn, name)?;
            insert_into(article_tags::table)
                .values((
                    article_tags::article_id.eq(self.id),
                    article_tags::tag_id.eq(tag.id),
                ))
                .execute(conn)?;
        }
        Ok(())
    }

    /// Tag names in the order they were attached.
    pub fn tag_list(&self, connection: &mut SqliteConnection) -> Result<Vec<String>, ApiError> {
        article_tags::table
            .inner_join(tags::table)
            .filter(article_tags::article_id.eq(self.id))
            .order(article_tags::id.asc())
            .select(tags::tag)
            .load::<String>(connection)
            .map_err(|e| e.into())
    }

    /// Live articles matching `filter`, newest first, and the total match count.
    pub fn list(
        connection: &mut SqliteConnection,
        filter: &ArticleFilter,
    ) -> Result<(Vec<Article>, i64), ApiError> {
        let count = filter.query().count().get_result::<i64>(connection)?;
        let page = filter
            .query()
            .order(articles::id.desc())
            .limit(filter.limit())
            .offset(filter.offset())
            .load::<Article>(connection)?;
        Ok((page, count))
    }
}
