use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::{delete as diesel_delete, insert_into, select};
use rocket::serde::json::Json;
use rocket::{delete, get, post};
use serde::Serialize;
use std::borrow::Cow;
use tracing::info;

use crate::auth::{CurrentUser, MaybeUser};
use crate::db::schema::followers;
use crate::db::DbConnection;
use crate::types::*;
use crate::users::models::User;

#[derive(Debug, Serialize)]
pub struct ProfileResponse<'a> {
    profile: Profile<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile<'a> {
    pub username: Cow<'a, str>,
    pub bio: Option<Cow<'a, str>>,
    pub image: Option<Cow<'a, str>>,
    pub following: bool,
}

pub fn is_following(
    connection: &mut SqliteConnection,
    follower: i32,
    followed: i32,
) -> Result<bool, ApiError> {
    select(exists(
        followers::table
            .filter(followers::user_id.eq(followed))
            .filter(followers::follower_id.eq(follower)),
    ))
    .get_result::<bool>(connection)
    .map_err(|e| e.into())
}

/// Whether an optional viewer follows `user`; anonymous viewers follow nobody.
pub fn viewer_follows(
    connection: &mut SqliteConnection,
    viewer: Option<i32>,
    user: &User,
) -> Result<bool, ApiError> {
    match viewer {
        Some(viewer) => is_following(connection, viewer, user.id),
        None => Ok(false),
    }
}

pub fn follow_user(connection: &mut SqliteConnection, follower: i32, followed: &User) -> Result<(), ApiError> {
    if follower == followed.id {
        return Err(ValidationError::from("profile", "can't follow yourself").into());
    }
    insert_into(followers::table)
        .values((
            followers::user_id.eq(followed.id),
            followers::follower_id.eq(follower),
        ))
        .on_conflict((followers::user_id, followers::follower_id))
        .do_nothing()
        .execute(connection)?;
    info!(follower, followed = followed.id, "followed user");
    Ok(())
}

pub fn unfollow_user(connection: &mut SqliteConnection, follower: i32, followed: &User) -> Result<(), ApiError> {
    diesel_delete(
        followers::table
            .filter(followers::user_id.eq(followed.id))
            .filter(followers::follower_id.eq(follower)),
    )
    .execute(connection)?;
    Ok(())
}

#[get("/profiles/<name>")]
pub fn profile(
    mut connection: DbConnection,
    current_user: MaybeUser,
    name: &str,
) -> ApiResult<ProfileResponse<'static>> {
    let user = User::load_by_name(&mut connection, name)?;
    let following = viewer_follows(&mut connection, current_user.map(|u| u.user_id), &user)?;
    Ok(Json(ProfileResponse {
        profile: user.into_profile(following),
    }))
}

#[post("/profiles/<name>/follow")]
pub fn follow(
    mut connection: DbConnection,
    current_user: CurrentUser,
    name: &str,
) -> ApiResult<ProfileResponse<'static>> {
    let current = current_user?;
    let followed = User::load_by_name(&mut connection, name)?;
    follow_user(&mut connection, current.user_id, &followed)?;
    Ok(Json(ProfileResponse {
        profile: followed.into_profile(true),
    }))
}

#[delete("/profiles/<name>/follow")]
pub fn unfollow(
    mut connection: DbConnection,
    current_user: CurrentUser,
    name: &str,
) -> ApiResult<ProfileResponse<'static>> {
    let current = current_user?;
    let followed = User::load_by_name(&mut connection, name)?;
    unfollow_user(&mut connection, current.user_id, &followed)?;
    Ok(Json(ProfileResponse {
        profile: followed.into_profile(false),
    }))
}
