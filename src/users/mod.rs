use diesel::prelude::*;
use diesel::{insert_into, update as diesel_update};
use rocket::serde::json::{Json, Value};
use rocket::{get, post, put, State};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::auth::{CurrentUser, Identity, IdentityProvider};
use crate::db::schema::users;
use crate::db::DbConnection;
use crate::types::{created, ApiError, ApiResult, CreatedResult, Validate, ValidationError};

pub mod models;
mod utils;

use self::models::{NewUser, User};
use self::utils::*;

#[derive(Debug, Deserialize)]
struct RegistrationDetails {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct Registration {
    user: RegistrationDetails,
}

/// Folds a field check into `errors`, passing storage failures straight through.
fn collect(errors: &mut ValidationError, result: Result<(), ApiError>) -> Result<(), ApiError> {
    match result {
        Ok(()) => Ok(()),
        Err(ApiError::Validation(e)) => {
            errors.merge(e);
            Ok(())
        }
        Err(other) => Err(other),
    }
}

impl Validate for Registration {
    type Error = ApiError;
    fn validate(self, connection: &mut SqliteConnection) -> Result<Self, Self::Error> {
        let mut errors = ValidationError::default();

        collect(
            &mut errors,
            validate_username(&self.user.username, None, connection),
        )?;
        collect(&mut errors, validate_email(&self.user.email, None, connection))?;
        if let Err(e) = validate_password(&self.user.password) {
            errors.merge(e);
        }

        errors.into_result()?;
        Ok(self)
    }
}

/// Resolves the token's user; a token for a vanished user is unauthenticated.
fn load_current(connection: &mut SqliteConnection, identity: &Identity) -> Result<User, ApiError> {
    match User::load(connection, identity.user_id) {
        Err(ApiError::Diesel(diesel::result::Error::NotFound)) => Err(ApiError::Unauthorized),
        other => other,
    }
}

#[post("/", format = "json", data = "<registration>")]
pub fn register(
    mut connection: DbConnection,
    provider: &State<IdentityProvider>,
    registration: Json<Registration>,
) -> CreatedResult<Value> {
    let registration = registration.validate(&mut connection)?.into_inner();
    let new_user = NewUser {
        username: registration.user.username,
        email: registration.user.email,
        password_hash: User::make_password(&registration.user.password)?,
    };

    let user = insert_into(users::table)
        .values(&new_user)
        .get_result::<User>(&mut *connection)
        .map_err(|e| ApiError::from(e).on_conflict("username", "has already been taken"))?;
    info!(user_id = user.id, username = %user.username, "registered user");

    let token = provider.issue_token(user.id)?;
    Ok(created(json!({ "user": user.view(token) })))
}

#[derive(Debug, Deserialize)]
struct LoginDetails {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    user: LoginDetails,
}

#[post("/login", format = "json", data = "<login>")]
pub fn login(
    mut connection: DbConnection,
    provider: &State<IdentityProvider>,
    login: Json<Login>,
) -> ApiResult<Value> {
    let user = match User::load_by_email(&mut connection, &login.user.email) {
        Ok(user) => user,
        Err(ApiError::Diesel(diesel::result::Error::NotFound)) => {
            debug!("login for unknown email");
            return Err(ApiError::Forbidden);
        }
        Err(e) => return Err(e),
    };
    if !user.verify_password(&login.user.password)? {
        debug!(user_id = user.id, "login with wrong password");
        return Err(ApiError::Forbidden);
    }

    let token = provider.issue_token(user.id)?;
    Ok(Json(json!({ "user": user.view(token) })))
}

#[get("/user")]
pub fn current(
    mut connection: DbConnection,
    provider: &State<IdentityProvider>,
    current_user: CurrentUser,
) -> ApiResult<Value> {
    let user = load_current(&mut connection, &current_user?)?;
    let token = provider.issue_token(user.id)?;
    Ok(Json(json!({ "user": user.view(token) })))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub image: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub user: UpdateUser,
}

/// Applies the fields present in `update` to `user`, collecting every failure.
pub fn apply_update(
    connection: &mut SqliteConnection,
    user: &mut User,
    update: UpdateUser,
) -> Result<(), ApiError> {
    let mut error = ValidationError::default();

    if let Some(new_email) = update.email {
        collect(&mut error, validate_email(&new_email, Some(user.id), connection))?;
        user.email = new_email;
    }

    if let Some(new_username) = update.username {
        collect(
            &mut error,
            validate_username(&new_username, Some(user.id), connection),
        )?;
        user.username = new_username;
    }

    if let Some(new_password) = update.password {
        match validate_password(&new_password) {
            Err(e) => error.merge(e),
            Ok(_) => user.new_password(&new_password)?,
        }
    }

    if let Some(bio) = update.bio {
        match validate_bio(&bio) {
            Err(e) => error.merge(e),
            Ok(_) => user.bio = Some(bio).filter(|b| !b.is_empty()),
        }
    }

    if let Some(image) = update.image {
        match validate_image(&image) {
            Err(e) => error.merge(e),
            Ok(_) => user.image = Some(image).filter(|i| !i.is_empty()),
        }
    }

    error.into_result()?;
    Ok(())
}

#[put("/user", format = "json", data = "<update>")]
pub fn update(
    current_user: CurrentUser,
    mut connection: DbConnection,
    provider: &State<IdentityProvider>,
    update: Json<Update>,
) -> ApiResult<Value> {
    let mut user = load_current(&mut connection, &current_user?)?;
    apply_update(&mut connection, &mut user, update.into_inner().user)?;

    diesel_update(&user)
        .set(&user)
        .execute(&mut *connection)
        .map_err(|e| ApiError::from(e).on_conflict("user", "username or email already taken"))?;
    info!(user_id = user.id, "updated user");

    let token = provider.issue_token(user.id)?;
    Ok(Json(json!({ "user": user.view(token) })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::models::tests::{connection, user};

    fn registration(username: &str, email: &str, password: &str) -> Registration {
        Registration {
            user: RegistrationDetails {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            },
        }
    }

    #[test]
    fn registration_collects_every_field_error() {
        let mut conn = connection();
        match registration("ab", "nope", "short").validate(&mut conn) {
            Err(ApiError::Validation(e)) => {
                assert!(e.contains_key("username"));
                assert!(e.contains_key("email"));
                assert!(e.contains_key("password"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn registration_rejects_taken_names() {
        let mut conn = connection();
        user(&mut conn, "jake");
        match registration("jake", "jake@example.com", "jakejake1").validate(&mut conn) {
            Err(ApiError::Validation(e)) => {
                assert!(e.contains_key("username"));
                assert!(e.contains_key("email"));
                assert!(!e.contains_key("password"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(registration("jacob", "jacob@example.com", "jakejake1")
            .validate(&mut conn)
            .is_ok());
    }

    #[test]
    fn update_keeps_absent_fields_and_allows_own_email() {
        let mut conn = connection();
        let (mut jake, _) = user(&mut conn, "jake");
        let before = jake.clone();
        let changes = UpdateUser {
            email: Some(before.email.clone()),
            bio: Some("I like to skateboard".to_string()),
            ..Default::default()
        };
        apply_update(&mut conn, &mut jake, changes).unwrap();

        assert_eq!(jake.username, before.username);
        assert_eq!(jake.email, before.email);
        assert_eq!(jake.password_hash, before.password_hash);
        assert_eq!(jake.bio.as_deref(), Some("I like to skateboard"));
    }

    #[test]
    fn update_rejects_someone_elses_username() {
        let mut conn = connection();
        let (mut jake, _) = user(&mut conn, "jake");
        user(&mut conn, "jane");
        let changes = UpdateUser {
            username: Some("jane".to_string()),
            bio: Some("b".repeat(BIO_MAX + 1)),
            ..Default::default()
        };
        match apply_update(&mut conn, &mut jake, changes) {
            Err(ApiError::Validation(e)) => {
                assert!(e.contains_key("username"));
                assert!(e.contains_key("bio"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn vanished_user_is_unauthorized() {
        let mut conn = connection();
        assert!(matches!(
            load_current(&mut conn, &Identity { user_id: 42 }),
            Err(ApiError::Unauthorized)
        ));
    }
}
