use diesel::prelude::*;
use pbkdf2::password_hash::rand_core::OsRng;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};
use serde::Serialize;
use std::borrow::Cow;
use tracing::error;

use crate::db::schema::users;
use crate::profile::Profile;
use crate::types::ApiError;

const PBKDF2_ROUNDS: u32 = 10_000;
const PBKDF2_OUTPUT_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(treat_none_as_null = true)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub password_hash: String,
}

/// The `user` body returned on register, login and update.
#[derive(Debug, Serialize)]
pub struct UserView<'a> {
    pub email: &'a str,
    pub token: String,
    pub username: &'a str,
    pub bio: Option<&'a str>,
    pub image: Option<&'a str>,
}

impl User {
    pub fn make_password(password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        let params = Params {
            rounds: PBKDF2_ROUNDS,
            output_length: PBKDF2_OUTPUT_LEN,
        };
        Pbkdf2
            .hash_password_customized(password.as_bytes(), None, None, params, &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("failed to hash password: {}", e);
                ApiError::Internal
            })
    }

    pub fn new_password(&mut self, password: &str) -> Result<(), ApiError> {
        self.password_hash = User::make_password(password)?;
        Ok(())
    }

    pub fn verify_password(&self, password_to_verify: &str) -> Result<bool, ApiError> {
        let hash = PasswordHash::new(&self.password_hash).map_err(|e| {
            error!(user_id = self.id, "stored password hash is unreadable: {}", e);
            ApiError::Internal
        })?;
        Ok(Pbkdf2
            .verify_password(password_to_verify.as_bytes(), &hash)
            .is_ok())
    }

    pub fn view(&self, token: String) -> UserView<'_> {
        UserView {
            email: &self.email,
            token,
            username: &self.username,
            bio: self.bio.as_deref(),
            image: self.image.as_deref(),
        }
    }

    pub fn into_profile(self, following: bool) -> Profile<'static> {
        Profile {
            username: Cow::Owned(self.username),
            bio: self.bio.map(Cow::Owned),
            image: self.image.map(Cow::Owned),
            following,
        }
    }

    pub fn load(connection: &mut SqliteConnection, user_id: i32) -> Result<User, ApiError> {
        users::table
            .find(user_id)
            .get_result::<User>(connection)
            .map_err(|e| e.into())
    }

    pub fn load_by_name(connection: &mut SqliteConnection, name: &str) -> Result<User, ApiError> {
        users::table
            .filter(users::username.eq(name))
            .get_result::<User>(connection)
            .map_err(|e| e.into())
    }

    pub fn load_by_email(connection: &mut SqliteConnection, email: &str) -> Result<User, ApiError> {
        users::table
            .filter(users::email.eq(email))
            .get_result::<User>(connection)
            .map_err(|e| e.into())
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}
