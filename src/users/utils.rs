use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::select;
use regex::Regex;

use crate::db::schema::users;
use crate::types::{ApiError, ValidationError};

pub const USERNAME_MIN: usize = 4;
pub const USERNAME_MAX: usize = 255;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 255;
pub const BIO_MAX: usize = 1024;

lazy_static! {
    static ref EMAIL_RE: Regex = {
        let pattern = r"\A[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\z";
        Regex::new(pattern).unwrap()
    };
    static ref USERNAME_RE: Regex = Regex::new(r"\A[A-Za-z0-9]+\z").unwrap();
    static ref IMAGE_RE: Regex = Regex::new(r"\Ahttps?://\S+\z").unwrap();
}

pub fn validate_email_re(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(&email.to_lowercase()) {
        Err(ValidationError::from(
            "email",
            format!("Invalid email: {}", email),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_username_re(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if len < USERNAME_MIN {
        Err(ValidationError::from(
            "username",
            format!("username too short: {}", username),
        ))
    } else if len > USERNAME_MAX {
        Err(ValidationError::from("username", "username too long"))
    } else if !USERNAME_RE.is_match(username) {
        Err(ValidationError::from(
            "username",
            "username must be alphanumeric",
        ))
    } else {
        Ok(())
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < PASSWORD_MIN {
        Err(ValidationError::from("password", "Password too short"))
    } else if len > PASSWORD_MAX {
        Err(ValidationError::from("password", "Password too long"))
    } else {
        Ok(())
    }
}

pub fn validate_bio(bio: &str) -> Result<(), ValidationError> {
    if bio.chars().count() > BIO_MAX {
        Err(ValidationError::from("bio", "bio too long"))
    } else {
        Ok(())
    }
}

/// Empty means "no image"; anything else must be an http(s) URL.
pub fn validate_image(image: &str) -> Result<(), ValidationError> {
    if image.is_empty() || IMAGE_RE.is_match(image) {
        Ok(())
    } else {
        Err(ValidationError::from("image", format!("Invalid image url: {}", image)))
    }
}

/// Uniqueness checks skip `except`, the user being updated.
pub fn email_taken(
    email_to_check: &str,
    except: Option<i32>,
    connection: &mut SqliteConnection,
) -> Result<bool, ApiError> {
    let expr = users::table
        .filter(users::email.eq(email_to_check))
        .filter(users::id.ne(except.unwrap_or(0)));
    select(exists(expr))
        .get_result::<bool>(connection)
        .map_err(|e| e.into())
}

pub fn username_taken(
    username_to_check: &str,
    except: Option<i32>,
    connection: &mut SqliteConnection,
) -> Result<bool, ApiError> {
    let expr = users::table
        .filter(users::username.eq(username_to_check))
        .filter(users::id.ne(except.unwrap_or(0)));
    select(exists(expr))
        .get_result::<bool>(connection)
        .map_err(|e| e.into())
}

pub fn validate_email(
    email_to_validate: &str,
    except: Option<i32>,
    connection: &mut SqliteConnection,
) -> Result<(), ApiError> {
    let mut errors = ValidationError::default();
    if let Err(e) = validate_email_re(email_to_validate) {
        errors.merge(e);
    }
    if email_taken(email_to_validate, except, connection)? {
        errors.add_error("email", "Email already exists");
    }
    errors.into_result().map_err(|e| e.into())
}

pub fn validate_username(
    username_to_validate: &str,
    except: Option<i32>,
    connection: &mut SqliteConnection,
) -> Result<(), ApiError> {
    let mut errors = ValidationError::default();
    if let Err(e) = validate_username_re(username_to_validate) {
        errors.merge(e);
    }
    if username_taken(username_to_validate, except, connection)? {
        errors.add_error("username", "username already exists");
    }
    errors.into_result().map_err(|e| e.into())
}
