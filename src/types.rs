use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::SqliteConnection;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, status::Custom, Responder};
use rocket::serde::json::Json;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::error;

use crate::utils::try_respond;

pub trait Validate
where
    Self: Sized,
{
    type Error;
    fn validate(self, connection: &mut SqliteConnection) -> Result<Self, Self::Error>;
}

#[derive(Debug)]
pub enum ApiError {
    Diesel(DieselError),
    Validation(ValidationError),
    Conflict(ValidationError),
    Internal,
    Unauthorized,
    Forbidden,
    NotFound,
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> ApiError {
        ApiError::Diesel(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> ApiError {
        ApiError::Validation(err)
    }
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Diesel(DieselError::NotFound) | ApiError::NotFound => Status::NotFound,
            ApiError::Diesel(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
            | ApiError::Conflict(_) => Status::Conflict,
            ApiError::Validation(_) => Status::UnprocessableEntity,
            ApiError::Unauthorized => Status::Unauthorized,
            ApiError::Forbidden => Status::Forbidden,
            ApiError::Diesel(_) | ApiError::Internal => Status::InternalServerError,
        }
    }

    /// Turns a unique-constraint violation into a field-level conflict.
    pub fn on_conflict<K: Into<String>, V: Into<String>>(self, key: K, val: V) -> ApiError {
        match self {
            ApiError::Diesel(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                ApiError::Conflict(ValidationError::from(key, val))
            }
            other => other,
        }
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
pub type CreatedResult<T> = Result<Custom<Json<T>>, ApiError>;

pub fn created<T>(body: T) -> Custom<Json<T>> {
    Custom(Status::Created, Json(body))
}

#[derive(Debug, Serialize, Default, PartialEq)]
pub struct ValidationError(BTreeMap<String, Vec<String>>);

impl ValidationError {
    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        let entry = self.0.entry(key.into()).or_default();
        entry.push(val.into());
    }

    pub fn from<K: Into<String>, V: Into<String>>(key: K, val: V) -> Self {
        let mut error = ValidationError::default();
        error.add_error(key, val);
        error
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (key, errors) in other.0.into_iter() {
            let entry = self.0.entry(key).or_default();
            entry.extend(errors);
        }
    }

    pub fn empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// `Ok(())` when nothing was recorded, the collected errors otherwise.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        match self {
            ApiError::Validation(error) | ApiError::Conflict(error) => {
                try_respond(req, json!({ "errors": error }), status)
            }

            ApiError::Diesel(DieselError::NotFound) | ApiError::NotFound => {
                try_respond(req, json!({ "errors": { "body": ["entity not found"] } }), status)
            }

            ApiError::Diesel(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                try_respond(req, json!({ "errors": { "body": ["already exists"] } }), status)
            }

            ApiError::Unauthorized => try_respond(
                req,
                json!({ "errors": { "status": ["401 Unauthorized"] } }),
                status,
            ),

            ApiError::Forbidden => try_respond(
                req,
                json!({ "errors": { "status": ["403 Forbidden"] } }),
                status,
            ),

            ApiError::Diesel(e) => {
                error!(path = %req.uri(), "database error: {}", e);
                try_respond(req, json!({ "errors": { "body": ["internal error"] } }), status)
            }

            ApiError::Internal => {
                error!(path = %req.uri(), "internal error");
                try_respond(req, json!({ "errors": { "body": ["internal error"] } }), status)
            }
        }
    }
}

impl<T> Validate for Json<T>
where
    T: Validate,
{
    type Error = <T as Validate>::Error;
    fn validate(self, connection: &mut SqliteConnection) -> Result<Self, Self::Error> {
        let inner = self.into_inner();
        let validated = inner.validate(connection)?;
        Ok(Json(validated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_every_message_per_field() {
        let mut errors = ValidationError::from("email", "is invalid");
        let mut other = ValidationError::from("email", "has already been taken");
        other.add_error("password", "is too short");
        errors.merge(other);

        assert_eq!(errors.len(), 2);
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!({
                "email": ["is invalid", "has already been taken"],
                "password": ["is too short"],
            })
        );
    }

    #[test]
    fn unique_violation_becomes_a_conflict() {
        let err = ApiError::Diesel(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("UNIQUE constraint failed: articles.slug".to_string()),
        ))
        .on_conflict("slug", "has already been taken");

        assert_eq!(err.status(), Status::Conflict);
        match err {
            ApiError::Conflict(e) => assert!(e.contains_key("slug")),
            other => panic!("expected a conflict, got {:?}", other),
        }
    }

    #[test]
    fn other_errors_pass_through_on_conflict() {
        let err = ApiError::Forbidden.on_conflict("slug", "taken");
        assert_eq!(err.status(), Status::Forbidden);
    }

    #[test]
    fn storage_failures_are_internal() {
        assert_eq!(
            ApiError::Diesel(DieselError::RollbackTransaction).status(),
            Status::InternalServerError
        );
        assert_eq!(ApiError::Diesel(DieselError::NotFound).status(), Status::NotFound);
    }
}
