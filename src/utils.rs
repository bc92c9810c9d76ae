use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, status::Custom, Responder};
use rocket::serde::json::Json;
use serde::Serializer;
use serde_json::Value;

pub fn try_respond(req: &Request<'_>, json: Value, status: Status) -> response::Result<'static> {
    Custom(status, Json(json)).respond_to(req)
}

pub fn serialize_date<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = date.to_rfc3339_opts(SecondsFormat::Millis, true);
    serializer.serialize_str(&s)
}

/// Rows store naive UTC timestamps.
pub fn as_utc(date: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date, Utc)
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
