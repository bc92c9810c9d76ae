#[macro_use]
extern crate diesel;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;

pub mod article;
pub mod auth;
pub mod comment;
pub mod config;
pub mod db;
pub mod errors;
pub mod headers;
pub mod ownership;
pub mod profile;
pub mod types;
pub mod users;
pub mod utils;

use rocket::http::Status;
use rocket::serde::json::{json, Value};
use rocket::{catch, catchers, routes, Build, Request, Rocket};
use tracing::info;

use crate::auth::IdentityProvider;
use crate::config::Config;

fn error_body(status: Status) -> Value {
    json!({ "errors": { "status": [status.to_string()] } })
}

#[catch(400)]
fn bad_request(_req: &Request) -> Value {
    error_body(Status::BadRequest)
}

#[catch(401)]
fn unauthorized(_req: &Request) -> Value {
    error_body(Status::Unauthorized)
}

#[catch(404)]
fn not_found(_req: &Request) -> Value {
    json!({ "errors": { "body": ["entity not found"] } })
}

#[catch(422)]
fn unprocessable_entity(_req: &Request) -> Value {
    json!({ "errors": { "body": ["request body could not be parsed"] } })
}

#[catch(500)]
fn internal_error(_req: &Request) -> Value {
    error_body(Status::InternalServerError)
}

#[catch(503)]
fn service_unavailable(_req: &Request) -> Value {
    error_body(Status::ServiceUnavailable)
}

/// Builds the application: pool, token issuer, routes, catchers and fairings.
pub fn rocket(config: Config) -> errors::Result<Rocket<Build>> {
    let pool = db::init_pool(&config)?;
    let identity = IdentityProvider::from_config(&config)?;
    info!(pool_size = pool.max_size(), "configured application");

    Ok(rocket::build()
        .manage(pool)
        .manage(identity)
        .mount("/api/users", routes![users::register, users::login])
        .mount("/api", routes![users::current, users::update])
        .mount(
            "/api",
            routes![profile::profile, profile::follow, profile::unfollow],
        )
        .mount("/api", routes![article::tags])
        .mount(
            "/api/articles",
            routes![
                article::list_articles,
                article::feed,
                article::create_article,
                article::get_article,
                article::update_article,
                article::delete_article,
                article::favorite,
                article::unfavorite,
                comment::add,
                comment::list,
                comment::remove,
            ],
        )
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                not_found,
                unprocessable_entity,
                internal_error,
                service_unavailable
            ],
        )
        .attach(headers::SecurityHeaders))
}
