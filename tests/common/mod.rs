#![allow(dead_code)]

use conduit::config::Config;
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::{Client, LocalResponse};
use serde_json::{json, Value};

pub const PASSWORD: &str = "password123";

/// A client over a fresh in-memory database.
pub fn client() -> Client {
    let app = conduit::rocket(Config::in_memory("integration-test-secret")).expect("valid rocket");
    Client::tracked(app).expect("valid rocket instance")
}

pub fn auth(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Token {}", token))
}

pub fn body(response: LocalResponse<'_>) -> Value {
    response.into_json::<Value>().expect("json body")
}

pub fn register(client: &Client, username: &str) -> String {
    let response = client
        .post("/api/users")
        .header(ContentType::JSON)
        .body(
            json!({
                "user": {
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": PASSWORD,
                }
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::Created);
    body(response)["user"]["token"]
        .as_str()
        .expect("token")
        .to_string()
}

/// Creates an article and returns its slug.
pub fn create_article(client: &Client, token: &str, title: &str, tags: &[&str]) -> String {
    let response = client
        .post("/api/articles")
        .header(ContentType::JSON)
        .header(auth(token))
        .body(
            json!({
                "article": {
                    "title": title,
                    "description": "Test description",
                    "body": "Test body",
                    "tagList": tags,
                }
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(response.status(), Status::Created);
    body(response)["article"]["slug"]
        .as_str()
        .expect("slug")
        .to_string()
}
