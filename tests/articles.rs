mod common;

use common::*;
use rocket::http::{ContentType, Status};
use serde_json::json;

#[test]
fn create_requires_authentication() {
    let client = client();
    let response = client
        .post("/api/articles")
        .header(ContentType::JSON)
        .body(json!({"article": {"title": "Test Article", "description": "d", "body": "b"}}).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
}

#[test]
fn create_and_get_article() {
    let client = client();
    let token = register(&client, "author1");
    let slug = create_article(&client, &token, "Test Article", &["rust", "web"]);
    assert_eq!(slug, "test-article");

    let response = client.get(format!("/api/articles/{}", slug)).dispatch();
    assert_eq!(response.status(), Status::Ok);
    let article = body(response);
    assert_eq!(article["article"]["title"], "Test Article");
    assert_eq!(article["article"]["tagList"], json!(["rust", "web"]));
    assert_eq!(article["article"]["favorited"], false);
    assert_eq!(article["article"]["favoritesCount"], 0);
    assert_eq!(article["article"]["author"]["username"], "author1");
    assert!(article["article"]["createdAt"].as_str().unwrap().ends_with('Z'));

    assert_eq!(
        client.get("/api/articles/no-such-article").dispatch().status(),
        Status::NotFound
    );
}

#[test]
fn invalid_article_is_unprocessable() {
    let client = client();
    let token = register(&client, "author1");
    let response = client
        .post("/api/articles")
        .header(ContentType::JSON)
        .header(auth(&token))
        .body(json!({"article": {"title": "abc", "description": "", "body": "b"}}).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let errors = body(response);
    assert!(errors["errors"]["title"].is_array());
    assert!(errors["errors"]["description"].is_array());
}

#[test]
fn only_the_author_may_update() {
    let client = client();
    let author = register(&client, "author1");
    let other = register(&client, "otheruser");
    let slug = create_article(&client, &author, "Original Title", &[]);
    let path = format!("/api/articles/{}", slug);

    let response = client
        .put(path.as_str())
        .header(ContentType::JSON)
        .header(auth(&other))
        .body(json!({"article": {"body": "Hijacked"}}).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .put(path.as_str())
        .header(ContentType::JSON)
        .header(auth(&author))
        .body(json!({"article": {"title": "Updated Title"}}).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let article = body(response);
    assert_eq!(article["article"]["slug"], "updated-title");
    assert_eq!(article["article"]["body"], "Test body");
}

#[test]
fn delete_hides_the_article_everywhere() {
    let client = client();
    let author = register(&client, "author1");
    let other = register(&client, "otheruser");
    let slug = create_article(&client, &author, "Doomed Article", &["doomed"]);
    let path = format!("/api/articles/{}", slug);

    assert_eq!(
        client.delete(path.as_str()).header(auth(&other)).dispatch().status(),
        Status::Forbidden
    );
    assert_eq!(
        client.delete(path.as_str()).header(auth(&author)).dispatch().status(),
        Status::Ok
    );
    assert_eq!(client.get(path.as_str()).dispatch().status(), Status::NotFound);

    let list = body(client.get("/api/articles").dispatch());
    assert_eq!(list["articlesCount"], 0);
    assert_eq!(list["articles"], json!([]));

    let tags = body(client.get("/api/tags").dispatch());
    assert_eq!(tags["tags"], json!([]));

    // The slug stays reserved.
    let again = create_article(&client, &author, "Doomed Article", &[]);
    assert_eq!(again, "doomed-article-2");
}

#[test]
fn favorites_are_idempotent() {
    let client = client();
    let author = register(&client, "author1");
    let fan = register(&client, "fanuser");
    let slug = create_article(&client, &author, "Popular Article", &[]);
    let path = format!("/api/articles/{}/favorite", slug);

    for _ in 0..2 {
        let response = client.post(path.as_str()).header(auth(&fan)).dispatch();
        assert_eq!(response.status(), Status::Ok);
        let article = body(response);
        assert_eq!(article["article"]["favorited"], true);
        assert_eq!(article["article"]["favoritesCount"], 1);
    }

    let anonymous = body(client.get(format!("/api/articles/{}", slug)).dispatch());
    assert_eq!(anonymous["article"]["favorited"], false);
    assert_eq!(anonymous["article"]["favoritesCount"], 1);

    let response = client.delete(path.as_str()).header(auth(&fan)).dispatch();
    let article = body(response);
    assert_eq!(article["article"]["favorited"], false);
    assert_eq!(article["article"]["favoritesCount"], 0);
}

#[test]
fn unfavorite_without_favorite_is_harmless() {
    let client = client();
    let author = register(&client, "author1");
    let slug = create_article(&client, &author, "Never Liked", &[]);

    let response = client
        .delete(format!("/api/articles/{}/favorite", slug))
        .header(auth(&author))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(body(response)["article"]["favorited"], false);
}

#[test]
fn listing_filters_and_pages() {
    let client = client();
    let alice = register(&client, "alice1");
    let bobby = register(&client, "bobby");
    let first = create_article(&client, &alice, "Alice First", &["rust"]);
    create_article(&client, &alice, "Alice Second", &["go"]);
    create_article(&client, &bobby, "Bobby First", &["rust"]);
    client
        .post(format!("/api/articles/{}/favorite", first))
        .header(auth(&bobby))
        .dispatch();

    let all = body(client.get("/api/articles").dispatch());
    assert_eq!(all["articlesCount"], 3);
    assert_eq!(all["articles"][0]["slug"], "bobby-first");

    let by_tag = body(client.get("/api/articles?tag=rust").dispatch());
    assert_eq!(by_tag["articlesCount"], 2);

    let by_author = body(client.get("/api/articles?author=alice1").dispatch());
    assert_eq!(by_author["articlesCount"], 2);

    let favorited = body(client.get("/api/articles?favorited=bobby").dispatch());
    assert_eq!(favorited["articlesCount"], 1);
    assert_eq!(favorited["articles"][0]["slug"], first.as_str());

    let paged = body(client.get("/api/articles?limit=1&offset=1").dispatch());
    assert_eq!(paged["articlesCount"], 3);
    assert_eq!(paged["articles"].as_array().unwrap().len(), 1);
    assert_eq!(paged["articles"][0]["slug"], "alice-second");

    let tags = body(client.get("/api/tags").dispatch());
    assert_eq!(tags["tags"], json!(["go", "rust"]));
}

#[test]
fn feed_shows_followed_authors() {
    let client = client();
    let reader = register(&client, "reader");
    let writer = register(&client, "writer");
    let stranger = register(&client, "stranger");
    create_article(&client, &writer, "Writer Post", &[]);
    create_article(&client, &stranger, "Stranger Post", &[]);

    assert_eq!(
        client.get("/api/articles/feed").dispatch().status(),
        Status::Unauthorized
    );

    let empty = body(client.get("/api/articles/feed").header(auth(&reader)).dispatch());
    assert_eq!(empty["articlesCount"], 0);

    client
        .post("/api/profiles/writer/follow")
        .header(auth(&reader))
        .dispatch();
    let feed = body(client.get("/api/articles/feed").header(auth(&reader)).dispatch());
    assert_eq!(feed["articlesCount"], 1);
    assert_eq!(feed["articles"][0]["slug"], "writer-post");
    assert_eq!(feed["articles"][0]["author"]["following"], true);
}
