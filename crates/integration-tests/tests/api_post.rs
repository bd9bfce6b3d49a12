use axum::http::StatusCode;
use integration_tests::TestApp;
use serde_json::json;

#[tokio::test]
async fn register_login_post_upvote_get() {
    let app = TestApp::new();
    let (token, user_id) = app.sign_up("ann").await;
    let post_id = app.create_post(&token, "Hello", "First post").await;

    let voted = app.put(&format!("/posts/upvote/{post_id}"), &token, None).await;
    assert_eq!(voted.status, StatusCode::OK, "{}", voted.body);
    assert_eq!(voted.body["data"]["upvoteCount"], 1);
    assert_eq!(voted.body["data"]["upvoters"], json!([user_id]));

    let fetched = app.get(&format!("/posts/{post_id}"), &token).await;
    assert_eq!(fetched.status, StatusCode::OK);
    let post = &fetched.body["data"];
    assert_eq!(post["title"], "Hello");
    assert_eq!(post["upvoteCount"], 1);
    assert_eq!(post["downvoteCount"], 0);
    assert_eq!(post["isUpvotedByUser"], true);
    assert_eq!(post["isDownvotedByUser"], false);
    assert_eq!(post["signedUrl"], serde_json::Value::Null);
    assert_eq!(post["createdBy"], user_id);
}

#[tokio::test]
async fn repeat_votes_are_rejected_and_opposite_votes_switch() {
    let app = TestApp::new();
    let (token, _) = app.sign_up("ann").await;
    let post_id = app.create_post(&token, "Votes", "body").await;

    app.put(&format!("/posts/upvote/{post_id}"), &token, None).await;
    let again = app.put(&format!("/posts/upvote/{post_id}"), &token, None).await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.body["success"], false);
    assert!(again.body["error"].as_str().unwrap().contains("already voted"));

    let switched = app.put(&format!("/posts/downvote/{post_id}"), &token, None).await;
    assert_eq!(switched.status, StatusCode::OK);
    let data = &switched.body["data"];
    assert_eq!(data["upvoteCount"], 0);
    assert_eq!(data["downvoteCount"], 1);
    assert_eq!(data["isUpvotedByUser"], false);
    assert_eq!(data["isDownvotedByUser"], true);
}

#[tokio::test]
async fn vote_state_is_per_viewer() {
    let app = TestApp::new();
    let (ann, _) = app.sign_up("ann").await;
    let (bob, _) = app.sign_up("bob").await;
    let post_id = app.create_post(&ann, "Shared", "body").await;

    app.put(&format!("/posts/upvote/{post_id}"), &ann, None).await;
    app.put(&format!("/posts/downvote/{post_id}"), &bob, None).await;

    let seen_by_bob = app.get(&format!("/posts/{post_id}"), &bob).await.body;
    assert_eq!(seen_by_bob["data"]["upvoteCount"], 1);
    assert_eq!(seen_by_bob["data"]["downvoteCount"], 1);
    assert_eq!(seen_by_bob["data"]["isUpvotedByUser"], false);
    assert_eq!(seen_by_bob["data"]["isDownvotedByUser"], true);
}

#[tokio::test]
async fn list_counts_and_searches() {
    let app = TestApp::new();
    let (token, _) = app.sign_up("ann").await;
    app.create_post(&token, "Rust ownership", "borrowing explained").await;
    app.create_post(&token, "Gardening", "tomatoes in spring").await;

    let all = app.get("/posts", &token).await;
    assert_eq!(all.status, StatusCode::OK);
    assert_eq!(all.body["count"], 2);
    assert_eq!(all.body["data"].as_array().unwrap().len(), 2);

    let found = app.get("/posts?query=tomatos", &token).await;
    assert_eq!(found.body["count"], 1);
    assert_eq!(found.body["data"][0]["title"], "Gardening");

    let none = app.get("/posts?query=kubernetes", &token).await;
    assert_eq!(none.status, StatusCode::OK);
    assert_eq!(none.body["count"], 0);
}

#[tokio::test]
async fn only_the_author_may_change_a_post() {
    let app = TestApp::new();
    let (ann, _) = app.sign_up("ann").await;
    let (bob, _) = app.sign_up("bob").await;
    let post_id = app.create_post(&ann, "Mine", "body").await;
    let uri = format!("/posts/{post_id}");

    let hijack = app.put(&uri, &bob, Some(json!({"title": "Yours"}))).await;
    assert_eq!(hijack.status, StatusCode::FORBIDDEN);
    assert_eq!(app.delete(&uri, &bob).await.status, StatusCode::FORBIDDEN);

    let edited = app.put(&uri, &ann, Some(json!({"title": "Still mine"}))).await;
    assert_eq!(edited.status, StatusCode::OK);
    assert_eq!(edited.body["data"]["title"], "Still mine");
    assert_eq!(edited.body["data"]["content"], "body");

    let empty = app.put(&uri, &ann, Some(json!({}))).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_a_post_removes_it_and_its_comments() {
    let app = TestApp::new();
    let (token, _) = app.sign_up("ann").await;
    let post_id = app.create_post(&token, "Short lived", "body").await;
    let comment = app.post("/comments", &token, json!({"body": "first", "postId": post_id})).await;
    let comment_id = comment.body["data"]["id"].as_str().unwrap().to_owned();

    let deleted = app.delete(&format!("/posts/{post_id}"), &token).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body, json!({"success": true, "data": {}}));

    let gone = app.get(&format!("/posts/{post_id}"), &token).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(gone.body["error"], format!("Post not found with id of {post_id}"));
    assert_eq!(app.get(&format!("/comments/{comment_id}"), &token).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_ids_and_missing_posts() {
    let app = TestApp::new();
    let (token, _) = app.sign_up("ann").await;

    let bad = app.get("/posts/not-a-uuid", &token).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad.body["success"], false);

    let missing = uuid::Uuid::new_v4();
    assert_eq!(app.get(&format!("/posts/{missing}"), &token).await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        app.put(&format!("/posts/upvote/{missing}"), &token, None).await.status,
        StatusCode::NOT_FOUND
    );

    let untitled = app.post("/posts", &token, json!({"content": "no title"})).await;
    assert_eq!(untitled.status, StatusCode::BAD_REQUEST);
}
