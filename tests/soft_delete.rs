mod common;

use axum::http::{Method, StatusCode};
use canopy_axum_http::music;
use canopy_axum_http::BroadcastHub;
use common::{call, id_of};
use serde_json::json;

#[tokio::test]
async fn test_end_dated_delete_lifecycle() {
    let app = music::tree(BroadcastHub::new()).unwrap().router().unwrap();

    let (_, artist) = call(&app, Method::POST, "/artists", Some(json!({ "name": "A" }))).await;
    let artist = id_of(&artist);
    let (_, album) = call(
        &app,
        Method::POST,
        &format!("/artists/{artist}/albums"),
        Some(json!({ "title": "T" })),
    )
    .await;
    let album = id_of(&album);

    let songs = format!("/artists/{artist}/albums/{album}/songs");
    let (status, song) = call(&app, Method::POST, &songs, Some(json!({ "title": "S" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let song_path = format!("{songs}/{}", id_of(&song));

    // First delete end-dates.
    let (status, _) = call(&app, Method::DELETE, &song_path, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, Method::GET, &song_path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["end_date"].is_string());

    let (_, listed) = call(&app, Method::GET, &songs, None).await;
    assert_eq!(listed, json!([]));
    let (_, listed) = call(&app, Method::GET, &format!("{songs}?end_dated=true"), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Second delete removes.
    let (status, _) = call(&app, Method::DELETE, &song_path, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, Method::GET, &song_path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "status": "Resource not found." }));

    // Third delete has nothing left.
    let (status, _) = call(&app, Method::DELETE, &song_path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_plain_delete_is_immediate() {
    let app = music::tree(BroadcastHub::new()).unwrap().router().unwrap();

    let (_, artist) = call(&app, Method::POST, "/artists", Some(json!({ "name": "A" }))).await;
    let path = format!("/artists/{}", id_of(&artist));

    let (status, _) = call(&app, Method::DELETE, &path, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::GET, &path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
