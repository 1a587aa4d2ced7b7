//! Example domain: artists, their albums, and the albums' songs.
//!
//! ```text
//! /artists                                  Artist
//! /artists/{id0}/albums                     Album    (patchable)
//! /artists/{id0}/albums/{id1}/songs         Song     (end-dated)
//! /artists/{id0}/albums/events              album change stream
//! /health                                   liveness
//! ```
//!
//! The binary serves this tree and the integration tests drive it.

use crate::error::{ApiError, Result};
use crate::protocol::ServerSentEvent;
use crate::server::{Api, BroadcastHub, ResourceTree};
use crate::types::{EndDated, Patchable, Query, Resource, ResponseCodes, StatusBody, Verb};
use axum::http::{Method, StatusCode};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;

/// Top-level resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    /// Server-assigned id.
    #[serde(default)]
    pub id: String,
    /// Required.
    pub name: String,
    /// Matched by `?genre=` on list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl Artist {
    /// Artist with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Resource for Artist {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn bind(&mut self, _verb: Verb) -> std::result::Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::invalid("name is required"));
        }
        Ok(())
    }

    /// `?genre=jazz` narrows the listing.
    fn matches(&self, query: &Query) -> bool {
        match query.get("genre") {
            Some(genre) => self.genre.as_deref() == Some(genre.as_str()),
            None => true,
        }
    }
}

/// An artist's album. Accepts PATCH.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Album {
    /// Server-assigned id.
    #[serde(default)]
    pub id: String,
    /// Recorded from the path on create and put.
    #[serde(default)]
    pub artist_id: String,
    /// Required.
    pub title: String,
    /// Release year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

impl Album {
    /// Album with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl Resource for Album {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.artist_id)
    }

    fn set_parent_id(&mut self, parent_id: String) {
        self.artist_id = parent_id;
    }

    fn bind(&mut self, _verb: Verb) -> std::result::Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::invalid("title is required"));
        }
        Ok(())
    }

    fn as_patchable_mut(&mut self) -> Option<&mut dyn Patchable> {
        Some(self)
    }
}

impl Patchable for Album {
    fn apply_patch(&mut self, patch: Value) -> std::result::Result<(), ApiError> {
        let Value::Object(fields) = patch else {
            return Err(ApiError::invalid("patch must be a JSON object"));
        };
        let mut current =
            serde_json::to_value(&*self).map_err(|e| ApiError::internal(e.to_string()))?;
        if let Value::Object(target) = &mut current {
            target.extend(fields);
        }
        *self = serde_json::from_value(current)
            .map_err(|e| ApiError::invalid(format!("invalid patch: {e}")))?;
        Ok(())
    }
}

/// A song on an album. The first delete end-dates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// Server-assigned id.
    #[serde(default)]
    pub id: String,
    /// Recorded from the path on create and put.
    #[serde(default)]
    pub album_id: String,
    /// Song title.
    pub title: String,
    /// Position on the album.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    /// Set by the first delete.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<OffsetDateTime>,
}

impl Song {
    /// Song with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl EndDated for Song {
    fn end_date(&self) -> Option<OffsetDateTime> {
        self.end_date
    }

    fn set_end_date(&mut self, at: Option<OffsetDateTime>) {
        self.end_date = at;
    }
}

impl Resource for Song {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.album_id)
    }

    fn set_parent_id(&mut self, parent_id: String) {
        self.album_id = parent_id;
    }

    fn as_end_dated(&self) -> Option<&dyn EndDated> {
        Some(self)
    }

    fn as_end_dated_mut(&mut self) -> Option<&mut dyn EndDated> {
        Some(self)
    }
}

/// Event names published on the album stream.
pub mod events {
    /// An album was posted.
    pub const CREATED: &str = "created";
    /// An album was put or patched.
    pub const UPDATED: &str = "updated";
    /// An album was deleted; the data carries its id.
    pub const DELETED: &str = "deleted";
}

fn album_event(verb: Verb) -> &'static str {
    match verb {
        Verb::Create => events::CREATED,
        _ => events::UPDATED,
    }
}

/// Build the music tree, publishing album changes on `album_events`.
pub fn tree(album_events: BroadcastHub<ServerSentEvent>) -> Result<ResourceTree> {
    let on_write = album_events.clone();
    let on_delete = album_events.clone();

    let artists = Api::<Artist>::new("Artists", "artists").add_custom_root_route(
        Method::GET,
        "/health",
        || async { (StatusCode::OK, Json(StatusBody::new("OK"))) },
    );

    let albums = Api::<Album>::new("Albums", "albums")
        .after_create_or_update(move |album: &Album, verb| {
            let event = ServerSentEvent::json(album_event(verb), album)
                .map_err(|e| ApiError::internal(e.to_string()))?;
            on_write.publish(event);
            Ok(())
        })
        .after_delete(move |id| {
            on_delete.publish(ServerSentEvent::new(
                events::DELETED,
                json!({ "id": id }).to_string(),
            ));
            Ok(())
        })
        .add_custom_id_route(
            Method::GET,
            "/summary",
            |Extension(album): Extension<Album>| async move {
                Json(json!({ "id": album.id, "title": album.title }))
            },
        )
        .add_server_sent_events("/events", album_events);

    let songs = Api::<Song>::new("Songs", "songs")
        .with_response_codes(ResponseCodes::default().with(Verb::Put, StatusCode::NO_CONTENT));

    let mut tree = ResourceTree::new(artists);
    let albums = tree.add_child(tree.root(), albums)?;
    tree.add_child(albums, songs)?;
    Ok(tree)
}
