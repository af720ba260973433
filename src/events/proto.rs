//! Event names and payload types shared with the vessel daemon.
//!
//! The daemon serializes every payload untagged, so each event is a flat JSON
//! record keyed only by its SSE event name.

use serde::{Deserialize, Serialize};

/// SSE event name carrying a [`SearchReply`].
pub const SEARCH_REPLY: &str = "search_reply";
/// SSE event name carrying a [`DownloadStarted`].
pub const DOWNLOAD_STARTED: &str = "download_started";
/// SSE event name carrying a [`DownloadProgress`].
pub const DOWNLOAD_PROGRESS: &str = "download_progress";
/// SSE event name carrying a [`RoomList`].
pub const ROOM_LISTS: &str = "room_lists";
/// SSE event name carrying a [`ChatMessage`].
pub const CHAT_MESSAGE: &str = "chat_message";

/// A peer's answer to a distributed search, correlated by ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchReply {
    pub username: String,
    /// Absent in replies from daemons that broadcast without correlation;
    /// `0` is the wildcard ticket.
    #[serde(default)]
    pub ticket: u32,
    pub files: Vec<File>,
    pub slot_free: bool,
    pub average_speed: u32,
    pub queue_length: u64,
    pub locked_results: Vec<File>,
}

/// One shared file inside a search reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct File {
    pub name: String,
    pub size: u64,
    pub extension: String,
    pub attributes: Vec<FileAttribute>,
}

/// Audio metadata attribute (bitrate, duration, ...) attached to a file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileAttribute {
    pub place: u32,
    pub attribute: u32,
}

/// Emitted once when a transfer begins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadStarted {
    pub file_name: String,
    pub user_name: String,
    pub ticket: u32,
}

/// Emitted repeatedly while a transfer is running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadProgress {
    pub ticket: u32,
    pub percent: u64,
}

/// Room name paired with its user count.
pub type Rooms = Vec<(String, u32)>;

/// Full room listing pushed by the server after login and on membership
/// changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomList {
    pub rooms: Rooms,
    pub owned_private_rooms: Rooms,
    pub private_rooms: Rooms,
    pub operated_private_rooms: Vec<String>,
}

/// Public chat room message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub room: String,
    pub username: String,
    pub message: String,
}

/// Typed union of every event the SDK consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum VesselEvent {
    SearchReply(SearchReply),
    DownloadStarted(DownloadStarted),
    DownloadProgress(DownloadProgress),
    RoomList(RoomList),
    ChatMessage(ChatMessage),
}

impl VesselEvent {
    /// Decodes an SSE message into a typed event.
    ///
    /// Returns `Ok(None)` for event names the SDK does not consume (the
    /// daemon broadcasts many more); malformed JSON for a recognized name is
    /// an error.
    pub fn decode(event: &str, data: &str) -> Result<Option<Self>, serde_json::Error> {
        let decoded = match event {
            SEARCH_REPLY => Self::SearchReply(serde_json::from_str(data)?),
            DOWNLOAD_STARTED => Self::DownloadStarted(serde_json::from_str(data)?),
            DOWNLOAD_PROGRESS => Self::DownloadProgress(serde_json::from_str(data)?),
            ROOM_LISTS => Self::RoomList(serde_json::from_str(data)?),
            CHAT_MESSAGE => Self::ChatMessage(serde_json::from_str(data)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }

    /// The SSE event name this payload travels under.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SearchReply(_) => SEARCH_REPLY,
            Self::DownloadStarted(_) => DOWNLOAD_STARTED,
            Self::DownloadProgress(_) => DOWNLOAD_PROGRESS,
            Self::RoomList(_) => ROOM_LISTS,
            Self::ChatMessage(_) => CHAT_MESSAGE,
        }
    }

    /// Re-encodes the payload as the JSON it arrived as.
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::SearchReply(payload) => serde_json::to_string(payload),
            Self::DownloadStarted(payload) => serde_json::to_string(payload),
            Self::DownloadProgress(payload) => serde_json::to_string(payload),
            Self::RoomList(payload) => serde_json::to_string(payload),
            Self::ChatMessage(payload) => serde_json::to_string(payload),
        }
    }
}
