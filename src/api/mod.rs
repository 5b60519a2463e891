// Wire types shared with the extraction server and the enqueue API

pub mod remote;

use serde::{Deserialize, Serialize};

/// Body of `POST /download`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteDownloadRequest {
    pub url: String,
    #[serde(rename = "isYouTube")]
    pub is_youtube: bool,
    pub filename: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Body of `POST /get-file-size`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSizeRequest {
    pub url: String,
    #[serde(rename = "isYouTube")]
    pub is_youtube: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSizeResponse {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Media bytes returned by the extraction server.
#[derive(Debug, Clone)]
pub struct RemotePayload {
    pub bytes: Vec<u8>,
    pub content_disposition: Option<String>,
}

/// Caller-facing download request, as sent by the popup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, rename = "isYouTube")]
    pub is_youtube: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EnqueueResponse {
    Accepted {
        #[serde(rename = "downloadId")]
        download_id: String,
    },
    Rejected {
        error: String,
    },
}
