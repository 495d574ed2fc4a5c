use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hosted media referenced by a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentAsset {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl AttachmentAsset {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
            mime_type: None,
            description: None,
            uploaded_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl UploadedImage {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
            mime_type: None,
            file_name: None,
            size: None,
            uploaded_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GifOption {
    pub attachment: AttachmentAsset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GifSearchResponse {
    #[serde(default)]
    pub results: Vec<GifOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessageRequest {
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentAsset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessageRequest {
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentAsset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gif_search_response_tolerates_missing_results() {
        let parsed: GifSearchResponse = serde_json::from_str("{}").expect("parse");
        assert!(parsed.results.is_empty());
    }

    #[test]
    fn uploaded_image_reads_camel_case_fields() {
        let parsed: UploadedImage = serde_json::from_str(
            r#"{"url":"https://cdn.example/a.jpg","width":512,"height":512,"mimeType":"image/jpeg","fileName":"a.jpg","uploadedAt":"2024-05-01T10:00:00Z"}"#,
        )
        .expect("parse");
        assert_eq!(parsed.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(parsed.file_name.as_deref(), Some("a.jpg"));
        assert!(parsed.uploaded_at.is_some());
    }

    #[test]
    fn asset_omits_unset_optional_fields() {
        let json = serde_json::to_value(AttachmentAsset::from_url("https://cdn.example/x.gif"))
            .expect("json");
        assert_eq!(json, serde_json::json!({ "url": "https://cdn.example/x.gif" }));
    }
}
