//! Upstream catalog API response shapes.

use serde::Deserialize;

use crate::domain::entities::{DramaPage, DramaSummary, Episode, EpisodeList};
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::serde_utils::{lenient_u32, string_or_number};

/// Status code the upstream uses for success.
pub const API_OK: u32 = 200;

/// Fields every response carries.
#[derive(Debug, Deserialize)]
pub struct ApiStatus {
    /// Upstream status code.
    #[serde(default, with = "lenient_u32")]
    pub code: u32,
    /// Status message.
    #[serde(default)]
    pub msg: String,
    /// Extra hint shown with errors.
    #[serde(default)]
    pub tips: String,
}

impl ApiStatus {
    /// Fails with the upstream message unless the code is 200.
    ///
    /// # Errors
    /// Returns `FetchError::Api` for non-success codes.
    pub fn ensure_ok(&self) -> FetchResult<()> {
        if self.code == API_OK {
            return Ok(());
        }
        let mut message = if self.msg.is_empty() {
            "unknown error".to_string()
        } else {
            self.msg.clone()
        };
        if !self.tips.is_empty() {
            message.push_str(": ");
            message.push_str(&self.tips);
        }
        Err(FetchError::api(i64::from(self.code), message))
    }
}

/// One drama in a listing.
#[derive(Debug, Deserialize)]
pub struct DramaItemResponse {
    /// Drama id.
    #[serde(default, with = "string_or_number")]
    pub book_id: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Cover image URL.
    #[serde(default)]
    pub cover: String,
    /// Number of episodes.
    #[serde(default, with = "lenient_u32")]
    pub episode_cnt: u32,
}

impl From<DramaItemResponse> for DramaSummary {
    fn from(item: DramaItemResponse) -> Self {
        Self {
            book_id: item.book_id,
            title: item.title,
            cover: item.cover,
            episode_count: item.episode_cnt,
        }
    }
}

/// Search and category listings.
#[derive(Debug, Deserialize)]
pub struct DramaListResponse {
    /// Response status.
    #[serde(flatten)]
    pub status: ApiStatus,
    /// Payload, absent on errors.
    #[serde(default)]
    pub data: Option<Vec<DramaItemResponse>>,
}

impl DramaListResponse {
    /// Converts into page `page`.
    ///
    /// # Errors
    /// Returns the upstream error for non-success codes.
    pub fn into_page(self, page: u32) -> FetchResult<DramaPage> {
        self.status.ensure_ok()?;
        let items = self
            .data
            .unwrap_or_default()
            .into_iter()
            .map(DramaSummary::from)
            .collect();
        Ok(DramaPage::new(page, items))
    }
}

/// One episode in a listing.
#[derive(Debug, Deserialize)]
pub struct EpisodeItemResponse {
    /// Video id.
    #[serde(default, with = "string_or_number")]
    pub video_id: String,
    /// Episode title.
    #[serde(default)]
    pub title: String,
}

/// Episode listing of one drama.
#[derive(Debug, Deserialize)]
pub struct EpisodeListResponse {
    /// Response status.
    #[serde(flatten)]
    pub status: ApiStatus,
    /// Payload, absent on errors.
    #[serde(default)]
    pub data: Option<Vec<EpisodeItemResponse>>,
    /// Drama title.
    #[serde(default)]
    pub book_name: String,
    /// Drama id.
    #[serde(default, with = "string_or_number")]
    pub book_id: String,
}

impl EpisodeListResponse {
    /// Converts into an episode list, falling back to `requested_id` when the
    /// response omits the drama id.
    ///
    /// # Errors
    /// Returns the upstream error for non-success codes.
    pub fn into_episodes(self, requested_id: &str) -> FetchResult<EpisodeList> {
        self.status.ensure_ok()?;
        let book_id = if self.book_id.is_empty() {
            requested_id.to_string()
        } else {
            self.book_id
        };
        Ok(EpisodeList {
            book_id,
            book_name: self.book_name,
            episodes: self
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|e| Episode {
                    video_id: e.video_id,
                    title: e.title,
                })
                .collect(),
        })
    }
}

/// Payload of a stream URL lookup.
#[derive(Debug, Default, Deserialize)]
pub struct VideoData {
    /// Playable stream URL.
    #[serde(default)]
    pub url: String,
}

/// Stream URL lookup.
#[derive(Debug, Deserialize)]
pub struct VideoResponse {
    /// Response status.
    #[serde(flatten)]
    pub status: ApiStatus,
    /// Payload, absent on errors.
    #[serde(default)]
    pub data: Option<VideoData>,
}

impl VideoResponse {
    /// Extracts the stream URL.
    ///
    /// # Errors
    /// Returns the upstream error, or a decode error when no URL is present.
    pub fn into_stream_url(self) -> FetchResult<String> {
        self.status.ensure_ok()?;
        self.data
            .map(|d| d.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| FetchError::decode("response carries no stream URL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drama_list_conversion() {
        let json = r#"{
            "code": 200,
            "msg": "ok",
            "page": "2",
            "data": [
                {"book_id": 7301, "title": "Return of the Heir", "cover": "https://c/1.jpg", "episode_cnt": "80"},
                {"book_id": "7302", "title": "Second", "cover": "", "episode_cnt": 12}
            ]
        }"#;
        let parsed: DramaListResponse = serde_json::from_str(json).unwrap();
        let page = parsed.into_page(2).unwrap();

        assert_eq!(page.page, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].book_id, "7301");
        assert_eq!(page.items[0].episode_count, 80);
        assert!(!page.has_more);
    }

    #[test]
    fn test_full_page_reports_more() {
        let items: Vec<String> = (0..20)
            .map(|i| format!(r#"{{"book_id": {i}, "title": "t{i}"}}"#))
            .collect();
        let json = format!(r#"{{"code": 200, "data": [{}]}}"#, items.join(","));
        let parsed: DramaListResponse = serde_json::from_str(&json).unwrap();

        assert!(parsed.into_page(1).unwrap().has_more);
    }

    #[test]
    fn test_error_code_carries_message_and_tips() {
        let json = r#"{"code": 400, "msg": "bad keyword", "tips": "try another", "data": null}"#;
        let parsed: DramaListResponse = serde_json::from_str(json).unwrap();

        assert_eq!(
            parsed.into_page(1),
            Err(FetchError::api(400, "bad keyword: try another"))
        );
    }

    #[test]
    fn test_episode_list_conversion() {
        let json = r#"{
            "code": 200,
            "book_name": "Return of the Heir",
            "book_id": 7301,
            "data": [{"video_id": 9001, "title": "Episode 1"}, {"video_id": "9002", "title": "Episode 2"}]
        }"#;
        let parsed: EpisodeListResponse = serde_json::from_str(json).unwrap();
        let list = parsed.into_episodes("7301").unwrap();

        assert_eq!(list.book_id, "7301");
        assert_eq!(list.book_name, "Return of the Heir");
        assert_eq!(list.episodes[1].video_id, "9002");
    }

    #[test]
    fn test_video_response_requires_url() {
        let ok: VideoResponse =
            serde_json::from_str(r#"{"code": 200, "data": {"url": "https://v/1.mp4"}}"#).unwrap();
        assert_eq!(ok.into_stream_url().unwrap(), "https://v/1.mp4");

        let empty: VideoResponse = serde_json::from_str(r#"{"code": 200, "data": {}}"#).unwrap();
        assert!(matches!(
            empty.into_stream_url(),
            Err(FetchError::Decode { .. })
        ));
    }
}
