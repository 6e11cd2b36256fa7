//! Resolves the heterogeneous media
//! fields of an upstream post payload
//! into a single [`MediaKind`]. Every
//! render site works off the resolved
//! value.
use chrono::{
  TimeZone,
  Utc
};
use serde_json::Value;

use crate::domain::model::{
  GalleryItem,
  MediaKind,
  Post
};

const IMAGE_EXTENSIONS: [&str; 5] = [
  ".jpg", ".jpeg", ".png", ".gif", ".webp"
];

/// Builds a [`Post`] from one listing
/// child's `data` object.
///
/// Returns `None` when the payload has
/// no usable id.
pub fn normalize_post(
  data: &Value
) -> Option<Post> {
  let id = str_field(data, "id")?
    .trim()
    .to_string();

  if id.is_empty() {
    return None;
  }

  let created_at = data
    .get("created_utc")
    .and_then(Value::as_f64)
    .and_then(|secs| {
      Utc
        .timestamp_opt(secs as i64, 0)
        .single()
    })
    .unwrap_or_default();

  Some(Post {
    id,
    title: decode_entities(
      str_field(data, "title")
        .unwrap_or_default()
    ),
    author: str_field(data, "author")
      .unwrap_or("[deleted]")
      .to_string(),
    subreddit: str_field(
      data,
      "subreddit"
    )
    .unwrap_or_default()
    .to_string(),
    permalink: str_field(
      data,
      "permalink"
    )
    .unwrap_or_default()
    .to_string(),
    created_at,
    score: data
      .get("score")
      .and_then(Value::as_i64)
      .unwrap_or(0),
    nsfw: data
      .get("over_18")
      .and_then(Value::as_bool)
      .unwrap_or(false),
    media: classify(data)
  })
}

/// Gallery, then video, then image, then
/// self text; anything else is a link.
/// Crossposts borrow the parent's media
/// when the outer post carries none.
pub fn classify(data: &Value) -> MediaKind {
  if let Some(media) = classify_media(data)
  {
    return media;
  }

  if let Some(parent) = data
    .get("crosspost_parent_list")
    .and_then(Value::as_array)
    .and_then(|list| list.first())
    && let Some(media) =
      classify_media(parent)
  {
    return media;
  }

  if data
    .get("is_self")
    .and_then(Value::as_bool)
    .unwrap_or(false)
  {
    return MediaKind::Text {
      body: str_field(data, "selftext")
        .unwrap_or_default()
        .to_string()
    };
  }

  let url = str_field(data, "url")
    .unwrap_or_default()
    .to_string();

  let domain = str_field(data, "domain")
    .map(str::to_string)
    .or_else(|| url_host(&url))
    .unwrap_or_default();

  MediaKind::Link {
    url,
    domain
  }
}

fn classify_media(
  data: &Value
) -> Option<MediaKind> {
  if let Some(items) = gallery_items(data)
  {
    return Some(MediaKind::Gallery {
      items
    });
  }

  if let Some(url) = video_url(data) {
    return Some(MediaKind::Video {
      url,
      poster: preview_image(data)
    });
  }

  let url = str_field(data, "url")
    .map(decode_entities)?;

  let lower = url.to_lowercase();

  let path = lower
    .split(['?', '#'])
    .next()
    .unwrap_or_default();

  if path.ends_with(".gifv") {
    let stem = url
      .get(..path.len() - ".gifv".len())
      .unwrap_or(url.as_str());

    return Some(MediaKind::Video {
      url:    format!("{stem}.mp4"),
      poster: preview_image(data)
    });
  }

  let hinted = str_field(data, "post_hint")
    == Some("image");

  if hinted
    || IMAGE_EXTENSIONS
      .iter()
      .any(|ext| path.ends_with(ext))
  {
    return Some(MediaKind::Image {
      url
    });
  }

  None
}

fn gallery_items(
  data: &Value
) -> Option<Vec<GalleryItem>> {
  if !data
    .get("is_gallery")
    .and_then(Value::as_bool)
    .unwrap_or(false)
  {
    return None;
  }

  let metadata =
    data.get("media_metadata")?;

  let items = data
    .get("gallery_data")
    .and_then(|g| g.get("items"))
    .and_then(Value::as_array)?;

  let resolved: Vec<GalleryItem> = items
    .iter()
    .filter_map(|item| {
      let media_id =
        str_field(item, "media_id")?;

      let source = metadata
        .get(media_id)?
        .get("s")?;

      let url = str_field(source, "u")
        .or_else(|| {
          str_field(source, "gif")
        })?;

      Some(GalleryItem {
        url:     decode_entities(url),
        caption: str_field(
          item, "caption"
        )
        .filter(|c| !c.is_empty())
        .map(decode_entities)
      })
    })
    .collect();

  if resolved.is_empty() {
    None
  } else {
    Some(resolved)
  }
}

fn video_url(data: &Value) -> Option<String> {
  ["secure_media", "media"]
    .iter()
    .find_map(|key| {
      data
        .get(*key)
        .and_then(|m| m.get("reddit_video"))
        .and_then(|v| {
          str_field(v, "fallback_url")
        })
    })
    .or_else(|| {
      data
        .get("preview")
        .and_then(|p| {
          p.get("reddit_video_preview")
        })
        .and_then(|v| {
          str_field(v, "fallback_url")
        })
    })
    .map(decode_entities)
}

fn preview_image(
  data: &Value
) -> Option<String> {
  data
    .get("preview")
    .and_then(|p| p.get("images"))
    .and_then(Value::as_array)
    .and_then(|images| images.first())
    .and_then(|image| image.get("source"))
    .and_then(|source| {
      str_field(source, "url")
    })
    .map(decode_entities)
}

fn str_field<'a>(
  value: &'a Value,
  key: &str
) -> Option<&'a str> {
  value.get(key).and_then(Value::as_str)
}

fn url_host(url: &str) -> Option<String> {
  let rest = url
    .split_once("://")
    .map(|(_, rest)| rest)?;

  let host =
    rest.split(['/', '?', '#']).next()?;

  if host.is_empty() {
    None
  } else {
    Some(host.to_string())
  }
}

/// Upstream HTML-escapes URLs and
/// titles.
pub fn decode_entities(raw: &str) -> String {
  raw
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&#39;", "'")
    .replace("&amp;", "&")
}
