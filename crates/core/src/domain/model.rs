use std::fmt;

use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct GalleryItem {
  pub url:     String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub caption: Option<String>
}

/// Media attached to a post, resolved
/// once from the upstream payload.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(
  tag = "kind",
  rename_all = "lowercase"
)]
pub enum MediaKind {
  Image {
    url: String
  },
  Video {
    url:    String,
    #[serde(
      default,
      skip_serializing_if = "Option::is_none"
    )]
    poster: Option<String>
  },
  Gallery {
    items: Vec<GalleryItem>
  },
  Text {
    body: String
  },
  Link {
    url:    String,
    domain: String
  }
}

impl MediaKind {
  pub fn is_displayable(&self) -> bool {
    matches!(
      self,
      MediaKind::Image { .. }
        | MediaKind::Video { .. }
        | MediaKind::Gallery { .. }
    )
  }

  pub fn label(&self) -> &'static str {
    match self {
      | MediaKind::Image { .. } => "image",
      | MediaKind::Video { .. } => "video",
      | MediaKind::Gallery { .. } => {
        "gallery"
      }
      | MediaKind::Text { .. } => "text",
      | MediaKind::Link { .. } => "link"
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct Post {
  pub id:         String,
  pub title:      String,
  pub author:     String,
  #[serde(default)]
  pub subreddit:  String,
  #[serde(default)]
  pub permalink:  String,
  pub created_at: DateTime<Utc>,
  pub score:      i64,
  #[serde(default)]
  pub nsfw:       bool,
  pub media:      MediaKind
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
  Subreddit,
  User
}

impl TargetKind {
  /// Short path prefix used in feed
  /// keys and listing URLs.
  pub fn prefix(self) -> &'static str {
    match self {
      | TargetKind::Subreddit => "r",
      | TargetKind::User => "u"
    }
  }

  pub fn from_prefix(
    raw: &str
  ) -> Option<Self> {
    match raw.trim().to_lowercase().as_str()
    {
      | "r" | "subreddit" => {
        Some(TargetKind::Subreddit)
      }
      | "u" | "user" => {
        Some(TargetKind::User)
      }
      | _ => None
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
pub struct FeedTarget {
  pub kind: TargetKind,
  pub name: String
}

impl FeedTarget {
  pub fn subreddit(
    name: impl Into<String>
  ) -> Self {
    Self {
      kind: TargetKind::Subreddit,
      name: name.into()
    }
  }

  pub fn user(
    name: impl Into<String>
  ) -> Self {
    Self {
      kind: TargetKind::User,
      name: name.into()
    }
  }

  /// Parses `r/memes`, `u/someone`,
  /// `r:memes` or a bare subreddit name.
  pub fn parse(raw: &str) -> Option<Self> {
    let trimmed =
      raw.trim().trim_matches('/');

    if trimmed.is_empty() {
      return None;
    }

    let (kind, name) =
      match trimmed.split_once(['/', ':'])
      {
        | Some((prefix, name)) => {
          (
            TargetKind::from_prefix(
              prefix
            )?,
            name
          )
        }
        | None => {
          (TargetKind::Subreddit, trimmed)
        }
      };

    let name = name.trim();

    if name.is_empty()
      || !is_valid_name(name)
    {
      return None;
    }

    Some(Self {
      kind,
      name: name.to_string()
    })
  }

  /// Partition key for seen records.
  /// Names are case-insensitive
  /// upstream.
  pub fn feed_key(&self) -> String {
    format!(
      "{}:{}",
      self.kind.prefix(),
      self.name.to_lowercase()
    )
  }
}

impl fmt::Display for FeedTarget {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{}/{}",
      self.kind.prefix(),
      self.name
    )
  }
}

pub fn is_valid_name(name: &str) -> bool {
  !name.is_empty()
    && name.len() <= 64
    && name.chars().all(|c| {
      c.is_ascii_alphanumeric()
        || c == '_'
        || c == '-'
    })
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ListingSort {
  #[default]
  Hot,
  New,
  Top,
  Rising
}

impl ListingSort {
  pub fn as_str(self) -> &'static str {
    match self {
      | ListingSort::Hot => "hot",
      | ListingSort::New => "new",
      | ListingSort::Top => "top",
      | ListingSort::Rising => "rising"
    }
  }

  pub fn parse(raw: &str) -> Option<Self> {
    match raw.trim().to_lowercase().as_str()
    {
      | "hot" => Some(ListingSort::Hot),
      | "new" => Some(ListingSort::New),
      | "top" => Some(ListingSort::Top),
      | "rising" => {
        Some(ListingSort::Rising)
      }
      | _ => None
    }
  }
}

/// Query sent to the content source for
/// one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
  pub sort:         ListingSort,
  pub limit:        u32,
  pub after:        Option<String>,
  pub include_nsfw: bool
}

/// One page of posts and the cursor for
/// the next one; `after: None` ends the
/// feed.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
pub struct Listing {
  pub posts: Vec<Post>,
  pub after: Option<String>
}

/// Identity handed over by the auth
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Viewer {
  Anonymous,
  SignedIn(String)
}

impl Viewer {
  pub fn user_id(&self) -> Option<&str> {
    match self {
      | Viewer::Anonymous => None,
      | Viewer::SignedIn(id) => {
        Some(id.as_str())
      }
    }
  }
}
