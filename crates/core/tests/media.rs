use serde_json::json;
use swipefeed_core::domain::media::{classify, decode_entities, normalize_post};
use swipefeed_core::domain::model::{FeedTarget, GalleryItem, MediaKind, TargetKind};

#[test]
fn gallery_wins_and_resolves_metadata_urls() {
    let data = json!({
        "is_gallery": true,
        "url": "https://www.reddit.com/gallery/abc",
        "gallery_data": { "items": [
            { "media_id": "m1", "caption": "first" },
            { "media_id": "m2" },
            { "media_id": "missing" }
        ]},
        "media_metadata": {
            "m1": { "s": { "u": "https://preview.redd.it/m1.jpg?width=640&amp;s=x" } },
            "m2": { "s": { "gif": "https://i.redd.it/m2.gif" } }
        }
    });

    assert_eq!(
        classify(&data),
        MediaKind::Gallery {
            items: vec![
                GalleryItem {
                    url: "https://preview.redd.it/m1.jpg?width=640&s=x".into(),
                    caption: Some("first".into()),
                },
                GalleryItem {
                    url: "https://i.redd.it/m2.gif".into(),
                    caption: None,
                },
            ]
        }
    );
}

#[test]
fn hosted_video_uses_fallback_and_preview_poster() {
    let data = json!({
        "url": "https://v.redd.it/xyz",
        "secure_media": { "reddit_video": { "fallback_url": "https://v.redd.it/xyz/DASH_720.mp4" } },
        "preview": { "images": [ { "source": { "url": "https://preview.redd.it/p.jpg?a=1&amp;b=2" } } ] }
    });

    assert_eq!(
        classify(&data),
        MediaKind::Video {
            url: "https://v.redd.it/xyz/DASH_720.mp4".into(),
            poster: Some("https://preview.redd.it/p.jpg?a=1&b=2".into()),
        }
    );
}

#[test]
fn gifv_link_becomes_mp4_video() {
    let data = json!({ "url": "https://i.imgur.com/abc.gifv?x=1" });
    assert_eq!(
        classify(&data),
        MediaKind::Video {
            url: "https://i.imgur.com/abc.mp4".into(),
            poster: None,
        }
    );
}

#[test]
fn image_detected_by_hint_or_extension() {
    let hinted = json!({ "url": "https://example.com/render", "post_hint": "image" });
    let by_ext = json!({ "url": "https://i.redd.it/a.PNG" });

    assert_eq!(classify(&hinted).label(), "image");
    assert_eq!(
        classify(&by_ext),
        MediaKind::Image {
            url: "https://i.redd.it/a.PNG".into()
        }
    );
}

#[test]
fn self_posts_are_text_and_the_rest_are_links() {
    let text = json!({ "is_self": true, "selftext": "hello", "url": "https://www.reddit.com/r/x/comments/1" });
    let link = json!({ "url": "https://news.example.org/story?id=4" });

    assert_eq!(
        classify(&text),
        MediaKind::Text {
            body: "hello".into()
        }
    );
    assert_eq!(
        classify(&link),
        MediaKind::Link {
            url: "https://news.example.org/story?id=4".into(),
            domain: "news.example.org".into(),
        }
    );
    assert!(!classify(&text).is_displayable());
    assert!(!classify(&link).is_displayable());
}

#[test]
fn crosspost_borrows_parent_media() {
    let data = json!({
        "url": "/r/origin/comments/1",
        "crosspost_parent_list": [ { "url": "https://i.redd.it/orig.jpg" } ]
    });
    assert_eq!(
        classify(&data),
        MediaKind::Image {
            url: "https://i.redd.it/orig.jpg".into()
        }
    );
}

#[test]
fn normalize_requires_an_id() {
    assert!(normalize_post(&json!({ "title": "no id" })).is_none());
    assert!(normalize_post(&json!({ "id": "  " })).is_none());
}

#[test]
fn normalize_fills_defaults_and_decodes_title() {
    let post = normalize_post(&json!({
        "id": "t1",
        "title": "Tom &amp; Jerry",
        "subreddit": "cartoons",
        "created_utc": 1_700_000_000.0,
        "over_18": true,
        "url": "https://i.redd.it/t1.jpg"
    }))
    .unwrap();

    assert_eq!(post.title, "Tom & Jerry");
    assert_eq!(post.author, "[deleted]");
    assert_eq!(post.created_at.timestamp(), 1_700_000_000);
    assert_eq!(post.score, 0);
    assert!(post.nsfw);
    assert!(post.media.is_displayable());
}

#[test]
fn entities_decode_ampersand_last() {
    assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    assert_eq!(decode_entities("&quot;a&quot; &#39;b&#39;"), "\"a\" 'b'");
}

#[test]
fn feed_targets_parse_and_key_case_insensitively() {
    let r = FeedTarget::parse("r/Memes").unwrap();
    assert_eq!(r.kind, TargetKind::Subreddit);
    assert_eq!(r.feed_key(), "r:memes");
    assert_eq!(r.to_string(), "r/Memes");

    let u = FeedTarget::parse("u:Someone_1").unwrap();
    assert_eq!(u.feed_key(), "u:someone_1");

    assert_eq!(FeedTarget::parse("pics"), Some(FeedTarget::subreddit("pics")));
    assert!(FeedTarget::parse("x/pics").is_none());
    assert!(FeedTarget::parse("r/").is_none());
    assert!(FeedTarget::parse("r/bad name").is_none());
}

#[test]
fn media_serializes_with_kind_tag() {
    let value = serde_json::to_value(MediaKind::Video {
        url: "u".into(),
        poster: None,
    })
    .unwrap();
    assert_eq!(value, json!({ "kind": "video", "url": "u" }));
}
