//! Dash XML feeds
//!
//! A Dash feed describes one docset; its name is the feed file name:
//!
//! ```xml
//! <entry>
//!   <version>1.80.0</version>
//!   <url>https://primary.example.com/Rust.tgz</url>
//!   <url>https://mirror.example.com/Rust.tgz</url>
//!   <other-versions>...</other-versions>
//! </entry>
//! ```
//!
//! The first `<version>` is the latest one and doubles as the revision. The
//! first `<url>` is the download location, the rest are mirrors.

use super::{is_safe_identifier, FeedEntry};
use crate::error::{DocsetError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Scheme of the links Dash feed pages use to subscribe to a feed
pub const LINK_SCHEME: &str = "dash-feed://";

const FEED_EXTENSION: &str = ".xml";

/// Parse a Dash feed read from `source`
pub fn parse_dash_feed(source: &str, text: &str) -> Result<FeedEntry> {
    let identifier = feed_identifier(source).ok_or_else(|| {
        DocsetError::malformed_feed(source, "cannot derive a docset name from the feed URL")
    })?;

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut versions = Vec::new();
    let mut urls = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| DocsetError::malformed_feed(source, e))?;
                let text = text.trim();
                // Only direct children of the root; `other-versions` nests deeper
                match path.as_slice() {
                    [_, tag] if tag.as_str() == "version" => versions.push(text.to_string()),
                    [_, tag] if tag.as_str() == "url" && !text.is_empty() => {
                        urls.push(text.to_string())
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocsetError::malformed_feed(source, e)),
            _ => {}
        }
    }

    if urls.is_empty() {
        return Err(DocsetError::malformed_feed(
            source,
            "invalid docset feed: no download URL",
        ));
    }
    let mirrors = urls.split_off(1);
    let version = versions.into_iter().next().filter(|v| !v.is_empty());

    let mut entry = FeedEntry::new(
        identifier.clone(),
        identifier.replace('_', " "),
        urls.remove(0),
        version.clone().unwrap_or_default(),
    );
    entry.version = version;
    entry.mirrors = mirrors;
    entry.feed_url = Some(source.to_string());
    Ok(entry)
}

/// `https://host/feeds/Ruby_on_Rails_7.xml` names `Ruby_on_Rails_7`
fn feed_identifier(source: &str) -> Option<String> {
    let path = source.split(|c| c == '?' || c == '#').next().unwrap_or(source);
    let file = path.rsplit(|c| c == '/' || c == '\\').next()?;
    let file = urlencoding::decode(file)
        .map(|f| f.into_owned())
        .unwrap_or_else(|_| file.to_string());
    let name = file.strip_suffix(FEED_EXTENSION).unwrap_or(&file).to_string();
    is_safe_identifier(&name).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    const RUST_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<entry>
    <version>1.80.0</version>
    <url>https://primary.example.com/Rust.tgz</url>
    <url>https://mirror.example.com/Rust.tgz</url>
    <other-versions>
        <version><name>1.79.0</name></version>
    </other-versions>
</entry>"#;

    #[test]
    fn test_first_url_downloads_and_the_rest_mirror() {
        let entry = parse_dash_feed("https://example.com/feeds/Rust.xml", RUST_FEED).unwrap();

        assert_eq!(entry.identifier, "Rust");
        assert_eq!(entry.name, "Rust");
        assert_eq!(entry.url, "https://primary.example.com/Rust.tgz");
        assert_eq!(entry.mirrors, vec!["https://mirror.example.com/Rust.tgz".to_string()]);
        assert_eq!(entry.revision, "1.80.0");
        assert_eq!(entry.version.as_deref(), Some("1.80.0"));
        assert_eq!(
            entry.feed_url.as_deref(),
            Some("https://example.com/feeds/Rust.xml")
        );
    }

    #[test]
    fn test_name_comes_from_the_feed_file() {
        let entry = parse_dash_feed(
            "file:///feeds/Ruby%20on%20Rails_7.xml?ref=x",
            "<entry><url>https://a/Rails.tgz</url></entry>",
        )
        .unwrap();
        assert_eq!(entry.identifier, "Ruby on Rails_7");
        assert_eq!(entry.name, "Ruby on Rails 7");
        assert_eq!(entry.revision, "");
        assert_eq!(entry.version, None);
    }

    #[test]
    fn test_invalid_dash_feeds() {
        let cases = [
            ("https://example.com/Rust.xml", "<entry><version>1</version></entry>"),
            ("https://example.com/Rust.xml", "<entry><url>https://a/Rust.tgz</entry>"),
            ("https://example.com/", "<entry><url>https://a/Rust.tgz</url></entry>"),
        ];
        for (source, text) in cases {
            let err = parse_dash_feed(source, text).unwrap_err();
            assert_eq!(err.kind, ErrorKind::MalformedFeed, "case: {text}");
        }
    }
}
