use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::models::{ParsedEntry, ParsedFeed};
use crate::{Error, Result};

/// Parse RSS 2.0, RSS 1.0 (RDF) or Atom content.
///
/// Date elements are kept verbatim: the checkpoint compares the feed-level
/// marker as an opaque string, and entry dates go through `feed::date` later.
pub fn parse_feed(content: &[u8]) -> Result<ParsedFeed> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut feed = ParsedFeed::default();
    let mut root_seen = false;
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut entry: Option<ParsedEntry> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();

                if stack.is_empty() {
                    if !matches!(name.as_slice(), b"rss" | b"RDF" | b"feed") {
                        return Err(Error::FeedParse(format!(
                            "Unexpected root element <{}>",
                            String::from_utf8_lossy(&name)
                        )));
                    }
                    root_seen = true;
                }

                if is_entry_element(&name) {
                    entry = Some(ParsedEntry::default());
                } else if name == b"link" && parent_is_entry(&stack) {
                    if let Some(current) = entry.as_mut() {
                        take_atom_link(current, &e);
                    }
                }

                stack.push(name);
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" && parent_is_entry(&stack) {
                    if let Some(current) = entry.as_mut() {
                        take_atom_link(current, &e);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let value = e
                    .unescape()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                text.push_str(&value);
            }
            Ok(Event::CData(e)) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(_)) => {
                if let Some(name) = stack.pop() {
                    close_element(&name, stack.last(), &mut feed, &mut entry, &mut text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::FeedParse(format!(
                    "Malformed feed at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if !root_seen {
        return Err(Error::FeedParse("Document is not an RSS or Atom feed".to_string()));
    }

    Ok(feed)
}

fn close_element(
    name: &[u8],
    parent: Option<&Vec<u8>>,
    feed: &mut ParsedFeed,
    entry: &mut Option<ParsedEntry>,
    text: &mut String,
) {
    if is_entry_element(name) {
        if let Some(done) = entry.take() {
            feed.entries.push(done);
        }
        return;
    }

    match (entry.as_mut(), parent.map(Vec::as_slice)) {
        (Some(current), Some(p)) if is_entry_element(p) => {
            assign_entry_field(current, name, text);
        }
        (None, Some(b"channel" | b"feed")) => {
            assign_feed_field(feed, name, text);
        }
        _ => {}
    }
}

fn is_entry_element(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

/// Links nested deeper, such as inside an Atom `<source>`, belong to another document
fn parent_is_entry(stack: &[Vec<u8>]) -> bool {
    stack.last().is_some_and(|parent| is_entry_element(parent))
}

fn non_empty(text: &mut String) -> Option<String> {
    let value = std::mem::take(text);
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn assign_entry_field(entry: &mut ParsedEntry, name: &[u8], text: &mut String) {
    match name {
        b"title" => entry.title = non_empty(text),
        // RSS carries the link as text; Atom links were taken from attributes
        b"link" => {
            if entry.link.is_none() {
                entry.link = non_empty(text);
            }
        }
        b"updated" | b"modified" | b"date" => {
            if entry.updated.is_none() {
                entry.updated = non_empty(text);
            }
        }
        b"pubDate" | b"published" | b"issued" => {
            if entry.published.is_none() {
                entry.published = non_empty(text);
            }
        }
        _ => {}
    }
}

fn assign_feed_field(feed: &mut ParsedFeed, name: &[u8], text: &mut String) {
    match name {
        b"title" => {
            if feed.title.is_none() {
                feed.title = non_empty(text);
            }
        }
        b"lastBuildDate" | b"updated" | b"date" => {
            if feed.updated.is_none() {
                feed.updated = non_empty(text);
            }
        }
        b"pubDate" | b"published" => {
            if feed.published.is_none() {
                feed.published = non_empty(text);
            }
        }
        _ => {}
    }
}

/// Atom `<link href=".."/>`: the first alternate (or rel-less) link wins
fn take_atom_link(entry: &mut ParsedEntry, element: &BytesStart<'_>) {
    if entry.link.is_some() {
        return;
    }

    let mut href = None;
    let mut rel = None;

    for attr in element.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(String::from_utf8_lossy(&attr.value).to_string()),
            b"rel" => rel = Some(String::from_utf8_lossy(&attr.value).to_string()),
            _ => {}
        }
    }

    if matches!(rel.as_deref(), None | Some("alternate")) {
        entry.link = href.filter(|h| !h.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://news.example.com/</link>
    <lastBuildDate>Tue, 05 Mar 2024 09:30:00 GMT</lastBuildDate>
    <item>
      <title>Second &amp; last</title>
      <link>https://news.example.com/2</link>
      <pubDate>Tue, 05 Mar 2024 09:00:00 GMT</pubDate>
    </item>
    <item>
      <title><![CDATA[First <b>post</b>]]></title>
      <link>https://news.example.com/1</link>
      <pubDate>Mon, 04 Mar 2024 09:00:00 +0900</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Blog</title>
  <link href="https://blog.example.com/"/>
  <updated>2024-03-05T18:30:00+09:00</updated>
  <entry>
    <title>Hello</title>
    <link rel="self" href="https://blog.example.com/hello.atom"/>
    <link rel="alternate" href="https://blog.example.com/hello"/>
    <published>2024-03-05T18:00:00+09:00</published>
    <updated>2024-03-05T18:30:00+09:00</updated>
  </entry>
</feed>"#;

    const RDF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://rdf.example.com/">
    <title>RDF Site</title>
    <dc:date>2024-03-05T18:30:00+09:00</dc:date>
  </channel>
  <item rdf:about="https://rdf.example.com/a">
    <title>A</title>
    <link>https://rdf.example.com/a</link>
    <dc:date>2024-03-05T18:10:00+09:00</dc:date>
  </item>
</rdf:RDF>"#;

    #[test]
    fn test_parse_rss() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();

        assert_eq!(feed.title.as_deref(), Some("Example News"));
        assert_eq!(feed.update_marker(), Some("Tue, 05 Mar 2024 09:30:00 GMT"));
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].title.as_deref(), Some("Second & last"));
        assert_eq!(feed.entries[0].link.as_deref(), Some("https://news.example.com/2"));
        assert_eq!(
            feed.entries[1].update_marker(),
            Some("Mon, 04 Mar 2024 09:00:00 +0900")
        );
        assert_eq!(feed.entries[1].title.as_deref(), Some("First <b>post</b>"));
    }

    #[test]
    fn test_parse_atom_prefers_alternate_link() {
        let feed = parse_feed(ATOM.as_bytes()).unwrap();

        assert_eq!(feed.title.as_deref(), Some("Example Blog"));
        assert_eq!(feed.update_marker(), Some("2024-03-05T18:30:00+09:00"));
        assert_eq!(feed.entries.len(), 1);

        let entry = &feed.entries[0];
        assert_eq!(entry.link.as_deref(), Some("https://blog.example.com/hello"));
        assert_eq!(entry.update_marker(), Some("2024-03-05T18:30:00+09:00"));
        assert_eq!(entry.published.as_deref(), Some("2024-03-05T18:00:00+09:00"));
    }

    #[test]
    fn test_ignores_links_of_the_source_feed() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Planet</title>
  <updated>2024-03-05T18:30:00+09:00</updated>
  <entry>
    <title>Syndicated</title>
    <source>
      <link href="https://origin.example.com/"/>
      <updated>2024-01-01T00:00:00Z</updated>
    </source>
    <link href="https://planet.example.com/syndicated"/>
    <updated>2024-03-05T18:00:00+09:00</updated>
  </entry>
</feed>"#;

        let feed = parse_feed(atom.as_bytes()).unwrap();
        let entry = &feed.entries[0];
        assert_eq!(entry.link.as_deref(), Some("https://planet.example.com/syndicated"));
        assert_eq!(entry.update_marker(), Some("2024-03-05T18:00:00+09:00"));
    }

    #[test]
    fn test_parse_rdf() {
        let feed = parse_feed(RDF.as_bytes()).unwrap();

        assert_eq!(feed.title.as_deref(), Some("RDF Site"));
        assert_eq!(feed.update_marker(), Some("2024-03-05T18:30:00+09:00"));
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].update_marker(), Some("2024-03-05T18:10:00+09:00"));
    }

    #[test]
    fn test_rejects_html() {
        let result = parse_feed(b"<html><body>Not found</body></html>");
        assert!(matches!(result, Err(Error::FeedParse(_))));
    }

    #[test]
    fn test_rejects_empty_document() {
        assert!(parse_feed(b"").is_err());
    }

    #[test]
    fn test_rejects_malformed_xml() {
        let result = parse_feed(b"<rss><channel><title>Broken</channel></rss>");
        assert!(result.is_err());
    }
}
