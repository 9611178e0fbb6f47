use once_cell::sync::Lazy;
use regex::Regex;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid URL pattern"));

/// A piece of rendered free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Link { text: String, href: String },
    LineBreak,
}

/// Split text into plain runs, links and line breaks. Bare `www.` links get
/// an `https://` href; the visible text is left as typed.
pub fn linkify(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;

    for m in URL_PATTERN.find_iter(text) {
        push_text(&mut segments, &text[last..m.start()]);
        let link = m.as_str();
        let href = if link.starts_with("http") {
            link.to_string()
        } else {
            format!("https://{}", link)
        };
        segments.push(Segment::Link {
            text: link.to_string(),
            href,
        });
        last = m.end();
    }
    push_text(&mut segments, &text[last..]);

    segments
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            segments.push(Segment::LineBreak);
        }
        if !line.is_empty() {
            segments.push(Segment::Text(line.to_string()));
        }
    }
}

/// Plain-text rendering: links become `text <href>` when the two differ.
pub fn render_plain(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Link { text, href } if text == href => out.push_str(text),
            Segment::Link { text, href } => {
                out.push_str(text);
                out.push_str(" <");
                out.push_str(href);
                out.push('>');
            }
            Segment::LineBreak => out.push('\n'),
        }
    }
    out
}
