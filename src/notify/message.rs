use crate::feed::FeedItem;
use crate::util::strip_control_chars;

const UNKNOWN_AUTHOR: &str = "unknown author";

/// Render the chat message for one item.
///
/// ```text
/// New post by <author>
/// <link|title>
/// <description>        (only if present)
/// ```
///
/// The second line is the chat "link with label" markup; an empty title
/// falls back to the bare link as label.
pub fn render(item: &FeedItem) -> String {
    let author = item.author.as_deref().unwrap_or(UNKNOWN_AUTHOR);
    let title = if item.title.trim().is_empty() {
        item.link.as_str()
    } else {
        item.title.as_str()
    };

    let mut text = format!(
        "New post by {}\n<{}|{}>",
        escape(&single_line(author)),
        escape(&single_line(&item.link)),
        escape(&single_line(title)).replace('|', "\u{2758}"),
    );

    if let Some(description) = &item.description {
        text.push('\n');
        text.push_str(&escape(&strip_control_chars(description)));
    }

    text
}

/// Chat markup reserves `&`, `<` and `>`.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Collapse a field onto one line (line-based layout).
fn single_line(s: &str) -> String {
    strip_control_chars(s)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item() -> FeedItem {
        FeedItem {
            id: "1".into(),
            title: "Hello world".into(),
            link: "http://example.com/x".into(),
            description: Some("A short summary.".into()),
            author: Some("Ann".into()),
        }
    }

    #[test]
    fn test_render_full_item() {
        assert_eq!(
            render(&item()),
            "New post by Ann\n<http://example.com/x|Hello world>\nA short summary."
        );
    }

    #[test]
    fn test_render_without_description_has_two_lines() {
        let mut item = item();
        item.description = None;
        assert_eq!(render(&item), "New post by Ann\n<http://example.com/x|Hello world>");
    }

    #[test]
    fn test_render_unknown_author() {
        let mut item = item();
        item.author = None;
        assert!(render(&item).starts_with("New post by unknown author\n"));
    }

    #[test]
    fn test_render_empty_title_uses_link() {
        let mut item = item();
        item.title = String::new();
        assert!(render(&item).contains("<http://example.com/x|http://example.com/x>"));
    }

    #[test]
    fn test_render_escapes_markup() {
        let mut item = item();
        item.title = "a < b & c > d".into();
        item.description = Some("<script>".into());
        let text = render(&item);
        assert!(text.contains("|a &lt; b &amp; c &gt; d>"));
        assert!(text.ends_with("&lt;script&gt;"));
    }

    #[test]
    fn test_render_title_pipe_does_not_split_link() {
        let mut item = item();
        item.title = "left | right".into();
        let text = render(&item);
        assert_eq!(text.matches('|').count(), 1);
    }

    #[test]
    fn test_render_strips_escape_sequences_and_newlines_in_title() {
        let mut item = item();
        item.title = "multi\nline\x1b[31m title".into();
        let text = render(&item);
        assert!(text.contains("|multi line title>"));
    }

    #[test]
    fn test_render_description_drops_escape_payload() {
        let mut item = item();
        item.description = Some("\x1b]0;title\x07Line one\nLine two".into());
        assert!(render(&item).ends_with("\nLine one\nLine two"));
    }
}
