//! HTML and plain-text bodies of the daily digest.
//!
//! The newest edition is shown large at the top; older editions follow as
//! one link per line.

use crate::models::ArchiveEntry;
use html_escape::{encode_double_quoted_attribute, encode_text};
use itertools::Itertools;

fn label(newspaper: &str, entry: &ArchiveEntry) -> String {
    format!("il {} del {}", newspaper, entry.date.replace('-', " "))
}

fn anchor(newspaper: &str, entry: &ArchiveEntry) -> String {
    format!(
        r#"<a href="{}">{}</a>"#,
        encode_double_quoted_attribute(&entry.link),
        encode_text(&label(newspaper, entry))
    )
}

/// Digest HTML for `latest` followed by `older` in archive order.
pub fn html_body(newspaper: &str, latest: &ArchiveEntry, older: &[ArchiveEntry]) -> String {
    let older_html = older
        .iter()
        .map(|entry| format!("<br>{}", anchor(newspaper, entry)))
        .join("\n");
    format!(
        r#"<html>
<body>
<div style="width:300px; margin:0 auto; text-align:center;"><div style="font-size: 24px;">{}</div><br>
{}
</div>
</body>
</html>
"#,
        anchor(newspaper, latest),
        older_html
    )
}

/// Plain-text alternative with the same links.
pub fn text_body(newspaper: &str, latest: &ArchiveEntry, older: &[ArchiveEntry]) -> String {
    let mut text = format!("{}: {}\n", label(newspaper, latest), latest.link);
    if !older.is_empty() {
        text.push('\n');
        for entry in older {
            text.push_str(&format!("{}: {}\n", label(newspaper, entry), entry.link));
        }
    }
    text
}
