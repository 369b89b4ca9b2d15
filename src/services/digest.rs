//! Digest rendering.
//!
//! A digest is the subject plus an HTML and a plain-text body describing a
//! batch of newly discovered items.

use std::fmt::Write as _;

use serde::Serialize;

use crate::models::Item;

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl Digest {
    /// Digest for a batch of new items, in the order given.
    pub fn for_items(subject: &str, items: &[Item]) -> Self {
        let plural = if items.len() == 1 { "" } else { "s" };

        let mut html = String::new();
        let _ = write!(
            html,
            "<html>\n<body>\n<h2>New Free Courses Available!</h2>\n\
             <p>Found {} new free course{}:</p>\n<div style=\"margin: 20px 0;\">\n",
            items.len(),
            plural
        );
        for item in items {
            let url = escape_html(&item.url);
            let _ = write!(
                html,
                "<div style=\"border: 1px solid #ddd; padding: 15px; margin: 10px 0; border-radius: 5px;\">\n\
                 <h3><a href=\"{url}\" style=\"color: #007bff; text-decoration: none;\">{}</a></h3>\n",
                escape_html(&item.title)
            );
            for (label, value) in details(item) {
                let _ = writeln!(
                    html,
                    "<p><strong>{label}:</strong> {}</p>",
                    escape_html(value)
                );
            }
            let _ = write!(
                html,
                "<p><a href=\"{url}\" style=\"background-color: #007bff; color: white; padding: 8px 16px; \
                 text-decoration: none; border-radius: 4px;\">Enroll Now</a></p>\n</div>\n"
            );
        }
        html.push_str(
            "</div>\n<p>This email was sent by your free course watcher.</p>\n\
             <p>To stop receiving these notifications, stop the watcher.</p>\n</body>\n</html>\n",
        );

        let mut text = format!("Found {} new free course{}:\n\n", items.len(), plural);
        for item in items {
            let _ = writeln!(text, "* {}", item.title);
            let _ = writeln!(text, "  {}", item.url);
            for (label, value) in details(item) {
                let _ = writeln!(text, "  {label}: {value}");
            }
            text.push('\n');
        }

        Self {
            subject: subject.to_string(),
            html,
            text,
        }
    }

    /// A free-form message; the body is plain text.
    pub fn plain(subject: &str, body: &str) -> Self {
        let paragraphs: String = body
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("<p>{}</p>\n", escape_html(p).replace('\n', "<br>\n")))
            .collect();
        Self {
            subject: subject.to_string(),
            html: format!("<html>\n<body>\n{paragraphs}</body>\n</html>\n"),
            text: body.to_string(),
        }
    }
}

fn details(item: &Item) -> impl Iterator<Item = (&'static str, &str)> {
    [
        ("Instructor", item.instructor.as_deref()),
        ("Rating", item.rating.as_deref()),
        ("Students", item.students.as_deref()),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.map(|v| (label, v)))
}

/// Escape text for inclusion in HTML element content or a quoted attribute.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
