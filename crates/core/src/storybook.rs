//! Standalone HTML rendering of a finished story.

use crate::{markup::escape_markup, story::StoryConfig, transcript::StoryPage};

pub const STORYBOOK_MIME_TYPE: &str = "text/html; charset=utf-8";

const STYLE: &str = r#"body { font-family: 'Inter', sans-serif; background: linear-gradient(135deg, #e0e7ff, #fce7f3, #fef3c7); padding: 20px; max-width: 800px; margin: 0 auto; min-height: 100vh; }
.book-cover { text-align: center; padding: 50px; background: linear-gradient(135deg, #d8b4fe, #fbcfe8); border-radius: 20px; box-shadow: 0 10px 20px rgba(0,0,0,0.1); margin-bottom: 30px; border: 4px solid white; }
.book-cover h1 { font-size: 3em; color: #6d28d9; margin: 0; font-weight: 900; }
.book-cover p { font-size: 1.2em; color: #8b5cf6; font-weight: 700; }
.page { margin-bottom: 40px; padding: 24px; background: linear-gradient(135deg, white, #e0f2fe); border-radius: 24px; border: 4px solid #a855f7; }
.page-number { font-size: 0.9em; color: #6366f1; margin-bottom: 10px; text-align: right; font-weight: 700; }
.sentence { font-size: 1.8em; font-weight: 900; color: #1e293b; margin-bottom: 20px; text-align: center; padding: 16px; border-radius: 16px; border: 2px solid #cbd5e1; }
.illustration { width: 100%; max-width: 600px; height: auto; border-radius: 16px; display: block; margin: 16px auto; border: 4px solid white; }
.footer { text-align: center; margin-top: 40px; padding: 20px; color: #6366f1; font-weight: 700; }"#;

/// A rendered storybook ready to be offered as a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storybook {
    pub file_name: String,
    pub html: String,
}

pub fn render_storybook(story: &StoryConfig, pages: &[StoryPage]) -> Storybook {
    let title = escape_markup(&format!("{} - My Story Book", story.title));

    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n<title>{title}</title>\n<style>\n{STYLE}\n</style>\n</head>\n<body>\n"
    );
    html.push_str(&format!(
        "<div class=\"book-cover\">\n<h1>{title}</h1>\n<p>Created by Story Book Creator 🤖</p>\n</div>\n"
    ));

    for (i, page) in pages.iter().enumerate() {
        let number = i + 1;
        html.push_str(&format!(
            "<div class=\"page\">\n<p class=\"page-number\">Page {number}</p>\n"
        ));
        if !page.illustration.is_empty() {
            html.push_str(&format!(
                "<img src=\"{}\" alt=\"Illustration for page {number}\" class=\"illustration\"/>\n",
                escape_markup(&page.illustration.to_data_url())
            ));
        }
        html.push_str(&format!(
            "<p class=\"sentence\">{}</p>\n</div>\n",
            escape_markup(&page.sentence)
        ));
    }

    html.push_str(
        "<div class=\"footer\">\n<p>🎉 The End! Great job creating your story! 🎉</p>\n</div>\n</body>\n</html>\n",
    );

    Storybook {
        file_name: story.storybook_file_name(),
        html,
    }
}
