//! Locally synthesized stand-in illustrations.
//!
//! When the image service cannot deliver, the page still gets a picture: an SVG
//! canvas with a soft gradient, a scatter of circles, a title and the prompt
//! text wrapped onto it.

use crate::{illustration::Illustration, markup::escape_markup};
use rand::Rng;

pub const PLACEHOLDER_WIDTH: u32 = 768;
pub const PLACEHOLDER_HEIGHT: u32 = 512;
pub const PLACEHOLDER_TITLE: &str = "Your Story Picture";
pub const SVG_MIME_TYPE: &str = "image/svg+xml";

const MARGIN: u32 = 24;
const FIRST_LINE_Y: u32 = 90;
const LINE_HEIGHT: u32 = 26;
const BOTTOM_PADDING: u32 = 30;
// About how many 18px glyphs fit across the canvas inside the margins.
const WRAP_COLUMNS: usize = 68;
const CIRCLE_COUNT: usize = 30;
const FONT_FAMILY: &str = "Inter, system-ui, sans-serif";

/// Renders a placeholder illustration for `prompt`.
pub fn render_placeholder(prompt: &str) -> Illustration {
    let svg = render_svg(prompt, &mut rand::rng());
    Illustration::new(SVG_MIME_TYPE, svg.into_bytes())
}

fn render_svg<R: Rng>(prompt: &str, rng: &mut R) -> String {
    let (width, height) = (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);
    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"##
    );
    svg.push_str(
        r##"<defs><linearGradient id="bg" x1="0" y1="0" x2="1" y2="1"><stop offset="0" stop-color="#e0f2fe"/><stop offset="1" stop-color="#ddd6fe"/></linearGradient></defs>"##,
    );
    svg.push_str(&format!(
        r##"<rect width="{width}" height="{height}" fill="url(#bg)"/>"##
    ));

    for _ in 0..CIRCLE_COUNT {
        let cx = rng.random_range(0.0..width as f64);
        let cy = rng.random_range(0.0..height as f64);
        let r = rng.random_range(10.0..30.0);
        svg.push_str(&format!(
            r##"<circle cx="{cx:.1}" cy="{cy:.1}" r="{r:.1}" fill="#ffffff" fill-opacity="0.6"/>"##
        ));
    }

    svg.push_str(&format!(
        r##"<text x="{MARGIN}" y="50" font-family="{FONT_FAMILY}" font-size="32" font-weight="bold" fill="#1e293b">{PLACEHOLDER_TITLE}</text>"##
    ));

    for (line, y) in wrapped_lines(prompt) {
        svg.push_str(&format!(
            r##"<text x="{MARGIN}" y="{y}" font-family="{FONT_FAMILY}" font-size="18" fill="#1e293b">{}</text>"##,
            escape_markup(&line)
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Wrapped prompt lines paired with their baseline, dropping whatever overflows the canvas.
fn wrapped_lines(prompt: &str) -> Vec<(String, u32)> {
    let last_baseline = PLACEHOLDER_HEIGHT - BOTTOM_PADDING;
    textwrap::wrap(prompt, WRAP_COLUMNS)
        .into_iter()
        .zip((0..).map(|i| FIRST_LINE_Y + i * LINE_HEIGHT))
        .take_while(|(_, y)| *y <= last_baseline)
        .map(|(line, y)| (line.into_owned(), y))
        .collect()
}
