//! Slide page rendering.
//!
//! Fills the placeholders of the deck's HTML template with one slide's
//! content and a navigation list of every slide.  The template is treated as
//! opaque text: placeholders are found by plain substring replacement.

use crate::error::RenderError;
use crate::html;
use crate::slides::Slide;

/// Sign and leading digit run of `requested`, read the way a lenient integer
/// parse would: optional leading whitespace and sign, then digits.  Anything
/// after the digits is ignored.
fn leading_integer(requested: &str) -> Option<(bool, &str)> {
    let trimmed = requested.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let len = rest.bytes().take_while(u8::is_ascii_digit).count();
    (len > 0).then(|| (negative, &rest[..len]))
}

fn parse_index(requested: &str) -> Option<i64> {
    let (negative, digits) = leading_integer(requested)?;
    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// The index a request names: its leading integer without leading zeros, or
/// `NaN` when it does not start with one.  Only digits, `-` and `NaN` ever
/// come out, so the label is safe to send back in a page.
fn index_label(requested: &str) -> String {
    let Some((negative, digits)) = leading_integer(requested) else {
        return "NaN".to_owned();
    };
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        "0".to_owned()
    } else if negative {
        format!("-{digits}")
    } else {
        digits.to_owned()
    }
}

/// Resolve a requested index (as written in the URL) against `count` slides.
pub fn resolve_index(requested: &str, count: usize) -> Result<usize, RenderError> {
    parse_index(requested)
        .and_then(|i| usize::try_from(i).ok())
        .filter(|&i| i < count)
        .ok_or_else(|| RenderError::NoSuchSlide {
            index: index_label(requested),
        })
}

fn list_item(slide: &Slide, index: usize, current: usize) -> String {
    let current_class = if index == current {
        "slide-list__link--current"
    } else {
        ""
    };
    format!(
        "<li><a href=\"/{index}\" class=\"slide-list__link slide-list__link--level{level} {current_class}\">{title}</a></li>",
        level = slide.level,
        title = html::encode(&slide.title),
    )
}

/// Live example block: the example and displayed CSS in one `<style>`,
/// followed by the example markup.
fn example_block(slide: &Slide) -> String {
    format!(
        "\n<style>{}\n\n{}</style>\n{}\n",
        slide.example_css.as_deref().unwrap_or_default(),
        slide.display_css.as_deref().unwrap_or_default(),
        slide.example_html.as_deref().unwrap_or_default(),
    )
}

fn add_slide_content(template: &str, slide: &Slide) -> String {
    template
        .replacen("$example", &example_block(slide), 1)
        .replacen("$notes", &html::encode(&slide.notes), 1)
        .replacen("$displayCss", &html::highlight(slide.display_css.as_deref()), 1)
}

fn add_title_and_navigation(page: &str, slides: &[Slide], current: usize) -> String {
    let slide = &slides[current];
    let items = slides
        .iter()
        .enumerate()
        .map(|(index, s)| list_item(s, index, current))
        .collect::<Vec<_>>()
        .join("\n");
    let previous = current.checked_sub(1).map(|i| i.to_string()).unwrap_or_default();
    let next = if current + 1 >= slides.len() {
        String::new()
    } else {
        (current + 1).to_string()
    };

    page.replace("$slideTitle", &html::encode(&slide.title))
        .replace("$slideLevel", &slide.level.to_string())
        .replace("$slideListItems", &items)
        .replace("$previousSlideIndex", &previous)
        .replace("$nextSlideIndex", &next)
}

/// Render the slide at `index` into `template`.
pub fn render_slide(slides: &[Slide], template: &str, index: usize) -> Result<String, RenderError> {
    let slide = slides.get(index).ok_or_else(|| RenderError::NoSuchSlide {
        index: index.to_string(),
    })?;
    Ok(add_title_and_navigation(
        &add_slide_content(template, slide),
        slides,
        index,
    ))
}

/// Render the slide requested by the raw URL segment `requested`.
///
/// Negative, out-of-range and non-numeric requests yield
/// [`RenderError::NoSuchSlide`] naming the integer `requested` parses to, or
/// `NaN`.
pub fn render_page(slides: &[Slide], template: &str, requested: &str) -> Result<String, RenderError> {
    let index = resolve_index(requested, slides.len())?;
    render_slide(slides, template, index)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
