//! Embedded web assets.
//!
//! The presenter stylesheet and script are compiled into the binary via
//! `include_str!` and served under `/assets/`, so a deck only needs its
//! markdown and template.  The starter files are written by `mdslides init`.

/// Stylesheet for slide pages, served at `/assets/slides.css`.
pub const CSS: &str = include_str!("assets/slides.css");

/// Presenter-mode script, served at `/assets/slides.js`.
///
/// Toggles presenting mode on `p`, navigates with the arrow keys and keeps
/// the slide list's scroll offset in `sessionStorage`.
pub const JS: &str = include_str!("assets/slides.js");

/// Starter page template using every placeholder the renderer fills in.
pub const STARTER_TEMPLATE: &str = include_str!("assets/template.html");

/// Starter deck demonstrating notes, display CSS and example sections.
pub const STARTER_CONTENT: &str = include_str!("assets/content.md");

/// Embedded asset served at `path`, as `(content type, body)`.
pub fn lookup(path: &str) -> Option<(&'static str, &'static str)> {
    match path {
        "/assets/slides.css" => Some(("text/css; charset=utf-8", CSS)),
        "/assets/slides.js" => Some(("text/javascript; charset=utf-8", JS)),
        _ => None,
    }
}
