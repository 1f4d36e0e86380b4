//! Slide model and the markdown → slide folding pass.
//!
//! Every `##` or `###` heading opens a new slide.  The blocks between two
//! headings fill in the slide: paragraphs become speaker notes, a `css` code
//! block becomes the displayed CSS, and an `Example Details:` paragraph
//! switches to collecting the CSS/HTML of the live example instead.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::LoadError;
use crate::parse::{self, BlockKind, ContentBlock};

/// Paragraph text that switches a slide into its example section.
pub const EXAMPLE_MARKER: &str = "Example Details:";

/// Invisible characters stripped when they open the document.
const LEADING_INVISIBLES: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{200E}', '\u{200F}', '\u{FEFF}',
];

/// One slide of the deck.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slide {
    /// Heading text, with its inline markdown left as written.
    pub title: String,
    /// Heading depth, either 2 or 3.
    pub level: u8,
    /// 1-based line of the heading in the source document.
    pub line: usize,
    /// Paragraph text of the slide, trimmed.
    pub notes: String,
    /// CSS shown as code on the slide.
    pub display_css: Option<String>,
    /// CSS driving the live example.
    pub example_css: Option<String>,
    /// Markup of the live example.
    pub example_html: Option<String>,
}

impl Slide {
    fn new(title: &str, level: u8, line: usize) -> Self {
        Self {
            title: title.to_owned(),
            level,
            line,
            ..Self::default()
        }
    }
}

/// Returns `true` for heading depths that open a slide.
fn opens_slide(depth: u8) -> bool {
    depth > 1 && depth < 4
}

fn is_code(block: &ContentBlock, lang: &str) -> bool {
    block.kind == BlockKind::CodeBlock && block.lang.as_deref() == Some(lang)
}

/// Accumulates slides while walking the block stream.
#[derive(Default)]
struct DeckBuilder {
    slides: Vec<Slide>,
    in_example: bool,
}

impl DeckBuilder {
    /// Close the current slide when the next heading opens: a level-3 slide
    /// without an example section of its own takes the example of the slide
    /// before it, extended with that slide's displayed CSS.
    ///
    /// Only a following heading closes a slide, so the last slide of the
    /// document never inherits.
    fn close_current(&mut self) {
        if self.in_example || self.slides.len() < 2 {
            return;
        }
        let index = self.slides.len() - 1;
        let (before, current) = self.slides.split_at_mut(index);
        let current = &mut current[0];
        if current.level != 3 {
            return;
        }
        let prior = &before[before.len() - 1];
        current.example_css = Some(format!(
            "{}\n\n{}",
            prior.example_css.as_deref().unwrap_or_default(),
            prior.display_css.as_deref().unwrap_or_default(),
        ));
        current.example_html = prior.example_html.clone();
        debug!(
            slide = index,
            title = %current.title,
            "inherited example from previous slide"
        );
    }

    fn push(&mut self, block: &ContentBlock) {
        if let BlockKind::Heading(depth) = block.kind {
            if opens_slide(depth) {
                self.close_current();
                self.slides
                    .push(Slide::new(&block.text, depth, block.line_start));
                self.in_example = false;
                return;
            }
        }

        let Some(slide) = self.slides.last_mut() else {
            return;
        };

        if block.kind == BlockKind::Paragraph && block.text.trim() == EXAMPLE_MARKER {
            self.in_example = true;
        } else if self.in_example {
            if is_code(block, "css") {
                slide.example_css = Some(block.text.clone());
            } else if is_code(block, "html") {
                slide.example_html = Some(block.text.clone());
            }
        } else if is_code(block, "css") {
            slide.display_css = Some(block.text.clone());
        } else if block.kind == BlockKind::Paragraph {
            slide.notes.push_str(&block.text);
        } else if block.kind == BlockKind::Space {
            slide.notes.push_str(&block.raw);
        }
    }

    fn finish(mut self) -> Vec<Slide> {
        for slide in &mut self.slides {
            slide.notes = slide.notes.trim().to_owned();
        }
        self.slides
    }
}

/// Drop a single leading byte-order mark or zero-width/direction character.
fn strip_leading_invisible(source: &str) -> &str {
    source
        .strip_prefix(|c: char| LEADING_INVISIBLES.contains(&c))
        .unwrap_or(source)
}

/// Parse a markdown document into its slides, in document order.
pub fn parse_slides(source: &str) -> Vec<Slide> {
    let blocks = parse::lex(strip_leading_invisible(source));
    let mut builder = DeckBuilder::default();
    for block in &blocks {
        builder.push(block);
    }
    let slides = builder.finish();
    debug!(blocks = blocks.len(), slides = slides.len(), "parsed deck");
    slides
}

/// Read the markdown document at `path` and parse it into slides.
pub fn load_slides(path: &Path) -> Result<Vec<Slide>, LoadError> {
    let source = fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_slides(&source))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_slide_headings_yields_empty_deck() {
        assert!(parse_slides("").is_empty());
        assert!(parse_slides("# Title only\n\nSome text.\n\n#### Deep\n").is_empty());
    }

    #[test]
    fn two_level_two_headings() {
        let slides = parse_slides("## One\n\nFirst.\n\n## Two\n\nSecond.\n");
        assert_eq!(slides.len(), 2);
        assert!(slides.iter().all(|s| s.level == 2));
        assert_eq!(slides[0].title, "One");
        assert_eq!(slides[0].notes, "First.");
        assert_eq!(slides[1].title, "Two");
        assert_eq!(slides[1].line, 5);
    }

    #[test]
    fn other_heading_depths_do_not_open_slides() {
        let slides = parse_slides("# Deck\n\n## One\n\n#### Aside\n\nText.\n");
        assert_eq!(slides.len(), 1);
        assert_eq!(slides[0].notes, "Text.");
    }

    #[test]
    fn notes_keep_paragraph_spacing() {
        let slides = parse_slides("## One\n\nFirst para.\n\nSecond para.\n\n");
        assert_eq!(slides[0].notes, "First para.\n\nSecond para.");
    }

    #[test]
    fn display_css_and_notes() {
        let src = "## Grid\n\nLay out a grid.\n\n```css\n.grid {\n  display: grid;\n}\n```\n";
        let slides = parse_slides(src);
        assert_eq!(slides[0].notes, "Lay out a grid.");
        assert_eq!(
            slides[0].display_css.as_deref(),
            Some(".grid {\n  display: grid;\n}")
        );
        assert_eq!(slides[0].example_css, None);
    }

    #[test]
    fn last_css_block_wins() {
        let slides = parse_slides("## One\n\n```css\na {}\n```\n\n```css\nb {}\n```\n");
        assert_eq!(slides[0].display_css.as_deref(), Some("b {}"));
    }

    #[test]
    fn non_css_code_outside_example_is_ignored() {
        let slides = parse_slides("## One\n\n```html\n<p>x</p>\n```\n");
        assert_eq!(slides[0].display_css, None);
        assert_eq!(slides[0].example_html, None);
        assert_eq!(slides[0].notes, "");
    }

    #[test]
    fn example_section_collects_css_and_html() {
        let src = "\
## Flex

Notes here.

Example Details:

```css
.row { display: flex; }
```

```html
<div class=\"row\"></div>
```

Ignored paragraph.
";
        let slides = parse_slides(src);
        assert_eq!(slides[0].notes, "Notes here.");
        assert_eq!(slides[0].example_css.as_deref(), Some(".row { display: flex; }"));
        assert_eq!(
            slides[0].example_html.as_deref(),
            Some("<div class=\"row\"></div>")
        );
        assert_eq!(slides[0].display_css, None);
    }

    #[test]
    fn level_three_inherits_example_and_display_css() {
        let src = "\
## Base

```css
.a { color: red; }
```

Example Details:

```css
.base {}
```

```html
<p>demo</p>
```

### Step

```css
.b {}
```

## Next
";
        let slides = parse_slides(src);
        assert_eq!(slides.len(), 3);
        assert_eq!(
            slides[1].example_css.as_deref(),
            Some(".base {}\n\n.a { color: red; }")
        );
        assert_eq!(slides[1].example_html.as_deref(), Some("<p>demo</p>"));
        assert_eq!(slides[1].display_css.as_deref(), Some(".b {}"));
    }

    #[test]
    fn inheritance_chains_through_consecutive_steps() {
        let src = "\
## Base

```css
.a {}
```

### Step one

```css
.b {}
```

### Step two

## Done
";
        let slides = parse_slides(src);
        assert_eq!(slides[1].example_css.as_deref(), Some("\n\n.a {}"));
        assert_eq!(slides[2].example_css.as_deref(), Some("\n\n.a {}\n\n.b {}"));
        assert_eq!(slides[2].example_html, None);
    }

    #[test]
    fn step_between_two_sections_inherits() {
        let src = "## A\n\n```css\n.a {}\n```\n\n### B\n\n## C\n";
        let slides = parse_slides(src);
        assert_eq!(slides.len(), 3);
        assert_eq!(slides[1].level, 3);
        assert_eq!(slides[1].example_css.as_deref(), Some("\n\n.a {}"));
        assert_eq!(slides[2].example_css, None);
    }

    #[test]
    fn trailing_step_does_not_inherit() {
        let slides = parse_slides("## A\n\n```css\n.a {}\n```\n\n### B\n");
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[1].example_css, None);
        assert_eq!(slides[1].example_html, None);
    }

    #[test]
    fn fenced_code_between_paragraphs_keeps_both_gaps() {
        let slides = parse_slides("## A\n\nBefore.\n\n```css\na {}\n```\n\nAfter.\n");
        assert_eq!(slides[0].notes, "Before.\n\n\n\nAfter.");
    }

    #[test]
    fn html_block_between_paragraphs_absorbs_its_gap() {
        let slides = parse_slides("## A\n\nBefore.\n\n<div>\nx\n</div>\n\nAfter.\n");
        assert_eq!(slides[0].notes, "Before.\n\nAfter.");
    }

    #[test]
    fn level_three_with_own_example_does_not_inherit() {
        let src = "\
## Base

Example Details:

```html
<p>base</p>
```

### Own

Example Details:

```html
<p>own</p>
```

## End
";
        let slides = parse_slides(src);
        assert_eq!(slides[1].example_html.as_deref(), Some("<p>own</p>"));
        assert_eq!(slides[1].example_css, None);
    }

    #[test]
    fn empty_example_section_still_blocks_inheritance() {
        let src = "## Base\n\n```css\n.a {}\n```\n\n### Own\n\nExample Details:\n\n## End\n";
        let slides = parse_slides(src);
        assert_eq!(slides[1].example_css, None);
        assert_eq!(slides[1].example_html, None);
    }

    #[test]
    fn first_slide_never_inherits() {
        let slides = parse_slides("### Lonely\n\nText.\n");
        assert_eq!(slides.len(), 1);
        assert_eq!(slides[0].level, 3);
        assert_eq!(slides[0].example_css, None);
    }

    #[test]
    fn level_two_does_not_inherit() {
        let slides = parse_slides("## A\n\n```css\n.a {}\n```\n\n## B\n\n## C\n");
        assert_eq!(slides[1].example_css, None);
        assert_eq!(slides[2].example_css, None);
    }

    #[test]
    fn marker_paragraph_is_not_in_notes() {
        let slides = parse_slides("## A\n\nBefore.\n\n  Example Details:  \n\nAfter.\n");
        assert_eq!(slides[0].notes, "Before.");
    }

    #[test]
    fn leading_bom_is_stripped() {
        let slides = parse_slides("\u{FEFF}## First\n\nBody.\n");
        assert_eq!(slides.len(), 1);
        assert_eq!(slides[0].title, "First");
    }

    #[test]
    fn content_before_first_heading_is_dropped() {
        let slides = parse_slides("Intro text.\n\n```css\na {}\n```\n\n## One\n");
        assert_eq!(slides.len(), 1);
        assert_eq!(slides[0].notes, "");
        assert_eq!(slides[0].display_css, None);
    }

    #[test]
    fn load_slides_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_slides(&dir.path().join("missing.md")).unwrap_err();
        assert!(err.to_string().contains("missing.md"));
    }

    #[test]
    fn load_slides_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.md");
        std::fs::write(&path, "## Hello\n\nWorld.\n").unwrap();
        let slides = load_slides(&path).unwrap();
        assert_eq!(slides[0].notes, "World.");
    }
}
