//! Markdown lexing module.
//!
//! Flattens a markdown document into the sequence of its top-level blocks
//! (headings, paragraphs, code blocks, ...) in source order.  Nested blocks
//! such as paragraphs inside list items stay part of their container.
//!
//! Blank-line runs that separate two blocks are reported as
//! [`BlockKind::Space`] tokens so that callers can reproduce the spacing
//! between paragraphs.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The kind of a top-level content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    CodeBlock,
    List,
    BlockQuote,
    ThematicBreak,
    HtmlBlock,
    Table,
    /// Whitespace between two blocks containing at least one blank line.
    Space,
}

/// A top-level block of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub kind: BlockKind,
    /// 1-based starting line number.
    pub line_start: usize,
    /// Exact source text of the block.
    pub raw: String,
    /// Block text.
    ///
    /// Headings and paragraphs keep their inline markdown source (emphasis
    /// markers, backticks, link syntax).  Code blocks hold the literal code
    /// without the final newline.
    pub text: String,
    /// Language tag of a fenced code block (first word of the info string).
    pub lang: Option<String>,
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Maps byte offsets into a source string to 1-based line numbers.
struct LineIndex {
    /// Byte offsets of each `\n` character in the source.
    newline_offsets: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let newline_offsets = source
            .bytes()
            .enumerate()
            .filter_map(|(i, b)| if b == b'\n' { Some(i) } else { None })
            .collect();
        Self { newline_offsets }
    }

    /// Convert a byte offset to a 1-based line number.
    fn line_at(&self, offset: usize) -> usize {
        match self.newline_offsets.binary_search(&offset) {
            Ok(idx) | Err(idx) => idx + 1,
        }
    }
}

fn heading_level_to_u8(level: &HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Returns `true` for block-level tags (as opposed to inline spans).
fn is_block_level(tag: &Tag) -> bool {
    !matches!(
        tag,
        Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link { .. } | Tag::Image { .. }
    )
}

fn is_block_level_end(tag: &TagEnd) -> bool {
    !matches!(
        tag,
        TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link | TagEnd::Image
    )
}

/// Map a *top-level* block tag to its [`BlockKind`].
///
/// Returns `None` for block tags that only appear nested (e.g. `Item`,
/// `TableRow`) and for types we intentionally skip (e.g. metadata blocks).
fn tag_to_block_kind(tag: &Tag) -> Option<BlockKind> {
    match tag {
        Tag::Paragraph => Some(BlockKind::Paragraph),
        Tag::Heading { level, .. } => Some(BlockKind::Heading(heading_level_to_u8(level))),
        Tag::CodeBlock(_) => Some(BlockKind::CodeBlock),
        Tag::BlockQuote(..) => Some(BlockKind::BlockQuote),
        Tag::List(_) => Some(BlockKind::List),
        Tag::Table(_) => Some(BlockKind::Table),
        Tag::HtmlBlock => Some(BlockKind::HtmlBlock),
        _ => None,
    }
}

/// First whitespace-delimited word of a fenced code block's info string.
fn code_lang(tag: &Tag) -> Option<String> {
    match tag {
        Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
            info.split_whitespace().next().map(str::to_owned)
        }
        _ => None,
    }
}

/// Blocks that swallow the blank lines following them, leaving no
/// [`BlockKind::Space`] behind: headings, indented code and HTML blocks.
/// A fenced code block ends at its closing fence.
fn absorbs_following_blank(tag: &Tag) -> bool {
    matches!(
        tag,
        Tag::Heading { .. } | Tag::CodeBlock(CodeBlockKind::Indented) | Tag::HtmlBlock
    )
}

/// Byte offset just past the last non-whitespace character of `source[start..end]`.
fn content_end(source: &str, start: usize, end: usize) -> usize {
    start + source[start..end].trim_end().len()
}

/// A top-level block whose end event has not been seen yet.
struct OpenBlock {
    kind: BlockKind,
    start: usize,
    /// Source span covered by the block's inline events.
    inline: Option<Range<usize>>,
    /// Literal text collected for code blocks.
    code: String,
    lang: Option<String>,
    /// Whether the blank lines after the block belong to it.
    absorbs_blank: bool,
}

impl OpenBlock {
    fn new(tag: &Tag, kind: BlockKind, start: usize) -> Self {
        Self {
            kind,
            start,
            inline: None,
            code: String::new(),
            lang: code_lang(tag),
            absorbs_blank: absorbs_following_blank(tag),
        }
    }

    fn extend_inline(&mut self, range: &Range<usize>) {
        self.inline = Some(match self.inline.take() {
            Some(span) => span.start.min(range.start)..span.end.max(range.end),
            None => range.clone(),
        });
    }

    fn finish(self, source: &str, end: usize, line_index: &LineIndex) -> ContentBlock {
        let end = content_end(source, self.start, end.max(self.start));
        let raw = source[self.start..end].to_owned();
        let text = match self.kind {
            BlockKind::Heading(_) => self
                .inline
                .map(|span| source[span].trim().to_owned())
                .unwrap_or_default(),
            BlockKind::Paragraph => self
                .inline
                .map(|span| source[span].trim_end().to_owned())
                .unwrap_or_default(),
            BlockKind::CodeBlock => self
                .code
                .strip_suffix('\n')
                .unwrap_or(&self.code)
                .to_owned(),
            _ => raw.clone(),
        };
        ContentBlock {
            kind: self.kind,
            line_start: line_index.line_at(self.start),
            raw,
            text,
            lang: self.lang,
        }
    }
}

/// Build the [`BlockKind::Space`] token separating the previous block from a
/// block starting at `next_start`, if the gap holds a blank line.
///
/// `previous` is the content end of the last block and whether that block
/// absorbs the blank lines after it (see [`absorbs_following_blank`]).
fn space_between(
    source: &str,
    previous: Option<(usize, bool)>,
    next_start: usize,
    line_index: &LineIndex,
) -> Option<ContentBlock> {
    let (prev_end, absorbed) = previous?;
    if absorbed {
        return None;
    }
    let gap = source.get(prev_end..next_start)?;
    if !gap.trim().is_empty() || gap.matches('\n').count() < 2 {
        return None;
    }
    Some(ContentBlock {
        kind: BlockKind::Space,
        line_start: line_index.line_at(prev_end),
        raw: gap.to_owned(),
        text: gap.to_owned(),
        lang: None,
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Lex a markdown source string into its top-level blocks.
pub fn lex(source: &str) -> Vec<ContentBlock> {
    let line_index = LineIndex::new(source);

    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(source, options);

    let mut blocks: Vec<ContentBlock> = Vec::new();
    let mut block_depth: usize = 0;
    let mut current: Option<OpenBlock> = None;
    // (content end offset, absorbs blank lines) of the last top-level block
    let mut previous: Option<(usize, bool)> = None;

    for (event, range) in parser.into_offset_iter() {
        match &event {
            Event::Start(tag) if is_block_level(tag) => {
                if block_depth == 0 {
                    if let Some(kind) = tag_to_block_kind(tag) {
                        blocks.extend(space_between(source, previous, range.start, &line_index));
                        current = Some(OpenBlock::new(tag, kind, range.start));
                    }
                }
                block_depth += 1;
            }

            Event::End(tag_end) if is_block_level_end(tag_end) => {
                block_depth = block_depth.saturating_sub(1);
                if block_depth == 0 {
                    if let Some(open) = current.take() {
                        let start = open.start;
                        let absorbs_blank = open.absorbs_blank;
                        let block = open.finish(source, range.end, &line_index);
                        previous = Some((start + block.raw.len(), absorbs_blank));
                        blocks.push(block);
                    }
                }
            }

            Event::Rule if block_depth == 0 => {
                blocks.extend(space_between(source, previous, range.start, &line_index));
                let end = content_end(source, range.start, range.end);
                blocks.push(ContentBlock {
                    kind: BlockKind::ThematicBreak,
                    line_start: line_index.line_at(range.start),
                    raw: source[range.start..end].to_owned(),
                    text: String::new(),
                    lang: None,
                });
                previous = Some((end, true));
            }

            Event::Text(text) => {
                if let Some(open) = current.as_mut() {
                    if open.kind == BlockKind::CodeBlock {
                        open.code.push_str(text);
                    }
                    open.extend_inline(&range);
                }
            }

            _ => {
                if block_depth > 0 {
                    if let Some(open) = current.as_mut() {
                        open.extend_inline(&range);
                    }
                }
            }
        }
    }

    blocks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(blocks: &[ContentBlock]) -> Vec<BlockKind> {
        blocks.iter().map(|b| b.kind).collect()
    }

    #[test]
    fn empty_document() {
        assert!(lex("").is_empty());
    }

    #[test]
    fn single_paragraph() {
        let blocks = lex("Hello world.\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Paragraph);
        assert_eq!(blocks[0].text, "Hello world.");
        assert_eq!(blocks[0].line_start, 1);
    }

    #[test]
    fn headings_carry_depth_and_line() {
        let blocks = lex("# Title\n\n## Section\n\n### Sub\n");
        assert_eq!(
            kinds(&blocks),
            vec![BlockKind::Heading(1), BlockKind::Heading(2), BlockKind::Heading(3)]
        );
        assert_eq!(blocks[1].text, "Section");
        assert_eq!(blocks[1].line_start, 3);
        assert_eq!(blocks[2].line_start, 5);
    }

    #[test]
    fn setext_heading_is_depth_two() {
        let blocks = lex("Section\n-------\n");
        assert_eq!(blocks[0].kind, BlockKind::Heading(2));
        assert_eq!(blocks[0].text, "Section");
    }

    #[test]
    fn heading_keeps_inline_markdown() {
        let blocks = lex("## The `display` *property*\n");
        assert_eq!(blocks[0].text, "The `display` *property*");
    }

    #[test]
    fn paragraph_keeps_inline_markdown() {
        let blocks = lex("Use **grid** and [MDN](https://developer.mozilla.org).\n");
        assert_eq!(
            blocks[0].text,
            "Use **grid** and [MDN](https://developer.mozilla.org)."
        );
    }

    #[test]
    fn multiline_paragraph() {
        let blocks = lex("Line one\nline two\nline three\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Line one\nline two\nline three");
        assert_eq!(blocks[0].line_start, 1);
    }

    #[test]
    fn fenced_code_with_language() {
        let blocks = lex("```css\n.box {\n  color: red;\n}\n```\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::CodeBlock);
        assert_eq!(blocks[0].lang.as_deref(), Some("css"));
        assert_eq!(blocks[0].text, ".box {\n  color: red;\n}");
    }

    #[test]
    fn info_string_language_is_first_word() {
        let blocks = lex("```html title=demo\n<p>hi</p>\n```\n");
        assert_eq!(blocks[0].lang.as_deref(), Some("html"));
        assert_eq!(blocks[0].text, "<p>hi</p>");
    }

    #[test]
    fn indented_code_has_no_language() {
        let blocks = lex("    plain code\n");
        assert_eq!(blocks[0].kind, BlockKind::CodeBlock);
        assert_eq!(blocks[0].lang, None);
        assert_eq!(blocks[0].text, "plain code");
    }

    #[test]
    fn space_between_paragraphs_is_verbatim() {
        let blocks = lex("First\n\n\nSecond\n");
        assert_eq!(
            kinds(&blocks),
            vec![BlockKind::Paragraph, BlockKind::Space, BlockKind::Paragraph]
        );
        assert_eq!(blocks[1].raw, "\n\n\n");
    }

    #[test]
    fn no_space_after_heading() {
        let blocks = lex("## Title\n\nText\n");
        assert_eq!(kinds(&blocks), vec![BlockKind::Heading(2), BlockKind::Paragraph]);
    }

    #[test]
    fn space_follows_fenced_code() {
        let blocks = lex("Text\n\n```css\na {}\n```\n\nMore\n");
        assert_eq!(
            kinds(&blocks),
            vec![
                BlockKind::Paragraph,
                BlockKind::Space,
                BlockKind::CodeBlock,
                BlockKind::Space,
                BlockKind::Paragraph,
            ]
        );
        assert_eq!(blocks[3].raw, "\n\n");
    }

    #[test]
    fn no_space_after_indented_code_html_or_rule() {
        let blocks = lex("Text\n\n    code\n\nMore\n");
        assert_eq!(
            kinds(&blocks),
            vec![
                BlockKind::Paragraph,
                BlockKind::Space,
                BlockKind::CodeBlock,
                BlockKind::Paragraph,
            ]
        );

        let blocks = lex("Text\n\n<div>\nx\n</div>\n\nMore\n");
        assert_eq!(
            kinds(&blocks),
            vec![
                BlockKind::Paragraph,
                BlockKind::Space,
                BlockKind::HtmlBlock,
                BlockKind::Paragraph,
            ]
        );

        let blocks = lex("Text\n\n***\n\nMore\n");
        assert_eq!(
            kinds(&blocks),
            vec![
                BlockKind::Paragraph,
                BlockKind::Space,
                BlockKind::ThematicBreak,
                BlockKind::Paragraph,
            ]
        );
    }

    #[test]
    fn nested_paragraphs_stay_in_container() {
        let blocks = lex("- alpha\n- beta\n\n> quoted\n");
        assert_eq!(kinds(&blocks), vec![BlockKind::List, BlockKind::BlockQuote]);
        assert!(blocks[0].raw.contains("alpha"));
        assert!(blocks[1].raw.contains("quoted"));
    }

    #[test]
    fn thematic_break_and_table() {
        let blocks = lex("above\n\n---\n\n| A | B |\n|---|---|\n| 1 | 2 |\n");
        let found = kinds(&blocks);
        assert!(found.contains(&BlockKind::ThematicBreak));
        assert!(found.contains(&BlockKind::Table));
    }

    #[test]
    fn html_block() {
        let blocks = lex("<div class=\"note\">\nhi\n</div>\n");
        assert_eq!(blocks[0].kind, BlockKind::HtmlBlock);
        assert!(blocks[0].raw.starts_with("<div"));
    }

    #[test]
    fn line_ranges_increase() {
        let blocks = lex("# A\n\nPara 1\n\n## B\n\nPara 2\n");
        for window in blocks.windows(2) {
            assert!(
                window[0].line_start <= window[1].line_start,
                "blocks should appear in source order"
            );
        }
    }
}
