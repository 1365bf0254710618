//! Terminal rendering of assistant replies.
//!
//! Markdown is walked with `pulldown-cmark` and mapped onto ANSI styles;
//! fenced code blocks are highlighted with `syntect`. Raw mode prints the
//! reply untouched.

use crossterm::style::{Attribute, Color, ContentStyle};
use once_cell::sync::Lazy;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use std::io::Write;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const CODE_THEME: &str = "base16-ocean.dark";
const RESET: &str = "\x1b[0m";

/// Parse a `#RRGGBB` (or `RRGGBB`) colour.
pub fn parse_hex_color(hex: &str) -> Option<Color> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb { r, g, b })
}

/// Formats reply text for the terminal. Stateless between calls.
///
/// `color` paints prose and link targets; inline code keeps its own colour
/// and code blocks use the highlighting theme.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    markdown: bool,
    color: Option<Color>,
}

impl Renderer {
    pub fn new(markdown: bool, color: Option<Color>) -> Self {
        Self { markdown, color }
    }

    /// Renderer that prints replies verbatim.
    pub fn plain() -> Self {
        Self::new(false, None)
    }

    pub fn render(&self, text: &str) -> String {
        if self.markdown {
            self.render_markdown(text)
        } else {
            text.to_string()
        }
    }

    /// Render `text` and write it followed by a newline.
    pub fn write_reply<W: Write>(&self, out: &mut W, text: &str) -> std::io::Result<()> {
        writeln!(out, "{}", self.render(text))?;
        out.flush()
    }

    fn render_markdown(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + text.len() / 4);
        let mut inline = InlineState::default();
        let mut lists: Vec<Option<u64>> = Vec::new();
        let mut links: Vec<String> = Vec::new();
        let mut code: Option<(String, String)> = None;

        let parser = Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH);
        for event in parser {
            match event {
                Event::Start(Tag::Heading { .. }) => inline.heading = true,
                Event::End(TagEnd::Heading(_)) => {
                    inline.heading = false;
                    out.push_str("\n\n");
                }
                Event::End(TagEnd::Paragraph) => {
                    out.push('\n');
                    if lists.is_empty() {
                        out.push('\n');
                    }
                }
                Event::Start(Tag::Emphasis) => inline.emphasis += 1,
                Event::End(TagEnd::Emphasis) => inline.emphasis = inline.emphasis.saturating_sub(1),
                Event::Start(Tag::Strong) => inline.strong += 1,
                Event::End(TagEnd::Strong) => inline.strong = inline.strong.saturating_sub(1),
                Event::Start(Tag::Strikethrough) => inline.strike += 1,
                Event::End(TagEnd::Strikethrough) => inline.strike = inline.strike.saturating_sub(1),
                Event::Start(Tag::List(start)) => {
                    if !lists.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    lists.push(start);
                }
                Event::End(TagEnd::List(_)) => {
                    lists.pop();
                    if lists.is_empty() {
                        out.push('\n');
                    }
                }
                Event::Start(Tag::Item) => {
                    let depth = lists.len().saturating_sub(1);
                    out.push_str(&"  ".repeat(depth));
                    match lists.last_mut() {
                        Some(Some(n)) => {
                            out.push_str(&format!("{}. ", n));
                            *n += 1;
                        }
                        _ => out.push_str("• "),
                    }
                }
                Event::End(TagEnd::Item) => {
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => {
                            info.split_whitespace().next().unwrap_or("").to_string()
                        }
                        CodeBlockKind::Indented => String::new(),
                    };
                    code = Some((lang, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, body)) = code.take() {
                        out.push_str(&highlight_code(&body, &lang));
                        out.push_str("\n\n");
                    }
                }
                Event::Start(Tag::Link { dest_url, .. }) => links.push(dest_url.to_string()),
                Event::End(TagEnd::Link) => {
                    if let Some(url) = links.pop() {
                        let mut style = ContentStyle::new();
                        style.foreground_color = self.color;
                        style.attributes.set(Attribute::Dim);
                        out.push_str(&style.apply(format!(" ({})", url)).to_string());
                    }
                }
                Event::Text(t) => match code.as_mut() {
                    Some((_, body)) => body.push_str(&t),
                    None => out.push_str(&self.paint(&t, &inline)),
                },
                Event::Code(t) => {
                    let mut style = ContentStyle::new();
                    style.foreground_color = Some(Color::Cyan);
                    out.push_str(&style.apply(t.as_ref()).to_string());
                }
                Event::Html(t) | Event::InlineHtml(t) => out.push_str(&t),
                Event::SoftBreak | Event::HardBreak => out.push('\n'),
                Event::Rule => out.push_str(&format!("{}\n\n", "─".repeat(40))),
                _ => {}
            }
        }

        out.truncate(out.trim_end().len());
        out
    }

    fn paint(&self, text: &str, inline: &InlineState) -> String {
        let mut style = ContentStyle::new();
        style.foreground_color = self.color;
        if inline.heading || inline.strong > 0 {
            style.attributes.set(Attribute::Bold);
        }
        if inline.heading {
            style.attributes.set(Attribute::Underlined);
        }
        if inline.emphasis > 0 {
            style.attributes.set(Attribute::Italic);
        }
        if inline.strike > 0 {
            style.attributes.set(Attribute::CrossedOut);
        }

        if style == ContentStyle::default() {
            text.to_string()
        } else {
            style.apply(text).to_string()
        }
    }
}

#[derive(Debug, Default)]
struct InlineState {
    heading: bool,
    strong: usize,
    emphasis: usize,
    strike: usize,
}

/// Highlight a code block for a 24-bit terminal, falling back to plain text
/// for unknown languages. The result has no trailing newline.
fn highlight_code(code: &str, lang: &str) -> String {
    let code = code.trim_end_matches('\n');
    let syntax = SYNTAXES
        .find_syntax_by_token(lang)
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());
    let Some(theme) = THEMES.themes.get(CODE_THEME) else {
        return code.to_string();
    };

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut out = String::with_capacity(code.len() * 2);
    for line in LinesWithEndings::from(code) {
        match highlighter.highlight_line(line, &SYNTAXES) {
            Ok(ranges) => out.push_str(&as_24_bit_terminal_escaped(&ranges[..], false)),
            Err(_) => out.push_str(line),
        }
    }
    out.push_str(RESET);
    out
}
