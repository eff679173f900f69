//! Rendering of model-written Markdown.
//!
//! Model output is untrusted. Raw HTML is dropped and link targets are
//! limited to web and mail schemes before HTML rendering; terminal output
//! has control characters removed so the model cannot emit escape
//! sequences.

use colored::Colorize;
use pulldown_cmark::{html, CowStr, Event, HeadingLevel, Options, Parser, Tag};

use crate::theme::Palette;

fn options() -> Options {
    Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Strips C0/C1 control characters (ESC included), keeping newlines and tabs.
pub fn sanitize_terminal(text: &str) -> String {
    text.chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect()
}

fn is_safe_destination(destination: &str) -> bool {
    let lowered = destination.trim().to_ascii_lowercase();
    let Some((scheme, _)) = lowered.split_once(':') else {
        return true;
    };
    // a colon after a path, query or fragment delimiter is not a scheme
    if scheme.contains(['/', '?', '#']) {
        return true;
    }
    matches!(scheme, "http" | "https" | "mailto")
}

fn neutralize(tag: Tag<'_>) -> Tag<'_> {
    match tag {
        Tag::Link(kind, destination, title) if !is_safe_destination(&destination) => {
            Tag::Link(kind, CowStr::Borrowed("#"), title)
        }
        Tag::Image(kind, destination, title) if !is_safe_destination(&destination) => {
            Tag::Image(kind, CowStr::Borrowed("#"), title)
        }
        other => other,
    }
}

/// Sanitized HTML for the summary.
pub fn to_html(markdown: &str) -> String {
    let events = Parser::new_ext(markdown, options()).filter_map(|event| match event {
        Event::Html(_) => None,
        Event::Start(tag) => Some(Event::Start(neutralize(tag))),
        Event::End(tag) => Some(Event::End(neutralize(tag))),
        other => Some(other),
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

/// Styled terminal text for the summary.
pub fn to_terminal(markdown: &str, palette: &Palette) -> String {
    let mut writer = TerminalWriter::new(palette);
    for event in Parser::new_ext(markdown, options()) {
        writer.event(event);
    }
    writer.finish()
}

struct TerminalWriter<'p> {
    palette: &'p Palette,
    out: String,
    heading: Option<HeadingLevel>,
    strong: usize,
    emphasis: usize,
    strikethrough: usize,
    link: Option<String>,
    in_code_block: bool,
    lists: Vec<Option<u64>>,
}

impl<'p> TerminalWriter<'p> {
    fn new(palette: &'p Palette) -> Self {
        Self {
            palette,
            out: String::new(),
            heading: None,
            strong: 0,
            emphasis: 0,
            strikethrough: 0,
            link: None,
            in_code_block: false,
            lists: Vec::new(),
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    self.code_block_text(&text);
                } else {
                    let styled = self.styled(&text);
                    self.out.push_str(&styled);
                }
            }
            Event::Code(code) => {
                let code = sanitize_terminal(&code);
                let rendered = if self.palette.styled {
                    code.color(self.palette.accent).to_string()
                } else {
                    format!("`{code}`")
                };
                self.out.push_str(&rendered);
            }
            Event::SoftBreak => self.out.push(' '),
            Event::HardBreak => {
                self.out.push('\n');
                self.indent();
            }
            Event::Rule => {
                self.blank_line();
                let rule = "─".repeat(40);
                let rule = self.paint(&rule, self.palette.muted);
                self.out.push_str(&rule);
                self.out.push('\n');
            }
            Event::TaskListMarker(done) => {
                self.out.push_str(if done { "[x] " } else { "[ ] " });
            }
            Event::FootnoteReference(name) => {
                self.out.push_str(&format!("[^{}]", sanitize_terminal(&name)));
            }
            Event::Html(_) => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading(level, _, _) => {
                self.blank_line();
                self.heading = Some(level);
            }
            Tag::Paragraph => {
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.blank_line();
                } else {
                    self.newline();
                }
                self.lists.push(start);
            }
            Tag::Item => {
                self.newline();
                self.indent_for_item();
                let marker = match self.lists.last_mut() {
                    Some(Some(number)) => {
                        let marker = format!("{number}. ");
                        *number += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                let marker = self.paint(&marker, self.palette.accent);
                self.out.push_str(&marker);
            }
            Tag::CodeBlock(_) => {
                self.blank_line();
                self.in_code_block = true;
            }
            Tag::BlockQuote => self.blank_line(),
            Tag::Strong => self.strong += 1,
            Tag::Emphasis => self.emphasis += 1,
            Tag::Strikethrough => self.strikethrough += 1,
            Tag::Link(_, destination, _) => {
                self.link = Some(sanitize_terminal(&destination));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading(..) => {
                self.heading = None;
                self.newline();
            }
            Tag::Paragraph | Tag::Item | Tag::BlockQuote => self.newline(),
            Tag::List(_) => {
                self.lists.pop();
                self.newline();
            }
            Tag::CodeBlock(_) => {
                self.in_code_block = false;
                self.newline();
            }
            Tag::Strong => self.strong = self.strong.saturating_sub(1),
            Tag::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            Tag::Strikethrough => self.strikethrough = self.strikethrough.saturating_sub(1),
            Tag::Link(..) => {
                if let Some(destination) = self.link.take() {
                    if !destination.is_empty() && !self.out.ends_with(destination.as_str()) {
                        let suffix = format!(" ({destination})");
                        let suffix = self.paint(&suffix, self.palette.muted);
                        self.out.push_str(&suffix);
                    }
                }
            }
            _ => {}
        }
    }

    fn styled(&self, text: &str) -> String {
        let clean = sanitize_terminal(text);
        if !self.palette.styled {
            return clean;
        }

        let mut styled = clean.normal();
        if let Some(level) = self.heading {
            styled = styled.color(self.palette.heading).bold();
            if level == HeadingLevel::H1 {
                styled = styled.underline();
            }
        }
        if self.strong > 0 {
            styled = styled.color(self.palette.strong).bold();
        }
        if self.emphasis > 0 {
            styled = styled.italic();
        }
        if self.strikethrough > 0 {
            styled = styled.strikethrough();
        }
        if self.link.is_some() {
            styled = styled.color(self.palette.link).underline();
        }
        styled.to_string()
    }

    fn paint(&self, text: &str, color: colored::Color) -> String {
        if self.palette.styled {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn code_block_text(&mut self, text: &str) {
        for line in sanitize_terminal(text).lines() {
            let line = format!("    {line}");
            let line = self.paint(&line, self.palette.muted);
            self.out.push_str(&line);
            self.out.push('\n');
        }
    }

    fn indent(&mut self) {
        let depth = self.lists.len();
        if depth > 0 {
            self.out.push_str(&"  ".repeat(depth));
        }
    }

    fn indent_for_item(&mut self) {
        let depth = self.lists.len().saturating_sub(1);
        self.out.push_str(&"  ".repeat(depth));
    }

    fn newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn blank_line(&mut self) {
        self.newline();
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        let trimmed = self.out.trim_end();
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}\n")
        }
    }
}
