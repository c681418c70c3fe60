//! Markdown to ClickUp rich-text comment segments.
//!
//! ClickUp comments are a flat list of `{text, attributes}` segments. Agent
//! and sidebar comments are written in markdown, so they are parsed with
//! comrak and flattened: emphasis becomes attributes, block boundaries and
//! line breaks become standalone `"\n"` segments.

use comrak::nodes::{Ast, NodeValue};
use comrak::{Arena, Options};
use serde::{Deserialize, Serialize};

type Node<'a> = comrak::arena_tree::Node<'a, std::cell::RefCell<Ast>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentAttributes {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSegment {
    pub text: String,
    #[serde(default)]
    pub attributes: SegmentAttributes,
}

impl CommentSegment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::styled(text, SegmentAttributes::default())
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self::styled(
            text,
            SegmentAttributes {
                bold: true,
                ..Default::default()
            },
        )
    }

    pub fn italic(text: impl Into<String>) -> Self {
        Self::styled(
            text,
            SegmentAttributes {
                italic: true,
                ..Default::default()
            },
        )
    }

    pub fn code(text: impl Into<String>) -> Self {
        Self::styled(
            text,
            SegmentAttributes {
                code: true,
                ..Default::default()
            },
        )
    }

    fn styled(text: impl Into<String>, attributes: SegmentAttributes) -> Self {
        Self {
            text: text.into(),
            attributes,
        }
    }

    fn is_newline(&self) -> bool {
        self.text == "\n"
    }
}

/// Footer line appended to every comment, by board locale.
pub fn ai_footer(locale: &str) -> &'static str {
    let lang = locale
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match lang.as_str() {
        "es" => "Generado automáticamente por IA",
        "pt" => "Gerado automaticamente por IA",
        "fr" => "Généré automatiquement par IA",
        "de" => "Automatisch von KI generiert",
        _ => "Auto-generated by AI",
    }
}

/// Full comment body: rendered markdown, a separator, then the italic footer.
pub fn build_comment(markdown: &str, locale: &str) -> Vec<CommentSegment> {
    let mut segments = markdown_to_segments(markdown);
    if !segments.is_empty() {
        segments.push(CommentSegment::plain("\n\n"));
    }
    segments.push(CommentSegment::italic(ai_footer(locale)));
    segments
}

/// Flatten markdown into styled segments.
pub fn markdown_to_segments(markdown: &str) -> Vec<CommentSegment> {
    let options = Options::default();
    let arena = Arena::new();
    let root = comrak::parse_document(&arena, markdown, &options);

    let mut out = SegmentWriter::default();
    out.walk(root, SegmentAttributes::default());
    out.segments
}

#[derive(Default)]
struct SegmentWriter {
    segments: Vec<CommentSegment>,
    /// A block ended; the next text starts on a new line.
    pending_break: bool,
}

impl SegmentWriter {
    fn walk<'a>(&mut self, node: &'a Node<'a>, style: SegmentAttributes) {
        let value = node.data.borrow().value.clone();
        match value {
            NodeValue::Text(text) => self.push(&text, style),
            NodeValue::Code(code) => self.push(
                &code.literal,
                SegmentAttributes {
                    code: true,
                    ..style
                },
            ),
            NodeValue::CodeBlock(block) => {
                self.push(
                    block.literal.trim_end_matches('\n'),
                    SegmentAttributes {
                        code: true,
                        ..Default::default()
                    },
                );
                self.pending_break = true;
            }
            NodeValue::HtmlInline(html) => self.push(&html, style),
            NodeValue::HtmlBlock(block) => {
                self.push(block.literal.trim_end_matches('\n'), style);
                self.pending_break = true;
            }
            NodeValue::SoftBreak | NodeValue::LineBreak => self.newline(),
            NodeValue::Strong => self.children(node, SegmentAttributes { bold: true, ..style }),
            NodeValue::Emph => self.children(
                node,
                SegmentAttributes {
                    italic: true,
                    ..style
                },
            ),
            NodeValue::Heading(_) => {
                self.children(node, SegmentAttributes { bold: true, ..style });
                self.pending_break = true;
            }
            NodeValue::Paragraph => {
                self.children(node, style);
                self.pending_break = true;
            }
            NodeValue::Item(_) => {
                self.push("- ", SegmentAttributes::default());
                self.children(node, style);
                self.pending_break = true;
            }
            NodeValue::Link(link) => {
                let before = self.text_len();
                self.children(node, style);
                let label_is_url = self
                    .segments
                    .last()
                    .is_some_and(|s| s.text.ends_with(&link.url));
                if self.text_len() == before {
                    self.push(&link.url, style);
                } else if !label_is_url && !link.url.is_empty() {
                    self.push(&format!(" ({})", link.url), style);
                }
            }
            NodeValue::ThematicBreak => {
                self.push("---", SegmentAttributes::default());
                self.pending_break = true;
            }
            _ => self.children(node, style),
        }
    }

    fn children<'a>(&mut self, node: &'a Node<'a>, style: SegmentAttributes) {
        for child in node.children() {
            self.walk(child, style);
        }
    }

    fn text_len(&self) -> usize {
        self.segments.iter().map(|s| s.text.len()).sum()
    }

    fn newline(&mut self) {
        self.pending_break = false;
        self.segments.push(CommentSegment::plain("\n"));
    }

    fn push(&mut self, text: &str, attributes: SegmentAttributes) {
        if text.is_empty() {
            return;
        }
        if self.pending_break {
            self.newline();
        }
        match self.segments.last_mut() {
            Some(last) if last.attributes == attributes && !last.is_newline() => {
                last.text.push_str(text);
            }
            _ => self
                .segments
                .push(CommentSegment::styled(text, attributes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_styles() {
        let segments = markdown_to_segments("Hello **world** and *stuff* with `code`");
        assert_eq!(
            segments,
            vec![
                CommentSegment::plain("Hello "),
                CommentSegment::bold("world"),
                CommentSegment::plain(" and "),
                CommentSegment::italic("stuff"),
                CommentSegment::plain(" with "),
                CommentSegment::code("code"),
            ]
        );
    }

    #[test]
    fn test_paragraphs_become_newline_segments() {
        let segments = markdown_to_segments("first\n\nsecond");
        assert_eq!(
            segments,
            vec![
                CommentSegment::plain("first"),
                CommentSegment::plain("\n"),
                CommentSegment::plain("second"),
            ]
        );
    }

    #[test]
    fn test_line_break_inside_paragraph() {
        let segments = markdown_to_segments("one\ntwo");
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "\n", "two"]);
    }

    #[test]
    fn test_code_block_is_code_segment() {
        let segments = markdown_to_segments("Run:\n\n```\ncargo fix\n```\n");
        assert_eq!(segments.last().unwrap(), &CommentSegment::code("cargo fix"));
    }

    #[test]
    fn test_list_items() {
        let segments = markdown_to_segments("- a\n- b\n");
        let joined: String = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined, "- a\n- b");
    }

    #[test]
    fn test_build_comment_appends_localized_footer() {
        let segments = build_comment("Done", "es");
        assert_eq!(segments[0], CommentSegment::plain("Done"));
        assert_eq!(segments[1], CommentSegment::plain("\n\n"));
        assert_eq!(
            segments[2],
            CommentSegment::italic("Generado automáticamente por IA")
        );
    }

    #[test]
    fn test_footer_fallback() {
        assert_eq!(ai_footer("pt-BR"), "Gerado automaticamente por IA");
        assert_eq!(ai_footer("de_DE"), "Automatisch von KI generiert");
        assert_eq!(ai_footer("fr"), "Généré automatiquement par IA");
        assert_eq!(ai_footer("ja"), "Auto-generated by AI");
        assert_eq!(ai_footer(""), "Auto-generated by AI");
    }

    #[test]
    fn test_segment_serialization_skips_false_attributes() {
        let value = serde_json::to_value(CommentSegment::bold("x")).unwrap();
        assert_eq!(value, serde_json::json!({"text": "x", "attributes": {"bold": true}}));
        let value = serde_json::to_value(CommentSegment::plain("x")).unwrap();
        assert_eq!(value, serde_json::json!({"text": "x", "attributes": {}}));
    }
}
