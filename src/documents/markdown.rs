use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use super::{Document, LoadError};

pub(super) fn load_markdown(bytes: &[u8], origin: &str) -> Result<Vec<Document>, LoadError> {
    let source = std::str::from_utf8(bytes)?;
    Ok(vec![Document {
        source: origin.to_string(),
        page: None,
        content: markdown_to_text(source),
    }])
}

/// Render Markdown to plain text, one block per paragraph separated by blank lines.
///
/// Headings, paragraphs, list items, code blocks and table rows each become a block. Inline
/// markup is dropped and raw HTML is skipped.
#[must_use]
pub fn markdown_to_text(input: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();

    for event in Parser::new_ext(input, options) {
        match event {
            Event::Text(text) | Event::Code(text) => current.push_str(&text),
            Event::SoftBreak | Event::HardBreak => current.push('\n'),
            Event::Start(Tag::Item) => flush(&mut blocks, &mut current),
            Event::End(TagEnd::TableCell) => current.push(' '),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::CodeBlock
                | TagEnd::Item
                | TagEnd::TableHead
                | TagEnd::TableRow,
            ) => flush(&mut blocks, &mut current),
            _ => {}
        }
    }
    flush(&mut blocks, &mut current);
    blocks.join("\n\n")
}

fn flush(blocks: &mut Vec<String>, current: &mut String) {
    let block = current.trim();
    if !block.is_empty() {
        blocks.push(block.to_string());
    }
    current.clear();
}
