//! Conversion between plain text and Jira's Atlassian Document Format.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct AdfDocument {
    #[serde(rename = "type")]
    doc_type: &'static str,
    version: u8,
    content: Vec<AdfBlock>,
}

impl AdfDocument {
    /// Blank lines separate paragraphs, single newlines become hard breaks.
    pub fn from_markdown(text: &str) -> Self {
        let cleaned = text.replace('\r', "");
        let content = cleaned
            .split("\n\n")
            .map(|section| section.trim())
            .filter(|section| !section.is_empty())
            .map(AdfBlock::paragraph)
            .collect();

        Self {
            doc_type: "doc",
            version: 1,
            content,
        }
    }
}

#[derive(Debug, Serialize)]
struct AdfBlock {
    #[serde(rename = "type")]
    node_type: &'static str,
    content: Vec<AdfInline>,
}

impl AdfBlock {
    fn paragraph(section: &str) -> Self {
        let mut content = Vec::new();
        for (index, line) in section.lines().enumerate() {
            if index > 0 {
                content.push(AdfInline::HardBreak);
            }
            let line = line.trim_end();
            if !line.is_empty() {
                content.push(AdfInline::Text {
                    text: line.to_string(),
                });
            }
        }
        Self {
            node_type: "paragraph",
            content,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum AdfInline {
    Text { text: String },
    HardBreak,
}

/// Flattens an ADF document (or a legacy plain string field) to text.
pub fn adf_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(_) | Value::Array(_) => {
            let mut blocks = Vec::new();
            collect_blocks(value, &mut blocks);
            blocks.join("\n\n")
        }
        _ => String::new(),
    }
}

fn collect_blocks(value: &Value, blocks: &mut Vec<String>) {
    match value {
        Value::Array(nodes) => nodes.iter().for_each(|node| collect_blocks(node, blocks)),
        Value::Object(node) => match node.get("type").and_then(Value::as_str) {
            Some("paragraph" | "heading" | "codeBlock") => {
                let text = inline_text(value);
                if !text.trim().is_empty() {
                    blocks.push(text);
                }
            }
            _ => {
                if let Some(content) = node.get("content") {
                    collect_blocks(content, blocks);
                }
            }
        },
        _ => {}
    }
}

fn inline_text(value: &Value) -> String {
    let mut out = String::new();
    let children = value
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for child in children {
        match child.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = child.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
            Some("hardBreak") => out.push('\n'),
            Some("mention" | "emoji") => {
                if let Some(text) = child.pointer("/attrs/text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
            _ => out.push_str(&inline_text(child)),
        }
    }
    out
}
