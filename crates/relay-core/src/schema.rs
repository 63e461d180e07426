//! Result schema: the caller's description of the expected answer shape
//!
//! A schema is communicated to providers as an instruction, not enforced
//! against the answer. It is immutable once built: there are no mutators,
//! only constructors.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Shape of one value in the result tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchemaNode {
    String,
    Number,
    Integer,
    Boolean,
    Enum { values: Vec<String> },
    Array { items: Box<SchemaNode> },
    Object { fields: Vec<SchemaField> },
}

/// A named field of an object node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    name: String,
    #[serde(default = "default_required")]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(flatten)]
    node: SchemaNode,
}

fn default_required() -> bool {
    true
}

impl SchemaField {
    pub fn required(name: impl Into<String>, node: SchemaNode) -> Self {
        Self {
            name: name.into(),
            required: true,
            description: None,
            node,
        }
    }

    pub fn optional(name: impl Into<String>, node: SchemaNode) -> Self {
        Self {
            required: false,
            ..Self::required(name, node)
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn node(&self) -> &SchemaNode {
        &self.node
    }
}

impl SchemaNode {
    pub fn object(fields: Vec<SchemaField>) -> Self {
        Self::Object { fields }
    }

    pub fn array(items: SchemaNode) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Named description of a structured result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSchema {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    root: SchemaNode,
}

const INSTRUCTION_PREAMBLE: &str = "You are a structured data service. \
Answer with a single JSON value and nothing else: no prose, no explanations.";

impl ResultSchema {
    pub fn new(name: impl Into<String>, root: SchemaNode) -> Self {
        Self {
            name: name.into(),
            description: None,
            root,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// Compact, human-readable rendering of the expected shape
    pub fn shape(&self) -> String {
        let mut out = String::new();
        render_node(&self.root, 0, &mut out);
        out
    }

    /// System instruction embedded by every provider transport
    pub fn instruction(&self) -> String {
        let mut out = String::from(INSTRUCTION_PREAMBLE);
        out.push_str("\n\n");
        let _ = write!(out, "The value is a \"{}\"", self.name);
        if let Some(description) = &self.description {
            let _ = write!(out, " ({description})");
        }
        out.push_str(" with this shape:\n");
        out.push_str(&self.shape());
        out.push_str(
            "\n\nRequired fields must always be present. Use null for optional fields \
             you cannot determine. Enumerated fields must use one of the listed values exactly.",
        );
        out
    }
}

fn render_node(node: &SchemaNode, indent: usize, out: &mut String) {
    match node {
        SchemaNode::String => out.push_str("string"),
        SchemaNode::Number => out.push_str("number"),
        SchemaNode::Integer => out.push_str("integer"),
        SchemaNode::Boolean => out.push_str("boolean"),
        SchemaNode::Enum { values } => {
            let quoted: Vec<String> = values.iter().map(|v| format!("\"{v}\"")).collect();
            let _ = write!(out, "one of {}", quoted.join(" | "));
        }
        SchemaNode::Array { items } => {
            out.push('[');
            render_node(items, indent, out);
            out.push_str(", ...]");
        }
        SchemaNode::Object { fields } => {
            out.push_str("{\n");
            let pad = "  ".repeat(indent + 1);
            for (i, field) in fields.iter().enumerate() {
                let _ = write!(out, "{pad}\"{}\": ", field.name);
                render_node(&field.node, indent + 1, out);
                out.push_str(if field.required {
                    " (required)"
                } else {
                    " (optional)"
                });
                if let Some(description) = &field.description {
                    let _ = write!(out, " - {description}");
                }
                if i + 1 < fields.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            let _ = write!(out, "{}}}", "  ".repeat(indent));
        }
    }
}
