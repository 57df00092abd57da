//! Filter descriptions.
//!
//! ```text
//! description := chain (';' chain)*
//! chain       := filter (',' filter)*
//! filter      := label* kind ('@' name)? ('=' args)? label*
//! label       := '[' text ']'
//! ```
//!
//! Inside a chain, outputs not claimed by labels feed the next filter's
//! unlabelled inputs in order. Equal labels on an output and an input are
//! linked. A label naming a node already in the graph links to that node's
//! pad 0, which is how a description attaches to sources and sinks created
//! beforehand. The first filter's unlabelled input is called `in` and the
//! last filter's unlabelled output `out`. Labels left unmatched are
//! returned as [`OpenPads`].
//!
//! Arguments run to the next unquoted `,`, `;` or `[`; single quotes protect
//! those characters and are removed.

use crate::graph::Graph;
use crate::node::NodeId;
use tracing::debug;
use transcode_core::{Error, Result};

/// A pad left unlinked by a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPad {
    /// Label written in the description, if any.
    pub label: Option<String>,
    /// Node owning the pad.
    pub node: NodeId,
    /// Pad index.
    pub pad: usize,
}

/// Unlinked pads of a parsed description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenPads {
    /// Input pads still waiting for an upstream link.
    pub inputs: Vec<OpenPad>,
    /// Output pads still waiting for a downstream link.
    pub outputs: Vec<OpenPad>,
}

impl OpenPads {
    /// Check if every pad got linked.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct FilterSpec {
    inputs: Vec<String>,
    kind: String,
    name: Option<String>,
    args: String,
    outputs: Vec<String>,
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

fn syntax(message: impl std::fmt::Display) -> Error {
    Error::invalid_config(format!("filter description: {message}"))
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&accept) {
            self.bump();
        }
        &self.text[start..self.pos]
    }

    fn chains(&mut self) -> Result<Vec<Vec<FilterSpec>>> {
        let mut chains = Vec::new();
        loop {
            chains.push(self.chain()?);
            match self.bump() {
                Some(';') => continue,
                None => return Ok(chains),
                Some(c) => return Err(syntax(format!("unexpected '{c}' at offset {}", self.pos - 1))),
            }
        }
    }

    fn chain(&mut self) -> Result<Vec<FilterSpec>> {
        let mut chain = vec![self.filter()?];
        while self.peek() == Some(',') {
            self.bump();
            chain.push(self.filter()?);
        }
        Ok(chain)
    }

    fn labels(&mut self) -> Result<Vec<String>> {
        let mut labels = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some('[') {
            self.bump();
            let label = self.take_while(|c| c != ']').trim();
            if self.bump() != Some(']') {
                return Err(syntax("unterminated label"));
            }
            if label.is_empty() {
                return Err(syntax(format!("empty label at offset {}", self.pos)));
            }
            labels.push(label.to_string());
            self.skip_whitespace();
        }
        Ok(labels)
    }

    fn filter(&mut self) -> Result<FilterSpec> {
        let inputs = self.labels()?;
        let kind = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        if kind.is_empty() {
            return Err(syntax(format!("expected a filter kind at offset {}", self.pos)));
        }
        let mut spec = FilterSpec {
            inputs,
            kind: kind.to_string(),
            ..FilterSpec::default()
        };
        if self.peek() == Some('@') {
            self.bump();
            let name = self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if name.is_empty() {
                return Err(syntax(format!("expected an instance name after '{kind}@'")));
            }
            spec.name = Some(name.to_string());
        }
        self.skip_whitespace();
        if self.peek() == Some('=') {
            self.bump();
            spec.args = self.args()?;
        }
        spec.outputs = self.labels()?;
        Ok(spec)
    }

    fn args(&mut self) -> Result<String> {
        let mut args = String::new();
        let mut quoted = false;
        while let Some(c) = self.peek() {
            match c {
                '\'' => quoted = !quoted,
                ',' | ';' | '[' if !quoted => break,
                _ => args.push(c),
            }
            self.bump();
        }
        if quoted {
            return Err(syntax("unterminated quote"));
        }
        Ok(args.trim().to_string())
    }
}

/// A pad with an optional label, before label matching.
struct Pending {
    label: Option<String>,
    node: NodeId,
    pad: usize,
}

impl Graph {
    /// Add the nodes and links of a filter description.
    ///
    /// Nodes without an `@name` are called `parsed_<kind>_<n>`.
    ///
    /// ```ignore
    /// let src = graph.create_node("buffer", "in", "video_size=64x48:pix_fmt=yuv420p")?;
    /// let sink = graph.create_node("buffersink", "out", "")?;
    /// let open = graph.parse("[in]split=2[a][b];[a]scale=w=32:h=24[s];[b][s]overlay[out]")?;
    /// assert!(open.is_empty());
    /// ```
    pub fn parse(&mut self, description: &str) -> Result<OpenPads> {
        let chains = Parser::new(description).chains()?;
        let existing = self.node_count();
        let chain_count = chains.len();

        let mut inputs: Vec<Pending> = Vec::new();
        let mut outputs: Vec<Pending> = Vec::new();
        let mut created = 0;
        for (c, chain) in chains.into_iter().enumerate() {
            let len = chain.len();
            let mut carried: Vec<(NodeId, usize)> = Vec::new();
            for (f, spec) in chain.into_iter().enumerate() {
                let name = match &spec.name {
                    Some(name) => name.clone(),
                    None => self.auto_name(&spec.kind, created),
                };
                created += 1;
                let id = self.create_node(&spec.kind, &name, &spec.args)?;
                let (in_count, out_count) = self.pad_counts(id);

                if spec.inputs.len() > in_count || spec.outputs.len() > out_count {
                    return Err(syntax(format!(
                        "'{name}' has {in_count} inputs and {out_count} outputs, {} and {} labels given",
                        spec.inputs.len(),
                        spec.outputs.len()
                    )));
                }
                for (pad, label) in spec.inputs.iter().enumerate() {
                    inputs.push(Pending {
                        label: Some(label.clone()),
                        node: id,
                        pad,
                    });
                }
                let mut upstream = std::mem::take(&mut carried).into_iter();
                for pad in spec.inputs.len()..in_count {
                    match upstream.next() {
                        Some((src, src_pad)) => self.link(src, src_pad, id, pad)?,
                        None => {
                            let first = c == 0 && f == 0 && !inputs.iter().any(|p| p.label.as_deref() == Some("in"));
                            inputs.push(Pending {
                                label: first.then(|| "in".to_string()),
                                node: id,
                                pad,
                            });
                        }
                    }
                }
                outputs.extend(upstream.map(|(node, pad)| Pending {
                    label: None,
                    node,
                    pad,
                }));

                for (pad, label) in spec.outputs.iter().enumerate() {
                    outputs.push(Pending {
                        label: Some(label.clone()),
                        node: id,
                        pad,
                    });
                }
                carried = (spec.outputs.len()..out_count).map(|pad| (id, pad)).collect();
                if f + 1 == len {
                    let last = c + 1 == chain_count;
                    for (i, (node, pad)) in carried.drain(..).enumerate() {
                        outputs.push(Pending {
                            label: (last && i == 0).then(|| "out".to_string()),
                            node,
                            pad,
                        });
                    }
                }
            }
        }

        let open = self.match_labels(inputs, outputs, existing)?;
        debug!(
            parent: self.logger().span(),
            nodes = created,
            open_inputs = open.inputs.len(),
            open_outputs = open.outputs.len(),
            "description parsed"
        );
        Ok(open)
    }

    fn auto_name(&self, kind: &str, index: usize) -> String {
        let mut n = index;
        loop {
            let name = format!("parsed_{kind}_{n}");
            if self.node_id(&name).is_none() {
                return name;
            }
            n += 1;
        }
    }

    fn match_labels(&mut self, inputs: Vec<Pending>, outputs: Vec<Pending>, existing: usize) -> Result<OpenPads> {
        let mut open = OpenPads::default();
        let mut inputs: Vec<Option<Pending>> = inputs.into_iter().map(Some).collect();

        for out in outputs {
            let Some(label) = out.label.clone() else {
                open.outputs.push(OpenPad {
                    label: None,
                    node: out.node,
                    pad: out.pad,
                });
                continue;
            };
            let matched = inputs
                .iter_mut()
                .find(|p| p.as_ref().is_some_and(|p| p.label.as_deref() == Some(label.as_str())))
                .and_then(Option::take);
            match matched {
                Some(input) => self.link(out.node, out.pad, input.node, input.pad)?,
                None => match self.existing_node(&label, existing) {
                    Some(sink) => self.link(out.node, out.pad, sink, 0)?,
                    None => open.outputs.push(OpenPad {
                        label: Some(label),
                        node: out.node,
                        pad: out.pad,
                    }),
                },
            }
        }

        for input in inputs.into_iter().flatten() {
            let source = input
                .label
                .as_deref()
                .and_then(|label| self.existing_node(label, existing));
            match source {
                Some(source) => self.link(source, 0, input.node, input.pad)?,
                None => open.inputs.push(OpenPad {
                    label: input.label,
                    node: input.node,
                    pad: input.pad,
                }),
            }
        }
        Ok(open)
    }

    /// A node created before the description whose name is `label`.
    fn existing_node(&self, label: &str, existing: usize) -> Option<NodeId> {
        self.node_id(label).filter(|id| id.index() < existing)
    }
}
