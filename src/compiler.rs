//! Template compilation: binding a node tree to reactive state.
//!
//! Text nodes may contain `{{ key }}` interpolations. Elements may carry
//! directives: `v-text`, `v-model` and `v-on:<event>`. Every binding becomes
//! a [`Watcher`] that writes into its node when the bound key changes.

use crate::app::Method;
use crate::dom::{Element, Node, TextNode};
use crate::error::{Error, Result};
use crate::value::{Object, Value};
use crate::watcher::Watcher;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Expression(String),
}

/// A parsed text template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse text containing `{{ expression }}` interpolations.
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_owned()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or_else(|| Error::template(format!("unterminated interpolation in {source:?}")))?;
            segments.push(Segment::Expression(expression(&after_open[..end])?));
            rest = &after_open[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_owned()));
        }
        Ok(Self { segments })
    }

    /// Whether the template contains any interpolation.
    pub fn is_dynamic(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Expression(_)))
    }

    /// The distinct expressions, in order of first appearance.
    pub fn expressions(&self) -> Vec<&str> {
        let mut expressions: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Expression(expression) = segment {
                if !expressions.contains(&expression.as_str()) {
                    expressions.push(expression);
                }
            }
        }
        expressions
    }

    /// Render against `data`. Missing keys render as empty text.
    pub fn render(&self, data: &Object) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.clone(),
                Segment::Expression(expression) => {
                    data.get_path(expression).unwrap_or_default().to_string()
                }
            })
            .collect()
    }
}

fn expression(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::template("empty expression"));
    }
    Ok(trimmed.to_owned())
}

/// Compiles a node tree against one data object.
pub struct Compiler<'a> {
    data: &'a Object,
    methods: &'a BTreeMap<String, Method>,
    watchers: Vec<Watcher>,
}

impl<'a> Compiler<'a> {
    pub fn new(data: &'a Object, methods: &'a BTreeMap<String, Method>) -> Self {
        Self {
            data,
            methods,
            watchers: Vec::new(),
        }
    }

    /// Bind every interpolation and directive below (and on) `root`.
    ///
    /// Returns the created watchers; they stay subscribed for as long as the
    /// data they observe is alive.
    pub fn compile(mut self, root: &Element) -> Result<Vec<Watcher>> {
        self.compile_element(root)?;
        tracing::debug!(watchers = self.watchers.len(), "compiled template");
        Ok(self.watchers)
    }

    fn compile_children(&mut self, element: &Element) -> Result<()> {
        for child in element.children() {
            match child {
                Node::Text(text) => self.compile_text(&text)?,
                Node::Element(element) => self.compile_element(&element)?,
            }
        }
        Ok(())
    }

    fn compile_text(&mut self, node: &TextNode) -> Result<()> {
        let template = Template::parse(&node.text())?;
        if !template.is_dynamic() {
            return Ok(());
        }
        node.set_text(template.render(self.data));

        let template = Rc::new(template);
        for expression in template.expressions() {
            let watcher = Watcher::path(self.data, expression, {
                let node = node.clone();
                let data = self.data.clone();
                let template = template.clone();
                move |_| node.set_text(template.render(&data))
            });
            self.watchers.push(watcher);
        }
        Ok(())
    }

    fn compile_element(&mut self, element: &Element) -> Result<()> {
        let mut owns_content = false;
        for (name, value) in element.attributes() {
            let Some(directive) = name.strip_prefix("v-") else {
                continue;
            };
            let key = expression(&value)?;
            if let Some(event) = directive.strip_prefix("on:") {
                self.bind_event(element, event, &key)?;
            } else if directive == "text" {
                self.bind_text(element, &key);
                owns_content = true;
            } else if directive == "model" {
                self.bind_model(element, &key);
            } else {
                tracing::warn!(directive = %name, "skipping unknown directive");
            }
        }
        if owns_content {
            return Ok(());
        }
        self.compile_children(element)
    }

    fn bind_text(&mut self, element: &Element, key: &str) {
        element.set_text_content(self.current(key).to_string());
        let watcher = Watcher::path(self.data, key, {
            let element = element.clone();
            move |value| element.set_text_content(value.to_string())
        });
        self.watchers.push(watcher);
    }

    fn bind_model(&mut self, element: &Element, key: &str) {
        element.set_value(self.current(key).to_string());
        let watcher = Watcher::path(self.data, key, {
            let element = element.clone();
            move |value| element.set_value(value.to_string())
        });
        self.watchers.push(watcher);

        let data = self.data.clone();
        let key = key.to_owned();
        element.add_event_listener("input", move |element: &Element| {
            data.set_path(&key, element.value());
        });
    }

    fn bind_event(&mut self, element: &Element, event: &str, method: &str) -> Result<()> {
        let handler = self
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| Error::UnknownMethod {
                name: method.to_owned(),
            })?;
        let data = self.data.clone();
        element.add_event_listener(event, move |_: &Element| handler(&data));
        Ok(())
    }

    fn current(&self, key: &str) -> Value {
        self.data.get_path(key).unwrap_or_default()
    }
}
