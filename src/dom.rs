//! A small headless node tree for template bindings.
//!
//! Nodes are shared handles with interior mutability so that watcher
//! callbacks can write into them after compilation.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Event listener attached to an element.
pub type Listener = Rc<dyn Fn(&Element)>;

#[derive(Clone, Debug)]
pub enum Node {
    Text(TextNode),
    Element(Element),
}

impl Node {
    pub fn text_content(&self) -> String {
        match self {
            Node::Text(text) => text.text(),
            Node::Element(element) => element.text_content(),
        }
    }
}

impl From<TextNode> for Node {
    fn from(text: TextNode) -> Self {
        Node::Text(text)
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(TextNode::new(text))
    }
}

/// A text node.
#[derive(Clone)]
pub struct TextNode(Rc<RefCell<String>>);

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self(Rc::new(RefCell::new(text.into())))
    }

    pub fn text(&self) -> String {
        self.0.borrow().clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        *self.0.borrow_mut() = text.into();
    }
}

impl fmt::Debug for TextNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextNode").field(&*self.0.borrow()).finish()
    }
}

struct ElementInner {
    tag: String,
    attributes: RefCell<Vec<(String, String)>>,
    children: RefCell<Vec<Node>>,
    value: RefCell<String>,
    listeners: RefCell<Vec<(String, Listener)>>,
}

/// An element with attributes, children, a form value and event listeners.
#[derive(Clone)]
pub struct Element(Rc<ElementInner>);

impl Element {
    /// Create an element with no attributes or children.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Rc::new(ElementInner {
            tag: tag.into(),
            attributes: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            value: RefCell::new(String::new()),
            listeners: RefCell::new(Vec::new()),
        }))
    }

    /// Builder: set an attribute.
    pub fn attr(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder: append a child node.
    pub fn child(self, node: impl Into<Node>) -> Self {
        self.append_child(node);
        self
    }

    /// Builder: append a text child.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.append_child(TextNode::new(text));
        self
    }

    /// The tag name.
    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    /// The value of attribute `name`, if set.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0
            .attributes
            .borrow()
            .iter()
            .find(|(attribute, _)| attribute == name)
            .map(|(_, value)| value.clone())
    }

    /// All attributes in insertion order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.0.attributes.borrow().clone()
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let mut attributes = self.0.attributes.borrow_mut();
        match attributes.iter_mut().find(|(attribute, _)| *attribute == name) {
            Some((_, existing)) => *existing = value,
            None => attributes.push((name, value)),
        }
    }

    /// The child nodes in document order.
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn append_child(&self, node: impl Into<Node>) {
        self.0.children.borrow_mut().push(node.into());
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        self.children().iter().map(Node::text_content).collect()
    }

    /// Replace all children with a single text node.
    pub fn set_text_content(&self, text: impl Into<String>) {
        let replaced = std::mem::replace(
            &mut *self.0.children.borrow_mut(),
            vec![Node::Text(TextNode::new(text))],
        );
        drop(replaced);
    }

    /// The form value, as held by inputs.
    pub fn value(&self) -> String {
        self.0.value.borrow().clone()
    }

    pub fn set_value(&self, value: impl Into<String>) {
        *self.0.value.borrow_mut() = value.into();
    }

    pub fn add_event_listener(&self, event: impl Into<String>, listener: impl Fn(&Element) + 'static) {
        self.0
            .listeners
            .borrow_mut()
            .push((event.into(), Rc::new(listener)));
    }

    /// Run the listeners registered for `event`, returning how many ran.
    pub fn dispatch(&self, event: &str) -> usize {
        let listeners: Vec<Listener> = self
            .0
            .listeners
            .borrow()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in &listeners {
            listener(self);
        }
        listeners.len()
    }

    /// Simulate typing: set the value, then dispatch `input`.
    pub fn input(&self, value: impl Into<String>) {
        self.set_value(value);
        self.dispatch("input");
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_whitespace().any(|name| name == class))
    }

    /// First element matching `#id`, `.class` or a tag name, searching
    /// depth-first and starting with this element.
    pub fn query_selector(&self, selector: &str) -> Option<Element> {
        let matches = if let Some(id) = selector.strip_prefix('#') {
            self.attribute("id").as_deref() == Some(id)
        } else if let Some(class) = selector.strip_prefix('.') {
            self.has_class(class)
        } else {
            self.0.tag.eq_ignore_ascii_case(selector)
        };
        if matches {
            return Some(self.clone());
        }
        self.children().iter().find_map(|child| match child {
            Node::Element(element) => element.query_selector(selector),
            Node::Text(_) => None,
        })
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.0.tag)
            .field("attributes", &*self.0.attributes.borrow())
            .field("children", &*self.0.children.borrow())
            .finish()
    }
}
