//! Field extraction from brand pages.
//!
//! Each field is read by its own [`SelectorChain`]. A chain that cannot complete
//! yields [`FieldValue::Absent`]; it never affects the other fields and never
//! turns into an error.

use std::fmt;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Outcome of reading one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    /// Non-blank text.
    Present(String),
    /// The chain stopped early, or matched only blank text.
    Absent { reason: String },
}

impl FieldValue {
    fn from_text(text: String) -> Self {
        if text.is_empty() {
            Self::Absent {
                reason: "matched element has no text".to_string(),
            }
        } else {
            Self::Present(text)
        }
    }

    /// The text, or `""` when absent.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Present(text) => text,
            Self::Absent { .. } => "",
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

/// The text fields read from one brand page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub review_text: FieldValue,
    pub description: FieldValue,
    pub characteristics: FieldValue,
}

impl ExtractedFields {
    /// Text submitted to the embedder: review and description, one per line.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.review_text.as_str(), self.description.as_str())
    }
}

/// One step of a selector chain, applied to the element the previous step produced.
#[derive(Debug, Clone)]
pub enum Step {
    /// First descendant matching the selector.
    Select(Css),
    /// Next sibling element with the given tag name.
    NextSibling(String),
    /// The n-th (zero-based) descendant matching the selector.
    Nth(Css, usize),
}

/// A parsed selector that remembers its source text.
#[derive(Debug, Clone)]
pub struct Css {
    source: String,
    selector: Selector,
}

impl Css {
    pub fn parse(css: &str) -> Result<Self, SelectorError> {
        let selector = Selector::parse(css).map_err(|e| SelectorError {
            css: css.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: css.to_string(),
            selector,
        })
    }
}

impl Step {
    pub fn select(css: &str) -> Result<Self, SelectorError> {
        Ok(Self::Select(Css::parse(css)?))
    }

    pub fn nth(css: &str, n: usize) -> Result<Self, SelectorError> {
        Ok(Self::Nth(Css::parse(css)?, n))
    }

    pub fn next_sibling(tag: &str) -> Self {
        Self::NextSibling(tag.to_string())
    }

    fn apply<'a>(&self, el: ElementRef<'a>) -> Option<ElementRef<'a>> {
        match self {
            Self::Select(css) => el.select(&css.selector).next(),
            Self::Nth(css, n) => el.select(&css.selector).nth(*n),
            Self::NextSibling(tag) => el
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|sib| sib.value().name() == tag.as_str()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select(css) => write!(f, "select {:?}", css.source),
            Self::Nth(css, n) => write!(f, "match #{} of {:?}", n, css.source),
            Self::NextSibling(tag) => write!(f, "next sibling <{}>", tag),
        }
    }
}

/// A sequence of steps from the document root down to the element holding a field.
#[derive(Debug, Clone)]
pub struct SelectorChain {
    steps: Vec<Step>,
}

impl SelectorChain {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Walks the chain from the root element and reads the text of the final element.
    pub fn read(&self, document: &Html) -> FieldValue {
        let mut current = document.root_element();
        for (i, step) in self.steps.iter().enumerate() {
            match step.apply(current) {
                Some(next) => current = next,
                None => {
                    return FieldValue::Absent {
                        reason: format!("step {} ({}) matched nothing", i + 1, step),
                    }
                }
            }
        }
        FieldValue::from_text(element_text(&current))
    }
}

/// Reads review text, description and characteristics from a brand page.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    review_text: SelectorChain,
    description: SelectorChain,
    characteristics: SelectorChain,
}

impl FieldExtractor {
    pub fn new(
        review_text: SelectorChain,
        description: SelectorChain,
        characteristics: SelectorChain,
    ) -> Self {
        Self {
            review_text,
            description,
            characteristics,
        }
    }

    /// Chains for the brand page layout: a `#review` block inside `#rice`, the
    /// description in the `div` that follows it, and a details table whose third
    /// cell lists the characteristics.
    pub fn brand_page() -> Result<Self, SelectorError> {
        Ok(Self::new(
            SelectorChain::new(vec![Step::select("#rice #review")?, Step::select("div.text p")?]),
            SelectorChain::new(vec![
                Step::select("#rice #review")?,
                Step::next_sibling("div"),
                Step::select("p")?,
            ]),
            SelectorChain::new(vec![Step::select("#rice div.text table")?, Step::nth("td", 2)?]),
        ))
    }

    /// Always returns all three fields; missing markup shows up as `Absent`.
    pub fn extract(&self, document: &Html) -> ExtractedFields {
        ExtractedFields {
            review_text: self.review_text.read(document),
            description: self.description.read(document),
            characteristics: self.characteristics.read(document),
        }
    }
}

/// Concatenated text of an element, whitespace collapsed and trimmed.
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    let mut buf = String::new();
    let mut last_space = false;
    for ch in element.text().flat_map(str::chars) {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.truncate(buf.trim_end().len());
    buf
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid selector {css:?}: {message}")]
pub struct SelectorError {
    pub css: String,
    pub message: String,
}
