//! Discovers the catalog from the listing page: one record per brand, grouped by breed.
//!
//! Identifiers are positional. The n-th record in document order gets id n, so
//! the same page always yields the same ids (but a changed page may not).

use std::fmt;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::extract::element_text;
use crate::fetch::{FetchError, Fetcher};

/// Stable key of one catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub usize);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// One discovered item. Immutable once discovery has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: ItemId,
    pub category: String,
    pub name: String,
    pub source_url: String,
}

/// CSS selectors describing the listing page layout.
#[derive(Debug, Clone)]
pub struct CatalogSelectors {
    container: Selector,
    heading: Selector,
    item: Selector,
    name: Selector,
    link: Selector,
    list_tag: String,
}

impl CatalogSelectors {
    pub fn new(
        container: &str,
        heading: &str,
        list_tag: &str,
        item: &str,
        name: &str,
        link: &str,
    ) -> Result<Self, CatalogError> {
        Ok(Self {
            container: parse_selector(container)?,
            heading: parse_selector(heading)?,
            item: parse_selector(item)?,
            name: parse_selector(name)?,
            link: parse_selector(link)?,
            list_tag: list_tag.to_string(),
        })
    }
}

impl Default for CatalogSelectors {
    fn default() -> Self {
        Self::new("section#archive", "h2", "ul", "li", "div.txt h3", "a[href]")
            .unwrap_or_else(|e| unreachable!("built-in catalog selectors: {e}"))
    }
}

fn parse_selector(css: &str) -> Result<Selector, CatalogError> {
    Selector::parse(css).map_err(|e| CatalogError::Selector {
        css: css.to_string(),
        message: e.to_string(),
    })
}

/// Fetches the listing page and parses it into the catalog.
pub async fn discover(
    fetcher: &Fetcher,
    listing_url: &str,
    selectors: &CatalogSelectors,
) -> Result<Vec<CatalogRecord>, CatalogError> {
    info!("Fetching catalog listing: {}", listing_url);
    let page = fetcher.fetch(listing_url).await?;
    let base = Url::parse(&page.url).map_err(|e| CatalogError::BaseUrl(page.url.clone(), e))?;
    let records = parse_listing(&page.body, &base, selectors)?;
    info!("Discovered {} catalog records", records.len());
    Ok(records)
}

/// Parses a listing document. Relative links are resolved against `base`.
pub fn parse_listing(
    html: &str,
    base: &Url,
    selectors: &CatalogSelectors,
) -> Result<Vec<CatalogRecord>, CatalogError> {
    let document = Html::parse_document(html);
    let container = document
        .select(&selectors.container)
        .next()
        .ok_or(CatalogError::MissingContainer)?;

    let mut records = Vec::new();
    for heading in container.select(&selectors.heading) {
        let category = element_text(&heading);
        let Some(list) = following_list(heading, selectors) else {
            warn!("Category {:?} has no item list; skipping", category);
            continue;
        };
        for item in list.select(&selectors.item) {
            let id = ItemId(records.len());
            let name = item
                .select(&selectors.name)
                .next()
                .map(|el| element_text(&el))
                .filter(|s| !s.is_empty())
                .ok_or_else(|| CatalogError::MalformedItem {
                    category: category.clone(),
                    position: id.0,
                    missing: "name",
                })?;
            let href = item
                .select(&selectors.link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .ok_or_else(|| CatalogError::MalformedItem {
                    category: category.clone(),
                    position: id.0,
                    missing: "link",
                })?;
            let source_url = base
                .join(href.trim())
                .map_err(|e| CatalogError::BadLink(href.to_string(), e))?;
            records.push(CatalogRecord {
                id,
                category: category.clone(),
                name,
                source_url: source_url.to_string(),
            });
        }
    }
    Ok(records)
}

/// The first sibling list after `heading`, unless another heading comes first.
fn following_list<'a>(heading: ElementRef<'a>, selectors: &CatalogSelectors) -> Option<ElementRef<'a>> {
    let heading_tag = heading.value().name();
    heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .take_while(|el| el.value().name() != heading_tag)
        .find(|el| el.value().name() == selectors.list_tag)
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("listing page unreachable: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid listing url {0}: {1}")]
    BaseUrl(String, url::ParseError),
    #[error("listing container not found")]
    MissingContainer,
    #[error("item {position} in category {category:?} has no {missing}")]
    MalformedItem {
        category: String,
        position: usize,
        missing: &'static str,
    },
    #[error("cannot resolve item link {0:?}: {1}")]
    BadLink(String, url::ParseError),
    #[error("invalid selector {css:?}: {message}")]
    Selector { css: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://example.jp/breed/").unwrap()
    }

    fn item(name: &str, href: &str) -> String {
        format!(r#"<li><a href="{href}"><div class="txt"><h3>{name}</h3></div></a></li>"#)
    }

    fn listing(categories: &[(&str, Vec<(&str, &str)>)]) -> String {
        let mut body = String::from(r#"<html><body><section id="archive">"#);
        for (category, items) in categories {
            body.push_str(&format!("<h2>{category}</h2><ul>"));
            for (name, href) in items {
                body.push_str(&item(name, href));
            }
            body.push_str("</ul>");
        }
        body.push_str("</section></body></html>");
        body
    }

    #[test]
    fn ids_are_positional_across_categories() {
        let html = listing(&[
            ("Koshihikari", vec![("A", "/a/"), ("B", "/b/"), ("C", "/c/")]),
            ("Sasanishiki", vec![("D", "/d/"), ("E", "/e/")]),
        ]);
        let records = parse_listing(&html, &base(), &CatalogSelectors::default()).unwrap();
        let ids: Vec<usize> = records.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(records[2].category, "Koshihikari");
        assert_eq!(records[3].category, "Sasanishiki");
        assert_eq!(records[3].name, "D");
    }

    #[test]
    fn links_resolve_against_listing_url() {
        let html = listing(&[("X", vec![("A", "../brand/a/"), ("B", "http://other.jp/b")])]);
        let records = parse_listing(&html, &base(), &CatalogSelectors::default()).unwrap();
        assert_eq!(records[0].source_url, "http://example.jp/brand/a/");
        assert_eq!(records[1].source_url, "http://other.jp/b");
    }

    #[test]
    fn missing_container_is_fatal() {
        let html = "<html><body><section id=\"other\"><h2>X</h2><ul></ul></section></body></html>";
        let err = parse_listing(html, &base(), &CatalogSelectors::default()).unwrap_err();
        assert!(matches!(err, CatalogError::MissingContainer));
    }

    #[test]
    fn item_without_name_is_fatal() {
        let html = r#"<section id="archive"><h2>X</h2><ul><li><a href="/a/">A</a></li></ul></section>"#;
        let err = parse_listing(html, &base(), &CatalogSelectors::default()).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedItem { missing: "name", .. }));
    }

    #[test]
    fn heading_without_list_contributes_nothing() {
        let html = r#"<section id="archive"><h2>Empty</h2><h2>Full</h2><ul>"#.to_string()
            + &item("A", "/a/")
            + "</ul></section>";
        let records = parse_listing(&html, &base(), &CatalogSelectors::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "Full");
        assert_eq!(records[0].id, ItemId(0));
    }

    #[test]
    fn item_id_displays_zero_padded() {
        assert_eq!(ItemId(7).to_string(), "007");
    }
}
