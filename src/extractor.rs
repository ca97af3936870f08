//! Generic listing page extractor.
//!
//! One algorithm serves every source: the source's [`ExtractionRule`] is
//! compiled once into a [`CompiledRule`] and [`extract`] walks the page with
//! it. Nothing here performs I/O.
//!
//! Per container the extractor pulls out:
//!
//! - **headline**: required; containers without one are skipped
//! - **link**: the headline's anchor, an enclosing anchor, the rule's link
//!   selector or the first anchor in the container, resolved against the page
//! - **description**: optional teaser text
//! - **image**: inside the container, or (when the rule allows it) the
//!   nearest image among the siblings of the container and its ancestors

use crate::models::RawCandidate;
use crate::sources::{ExtractionRule, ImageFallback};
use crate::utils::collapse_whitespace;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, instrument};
use url::Url;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("static selector"));

/// How many ancestors above the container are searched for a nearby image.
const IMAGE_SEARCH_DEPTH: usize = 2;

/// An [`ExtractionRule`] with its selectors parsed.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    container: Selector,
    headline: Selector,
    link: Option<Selector>,
    description: Option<Selector>,
    image: Option<Selector>,
    image_fallback: ImageFallback,
    max_items: usize,
}

impl CompiledRule {
    /// Parse every selector in `rule`. On failure returns the offending
    /// selector text.
    pub fn compile(rule: &ExtractionRule) -> Result<Self, String> {
        let parse = |s: &str| Selector::parse(s).map_err(|_| s.to_string());
        let parse_opt = |s: &Option<String>| s.as_deref().map(parse).transpose();
        Ok(Self {
            container: parse(&rule.container)?,
            headline: parse(&rule.headline)?,
            link: parse_opt(&rule.link)?,
            description: parse_opt(&rule.description)?,
            image: parse_opt(&rule.image)?,
            image_fallback: rule.image_fallback,
            max_items: rule.max_items,
        })
    }
}

/// Extract headline candidates from a listing page.
///
/// Pure: no I/O, no state kept between pages.
///
/// # Arguments
///
/// * `html` - Listing page body
/// * `page_url` - URL the page was fetched from, base for relative links and images
/// * `rule` - The source's compiled selectors
///
/// # Returns
///
/// At most `max_items` candidates in page order. Empty when no container
/// matches; containers without a headline are skipped. Headlines repeated
/// on the same page collapse to their first occurrence.
#[instrument(level = "debug", skip_all, fields(page = %page_url))]
pub fn extract(html: &str, page_url: &Url, rule: &CompiledRule) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);
    let mut claimed_images: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for (index, container) in document
        .select(&rule.container)
        .take(rule.max_items)
        .enumerate()
    {
        let Some(headline_el) = find_headline(container, rule) else {
            debug!(index, "Container has no headline element; skipping");
            continue;
        };
        let headline = element_text(headline_el);
        if headline.is_empty() {
            debug!(index, "Container headline is empty; skipping");
            continue;
        }

        let link = find_link(container, headline_el, rule).and_then(|href| resolve(page_url, href));

        let description = rule
            .description
            .as_ref()
            .and_then(|sel| container.select(sel).next())
            .map(element_text)
            .filter(|d| !d.is_empty() && *d != headline);

        let image = find_image(container, rule, page_url, &claimed_images);
        if let Some(ref img) = image {
            claimed_images.insert(img.clone());
        }

        candidates.push(RawCandidate {
            headline,
            link,
            description,
            image,
        });
    }

    let before = candidates.len();
    let candidates: Vec<RawCandidate> = candidates
        .into_iter()
        .unique_by(|c| c.headline.clone())
        .collect();
    debug!(
        count = candidates.len(),
        repeated = before - candidates.len(),
        "Extracted candidates"
    );
    candidates
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// The headline element: the container itself when it matches the headline
/// selector, otherwise the first matching descendant.
fn find_headline<'a>(container: ElementRef<'a>, rule: &CompiledRule) -> Option<ElementRef<'a>> {
    if rule.headline.matches(&container) {
        return Some(container);
    }
    container.select(&rule.headline).next()
}

fn find_link<'a>(
    container: ElementRef<'a>,
    headline: ElementRef<'a>,
    rule: &CompiledRule,
) -> Option<&'a str> {
    let href = |el: ElementRef<'a>| {
        if el.value().name() == "a" {
            el.value().attr("href")
        } else {
            None
        }
    };

    if let Some(h) = href(headline) {
        return Some(h);
    }
    if let Some(h) = headline.select(&ANCHOR).next().and_then(href) {
        return Some(h);
    }
    // Enclosing anchor, up to and including the container.
    if headline.id() != container.id() {
        for ancestor in headline.ancestors().filter_map(ElementRef::wrap) {
            if let Some(h) = href(ancestor) {
                return Some(h);
            }
            if ancestor.id() == container.id() {
                break;
            }
        }
    }
    if let Some(h) = rule
        .link
        .as_ref()
        .and_then(|sel| container.select(sel).next())
        .and_then(|el| href(el).or_else(|| el.select(&ANCHOR).next().and_then(href)))
    {
        return Some(h);
    }
    container.select(&ANCHOR).next().and_then(href)
}

/// Resolve `href` against the page, keeping only http(s) targets.
fn resolve(page_url: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = page_url.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn image_src(img: ElementRef<'_>) -> Option<&str> {
    let attrs = img.value();
    attrs
        .attr("src")
        .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
        .or_else(|| attrs.attr("data-src"))
        .or_else(|| {
            attrs
                .attr("srcset")
                .and_then(|set| set.split(',').next())
                .and_then(|first| first.split_whitespace().next())
        })
        .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
}

fn first_image_in(el: ElementRef<'_>, selector: &Selector, page_url: &Url) -> Option<String> {
    let own = (el.value().name() == "img" && selector.matches(&el)).then_some(el);
    own.into_iter()
        .chain(el.select(selector))
        .filter_map(image_src)
        .find_map(|src| resolve(page_url, src))
}

fn find_image(
    container: ElementRef<'_>,
    rule: &CompiledRule,
    page_url: &Url,
    claimed: &HashSet<String>,
) -> Option<String> {
    let selector = rule.image.as_ref().unwrap_or(&*IMG);
    if let Some(src) = first_image_in(container, selector, page_url) {
        return Some(src);
    }
    match rule.image_fallback {
        ImageFallback::None => None,
        ImageFallback::Nearby => nearby_image(container, page_url, claimed),
    }
}

/// Best-effort image lookup outside the container: previous siblings
/// (nearest first), then next siblings, of the container and then of each
/// ancestor up to [`IMAGE_SEARCH_DEPTH`]. Images already attached to an
/// earlier candidate on this page are skipped.
fn nearby_image(
    container: ElementRef<'_>,
    page_url: &Url,
    claimed: &HashSet<String>,
) -> Option<String> {
    let mut current = Some(container);
    for _ in 0..=IMAGE_SEARCH_DEPTH {
        let el = current?;
        let found = el
            .prev_siblings()
            .chain(el.next_siblings())
            .filter_map(ElementRef::wrap)
            .filter_map(|sib| first_image_in(sib, &IMG, page_url))
            .find(|src| !claimed.contains(src));
        if found.is_some() {
            return found;
        }
        current = el.parent().and_then(ElementRef::wrap);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://news.example.com/section/world/").unwrap()
    }

    fn rule(container: &str, headline: &str) -> ExtractionRule {
        ExtractionRule {
            container: container.to_string(),
            headline: headline.to_string(),
            link: None,
            description: Some("p".to_string()),
            image: None,
            image_fallback: ImageFallback::Nearby,
            max_items: 10,
        }
    }

    fn compiled(rule: &ExtractionRule) -> CompiledRule {
        CompiledRule::compile(rule).unwrap()
    }

    #[test]
    fn test_no_matching_containers_yields_empty() {
        let html = r#"<html><body><div class="story"><h2>Not an article</h2></div></body></html>"#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert!(out.is_empty());
    }

    #[test]
    fn test_basic_extraction() {
        let html = r#"
            <div class="article">
                <h2><a href="/2025/01/15/markets">Markets rally   on
                    rate news</a></h2>
                <p>Stocks climbed after the announcement.</p>
                <img src="https://cdn.example.com/markets.jpg">
            </div>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.headline, "Markets rally on rate news");
        assert_eq!(c.link.as_deref(), Some("https://news.example.com/2025/01/15/markets"));
        assert_eq!(c.description.as_deref(), Some("Stocks climbed after the announcement."));
        assert_eq!(c.image.as_deref(), Some("https://cdn.example.com/markets.jpg"));
    }

    #[test]
    fn test_container_without_headline_is_skipped() {
        let html = r#"
            <div class="article"><p>No headline here</p></div>
            <div class="article"><h2>  </h2></div>
            <div class="article"><h2>Real one</h2></div>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].headline, "Real one");
    }

    #[test]
    fn test_relative_link_resolution() {
        let html = r#"
            <div class="article"><h2><a href="story-1">One</a></h2></div>
            <div class="article"><h2><a href="../../other/story-2">Two</a></h2></div>
            <div class="article"><h2><a href="//cdn.example.org/x">Three</a></h2></div>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        let links: Vec<_> = out.iter().map(|c| c.link.clone().unwrap()).collect();
        assert_eq!(
            links,
            vec![
                "https://news.example.com/section/world/story-1",
                "https://news.example.com/other/story-2",
                "https://cdn.example.org/x",
            ]
        );
    }

    #[test]
    fn test_enclosing_anchor_is_used() {
        let html = r#"
            <div class="article"><a href="/wrapped"><h3>Wrapped headline</h3></a></div>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h3")));
        assert_eq!(out[0].link.as_deref(), Some("https://news.example.com/wrapped"));
    }

    #[test]
    fn test_rule_link_selector_and_container_anchor() {
        let mut r = rule(".article", "h3");
        r.link = Some("a.more".to_string());
        let html = r#"
            <div class="article"><h3>Title A</h3><a href="/first">x</a><a class="more" href="/a">more</a></div>
            <div class="article"><h3>Title B</h3><a href="/b">read</a></div>
        "#;
        let out = extract(html, &page(), &compiled(&r));
        assert_eq!(out[0].link.as_deref(), Some("https://news.example.com/a"));
        assert_eq!(out[1].link.as_deref(), Some("https://news.example.com/b"));
    }

    #[test]
    fn test_unusable_links_are_dropped() {
        let html = r##"
            <div class="article"><h2><a href="javascript:void(0)">JS</a></h2></div>
            <div class="article"><h2><a href="#top">Fragment</a></h2></div>
            <div class="article"><h2>No link</h2></div>
        "##;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|c| c.link.is_none()));
    }

    #[test]
    fn test_empty_description_is_none() {
        let html = r#"
            <div class="article"><h2>Headline</h2><p>   </p></div>
            <div class="article"><h2>Other</h2></div>
            <div class="article"><h2>Same</h2><p>Same</p></div>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert!(out.iter().all(|c| c.description.is_none()));
    }

    #[test]
    fn test_container_is_headline() {
        let r = rule("h3.title", "h3.title");
        let html = r#"<h3 class="title"><a href="/x">Self headline</a></h3>"#;
        let out = extract(html, &page(), &compiled(&r));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].headline, "Self headline");
        assert_eq!(out[0].link.as_deref(), Some("https://news.example.com/x"));
    }

    #[test]
    fn test_max_items_bounds_containers() {
        let mut r = rule(".article", "h2");
        r.max_items = 3;
        let html: String = (0..8)
            .map(|i| format!(r#"<div class="article"><h2>Story {i}</h2></div>"#))
            .collect();
        let out = extract(&html, &page(), &compiled(&r));
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].headline, "Story 2");
    }

    #[test]
    fn test_repeated_headlines_collapse() {
        let html = r#"
            <div class="article"><h2><a href="/a">Same story</a></h2></div>
            <div class="article"><h2><a href="/b">Same story</a></h2></div>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].link.as_deref(), Some("https://news.example.com/a"));
    }

    #[test]
    fn test_image_attribute_fallbacks() {
        let html = r#"
            <div class="article"><h2>Lazy</h2><img src="data:image/gif;base64,R0l" data-src="/lazy.jpg"></div>
            <div class="article"><h2>Srcset</h2><img srcset="/small.jpg 320w, /big.jpg 1024w"></div>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert_eq!(out[0].image.as_deref(), Some("https://news.example.com/lazy.jpg"));
        assert_eq!(out[1].image.as_deref(), Some("https://news.example.com/small.jpg"));
    }

    #[test]
    fn test_nearby_image_fallback() {
        let html = r#"
            <section>
                <figure><img src="/lead.jpg"></figure>
                <div class="article"><h2>Has no image inside</h2></div>
            </section>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert_eq!(out[0].image.as_deref(), Some("https://news.example.com/lead.jpg"));
    }

    #[test]
    fn test_nearby_image_searches_ancestor_siblings() {
        let html = r#"
            <div class="row">
                <img src="/outer.jpg">
                <div class="wrap"><div class="article"><h2>Deep</h2></div></div>
            </div>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert_eq!(out[0].image.as_deref(), Some("https://news.example.com/outer.jpg"));
    }

    #[test]
    fn test_nearby_image_not_reused() {
        let html = r#"
            <section>
                <img src="/only.jpg">
                <div class="article"><h2>First</h2></div>
                <div class="article"><h2>Second</h2></div>
            </section>
        "#;
        let out = extract(html, &page(), &compiled(&rule(".article", "h2")));
        assert_eq!(out[0].image.as_deref(), Some("https://news.example.com/only.jpg"));
        assert_eq!(out[1].image, None);
    }

    #[test]
    fn test_image_fallback_disabled() {
        let mut r = rule(".article", "h2");
        r.image_fallback = ImageFallback::None;
        let html = r#"
            <section>
                <img src="/lead.jpg">
                <div class="article"><h2>Strict</h2></div>
            </section>
        "#;
        let out = extract(html, &page(), &compiled(&r));
        assert_eq!(out[0].image, None);
    }

    #[test]
    fn test_image_selector_is_respected() {
        let mut r = rule(".article", "h2");
        r.image = Some("img.hero".to_string());
        r.image_fallback = ImageFallback::None;
        let html = r#"
            <div class="article"><h2>A</h2><img class="icon" src="/icon.png"><img class="hero" src="/hero.jpg"></div>
        "#;
        let out = extract(html, &page(), &compiled(&r));
        assert_eq!(out[0].image.as_deref(), Some("https://news.example.com/hero.jpg"));
    }

    #[test]
    fn test_compile_reports_bad_selector() {
        let mut r = rule(".article", "h2");
        r.description = Some("p[[".to_string());
        assert_eq!(CompiledRule::compile(&r).unwrap_err(), "p[[");
    }
}
