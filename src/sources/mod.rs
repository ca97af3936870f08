//! Source registry: which sites are scraped and how.
//!
//! Each [`SourceDefinition`] is pure data. It names a site, says how a
//! canonical category becomes one of the site's own URL paths, and carries the
//! [`ExtractionRule`] the generic extractor applies to that site's listing
//! pages. Adding a site means adding an entry, never a code path.
//!
//! The built-in registry lives in `builtin.yaml`; a replacement can be given
//! at runtime with `--sources <file>` in the same format.
//!
//! # Category resolution
//!
//! [`SourceDefinition::resolve_category`] picks, in order:
//!
//! 1. the explicit mapping for the canonical category, if declared
//! 2. the canonical category verbatim, if the source declares an allow-list
//!    containing it
//! 3. the source's default category
//!
//! so every (source, category) pair yields exactly one URL.

use crate::categories;
use crate::error::RegistryError;
use crate::extractor::CompiledRule;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, instrument};
use url::Url;

const BUILTIN: &str = include_str!("builtin.yaml");

/// Placeholder substituted with the resolved category path.
pub const CATEGORY_PLACEHOLDER: &str = "{category}";

/// How the extractor looks for an image when the container holds none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFallback {
    /// Scan siblings of the container and of its nearest ancestors.
    #[default]
    Nearby,
    /// Only accept images inside the container.
    None,
}

fn default_max_items() -> usize {
    10
}

/// Selectors describing one site's listing page.
///
/// `container` matches each repeating article element; the other selectors
/// are evaluated relative to that element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub container: String,
    pub headline: String,
    /// Used only when no anchor is found on or around the headline.
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_fallback: ImageFallback,
    /// Containers past this count are ignored.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub name: String,
    /// Listing page URL with a single `{category}` placeholder.
    pub url_template: String,
    pub default_category: String,
    /// Canonical category to the site's own path segment(s).
    #[serde(default)]
    pub category_map: BTreeMap<String, String>,
    /// Canonical categories the site serves under the same name.
    #[serde(default)]
    pub allowed_categories: Option<Vec<String>>,
    pub rule: ExtractionRule,
}

impl SourceDefinition {
    /// Category path this source uses for `canonical`.
    pub fn resolve_category<'a>(&'a self, canonical: &'a str) -> &'a str {
        if let Some(mapped) = self.category_map.get(canonical) {
            return mapped;
        }
        match &self.allowed_categories {
            Some(allowed) if allowed.iter().any(|c| c == canonical) => canonical,
            _ => &self.default_category,
        }
    }

    /// Listing page URL for `canonical`. Pure and total.
    pub fn resolve_url(&self, canonical: &str) -> String {
        self.url_template
            .replace(CATEGORY_PLACEHOLDER, self.resolve_category(canonical))
    }

    /// Every category path this definition can ever substitute.
    fn reachable_paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.default_category.as_str())
            .chain(self.category_map.values().map(String::as_str))
            .chain(self.allowed_categories.iter().flatten().map(String::as_str))
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let bad = |reason: &str| RegistryError::BadTemplate {
            source_name: self.name.clone(),
            template: self.url_template.clone(),
            reason: reason.to_string(),
        };
        if self.url_template.matches(CATEGORY_PLACEHOLDER).count() != 1 {
            return Err(bad("must contain exactly one {category} placeholder"));
        }
        for path in self.reachable_paths() {
            let url = self.url_template.replace(CATEGORY_PLACEHOLDER, path);
            match Url::parse(&url) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                _ => return Err(bad(&format!("does not yield an http(s) URL for `{path}`"))),
            }
        }
        Ok(())
    }

    /// Canonicalize the keys of the category map and the allow-list so
    /// lookups with canonical categories always hit.
    fn canonicalized(mut self) -> Self {
        self.category_map = self
            .category_map
            .into_iter()
            .map(|(k, v)| (categories::canonicalize(&k), v))
            .collect();
        self.allowed_categories = self
            .allowed_categories
            .map(|list| list.iter().map(|c| categories::canonicalize(c)).collect());
        self
    }
}

/// A validated definition with its selectors compiled.
#[derive(Debug)]
pub struct Source {
    pub definition: SourceDefinition,
    pub rule: CompiledRule,
}

impl Source {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn resolve_url(&self, canonical: &str) -> String {
        self.definition.resolve_url(canonical)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    sources: Vec<SourceDefinition>,
}

/// Immutable set of sources, loaded once at startup.
#[derive(Debug)]
pub struct Registry {
    sources: Vec<Source>,
}

impl Registry {
    /// Validate definitions and compile their selectors.
    ///
    /// Category map keys and allow-lists are canonicalized first.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Empty`] for an empty list
    /// - [`RegistryError::DuplicateSource`] when two definitions share a name
    /// - [`RegistryError::BadTemplate`] when a template lacks exactly one
    ///   `{category}` placeholder or does not yield an http(s) URL
    /// - [`RegistryError::BadSelector`] for a selector that does not parse
    pub fn new(definitions: Vec<SourceDefinition>) -> Result<Self, RegistryError> {
        if definitions.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut seen = HashSet::new();
        let mut sources = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let definition = definition.canonicalized();
            if !seen.insert(definition.name.clone()) {
                return Err(RegistryError::DuplicateSource(definition.name));
            }
            definition.validate()?;
            let rule = CompiledRule::compile(&definition.rule).map_err(|selector| {
                RegistryError::BadSelector {
                    source_name: definition.name.clone(),
                    selector,
                }
            })?;
            sources.push(Source { definition, rule });
        }
        Ok(Self { sources })
    }

    /// The sources shipped with the binary.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_yaml_str(BUILTIN)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        Self::new(file.sources)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn from_yaml_file(path: &Path) -> Result<Self, RegistryError> {
        let yaml = std::fs::read_to_string(path)?;
        let registry = Self::from_yaml_str(&yaml)?;
        info!(count = registry.len(), "Loaded source registry");
        Ok(registry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Keep only the named sources, in registry order. Unknown names are
    /// returned so the caller can report them.
    pub fn retain_named(&mut self, names: &[String]) -> Vec<String> {
        let unknown = names
            .iter()
            .filter(|n| self.get(n).is_none())
            .cloned()
            .collect();
        self.sources.retain(|s| names.iter().any(|n| n == s.name()));
        unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> ExtractionRule {
        ExtractionRule {
            container: ".article".to_string(),
            headline: "h2".to_string(),
            link: None,
            description: Some("p".to_string()),
            image: None,
            image_fallback: ImageFallback::Nearby,
            max_items: 10,
        }
    }

    fn definition() -> SourceDefinition {
        SourceDefinition {
            name: "Example".to_string(),
            url_template: "https://example.com/{category}/".to_string(),
            default_category: "news".to_string(),
            category_map: BTreeMap::from([("technology".to_string(), "sci-tech".to_string())]),
            allowed_categories: Some(vec!["world".to_string(), "business".to_string()]),
            rule: rule(),
        }
    }

    #[test]
    fn test_resolve_prefers_explicit_mapping() {
        assert_eq!(definition().resolve_url("technology"), "https://example.com/sci-tech/");
    }

    #[test]
    fn test_resolve_allow_list_verbatim() {
        assert_eq!(definition().resolve_url("world"), "https://example.com/world/");
    }

    #[test]
    fn test_resolve_excluded_category_uses_default() {
        assert_eq!(definition().resolve_url("arts"), "https://example.com/news/");
    }

    #[test]
    fn test_resolve_without_allow_list_uses_default() {
        let mut def = definition();
        def.allowed_categories = None;
        assert_eq!(def.resolve_url("world"), "https://example.com/news/");
        assert_eq!(def.resolve_url("technology"), "https://example.com/sci-tech/");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let def = definition();
        for c in ["world", "arts", "technology", "", "???"] {
            assert_eq!(def.resolve_url(c), def.resolve_url(c));
        }
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let err = Registry::new(vec![definition(), definition()]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateSource(name) if name == "Example"));
    }

    #[test]
    fn test_registry_rejects_empty() {
        assert!(matches!(Registry::new(vec![]), Err(RegistryError::Empty)));
    }

    #[test]
    fn test_registry_rejects_missing_placeholder() {
        let mut def = definition();
        def.url_template = "https://example.com/news".to_string();
        assert!(matches!(
            Registry::new(vec![def]),
            Err(RegistryError::BadTemplate { .. })
        ));
    }

    #[test]
    fn test_registry_rejects_non_http_template() {
        let mut def = definition();
        def.url_template = "ftp://example.com/{category}".to_string();
        assert!(matches!(
            Registry::new(vec![def]),
            Err(RegistryError::BadTemplate { .. })
        ));
    }

    #[test]
    fn test_registry_rejects_bad_selector() {
        let mut def = definition();
        def.rule.container = "div[[".to_string();
        assert!(matches!(
            Registry::new(vec![def]),
            Err(RegistryError::BadSelector { selector, .. }) if selector == "div[["
        ));
    }

    #[test]
    fn test_registry_canonicalizes_keys() {
        let mut def = definition();
        def.category_map = BTreeMap::from([("Tech".to_string(), "sci-tech".to_string())]);
        def.allowed_categories = Some(vec!["Sports".to_string()]);
        let registry = Registry::new(vec![def]).unwrap();
        let source = registry.get("Example").unwrap();
        assert_eq!(source.resolve_url("technology"), "https://example.com/sci-tech/");
        assert_eq!(source.resolve_url("sport"), "https://example.com/sport/");
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
sources:
  - name: Minimal
    url_template: "https://minimal.example/{category}"
    default_category: latest
    rule:
      container: article
      headline: h3
"#;
        let registry = Registry::from_yaml_str(yaml).unwrap();
        let source = registry.get("Minimal").unwrap();
        assert_eq!(source.definition.rule.max_items, 10);
        assert_eq!(source.definition.rule.image_fallback, ImageFallback::Nearby);
        assert_eq!(source.resolve_url("world"), "https://minimal.example/latest");
    }

    #[test]
    fn test_builtin_registry_loads() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(registry.len(), 10);
        for name in [
            "BBC",
            "CNN",
            "CBC",
            "Global News",
            "The Guardian",
            "Al Jazeera",
            "NPR",
            "ABC News",
            "The New York Times",
            "CTV News",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_builtin_category_resolution() {
        let registry = Registry::builtin().unwrap();
        let guardian = registry.get("The Guardian").unwrap();
        assert_eq!(guardian.resolve_url("science"), "https://www.theguardian.com/science");
        assert_eq!(guardian.resolve_url("health"), "https://www.theguardian.com/world");

        let aljazeera = registry.get("Al Jazeera").unwrap();
        assert_eq!(
            aljazeera.resolve_url("technology"),
            "https://www.aljazeera.com/science-and-technology/"
        );
        assert_eq!(aljazeera.resolve_url("us"), "https://www.aljazeera.com/news/us-canada/");

        let bbc = registry.get("BBC").unwrap();
        assert_eq!(bbc.resolve_url("sport"), "https://www.bbc.com/sport");
        assert_eq!(bbc.resolve_url("technology"), "https://www.bbc.com/news/technology");
    }

    #[test]
    fn test_every_builtin_pair_resolves_to_a_url() {
        let registry = Registry::builtin().unwrap();
        for source in registry.iter() {
            for category in categories::CANONICAL {
                let url = source.resolve_url(category);
                assert!(Url::parse(&url).is_ok(), "{} / {category}: {url}", source.name());
            }
        }
    }

    #[test]
    fn test_retain_named() {
        let mut registry = Registry::builtin().unwrap();
        let unknown = registry.retain_named(&["NPR".to_string(), "Nope".to_string()]);
        assert_eq!(unknown, vec!["Nope".to_string()]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("NPR").is_some());
    }
}
