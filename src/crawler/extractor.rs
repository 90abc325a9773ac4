//! HTML extraction
//!
//! Turns a fetched body into the two things the crawl loop needs:
//! - the set of links to offer to the frontier
//! - the items of each configured content type
//!
//! # Link Extraction Rules
//!
//! **Include:** `<a href="...">` and `<link rel="canonical" href="...">`
//!
//! **Exclude:** `<a download>`, `javascript:`/`mailto:`/`tel:` links, data URIs,
//! fragment-only anchors. See [`crate::url::resolve_link`].

use crate::config::{ContentEntry, OptionsConfig};
use crate::options::{OptionFlag, Options};
use crate::url::resolve_link;
use crate::{ConfigError, CrawlError};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Source of links and content for the crawl loop
pub trait ContentExtractor: Send + Sync {
    /// Extracts absolute links from a page
    ///
    /// Fails with `NoLinksFound` when the page contributes nothing.
    fn extract_links(&self, page_url: &str, body: &str) -> Result<HashSet<String>, CrawlError>;

    /// Extracts the items of one content type from a page
    fn extract_content(&self, page_url: &str, body: &str, content_type: &str) -> HashSet<String>;

    /// Names of the content types this extractor knows, in configuration order
    fn content_types(&self) -> Vec<String>;
}

/// How the items of a content type are found
#[derive(Debug, Clone)]
pub enum ContentKind {
    /// Every regex match over the document text
    Pattern(Regex),
    /// Every element matching a CSS selector; its attribute value (resolved as a URL when
    /// it looks like one) or, with no attribute, its trimmed text
    Selector {
        selector: Selector,
        attribute: Option<String>,
    },
}

/// A named content type and its extraction rule
#[derive(Debug, Clone)]
pub struct ContentRule {
    pub name: String,
    pub kind: ContentKind,
}

impl ContentRule {
    pub fn pattern(name: impl Into<String>, pattern: &str) -> Result<Self, CrawlError> {
        Ok(Self {
            name: name.into(),
            kind: ContentKind::Pattern(Regex::new(pattern)?),
        })
    }

    pub fn selector(
        name: impl Into<String>,
        css: &str,
        attribute: Option<&str>,
    ) -> Result<Self, CrawlError> {
        let name = name.into();
        let selector = Selector::parse(css).map_err(|e| {
            ConfigError::InvalidPattern(format!("invalid selector '{}' for {}: {:?}", css, name, e))
        })?;
        Ok(Self {
            name,
            kind: ContentKind::Selector {
                selector,
                attribute: attribute.map(str::to_string),
            },
        })
    }

    /// Builds a rule from its configuration entry
    pub fn from_entry(entry: &ContentEntry) -> Result<Self, CrawlError> {
        match (&entry.pattern, &entry.selector) {
            (Some(pattern), None) => Self::pattern(&entry.name, pattern),
            (None, Some(css)) => Self::selector(&entry.name, css, entry.attribute.as_deref()),
            _ => Err(ConfigError::Validation(format!(
                "content type '{}' needs exactly one of pattern or selector",
                entry.name
            ))
            .into()),
        }
    }
}

/// Default extractor built on scraper and regex
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    rules: Vec<ContentRule>,
    // primary language subtag, only consulted when restricting
    language: Option<String>,
}

impl HtmlExtractor {
    /// Creates an extractor with no language restriction
    pub fn new(rules: Vec<ContentRule>) -> Self {
        Self {
            rules,
            language: None,
        }
    }

    /// Only extract content from pages whose `<html lang>` primary subtag is `language`
    pub fn restrict_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into().to_ascii_lowercase());
        self
    }

    /// Builds the extractor from configuration
    pub fn from_config(
        entries: &[ContentEntry],
        options_config: &OptionsConfig,
    ) -> Result<Self, CrawlError> {
        let rules = entries
            .iter()
            .map(ContentRule::from_entry)
            .collect::<Result<Vec<_>, _>>()?;
        let extractor = Self::new(rules);

        let options = Options::from(options_config);
        match (
            options.is_set(OptionFlag::RestrictLanguage),
            &options_config.language,
        ) {
            (true, Some(language)) => Ok(extractor.restrict_language(language.trim())),
            (true, None) => Err(ConfigError::Validation(
                "restrict-language is set but no language is configured".to_string(),
            )
            .into()),
            (false, _) => Ok(extractor),
        }
    }

    fn rule(&self, name: &str) -> Option<&ContentRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    fn language_allowed(&self, document: &Html) -> bool {
        let Some(wanted) = &self.language else {
            return true;
        };
        page_language(document).is_some_and(|lang| &lang == wanted)
    }
}

impl ContentExtractor for HtmlExtractor {
    fn extract_links(&self, page_url: &str, body: &str) -> Result<HashSet<String>, CrawlError> {
        let base = Url::parse(page_url).map_err(|_| CrawlError::NoLinksFound {
            url: page_url.to_string(),
        })?;
        let document = Html::parse_document(body);
        let links = collect_links(&document, &base);

        if links.is_empty() {
            return Err(CrawlError::NoLinksFound {
                url: page_url.to_string(),
            });
        }
        Ok(links)
    }

    fn extract_content(&self, page_url: &str, body: &str, content_type: &str) -> HashSet<String> {
        let Some(rule) = self.rule(content_type) else {
            return HashSet::new();
        };

        let document = Html::parse_document(body);
        if !self.language_allowed(&document) {
            return HashSet::new();
        }

        match &rule.kind {
            ContentKind::Pattern(regex) => {
                let text = document_text(&document);
                regex
                    .find_iter(&text)
                    .map(|m| m.as_str().to_string())
                    .collect()
            }
            ContentKind::Selector {
                selector,
                attribute,
            } => {
                let base = Url::parse(page_url).ok();
                document
                    .select(selector)
                    .filter_map(|element| match attribute {
                        Some(attribute) => {
                            let value = element.value().attr(attribute)?.trim();
                            if value.is_empty() {
                                return None;
                            }
                            let resolved = base.as_ref().and_then(|b| resolve_link(b, value));
                            Some(resolved.unwrap_or_else(|| value.to_string()))
                        }
                        None => {
                            let text = element.text().collect::<String>().trim().to_string();
                            (!text.is_empty()).then_some(text)
                        }
                    })
                    .collect()
            }
        }
    }

    fn content_types(&self) -> Vec<String> {
        self.rules.iter().map(|rule| rule.name.clone()).collect()
    }
}

/// Collects all followable links from the document
fn collect_links(document: &Html, base: &Url) -> HashSet<String> {
    let mut links = HashSet::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(link) = element.value().attr("href").and_then(|h| resolve_link(base, h)) {
                links.insert(link);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(link) = element.value().attr("href").and_then(|h| resolve_link(base, h)) {
                links.insert(link);
            }
        }
    }

    links
}

/// Primary language subtag declared on `<html lang>`, lowercased
fn page_language(document: &Html) -> Option<String> {
    let selector = Selector::parse("html[lang]").ok()?;
    let lang = document.select(&selector).next()?.value().attr("lang")?;
    let primary = lang.trim().split(['-', '_']).next()?.to_ascii_lowercase();
    (!primary.is_empty()).then_some(primary)
}

fn document_text(document: &Html) -> String {
    document.root_element().text().collect::<Vec<_>>().join(" ")
}
