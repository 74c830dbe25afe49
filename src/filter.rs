use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration for deciding which links on a game page are character pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkFilterConfig {
    /// Raw hrefs must start with this prefix (same-site wiki article paths)
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Hrefs containing any of these markers are skipped (namespaced pages such as
    /// `Category:` or `File:`)
    #[serde(default = "default_excluded_markers")]
    pub excluded_markers: Vec<String>,

    /// The lowercase resolved URL must contain at least one of these
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Additional regex patterns; a resolved URL matching any of them is skipped
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_path_prefix() -> String {
    "/wiki/".to_string()
}

fn default_excluded_markers() -> Vec<String> {
    vec![":".to_string()]
}

fn default_keywords() -> Vec<String> {
    ["character", "personnage", "protagonist", "antagonist", "villain"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for LinkFilterConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            excluded_markers: default_excluded_markers(),
            keywords: default_keywords(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Picks candidate character links out of the anchors of a game page
#[derive(Debug)]
pub struct CharacterLinkFilter {
    config: LinkFilterConfig,
    exclude_regexes: Vec<Regex>,
}

impl Default for CharacterLinkFilter {
    fn default() -> Self {
        Self {
            config: LinkFilterConfig::default(),
            exclude_regexes: Vec::new(),
        }
    }
}

impl CharacterLinkFilter {
    /// Create a new link filter from configuration
    pub fn new(config: LinkFilterConfig) -> Result<Self, regex::Error> {
        let mut exclude_regexes = Vec::with_capacity(config.exclude_patterns.len());
        for pattern in &config.exclude_patterns {
            exclude_regexes.push(Regex::new(pattern)?);
        }

        Ok(Self {
            config,
            exclude_regexes,
        })
    }

    /// Returns the canonical URL of `href` if it points at a character page.
    ///
    /// `base` is the page the link was found on and is used to resolve relative hrefs.
    pub fn candidate(&self, href: &str, base: &Url) -> Option<Url> {
        if !href.starts_with(&self.config.path_prefix) {
            return None;
        }

        if self
            .config
            .excluded_markers
            .iter()
            .any(|marker| href.contains(marker.as_str()))
        {
            ::log::trace!("Skipping namespaced link: {}", href);
            return None;
        }

        let resolved = base.join(href).ok()?;
        let canonical = canonicalize(&resolved);
        let url_str = canonical.as_str();

        if self.exclude_regexes.iter().any(|r| r.is_match(url_str)) {
            ::log::debug!("Link filter rejected by pattern: {}", url_str);
            return None;
        }

        let lowered = url_str.to_lowercase();
        if !self
            .config
            .keywords
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_lowercase()))
        {
            return None;
        }

        ::log::debug!("Link filter accepted: {}", url_str);
        Some(canonical)
    }
}

/// The dedup key for a page: the resolved URL without its fragment
pub fn canonicalize(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}
