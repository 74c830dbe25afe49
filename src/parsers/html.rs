use crate::records::Attributes;
use crate::utils::join_fragments;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// An ordered list of CSS selectors evaluated in sequence. The first selector
/// producing a non-empty result wins; later ones are never consulted.
pub struct SelectorChain {
    selectors: Vec<Selector>,
}

impl SelectorChain {
    fn compile(css: &[&'static str]) -> Self {
        let selectors = css
            .iter()
            .map(|c| Selector::parse(c).expect("built-in selectors are valid CSS"))
            .collect();
        Self { selectors }
    }

    /// Text of the first matching element whose text is non-empty.
    pub fn first_text(&self, doc: &Html) -> String {
        for selector in &self.selectors {
            for element in doc.select(selector) {
                let text = element_text(element);
                if !text.is_empty() {
                    return text;
                }
            }
        }
        String::new()
    }

    /// Value of `attr` on the first matching element that carries it.
    pub fn first_attr(&self, doc: &Html, attr: &str) -> Option<String> {
        self.selectors.iter().find_map(|selector| {
            doc.select(selector)
                .filter_map(|e| e.value().attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty())
                .map(str::to_string)
        })
    }

    /// Prose of every element matched by the first selector that matches
    /// anything non-empty, joined with spaces.
    pub fn joined_text(&self, doc: &Html) -> String {
        for selector in &self.selectors {
            let texts: Vec<String> = doc.select(selector).map(prose_text).collect();
            let joined = join_fragments(texts.iter().map(String::as_str));
            if !joined.is_empty() {
                return joined;
            }
        }
        String::new()
    }
}

/// Page title chain for game pages: community header first.
pub static GAME_NAME: LazyLock<SelectorChain> = LazyLock::new(|| {
    SelectorChain::compile(&[
        "a.fandom-community-header__community-name",
        ".fandom-community-header__community-name",
        "h1.page-header__title",
        "h1#firstHeading",
    ])
});

pub static CHARACTER_NAME: LazyLock<SelectorChain> = LazyLock::new(|| {
    SelectorChain::compile(&["h1.page-header__title", "h1#firstHeading"])
});

pub static INFOBOX_IMAGE: LazyLock<SelectorChain> =
    LazyLock::new(|| SelectorChain::compile(&[".portable-infobox img", ".infobox img"]));

pub static DESCRIPTION: LazyLock<SelectorChain> = LazyLock::new(|| {
    SelectorChain::compile(&[".mw-parser-output > p", "#mw-content-text > p"])
});

static INFOBOX_ROWS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".portable-infobox .pi-item, .infobox tr").expect("valid row selector")
});
static ROW_LABEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".pi-data-label, th").expect("valid label selector"));
static ROW_VALUE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".pi-data-value, td").expect("valid value selector"));
static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// All text nodes under `element`, trimmed and space-joined.
pub fn element_text(element: ElementRef<'_>) -> String {
    join_fragments(element.text())
}

/// Text nodes under `element` concatenated as written, whitespace collapsed.
/// Inline markup such as `<b>` does not introduce extra spaces.
pub fn prose_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads label/value pairs from both infobox markups, in document order.
pub fn infobox_attributes(doc: &Html) -> Attributes {
    let mut attributes = Attributes::new();

    for row in doc.select(&INFOBOX_ROWS) {
        let label = row
            .select(&ROW_LABEL)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let value = join_fragments(row.select(&ROW_VALUE).flat_map(|cell| cell.text()));

        if label.is_empty() || value.is_empty() {
            continue;
        }
        attributes.insert(label, value);
    }

    ::log::trace!("Infobox yielded {} attributes", attributes.len());
    attributes
}

/// Raw `href` values of every anchor on the page.
pub fn links(doc: &Html) -> Vec<String> {
    let links = doc
        .select(&ANCHORS)
        .filter_map(|e| e.value().attr("href"))
        .map(|s| s.to_string())
        .collect::<Vec<String>>();

    ::log::debug!("HTML parser found {} links", links.len());
    links
}
