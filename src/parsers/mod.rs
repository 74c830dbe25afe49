pub mod html;


use crate::records::Attributes;
use crate::utils::{GAME_DESCRIPTION_LIMIT, strip_token, truncate_with_ellipsis};
use scraper::Html;

/// Which kind of wiki page is being extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// A game's root page
    Game,
    /// A character page linked from a game page
    Character,
}

/// Best-effort fields read from a rendered page. Missing selectors leave the
/// corresponding field empty; extraction never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub name: String,
    pub image: Option<String>,
    pub description: String,
    pub attributes: Attributes,
}

/// Parses `html` and extracts the fields for `kind`.
pub fn extract(html: &str, kind: PageKind) -> ExtractedFields {
    let doc = Html::parse_document(html);
    extract_document(&doc, kind)
}

/// Extracts fields from an already parsed document.
pub fn extract_document(doc: &Html, kind: PageKind) -> ExtractedFields {
    let name = match kind {
        PageKind::Game => strip_token(&html::GAME_NAME.first_text(doc), "Wiki"),
        PageKind::Character => html::CHARACTER_NAME.first_text(doc),
    };

    let image = html::INFOBOX_IMAGE
        .first_attr(doc, "src")
        .map(|src| absolutize_image(&src));

    let description = html::DESCRIPTION.joined_text(doc);
    let description = match kind {
        PageKind::Game => truncate_with_ellipsis(&description, GAME_DESCRIPTION_LIMIT),
        PageKind::Character => description,
    };

    ExtractedFields {
        name,
        image,
        description,
        attributes: html::infobox_attributes(doc),
    }
}

/// Protocol-relative image sources are served over https.
fn absolutize_image(src: &str) -> String {
    if src.starts_with("//") {
        format!("https:{}", src)
    } else {
        src.to_string()
    }
}
