use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use url::Url;

/// Ordered label/value pairs read from an infobox.
///
/// Labels are unique. Inserting an existing label replaces its value in place,
/// so the last row with a given label wins while first-seen order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((label, value)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, value) in &self.entries {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

/// A game's root wiki page.
#[derive(Debug, Clone, Serialize)]
pub struct GameRecord {
    pub url: String,
    pub name: String,
    pub image: Option<String>,
    pub description: String,
    pub attributes: Attributes,

    /// Character pages discovered from this page. Not part of the stored record.
    #[serde(skip)]
    pub character_urls: BTreeSet<String>,
}

/// A character page reached from a game page.
#[derive(Debug, Clone, Serialize)]
pub struct CharacterRecord {
    pub url: String,
    pub name: String,
    pub game: String,
    pub image: String,
    pub description: String,
    pub attributes: Attributes,
}

/// Every record written to the output collection, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageRecord {
    Game(GameRecord),
    Character(CharacterRecord),
}

impl PageRecord {
    pub fn url(&self) -> &str {
        match self {
            PageRecord::Game(game) => &game.url,
            PageRecord::Character(character) => &character.url,
        }
    }
}

/// Why a character candidate was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingName,
    MissingImage,
    InvalidImage(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::MissingName => write!(f, "no name"),
            Rejection::MissingImage => write!(f, "no image"),
            Rejection::InvalidImage(src) => write!(f, "image is not an absolute http URL: {}", src),
        }
    }
}

impl CharacterRecord {
    /// Builds a character record, enforcing that the name is non-empty and the
    /// image is an absolute http(s) URL.
    pub fn validated(
        url: String,
        name: String,
        game: String,
        image: Option<String>,
        description: String,
        attributes: Attributes,
    ) -> Result<Self, Rejection> {
        if name.trim().is_empty() {
            return Err(Rejection::MissingName);
        }
        let image = image.ok_or(Rejection::MissingImage)?;
        if !is_absolute_http(&image) {
            return Err(Rejection::InvalidImage(image));
        }

        Ok(Self {
            url,
            name,
            game,
            image,
            description,
            attributes,
        })
    }
}

fn is_absolute_http(candidate: &str) -> bool {
    candidate.starts_with("http")
        && Url::parse(candidate)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_last_write_wins() {
        let mut attrs = Attributes::new();
        attrs.insert("Age", "17");
        attrs.insert("Class", "Rogue");
        attrs.insert("Age", "18");

        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("Age"), Some("18"));
        let labels: Vec<&str> = attrs.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["Age", "Class"]);
    }

    #[test]
    fn test_record_serializes_with_type_tag() {
        let mut attrs = Attributes::new();
        attrs.insert("Developer", "Studio");
        let mut game = GameRecord {
            url: "https://example.fandom.com/wiki/Demo_Game".to_string(),
            name: "Demo Game".to_string(),
            image: None,
            description: String::new(),
            attributes: attrs,
            character_urls: BTreeSet::new(),
        };
        game.character_urls
            .insert("https://example.fandom.com/wiki/Hero_Character".to_string());

        let value = serde_json::to_value(PageRecord::Game(game)).unwrap();
        assert_eq!(value["type"], "game");
        assert_eq!(value["name"], "Demo Game");
        assert_eq!(value["attributes"]["Developer"], "Studio");
        assert!(value["image"].is_null());
        assert!(value.get("character_urls").is_none());
    }

    #[test]
    fn test_character_validation_gate() {
        let build = |name: &str, image: Option<&str>| {
            CharacterRecord::validated(
                "https://example.fandom.com/wiki/Hero".to_string(),
                name.to_string(),
                "Demo Game".to_string(),
                image.map(str::to_string),
                String::new(),
                Attributes::new(),
            )
        };

        assert!(build("Hero", Some("https://img.example.com/hero.png")).is_ok());
        assert_eq!(
            build("", Some("https://img.example.com/hero.png")).unwrap_err(),
            Rejection::MissingName
        );
        assert_eq!(build("Hero", None).unwrap_err(), Rejection::MissingImage);
        assert!(matches!(
            build("Hero", Some("data:image/gif;base64,R0lGOD")),
            Err(Rejection::InvalidImage(_))
        ));
        assert!(matches!(
            build("Hero", Some("/images/hero.png")),
            Err(Rejection::InvalidImage(_))
        ));
    }

    #[test]
    fn test_character_serializes_as_character() {
        let character = CharacterRecord::validated(
            "https://example.fandom.com/wiki/Hero".to_string(),
            "Hero".to_string(),
            "Demo Game".to_string(),
            Some("https://img.example.com/hero.png".to_string()),
            "A hero.".to_string(),
            Attributes::new(),
        )
        .unwrap();
        let record = PageRecord::Character(character);
        assert_eq!(record.url(), "https://example.fandom.com/wiki/Hero");

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "character");
        assert_eq!(value["game"], "Demo Game");
    }
}
