use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// One entry of a named stimulus list as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetWord {
    pub id: u32,
    pub list: u32,
    pub word: String,
}

impl TargetWord {
    pub fn new(id: u32, list: u32, word: impl Into<String>) -> Self {
        Self {
            id,
            list,
            word: word.into(),
        }
    }
}

/// A stimulus ready for presentation. Identity is `word_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusItem {
    pub word: String,
    pub word_id: u32,
    pub list_tag: u32,
    pub image_file: String,
}

impl StimulusItem {
    pub fn from_target(target: &TargetWord, image_ext: &str) -> Self {
        Self {
            word: target.word.clone(),
            word_id: target.id,
            list_tag: target.list,
            image_file: image_file_name(&target.word, image_ext),
        }
    }
}

/// A named, ordered stimulus list as supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusList {
    pub name: String,
    pub items: Vec<TargetWord>,
}

impl StimulusList {
    pub fn new(name: impl Into<String>, items: Vec<TargetWord>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Canonical decomposition followed by removal of the Combining
/// Diacritical Marks block (U+0300..U+036F).
pub fn strip_diacritics(word: &str) -> String {
    word.nfd().filter(|&c| !is_combining_mark(c)).collect()
}

/// Image asset name for a word, e.g. `sandía` + `.jpg` -> `sandia.jpg`.
pub fn image_file_name(word: &str, image_ext: &str) -> String {
    format!("{}{}", strip_diacritics(word), image_ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_spanish_accents() {
        assert_eq!(strip_diacritics("sandía"), "sandia");
        assert_eq!(strip_diacritics("lápiz"), "lapiz");
        assert_eq!(strip_diacritics("pingüino"), "pinguino");
        assert_eq!(strip_diacritics("niño"), "nino");
        assert_eq!(strip_diacritics("ÁRBOL"), "ARBOL");
    }

    #[test]
    fn drops_decomposed_combining_marks() {
        // "e" followed by COMBINING ACUTE ACCENT
        assert_eq!(strip_diacritics("cafe\u{0301}"), "cafe");
    }

    #[test]
    fn strips_accents_beyond_latin_extended_a() {
        assert_eq!(strip_diacritics("ǎrbol"), "arbol");
        assert_eq!(strip_diacritics("ạ"), "a");
        assert_eq!(strip_diacritics("Ǹ"), "N");
        assert_eq!(strip_diacritics("ḿ"), "m");
        assert_eq!(strip_diacritics("ǖ"), "u");
        assert_eq!(strip_diacritics("Việt"), "Viet");
    }

    #[test]
    fn marks_outside_the_diacritics_block_survive() {
        // COMBINING ENCLOSING CIRCLE is U+20DD
        assert_eq!(strip_diacritics("a\u{20DD}"), "a\u{20DD}");
    }

    #[test]
    fn leaves_plain_ascii_untouched() {
        assert_eq!(strip_diacritics("manzana"), "manzana");
        assert_eq!(strip_diacritics("tiza-2"), "tiza-2");
    }

    #[test]
    fn letters_without_decomposition_are_kept() {
        assert_eq!(strip_diacritics("straße"), "straße");
        assert_eq!(strip_diacritics("Ørsted"), "Ørsted");
    }

    #[test]
    fn image_file_name_appends_extension() {
        assert_eq!(image_file_name("sandía", ".jpg"), "sandia.jpg");
        assert_eq!(image_file_name("oso", ".png"), "oso.png");
    }

    #[test]
    fn stimulus_item_from_target() {
        let target = TargetWord::new(19, 2, "lápiz");
        let item = StimulusItem::from_target(&target, ".jpg");
        assert_eq!(item.word, "lápiz");
        assert_eq!(item.word_id, 19);
        assert_eq!(item.list_tag, 2);
        assert_eq!(item.image_file, "lapiz.jpg");
    }
}
