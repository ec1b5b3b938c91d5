use tracing::{debug, warn};

use super::read_pointer_vector;
use super::strings::{StringLayout, read_msvc_string};
use crate::error::{DecodeError, LayoutError};
use crate::layout::{Field, MemoryLayout};
use crate::memory::{Address, ReadMemory};

/// Translation whose words spell dwarven last names.
pub const DWARF_TRANSLATION: &str = "DWARF";

/// Word tables used to render last names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    words: Vec<String>,
    dwarven: Vec<String>,
}

impl Dictionary {
    pub fn new(words: Vec<String>, dwarven: Vec<String>) -> Self {
        Self { words, dwarven }
    }

    /// Read the generic word list from the language vector and the dwarven
    /// word list from the translation named `DWARF`.
    pub fn load<R: ReadMemory + ?Sized>(
        reader: &R,
        layout: &MemoryLayout,
        language_vector: Address,
        translation_vector: Address,
    ) -> Result<Self, DecodeError> {
        let offsets = Offsets::resolve(layout).map_err(|e| {
            DecodeError::corrupt(language_vector, format!("unusable layout: {}", e))
        })?;
        let ptr = layout.pointer_size;
        let max_words = layout.scan.language_vector.max_count;
        let max_translations = layout.scan.translation_vector.max_count;

        let mut words = Vec::new();
        for word in read_pointer_vector(reader, language_vector, ptr, max_words)? {
            words.push(read_msvc_string(reader, word + offsets.word_base, &offsets.strings)?);
        }

        let mut dwarven = Vec::new();
        for translation in read_pointer_vector(reader, translation_vector, ptr, max_translations)? {
            let name = read_msvc_string(
                reader,
                translation + offsets.translation_name,
                &offsets.strings,
            )?;
            if !name.eq_ignore_ascii_case(DWARF_TRANSLATION) {
                continue;
            }
            for word in read_pointer_vector(
                reader,
                translation + offsets.translation_words,
                ptr,
                max_words,
            )? {
                dwarven.push(read_msvc_string(reader, word, &offsets.strings)?);
            }
            break;
        }

        if dwarven.is_empty() {
            warn!("No {} translation found; last names use generic words", DWARF_TRANSLATION);
        }
        debug!(
            "Loaded dictionary: {} words, {} dwarven words",
            words.len(),
            dwarven.len()
        );
        Ok(Self { words, dwarven })
    }

    pub fn word(&self, index: i32) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.words.get(i))
            .map(String::as_str)
    }

    pub fn dwarven_word(&self, index: i32) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.dwarven.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.dwarven.is_empty()
    }

    /// Join the word ids of a last name into one capitalised word.
    ///
    /// Negative ids are unused slots. Dwarven words are preferred, with the
    /// generic word as fallback.
    pub fn last_name(&self, word_ids: &[i32]) -> String {
        let joined: String = word_ids
            .iter()
            .filter(|&&id| id >= 0)
            .filter_map(|&id| self.dwarven_word(id).or_else(|| self.word(id)))
            .collect();
        capitalize(&joined)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

struct Offsets {
    strings: StringLayout,
    word_base: u64,
    translation_name: u64,
    translation_words: u64,
}

impl Offsets {
    fn resolve(layout: &MemoryLayout) -> Result<Self, LayoutError> {
        Ok(Self {
            strings: StringLayout::from_layout(layout)?,
            word_base: layout.offset(Field::WordBase)?,
            translation_name: layout.offset(Field::TranslationName)?,
            translation_words: layout.offset(Field::TranslationWords)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::strings::fixtures::string;
    use crate::layout::fixtures::test_layout;
    use crate::memory::MockMemoryBuilder;

    #[test]
    fn test_last_name_joins_words() {
        let dict = Dictionary::new(
            vec!["hammer".into(), "stone".into()],
            vec!["kadol".into(), "ustuth".into()],
        );
        assert_eq!(dict.last_name(&[0, 1, -1, -1, -1, -1, -1]), "Kadolustuth");
        assert_eq!(dict.last_name(&[-1; 7]), "");
    }

    #[test]
    fn test_last_name_falls_back_to_generic_words() {
        let dict = Dictionary::new(vec!["hammer".into(), "stone".into()], Vec::new());
        assert_eq!(dict.last_name(&[1, 0]), "Stonehammer");
    }

    #[test]
    fn test_load_from_memory() {
        // Language vector at 0x1000 -> [word 0x1100, word 0x1200]
        // Translation vector at 0x1010 -> [HUMAN 0x1300, DWARF 0x1400]
        // DWARF words vector at 0x1400 + 0x1C -> [0x1500, 0x1600]
        let b = MockMemoryBuilder::new(0x1000, 0x1000)
            .vector32(0x1000, 0x1040, 0x1048, 0x1048)
            .u32(0x1040, 0x1100)
            .u32(0x1044, 0x1200)
            .vector32(0x1010, 0x1050, 0x1058, 0x1058)
            .u32(0x1050, 0x1300)
            .u32(0x1054, 0x1400)
            .vector32(0x141C, 0x1060, 0x1068, 0x1068)
            .u32(0x1060, 0x1500)
            .u32(0x1064, 0x1600);
        let b = string(b, 0x1100, "hammer", 0);
        let b = string(b, 0x1200, "stone", 0);
        let b = string(b, 0x1300, "HUMAN", 0);
        let b = string(b, 0x1400, "DWARF", 0);
        let b = string(b, 0x1500, "kadol", 0);
        let b = string(b, 0x1600, "ustuth", 0);
        let mock = b.build();

        let dict = Dictionary::load(&mock, &test_layout(), 0x1000, 0x1010).unwrap();

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.word(1), Some("stone"));
        assert_eq!(dict.dwarven_word(0), Some("kadol"));
        assert_eq!(dict.dwarven_word(5), None);
        assert_eq!(dict.word(-1), None);
    }
}
