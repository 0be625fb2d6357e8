//! Short authentication strings for human key comparison.
//!
//! Both parties hash their two public keys in canonical (sorted) order together
//! with the conversation context id, then map five 6-bit slices of the digest
//! onto a 64-entry symbol table. Five symbols give 30 bits, sized for a person
//! comparing screens rather than for cryptographic proof.

use crate::transcript::{tags, Transcript};

/// Number of symbols shown to the user.
pub const SAS_LEN: usize = 5;
/// Bits consumed per symbol; the table holds `1 << BITS_PER_SYMBOL` entries.
pub const BITS_PER_SYMBOL: usize = 6;

/// One entry of the comparison table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SasSymbol {
    pub index: u8,
    pub emoji: &'static str,
    pub name: &'static str,
}

pub static SAS_SYMBOLS: [(&str, &str); 64] = [
    ("🐶", "Dog"), ("🐱", "Cat"), ("🦁", "Lion"), ("🐎", "Horse"),
    ("🦄", "Unicorn"), ("🐷", "Pig"), ("🐘", "Elephant"), ("🐰", "Rabbit"),
    ("🐼", "Panda"), ("🐓", "Rooster"), ("🐧", "Penguin"), ("🐢", "Turtle"),
    ("🐟", "Fish"), ("🐙", "Octopus"), ("🦋", "Butterfly"), ("🌷", "Flower"),
    ("🌳", "Tree"), ("🌵", "Cactus"), ("🍄", "Mushroom"), ("🌏", "Globe"),
    ("🌙", "Moon"), ("☁️", "Cloud"), ("🔥", "Fire"), ("🍌", "Banana"),
    ("🍎", "Apple"), ("🍓", "Strawberry"), ("🌽", "Corn"), ("🍕", "Pizza"),
    ("🎂", "Cake"), ("❤️", "Heart"), ("😀", "Smiley"), ("🤖", "Robot"),
    ("🎩", "Hat"), ("👓", "Glasses"), ("🔧", "Spanner"), ("🎅", "Santa"),
    ("👍", "Thumbs Up"), ("☂️", "Umbrella"), ("⌛", "Hourglass"), ("⏰", "Clock"),
    ("🎁", "Gift"), ("💡", "Light Bulb"), ("📕", "Book"), ("✏️", "Pencil"),
    ("📎", "Paperclip"), ("✂️", "Scissors"), ("🔒", "Lock"), ("🔑", "Key"),
    ("🔨", "Hammer"), ("☎️", "Telephone"), ("🏁", "Flag"), ("🚂", "Train"),
    ("🚲", "Bicycle"), ("✈️", "Aeroplane"), ("🚀", "Rocket"), ("🏆", "Trophy"),
    ("⚽", "Ball"), ("🎸", "Guitar"), ("🎺", "Trumpet"), ("🔔", "Bell"),
    ("⚓", "Anchor"), ("🎧", "Headphones"), ("📁", "Folder"), ("📌", "Pin"),
];

/// Five symbols both parties read out or compare visually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SasCode(pub [SasSymbol; SAS_LEN]);

impl SasCode {
    pub fn symbols(&self) -> &[SasSymbol; SAS_LEN] {
        &self.0
    }

    pub fn indices(&self) -> [u8; SAS_LEN] {
        self.0.map(|s| s.index)
    }

    pub fn emoji_string(&self) -> String {
        self.0.iter().map(|s| s.emoji).collect::<Vec<_>>().join(" ")
    }
}

impl std::fmt::Display for SasCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|s| s.name).collect();
        write!(f, "{}", names.join(" · "))
    }
}

pub fn symbol(index: u8) -> SasSymbol {
    let (emoji, name) = SAS_SYMBOLS[(index as usize) % SAS_SYMBOLS.len()];
    SasSymbol { index, emoji, name }
}

/// Canonical hash input: keys sorted so neither side's role matters.
pub fn sas_transcript(key_a: &[u8; 32], key_b: &[u8; 32], context_id: &str) -> Transcript {
    let (low, high) = if key_a <= key_b { (key_a, key_b) } else { (key_b, key_a) };
    let mut t = Transcript::new("hush_sas_v1");
    t.append_bytes(tags::KEY, low);
    t.append_bytes(tags::PEER_KEY, high);
    t.append_str(tags::CONTEXT, context_id);
    t
}

/// Split the leading `SAS_LEN * BITS_PER_SYMBOL` bits of `digest` into indices.
/// Stable across platforms: bits are read big-endian.
pub fn sas_indices(digest: &[u8; 32]) -> [u8; SAS_LEN] {
    let mut acc = u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ]);
    let mut out = [0u8; SAS_LEN];
    for slot in out.iter_mut() {
        *slot = (acc >> (64 - BITS_PER_SYMBOL)) as u8;
        acc <<= BITS_PER_SYMBOL;
    }
    out
}

/// Derive the symbol sequence for a key pair and context.
pub fn sas_symbols(key_a: &[u8; 32], key_b: &[u8; 32], context_id: &str) -> SasCode {
    let digest = sas_transcript(key_a, key_b, context_id).finalize();
    SasCode(sas_indices(&digest).map(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_entries_are_distinct() {
        let emoji: HashSet<_> = SAS_SYMBOLS.iter().map(|(e, _)| *e).collect();
        let names: HashSet<_> = SAS_SYMBOLS.iter().map(|(_, n)| *n).collect();
        assert_eq!(emoji.len(), 64);
        assert_eq!(names.len(), 64);
        assert_eq!(SAS_SYMBOLS.len(), 1 << BITS_PER_SYMBOL);
    }

    #[test]
    fn test_sas_is_order_independent() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_eq!(sas_symbols(&a, &b, "ctx"), sas_symbols(&b, &a, "ctx"));
    }

    #[test]
    fn test_context_changes_sas() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(sas_symbols(&a, &b, "ctx-1"), sas_symbols(&a, &b, "ctx-2"));
    }

    #[test]
    fn test_indices_from_known_digest() {
        let mut digest = [0u8; 32];
        // 000001 000010 000011 000100 000101 ...
        digest[0] = 0b0000_0100;
        digest[1] = 0b0010_0000;
        digest[2] = 0b1100_0100;
        digest[3] = 0b0001_0100;
        assert_eq!(sas_indices(&digest), [1, 2, 3, 4, 5]);
        assert_eq!(sas_indices(&[0xff; 32]), [63; 5]);
    }

    #[test]
    fn test_display_uses_names() {
        let code = SasCode([symbol(0), symbol(1), symbol(2), symbol(3), symbol(63)]);
        assert_eq!(code.to_string(), "Dog · Cat · Lion · Horse · Pin");
        assert_eq!(code.indices(), [0, 1, 2, 3, 63]);
    }
}
