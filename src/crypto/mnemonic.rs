//! BIP-39 seed phrase management.
//!
//! The mnemonic is the single root of trust: it is generated from the OS
//! CSPRNG, validated on import, and exposed to the rest of the crate only
//! through the [`Seed`] wrapper, which redacts itself in `Debug` output and
//! zeroizes on drop.

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::core::errors::WalletError;

/// Accepted phrase lengths. Anything else fails validation outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordCount {
    Twelve = 12,
    Fifteen = 15,
    Eighteen = 18,
    TwentyOne = 21,
    TwentyFour = 24,
}

impl WordCount {
    pub const fn entropy_bytes(self) -> usize {
        match self {
            WordCount::Twelve => 16,
            WordCount::Fifteen => 20,
            WordCount::Eighteen => 24,
            WordCount::TwentyOne => 28,
            WordCount::TwentyFour => 32,
        }
    }

    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            12 => Some(WordCount::Twelve),
            15 => Some(WordCount::Fifteen),
            18 => Some(WordCount::Eighteen),
            21 => Some(WordCount::TwentyOne),
            24 => Some(WordCount::TwentyFour),
            _ => None,
        }
    }
}

/// A validated seed phrase. Construction goes through [`SeedManager`] only,
/// so an invalid checksum can never reach key derivation.
#[derive(Clone)]
pub struct Seed {
    phrase: Zeroizing<String>,
    word_count: usize,
}

impl Seed {
    fn from_mnemonic(mnemonic: &Mnemonic) -> Self {
        Self {
            phrase: Zeroizing::new(mnemonic.to_string()),
            word_count: mnemonic.word_count(),
        }
    }

    /// The phrase itself. Handle transiently; never log.
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// The 64-byte BIP-39 seed (empty passphrase profile).
    pub fn to_seed_bytes(&self) -> Result<Zeroizing<[u8; 64]>, WalletError> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &self.phrase)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        Ok(Zeroizing::new(mnemonic.to_seed("")))
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seed")
            .field("word_count", &self.word_count)
            .field("phrase", &"[REDACTED]")
            .finish()
    }
}

/// Generates, validates and imports seed phrases.
pub struct SeedManager;

impl SeedManager {
    /// Fresh 12-word phrase (128-bit entropy), the default onboarding
    /// profile.
    pub fn generate() -> Result<Seed, WalletError> {
        Self::generate_with_word_count(WordCount::Twelve)
    }

    pub fn generate_with_word_count(word_count: WordCount) -> Result<Seed, WalletError> {
        let entropy_len = word_count.entropy_bytes();
        let mut entropy = [0u8; 32];
        OsRng.fill_bytes(&mut entropy[..entropy_len]);

        let mnemonic = Mnemonic::from_entropy(&entropy[..entropy_len])
            .map_err(|e| WalletError::Crypto(format!("mnemonic generation failed: {e}")))?;
        entropy.zeroize();

        Ok(Seed::from_mnemonic(&mnemonic))
    }

    /// Checksum + word-count validation. Whitespace is normalized first.
    pub fn validate(candidate: &str) -> bool {
        Self::parse(candidate).is_ok()
    }

    /// Validate and wrap a user-supplied phrase.
    pub fn import(candidate: &str) -> Result<Seed, WalletError> {
        let mnemonic = Self::parse(candidate)?;
        Ok(Seed::from_mnemonic(&mnemonic))
    }

    fn parse(candidate: &str) -> Result<Mnemonic, WalletError> {
        let words: Vec<&str> = candidate.split_whitespace().collect();
        if WordCount::from_len(words.len()).is_none() {
            return Err(WalletError::InvalidMnemonic(format!(
                "expected 12/15/18/21/24 words, got {}",
                words.len()
            )));
        }
        let normalized = words.join(" ").to_lowercase();
        Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn generate_yields_twelve_valid_words() {
        let seed = SeedManager::generate().unwrap();
        assert_eq!(seed.word_count(), 12);
        assert!(SeedManager::validate(seed.phrase()));
    }

    #[test]
    fn generate_other_word_counts() {
        for (wc, expected) in [
            (WordCount::Fifteen, 15),
            (WordCount::Eighteen, 18),
            (WordCount::TwentyOne, 21),
            (WordCount::TwentyFour, 24),
        ] {
            let seed = SeedManager::generate_with_word_count(wc).unwrap();
            assert_eq!(seed.word_count(), expected);
            assert!(SeedManager::validate(seed.phrase()));
        }
    }

    #[test]
    fn import_known_vector() {
        let seed = SeedManager::import(KNOWN_PHRASE).unwrap();
        assert_eq!(seed.word_count(), 12);
        // first 4 bytes of the canonical BIP-39 test vector seed
        let bytes = seed.to_seed_bytes().unwrap();
        assert_eq!(&bytes[..4], &[0x5e, 0xb0, 0x0b, 0xbd]);
    }

    #[test]
    fn wrong_word_counts_rejected() {
        let eleven: String = KNOWN_PHRASE.split(' ').take(11).collect::<Vec<_>>().join(" ");
        let thirteen = format!("{KNOWN_PHRASE} abandon");
        assert!(!SeedManager::validate(&eleven));
        assert!(!SeedManager::validate(&thirteen));
        assert!(!SeedManager::validate(""));
        assert!(matches!(
            SeedManager::import(&eleven).unwrap_err(),
            WalletError::InvalidMnemonic(_)
        ));
    }

    #[test]
    fn checksum_detects_one_substituted_word() {
        // replace the final checksum-bearing word with another wordlist entry
        let tampered = KNOWN_PHRASE.replace(" about", " zoo");
        assert!(!SeedManager::validate(&tampered));
    }

    #[test]
    fn non_wordlist_input_rejected() {
        let garbage = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor";
        assert!(!SeedManager::validate(garbage));
    }

    #[test]
    fn validate_trims_and_normalizes_whitespace() {
        let padded = format!("  {}  ", KNOWN_PHRASE.replace(' ', "   "));
        assert!(SeedManager::validate(&padded));
    }

    #[test]
    fn seed_debug_is_redacted() {
        let seed = SeedManager::import(KNOWN_PHRASE).unwrap();
        let printed = format!("{seed:?}");
        assert!(!printed.contains("abandon"));
    }
}
