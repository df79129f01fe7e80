use anyhow::{Context, Result};
use regex::Regex;

use crate::config::{ClassifierConfig, StrictnessMode};

/// Decides whether a message text is a trading signal.
#[derive(Debug, Clone)]
pub struct Classifier {
    pattern: Regex,
}

impl Classifier {
    pub fn new(instrument: &str, keywords: &[String], mode: StrictnessMode) -> Result<Self> {
        let instrument = regex::escape(instrument.trim());
        let keywords = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");
        if instrument.is_empty() || keywords.is_empty() {
            anyhow::bail!("classifier needs an instrument and at least one keyword");
        }

        let directional = format!(r"\b(?:{})\b", keywords);
        let source = match mode {
            StrictnessMode::Strict => format!(r"(?is)^{}.*{}", instrument, directional),
            StrictnessMode::Loose => {
                format!(r"(?is){}.*{}|{}", instrument, directional, directional)
            }
        };

        let pattern = Regex::new(&source)
            .with_context(|| format!("Failed to compile signal pattern: {}", source))?;
        Ok(Self { pattern })
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        Self::new(&config.instrument, &config.keywords, config.mode)
    }

    pub fn classify(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.pattern.is_match(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(mode: StrictnessMode) -> Classifier {
        Classifier::new("XAUUSD", &["buy".to_string(), "sell".to_string()], mode).unwrap()
    }

    #[test]
    fn test_blank_text_is_never_a_signal() {
        for mode in [StrictnessMode::Strict, StrictnessMode::Loose] {
            let c = classifier(mode);
            assert!(!c.classify(""));
            assert!(!c.classify("   \n\t "));
        }
    }

    #[test]
    fn test_no_directional_keyword() {
        for mode in [StrictnessMode::Strict, StrictnessMode::Loose] {
            let c = classifier(mode);
            assert!(!c.classify("XAUUSD price is up"));
            assert!(!c.classify("XAUUSD buyers are everywhere"));
            assert!(!c.classify("XAUUSD reselling"));
        }
    }

    #[test]
    fn test_instrument_with_keyword_matches_both_modes() {
        for mode in [StrictnessMode::Strict, StrictnessMode::Loose] {
            let c = classifier(mode);
            assert!(c.classify("XAUUSD BUY now"));
            assert!(c.classify("xauusd sell @ 1950"));
            assert!(c.classify("XAUUSD\nentry 1950\nSell"));
        }
    }

    #[test]
    fn test_bare_keyword_only_loose() {
        assert!(classifier(StrictnessMode::Loose).classify("buy"));
        assert!(!classifier(StrictnessMode::Strict).classify("buy"));
    }

    #[test]
    fn test_strict_requires_leading_instrument() {
        let strict = classifier(StrictnessMode::Strict);
        assert!(!strict.classify("Gold update: XAUUSD buy 1950"));
        assert!(classifier(StrictnessMode::Loose).classify("Gold update: XAUUSD buy 1950"));
    }

    #[test]
    fn test_keywords_are_escaped() {
        let c = Classifier::new("XAU.USD", &["l.ong".to_string()], StrictnessMode::Strict).unwrap();
        assert!(c.classify("XAU.USD l.ong now"));
        assert!(!c.classify("XAUxUSD l.ong now"));
        assert!(!c.classify("XAU.USD lxong now"));
    }

    #[test]
    fn test_empty_keywords_rejected() {
        assert!(Classifier::new("XAUUSD", &[" ".to_string()], StrictnessMode::Loose).is_err());
    }
}
