//! Option flags consumed by the crawler and fetcher
//!
//! A fixed set of named boolean switches, stored as a bitset so the whole set is `Copy`
//! and can be shared with every worker without locking.

use crate::config::OptionsConfig;
use std::fmt;

/// A named boolean switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionFlag {
    /// Verbose tracing of fetches, frontier sizes and collection counts
    DebugMode,
    /// Persist the visited and unvisited link sets on finalize
    SaveLinks,
    /// Persist the remaining content buffers on finalize
    SaveContent,
    /// Ignore the per-type collection limit as a stop condition
    Unlimited,
    /// Only extract content from pages in the configured language
    RestrictLanguage,
}

impl OptionFlag {
    /// Bit position of this flag inside [`Options`]
    pub const fn position(self) -> u8 {
        match self {
            Self::DebugMode => 0,
            Self::SaveLinks => 1,
            Self::SaveContent => 2,
            Self::Unlimited => 3,
            Self::RestrictLanguage => 4,
        }
    }

    /// Returns all flags in bit order
    pub fn all() -> [OptionFlag; 5] {
        [
            Self::DebugMode,
            Self::SaveLinks,
            Self::SaveContent,
            Self::Unlimited,
            Self::RestrictLanguage,
        ]
    }

    fn mask(self) -> u8 {
        1 << self.position()
    }
}

impl fmt::Display for OptionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DebugMode => "DEBUG_MODE",
            Self::SaveLinks => "SAVE_LINKS",
            Self::SaveContent => "SAVE_CONTENT",
            Self::Unlimited => "UNLIMITED",
            Self::RestrictLanguage => "RESTRICT_LANGUAGE",
        };
        write!(f, "{}", name)
    }
}

/// The set of flags enabled for a crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    bits: u8,
}

impl Options {
    /// Creates an empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `flag` is enabled
    pub fn is_set(&self, flag: OptionFlag) -> bool {
        self.bits & flag.mask() != 0
    }

    /// Enables or disables `flag`
    pub fn set(&mut self, flag: OptionFlag, enabled: bool) {
        if enabled {
            self.bits |= flag.mask();
        } else {
            self.bits &= !flag.mask();
        }
    }

    /// Builder-style variant of [`Options::set`] that enables `flag`
    pub fn with(mut self, flag: OptionFlag) -> Self {
        self.set(flag, true);
        self
    }

    /// Shorthand for `is_set(OptionFlag::DebugMode)`
    pub fn debug(&self) -> bool {
        self.is_set(OptionFlag::DebugMode)
    }
}

impl From<&OptionsConfig> for Options {
    fn from(config: &OptionsConfig) -> Self {
        let mut options = Options::new();
        options.set(OptionFlag::DebugMode, config.debug_mode);
        options.set(OptionFlag::SaveLinks, config.save_links);
        options.set(OptionFlag::SaveContent, config.save_content);
        options.set(OptionFlag::Unlimited, config.unlimited);
        options.set(OptionFlag::RestrictLanguage, config.restrict_language);
        options
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enabled: Vec<String> = OptionFlag::all()
            .iter()
            .filter(|flag| self.is_set(**flag))
            .map(|flag| flag.to_string())
            .collect();
        if enabled.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", enabled.join(", "))
        }
    }
}
