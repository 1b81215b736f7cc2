//! Capability requirements derived from a scrape request.
//!
//! The resolved [`FeatureSet`] is the only piece of request state that
//! changes during a scrape, and it only changes between scheduler runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use url::Url;

use crate::options::{Format, InternalOptions, ProxyMode, ScrapeOptions};

/// A capability an engine must provide to honor a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFlag {
    Actions,
    WaitFor,
    Screenshot,
    ScreenshotFullPage,
    Pdf,
    Document,
    Atsv,
    Location,
    Mobile,
    SkipTlsVerification,
    UseFastMode,
    StealthProxy,
    DisableAdblock,
}

impl FeatureFlag {
    pub const ALL: [FeatureFlag; 13] = [
        FeatureFlag::Actions,
        FeatureFlag::WaitFor,
        FeatureFlag::Screenshot,
        FeatureFlag::ScreenshotFullPage,
        FeatureFlag::Pdf,
        FeatureFlag::Document,
        FeatureFlag::Atsv,
        FeatureFlag::Location,
        FeatureFlag::Mobile,
        FeatureFlag::SkipTlsVerification,
        FeatureFlag::UseFastMode,
        FeatureFlag::StealthProxy,
        FeatureFlag::DisableAdblock,
    ];

    /// Weight of this flag when scoring engines for the fallback list
    pub fn priority(self) -> u32 {
        match self {
            FeatureFlag::Actions => 20,
            FeatureFlag::WaitFor => 1,
            FeatureFlag::Screenshot => 10,
            FeatureFlag::ScreenshotFullPage => 10,
            FeatureFlag::Pdf => 100,
            FeatureFlag::Document => 100,
            FeatureFlag::Atsv => 90,
            FeatureFlag::Location => 10,
            FeatureFlag::Mobile => 10,
            FeatureFlag::SkipTlsVerification => 10,
            FeatureFlag::UseFastMode => 1,
            FeatureFlag::StealthProxy => 20,
            FeatureFlag::DisableAdblock => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureFlag::Actions => "actions",
            FeatureFlag::WaitFor => "wait_for",
            FeatureFlag::Screenshot => "screenshot",
            FeatureFlag::ScreenshotFullPage => "screenshot_full_page",
            FeatureFlag::Pdf => "pdf",
            FeatureFlag::Document => "document",
            FeatureFlag::Atsv => "atsv",
            FeatureFlag::Location => "location",
            FeatureFlag::Mobile => "mobile",
            FeatureFlag::SkipTlsVerification => "skip_tls_verification",
            FeatureFlag::UseFastMode => "use_fast_mode",
            FeatureFlag::StealthProxy => "stealth_proxy",
            FeatureFlag::DisableAdblock => "disable_adblock",
        }
    }
}

impl fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of feature flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeSet<FeatureFlag>);

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flag: FeatureFlag) -> bool {
        self.0.insert(flag)
    }

    pub fn remove(&mut self, flag: FeatureFlag) -> bool {
        self.0.remove(&flag)
    }

    pub fn contains(&self, flag: FeatureFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = FeatureFlag> + '_ {
        self.0.iter().copied()
    }

    pub fn extend_from(&mut self, other: &FeatureSet) {
        self.0.extend(other.iter());
    }

    pub fn remove_all(&mut self, other: &FeatureSet) {
        for flag in other.iter() {
            self.0.remove(&flag);
        }
    }

    /// Flags of `self` that are missing from `supported`
    pub fn difference(&self, supported: &FeatureSet) -> FeatureSet {
        FeatureSet(self.0.difference(&supported.0).copied().collect())
    }

    pub fn total_priority(&self) -> u32 {
        self.iter().map(FeatureFlag::priority).sum()
    }
}

impl FromIterator<FeatureFlag> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = FeatureFlag>>(iter: I) -> Self {
        FeatureSet(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[FeatureFlag; N]> for FeatureSet {
    fn from(flags: [FeatureFlag; N]) -> Self {
        flags.into_iter().collect()
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(FeatureFlag::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

const DOCUMENT_EXTENSIONS: &[&str] = &[".docx", ".doc", ".odt", ".rtf", ".xlsx", ".xls"];

/// Derive the initial feature set for a request. Pure function of its input.
pub fn resolve_feature_flags(
    url: &Url,
    options: &ScrapeOptions,
    internal: &InternalOptions,
) -> FeatureSet {
    let mut flags = FeatureSet::new();

    if !options.actions.is_empty() {
        flags.insert(FeatureFlag::Actions);
    }
    if options.wait_for > 0 {
        flags.insert(FeatureFlag::WaitFor);
    }
    if options.wants(Format::Screenshot) {
        flags.insert(FeatureFlag::Screenshot);
    }
    if options.wants(Format::ScreenshotFullPage) {
        flags.insert(FeatureFlag::ScreenshotFullPage);
    }
    if internal.atsv {
        flags.insert(FeatureFlag::Atsv);
    }
    if options.location.is_some() {
        flags.insert(FeatureFlag::Location);
    }
    if options.mobile {
        flags.insert(FeatureFlag::Mobile);
    }
    if options.skip_tls_verification {
        flags.insert(FeatureFlag::SkipTlsVerification);
    }
    if options.fast_mode {
        flags.insert(FeatureFlag::UseFastMode);
    }
    if options.proxy == ProxyMode::Stealth {
        flags.insert(FeatureFlag::StealthProxy);
    }
    if !options.block_ads {
        flags.insert(FeatureFlag::DisableAdblock);
    }

    let path = url.path().to_ascii_lowercase();
    if path.ends_with(".pdf") {
        flags.insert(FeatureFlag::Pdf);
    }
    if DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        flags.insert(FeatureFlag::Document);
    }

    flags
}
