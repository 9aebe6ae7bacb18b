//! Source precedence between overlapping raw registries.
//!
//! Some periods have records in two sources. The authoritative source wins
//! from its introduction period onwards, the legacy source before it, and
//! whichever is present wins when the preferred one is missing.

use serde::{Deserialize, Serialize};

use crate::types::{PeriodKey, SourceTag};

/// Default tag of the authoritative (newer) registry.
pub const DEFAULT_AUTHORITATIVE_SOURCE: &str = "general";

/// Default tag of the legacy (older) registry.
pub const DEFAULT_LEGACY_SOURCE: &str = "metadata";

/// Outcome of choosing a source for one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSelection {
    /// Selected source.
    pub source: SourceTag,
    /// True when the preferred source was absent.
    pub fallback: bool,
}

/// Precedence rule with an injected transition period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePrecedence {
    /// Source preferred on and after `transition`.
    pub authoritative: SourceTag,
    /// Source preferred before `transition`.
    pub legacy: SourceTag,
    /// First period the authoritative source is preferred.
    pub transition: PeriodKey,
}

impl SourcePrecedence {
    /// Create a precedence rule.
    pub fn new(authoritative: SourceTag, legacy: SourceTag, transition: PeriodKey) -> Self {
        Self {
            authoritative,
            legacy,
            transition,
        }
    }

    /// Rule over the default `general` / `metadata` tags.
    pub fn with_default_sources(transition: PeriodKey) -> Self {
        Self::new(
            SourceTag::new(DEFAULT_AUTHORITATIVE_SOURCE),
            SourceTag::new(DEFAULT_LEGACY_SOURCE),
            transition,
        )
    }

    /// Source preferred for `period`.
    pub fn preferred(&self, period: &PeriodKey) -> &SourceTag {
        if period >= &self.transition {
            &self.authoritative
        } else {
            &self.legacy
        }
    }

    /// Choose among the sources that have data for `period`.
    ///
    /// Falls back to the other configured source, then to the smallest
    /// remaining tag, so the choice never depends on input order.
    pub fn select<'a, I>(&self, period: &PeriodKey, available: I) -> Option<SourceSelection>
    where
        I: IntoIterator<Item = &'a SourceTag>,
    {
        let mut available: Vec<&SourceTag> = available.into_iter().collect();
        available.sort();
        available.dedup();

        let preferred = self.preferred(period);
        if available.contains(&preferred) {
            return Some(SourceSelection {
                source: preferred.clone(),
                fallback: false,
            });
        }

        let secondary = if preferred == &self.authoritative {
            &self.legacy
        } else {
            &self.authoritative
        };
        let chosen = if available.contains(&secondary) {
            Some(secondary)
        } else {
            available.first().copied()
        }?;

        Some(SourceSelection {
            source: chosen.clone(),
            fallback: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PeriodKey {
        PeriodKey::parse(s).unwrap()
    }

    fn rule() -> SourcePrecedence {
        SourcePrecedence::with_default_sources(p("2018-03"))
    }

    #[test]
    fn test_preferred_switches_at_transition() {
        let rule = rule();
        assert_eq!(rule.preferred(&p("2018-02")).as_str(), "metadata");
        assert_eq!(rule.preferred(&p("2018-03")).as_str(), "general");
        assert_eq!(rule.preferred(&p("2019-01")).as_str(), "general");
    }

    #[test]
    fn test_select_prefers_and_falls_back() {
        let rule = rule();
        let both = [SourceTag::new("general"), SourceTag::new("metadata")];
        let only_metadata = [SourceTag::new("metadata")];

        let chosen = rule.select(&p("2018-06"), both.iter()).unwrap();
        assert_eq!(chosen.source.as_str(), "general");
        assert!(!chosen.fallback);

        let chosen = rule.select(&p("2018-06"), only_metadata.iter()).unwrap();
        assert_eq!(chosen.source.as_str(), "metadata");
        assert!(chosen.fallback);
    }

    #[test]
    fn test_select_unknown_sources_deterministic() {
        let rule = rule();
        let odd = [SourceTag::new("zeta"), SourceTag::new("alpha")];
        let chosen = rule.select(&p("2018-06"), odd.iter()).unwrap();
        assert_eq!(chosen.source.as_str(), "alpha");
        assert!(rule.select(&p("2018-06"), [].iter()).is_none());
    }
}
