//! Model candidate resolution.
//!
//! Resolution is a pure function of a preference list and the identifiers the
//! agent reports as available. Discovery itself lives in `io::models`.

use std::sync::LazyLock;

use regex::Regex;

static MODEL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9-]+/[a-z0-9.-]+$").expect("model id pattern should be valid")
});

/// Ranked model preferences for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPreferences {
    /// Preferred identifiers, best first.
    pub preferred: Vec<String>,
    /// Family substrings tried in order when no preferred id is available.
    pub generic_families: Vec<String>,
    /// Identifier used only if nothing else resolved and it is listed as available.
    pub last_resort: Option<String>,
}

/// Which rule produced the resolved candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Preferred,
    Generic,
    LastResort,
    Unresolved,
}

/// Ordered candidates for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub models: Vec<String>,
    pub source: ResolutionSource,
}

/// Extract `provider/model` identifiers from a model listing.
///
/// Lines are trimmed; anything that is not a single strict `provider/model`
/// token is discarded. Duplicates are dropped, first occurrence wins.
pub fn parse_model_listing(output: &str) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    for line in output.lines().map(str::trim) {
        if MODEL_ID_RE.is_match(line) && !models.iter().any(|m| m == line) {
            models.push(line.to_string());
        }
    }
    models
}

/// Resolve ordered candidates from `prefs` against the `available` identifiers.
///
/// 1. Preferred ids that are available, in preference order.
/// 2. Otherwise, for each generic family in order, the first available id containing it.
/// 3. Otherwise the last-resort id, if it is available.
///
/// An empty result is valid and reported through `ResolutionSource::Unresolved`.
pub fn resolve_models(prefs: &ModelPreferences, available: &[String]) -> Resolution {
    let is_available = |id: &str| available.iter().any(|m| m == id);

    let mut models: Vec<String> = Vec::new();
    for pref in &prefs.preferred {
        if is_available(pref) && !models.contains(pref) {
            models.push(pref.clone());
        }
    }
    if !models.is_empty() {
        return Resolution {
            models,
            source: ResolutionSource::Preferred,
        };
    }

    for family in &prefs.generic_families {
        if let Some(found) = available.iter().find(|m| m.contains(family.as_str()))
            && !models.contains(found)
        {
            models.push(found.clone());
        }
    }
    if !models.is_empty() {
        return Resolution {
            models,
            source: ResolutionSource::Generic,
        };
    }

    if let Some(last_resort) = &prefs.last_resort
        && is_available(last_resort)
    {
        return Resolution {
            models: vec![last_resort.clone()],
            source: ResolutionSource::LastResort,
        };
    }

    Resolution {
        models,
        source: ResolutionSource::Unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn prefs(preferred: &[&str]) -> ModelPreferences {
        ModelPreferences {
            preferred: ids(preferred),
            generic_families: ids(&["gpt-4o", "claude-sonnet"]),
            last_resort: None,
        }
    }

    #[test]
    fn parse_keeps_only_strict_tokens() {
        let listing = "Models:\nopenai/gpt-5.2\n  google/gemini-3-pro-preview  \nOpenAI/GPT\nfoo bar/baz\nopenai/gpt-5.2\n";
        assert_eq!(
            parse_model_listing(listing),
            ids(&["openai/gpt-5.2", "google/gemini-3-pro-preview"])
        );
    }

    #[test]
    fn preserves_preference_order() {
        let available = ids(&["p/b", "p/a"]);
        let resolved = resolve_models(&prefs(&["p/a", "p/b", "p/c"]), &available);
        assert_eq!(resolved.models, ids(&["p/a", "p/b"]));
        assert_eq!(resolved.source, ResolutionSource::Preferred);
    }

    #[test]
    fn duplicate_preferences_are_tried_once() {
        let available = ids(&["p/a"]);
        let resolved = resolve_models(&prefs(&["p/a", "p/a"]), &available);
        assert_eq!(resolved.models, ids(&["p/a"]));
    }

    #[test]
    fn falls_back_to_generic_families_in_order() {
        let available = ids(&[
            "x/claude-sonnet-4",
            "y/gpt-4o-mini",
            "z/gpt-4o",
            "w/other",
        ]);
        let resolved = resolve_models(&prefs(&["p/a"]), &available);
        assert_eq!(resolved.models, ids(&["y/gpt-4o-mini", "x/claude-sonnet-4"]));
        assert_eq!(resolved.source, ResolutionSource::Generic);
    }

    #[test]
    fn last_resort_requires_availability() {
        let mut prefs = prefs(&["p/a"]);
        prefs.last_resort = Some("opencode/grok-code".to_string());

        let resolved = resolve_models(&prefs, &ids(&["opencode/grok-code"]));
        assert_eq!(resolved.models, ids(&["opencode/grok-code"]));
        assert_eq!(resolved.source, ResolutionSource::LastResort);

        let resolved = resolve_models(&prefs, &ids(&["w/other"]));
        assert!(resolved.models.is_empty());
        assert_eq!(resolved.source, ResolutionSource::Unresolved);
    }

    #[test]
    fn empty_listing_resolves_empty() {
        let resolved = resolve_models(&prefs(&["p/a"]), &[]);
        assert!(resolved.models.is_empty());
        assert_eq!(resolved.source, ResolutionSource::Unresolved);
    }
}
