//! Dialogue selection
//!
//! Maps a set of required weather properties onto the phrase catalog. The
//! best record is the one covering the most requested properties without
//! ever claiming a property the request did not ask for.

use std::collections::BTreeSet;
use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::settings::SettingsCascade;

/// Weather condition tag used to match phrases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Property {
    Raining,
    Windy,
    Cold,
    Future,
    RecentlyAsked,
    Wildcard,
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raining => "Raining",
            Self::Windy => "Windy",
            Self::Cold => "Cold",
            Self::Future => "Future",
            Self::RecentlyAsked => "RecentlyAsked",
            Self::Wildcard => "Wildcard",
        };
        f.write_str(name)
    }
}

/// A catalog entry pairing spoken text with the properties it answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRecord {
    /// Text sent to speech synthesis
    pub text: String,

    /// Properties this phrase is valid to answer
    #[serde(default, alias = "requiredProperties")]
    pub properties: BTreeSet<Property>,

    /// Audio file id, also the catalog identity
    #[serde(rename = "fileName", alias = "audioFileId")]
    pub file_id: String,
}

impl PhraseRecord {
    /// Build a record from its parts
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        file_id: impl Into<String>,
        properties: impl IntoIterator<Item = Property>,
    ) -> Self {
        Self {
            text: text.into(),
            properties: properties.into_iter().collect(),
            file_id: file_id.into(),
        }
    }

    /// Whether this record describes the next hour
    #[must_use]
    pub fn is_future(&self) -> bool {
        self.properties.contains(&Property::Future)
    }

    /// Whether this record is a catch-all
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.properties.contains(&Property::Wildcard)
    }

    /// Whether this record says it is raining
    #[must_use]
    pub fn is_raining(&self) -> bool {
        self.properties.contains(&Property::Raining)
    }
}

/// Picks phrases from the catalog held by the settings cascade
#[derive(Clone)]
pub struct DialogueSelector {
    settings: SettingsCascade,
}

impl DialogueSelector {
    /// Create a selector reading the catalog through `settings`
    #[must_use]
    pub const fn new(settings: SettingsCascade) -> Self {
        Self { settings }
    }

    /// Select the best phrase for `required`, breaking ties at random
    #[must_use]
    pub fn select(&self, required: &BTreeSet<Property>) -> Option<PhraseRecord> {
        self.select_with_rng(required, &mut rand::thread_rng())
    }

    /// Select with a caller-supplied random source
    #[must_use]
    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        required: &BTreeSet<Property>,
        rng: &mut R,
    ) -> Option<PhraseRecord> {
        // Catalog is read fresh: a sync may have replaced it since the last request
        let catalog = self.settings.resolve().dialogues;
        select_phrase(&catalog, required, rng).cloned()
    }
}

/// Best-subset match over `catalog`
///
/// 1. Future and non-future records never compete
/// 2. A record is invalid if it holds any property absent from `required`
///    (so an empty request only admits empty records)
/// 3. Valid records score by property count; the highest scores tie-break
///    uniformly at random
/// 4. With no valid record, a wildcard of the same future-ness is chosen
#[must_use]
pub fn select_phrase<'a, R: Rng + ?Sized>(
    catalog: &'a [PhraseRecord],
    required: &BTreeSet<Property>,
    rng: &mut R,
) -> Option<&'a PhraseRecord> {
    let wants_future = required.contains(&Property::Future);

    let mut best_score = 0usize;
    let mut best: Vec<&PhraseRecord> = Vec::new();

    for record in catalog {
        if record.is_future() != wants_future {
            continue;
        }

        if !record.properties.is_subset(required) {
            continue;
        }

        let score = record.properties.len();
        if best.is_empty() || score > best_score {
            best_score = score;
            best.clear();
            best.push(record);
        } else if score == best_score {
            best.push(record);
        }
    }

    if let Some(&choice) = best.choose(rng) {
        tracing::debug!(
            file_id = %choice.file_id,
            score = best_score,
            candidates = best.len(),
            "selected dialogue"
        );
        return Some(choice);
    }

    let wildcards: Vec<&PhraseRecord> = catalog
        .iter()
        .filter(|r| r.is_wildcard() && r.is_future() == wants_future)
        .collect();

    let choice = wildcards.choose(rng).copied();
    if let Some(record) = choice {
        tracing::debug!(file_id = %record.file_id, "no property match, using wildcard");
    }
    choice
}

/// Format a property set for logs
#[must_use]
pub fn describe(properties: &BTreeSet<Property>) -> String {
    properties
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use super::Property::{Cold, Future, Raining, RecentlyAsked, Wildcard, Windy};

    fn set(props: &[Property]) -> BTreeSet<Property> {
        props.iter().copied().collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn catalog() -> Vec<PhraseRecord> {
        vec![
            PhraseRecord::new("rain+wind", "a", [Raining, Windy]),
            PhraseRecord::new("rain", "b", [Raining]),
        ]
    }

    fn wide_catalog() -> Vec<PhraseRecord> {
        vec![
            PhraseRecord::new("clear", "clear", []),
            PhraseRecord::new("rain", "rain", [Raining]),
            PhraseRecord::new("rain cold", "rain-cold", [Raining, Cold]),
            PhraseRecord::new("rain wind cold", "rain-wind-cold", [Raining, Windy, Cold]),
            PhraseRecord::new("windy", "windy", [Windy]),
            PhraseRecord::new("again rain", "again-rain", [RecentlyAsked, Raining]),
            PhraseRecord::new("later dry", "later-dry", [Future]),
            PhraseRecord::new("later rain", "later-rain", [Future, Raining]),
            PhraseRecord::new("dunno", "w", [Wildcard]),
            PhraseRecord::new("dunno later", "fw", [Future, Wildcard]),
        ]
    }

    const DOMAIN: [Property; 5] = [Raining, Windy, Cold, Future, RecentlyAsked];

    fn all_requests() -> Vec<BTreeSet<Property>> {
        (0u32..(1 << DOMAIN.len()))
            .map(|mask| {
                DOMAIN
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, p)| *p)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_higher_score_wins() {
        let catalog = catalog();
        let chosen = select_phrase(&catalog, &set(&[Raining, Windy]), &mut rng()).unwrap();
        assert_eq!(chosen.file_id, "a");
    }

    #[test]
    fn test_unrequested_property_invalidates_record() {
        let catalog = catalog();
        for _ in 0..20 {
            let chosen = select_phrase(&catalog, &set(&[Raining]), &mut rand::thread_rng()).unwrap();
            assert_eq!(chosen.file_id, "b");
        }
    }

    #[test]
    fn test_wildcard_fallback() {
        let mut catalog = catalog();
        catalog.push(PhraseRecord::new("no idea", "w", [Wildcard]));

        let chosen = select_phrase(&catalog, &set(&[Cold]), &mut rng()).unwrap();
        assert_eq!(chosen.file_id, "w");
    }

    #[test]
    fn test_wildcard_loses_to_any_valid_record() {
        let mut catalog = catalog();
        catalog.push(PhraseRecord::new("no idea", "w", [Wildcard]));

        let chosen = select_phrase(&catalog, &set(&[Raining, Cold]), &mut rng()).unwrap();
        assert_eq!(chosen.file_id, "b");
    }

    #[test]
    fn test_no_match_without_wildcard() {
        let catalog = catalog();
        assert!(select_phrase(&catalog, &set(&[Cold]), &mut rng()).is_none());
    }

    #[test]
    fn test_empty_request_only_matches_empty_records() {
        let catalog = wide_catalog();
        let chosen = select_phrase(&catalog, &BTreeSet::new(), &mut rng()).unwrap();
        assert_eq!(chosen.file_id, "clear");

        assert!(select_phrase(&self::catalog(), &BTreeSet::new(), &mut rng()).is_none());
    }

    #[test]
    fn test_future_wildcard_only_serves_future_requests() {
        let catalog = vec![
            PhraseRecord::new("dunno later", "fw", [Future, Wildcard]),
            PhraseRecord::new("rain", "b", [Raining]),
        ];

        assert!(select_phrase(&catalog, &set(&[Cold]), &mut rng()).is_none());
        let chosen = select_phrase(&catalog, &set(&[Future, Windy]), &mut rng()).unwrap();
        assert_eq!(chosen.file_id, "fw");
    }

    #[test]
    fn test_ties_pick_among_best_only() {
        let catalog = vec![
            PhraseRecord::new("rain one", "r1", [Raining]),
            PhraseRecord::new("rain two", "r2", [Raining]),
            PhraseRecord::new("clear", "clear", []),
        ];

        let mut seen = BTreeSet::new();
        let mut rng = rng();
        for _ in 0..200 {
            let chosen = select_phrase(&catalog, &set(&[Raining]), &mut rng).unwrap();
            seen.insert(chosen.file_id.clone());
        }

        assert_eq!(seen, ["r1".to_string(), "r2".to_string()].into_iter().collect());
    }

    #[test]
    fn test_selection_never_claims_unrequested_properties() {
        let catalog = wide_catalog();
        let mut rng = rng();

        for required in all_requests() {
            if let Some(chosen) = select_phrase(&catalog, &required, &mut rng) {
                if chosen.is_wildcard() {
                    continue;
                }
                assert!(
                    chosen.properties.is_subset(&required),
                    "{} chosen for {}",
                    chosen.file_id,
                    describe(&required)
                );
            }
        }
    }

    #[test]
    fn test_future_partition_holds_for_every_request() {
        let catalog = wide_catalog();
        let mut rng = rng();

        for required in all_requests() {
            let chosen = select_phrase(&catalog, &required, &mut rng).unwrap();
            assert_eq!(
                chosen.is_future(),
                required.contains(&Future),
                "{} chosen for {}",
                chosen.file_id,
                describe(&required)
            );
        }
    }

    #[test]
    fn test_exact_match_is_never_beaten_by_a_smaller_record() {
        let catalog = wide_catalog();
        let mut rng = rng();

        for record in catalog.iter().filter(|r| !r.is_wildcard()) {
            let chosen = select_phrase(&catalog, &record.properties, &mut rng).unwrap();
            assert!(chosen.properties.len() >= record.properties.len());
        }
    }

    #[test]
    fn test_phrase_record_json_names() {
        let json = r#"{"text":"hi","requiredProperties":["Raining","Future"],"audioFileId":"x"}"#;
        let record: PhraseRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.file_id, "x");
        assert!(record.is_future());
        assert!(record.is_raining());

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["fileName"], "x");
    }
}
