//! Pure mapping from raw storefront records to output rows. No I/O, no
//! retries; string tokens like "TRUE" and "N/A" exist only at the CSV
//! boundary, never here.

use std::collections::BTreeMap;

use crate::regions::REGIONS;
use crate::steam::AppDetails;

/// Localized price for one region. `Listed` legs are independently
/// optional; each missing leg serializes to its own sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionPrice {
    Free,
    Listed {
        final_price: Option<String>,
        initial_price: Option<String>,
        discount_percent: Option<i64>,
    },
    Unavailable,
}

/// One finalized output row, keyed by appid. At most one row per appid
/// ever reaches the persisted table, and rows are never updated once
/// appended.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRow {
    pub appid: u32,
    pub name: String,
    pub vr_supported: Option<bool>,
    pub vr_exclusive: Option<bool>,
    pub metacritic_score: Option<i64>,
    pub total_reviews: Option<i64>,
    pub release_date: Option<String>,
    pub developers: Option<String>,
    pub publishers: Option<String>,
    pub genres: Option<String>,
    pub categories: Option<String>,
    pub platform_windows: Option<bool>,
    pub platform_mac: Option<bool>,
    pub platform_linux: Option<bool>,
    pub achievements: Option<i64>,
    /// One entry per supported region, keyed by currency code.
    pub prices: BTreeMap<String, RegionPrice>,
}

impl GameRow {
    /// Row with every derived field at its "not available" state. This is
    /// what a candidate whose canonical fetch failed entirely looks like.
    pub fn sentinel(appid: u32, name: &str) -> Self {
        let prices = REGIONS
            .iter()
            .map(|(_, currency)| (currency.to_string(), RegionPrice::Unavailable))
            .collect();
        Self {
            appid,
            name: name.to_string(),
            vr_supported: None,
            vr_exclusive: None,
            metacritic_score: None,
            total_reviews: None,
            release_date: None,
            developers: None,
            publishers: None,
            genres: None,
            categories: None,
            platform_windows: None,
            platform_mac: None,
            platform_linux: None,
            achievements: None,
            prices,
        }
    }

    /// Fill the metadata fields from a canonical-region detail record.
    pub fn apply_details(&mut self, d: &AppDetails) {
        self.vr_supported = Some(has_vr_support(d));
        self.vr_exclusive = Some(is_vr_exclusive(d));
        self.metacritic_score = d.metacritic.and_then(|m| m.score);
        self.total_reviews = d.recommendations.and_then(|r| r.total);
        self.release_date = d.release_date.as_ref().and_then(|r| r.date.clone());
        self.developers = Some(d.developers.join(", "));
        self.publishers = Some(d.publishers.join(", "));
        self.genres = Some(join_descriptions(&d.genres));
        self.categories = Some(join_descriptions(&d.categories));
        let platforms = d.platforms.unwrap_or_default();
        self.platform_windows = Some(platforms.windows);
        self.platform_mac = Some(platforms.mac);
        self.platform_linux = Some(platforms.linux);
        self.achievements = d.achievements.and_then(|a| a.total);
    }

    /// Free-to-play shortcut: one fixed entry per region, no per-region
    /// fetches needed.
    pub fn mark_free(&mut self) {
        for (_, currency) in REGIONS {
            self.prices.insert(currency.to_string(), RegionPrice::Free);
        }
    }

    pub fn set_price(&mut self, currency: &str, price: RegionPrice) {
        self.prices.insert(currency.to_string(), price);
    }
}

/// Map a per-region detail record (or its absence) to a price cell.
pub fn region_price(details: Option<&AppDetails>) -> RegionPrice {
    match details.and_then(|d| d.price_overview.as_ref()) {
        Some(p) => RegionPrice::Listed {
            final_price: p.final_formatted.clone(),
            initial_price: p.initial_formatted.clone(),
            discount_percent: p.discount_percent,
        },
        None => RegionPrice::Unavailable,
    }
}

/// Any category tag containing "vr support", case-insensitive.
pub fn has_vr_support(d: &AppDetails) -> bool {
    tag_contains(d, "vr support")
}

/// A "vr only" category tag marks a headset-required title.
pub fn is_vr_exclusive(d: &AppDetails) -> bool {
    tag_contains(d, "vr only")
}

fn tag_contains(d: &AppDetails, needle: &str) -> bool {
    d.categories
        .iter()
        .any(|c| c.description.to_lowercase().contains(needle))
}

fn join_descriptions(items: &[crate::steam::Descriptor]) -> String {
    items
        .iter()
        .map(|d| d.description.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steam::{Descriptor, Metacritic, Platforms, PriceOverview, ReleaseDate};

    fn tagged(descriptions: &[&str]) -> AppDetails {
        AppDetails {
            categories: descriptions
                .iter()
                .map(|d| Descriptor {
                    description: d.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn vr_tags_match_case_insensitively() {
        let d = tagged(&["Single-player", "VR Support"]);
        assert!(has_vr_support(&d));
        assert!(!is_vr_exclusive(&d));

        let d = tagged(&["vr only"]);
        assert!(is_vr_exclusive(&d));
        assert!(!has_vr_support(&d));

        assert!(!has_vr_support(&tagged(&["Multi-player"])));
    }

    #[test]
    fn sentinel_row_has_no_derived_data() {
        let row = GameRow::sentinel(42, "Ghost");
        assert_eq!(row.appid, 42);
        assert_eq!(row.vr_supported, None);
        assert_eq!(row.developers, None);
        assert_eq!(row.prices.len(), REGIONS.len());
        assert!(row.prices.values().all(|p| *p == RegionPrice::Unavailable));
    }

    #[test]
    fn details_fill_every_metadata_field() {
        let mut d = tagged(&["VR Support", "VR Only"]);
        d.developers = vec!["StudioA".into(), "StudioB".into()];
        d.publishers = vec!["Pub".into()];
        d.genres = vec![Descriptor {
            description: "Action".into(),
        }];
        d.platforms = Some(Platforms {
            windows: true,
            mac: false,
            linux: false,
        });
        d.release_date = Some(ReleaseDate {
            date: Some("12 Mar, 2020".into()),
        });
        d.metacritic = Some(Metacritic { score: Some(88) });

        let mut row = GameRow::sentinel(7, "Title");
        row.apply_details(&d);

        assert_eq!(row.vr_supported, Some(true));
        assert_eq!(row.vr_exclusive, Some(true));
        assert_eq!(row.developers.as_deref(), Some("StudioA, StudioB"));
        assert_eq!(row.genres.as_deref(), Some("Action"));
        assert_eq!(row.platform_windows, Some(true));
        assert_eq!(row.platform_mac, Some(false));
        assert_eq!(row.release_date.as_deref(), Some("12 Mar, 2020"));
        assert_eq!(row.metacritic_score, Some(88));
        // Not provided by the record: stays at the sentinel state.
        assert_eq!(row.total_reviews, None);
        assert_eq!(row.achievements, None);
    }

    #[test]
    fn free_shortcut_covers_every_region() {
        let mut row = GameRow::sentinel(1, "F2P");
        row.mark_free();
        assert_eq!(row.prices.len(), REGIONS.len());
        assert!(row.prices.values().all(|p| *p == RegionPrice::Free));
    }

    #[test]
    fn price_legs_are_independently_optional() {
        let mut d = AppDetails::default();
        d.price_overview = Some(PriceOverview {
            final_formatted: Some("$4.99".into()),
            initial_formatted: None,
            discount_percent: Some(75),
        });
        match region_price(Some(&d)) {
            RegionPrice::Listed {
                final_price,
                initial_price,
                discount_percent,
            } => {
                assert_eq!(final_price.as_deref(), Some("$4.99"));
                assert_eq!(initial_price, None);
                assert_eq!(discount_percent, Some(75));
            }
            other => panic!("expected a listed price, got {:?}", other),
        }

        assert_eq!(region_price(None), RegionPrice::Unavailable);
        assert_eq!(
            region_price(Some(&AppDetails::default())),
            RegionPrice::Unavailable
        );
    }
}
