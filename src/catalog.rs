//! Static recommendation data for disaster supplies.
//!
//! # Overview
//!
//! Every supply category the household can track maps to a fixed
//! [`RecommendationEntry`]: how much one person (optionally broken out by age
//! band) and one pet consume per day, the unit that quantity is counted in, and
//! how important the category is. The table is compiled into the binary and is
//! never mutated at runtime.
//!
//! Categories the catalog does not know about are legal. They parse into
//! [`Category::Custom`] and simply have no recommendation.
//!
//! This module also holds the three stock-level presets and the expiry
//! classifier used by the weekly digest.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A supply category, keyed by the label stored on inventory records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Water,
    RiceBread,
    Canned,
    Retort,
    Noodles,
    Snacks,
    BabyFormula,
    Medicine,
    PortableToilet,
    ToiletPaper,
    WetWipes,
    Batteries,
    GasCartridge,
    PetFood,
    Masks,
    SanitaryProducts,
    /// The explicit "miscellaneous" bucket. Never expires, never recommended.
    Other,
    /// Any user-defined key the catalog does not know.
    Custom(String),
}

/// Every cataloged category paired with its storage key.
const KEYS: &[(Category, &str)] = &[
    (Category::Water, "水"),
    (Category::RiceBread, "米・パン"),
    (Category::Canned, "缶詰"),
    (Category::Retort, "レトルト食品"),
    (Category::Noodles, "麺類"),
    (Category::Snacks, "お菓子"),
    (Category::BabyFormula, "粉ミルク"),
    (Category::Medicine, "医薬品"),
    (Category::PortableToilet, "簡易トイレ"),
    (Category::ToiletPaper, "トイレットペーパー"),
    (Category::WetWipes, "ウェットティッシュ"),
    (Category::Batteries, "電池"),
    (Category::GasCartridge, "カセットボンベ"),
    (Category::PetFood, "ペットフード"),
    (Category::Masks, "マスク"),
    (Category::SanitaryProducts, "生理用品"),
    (Category::Other, "その他"),
];

impl Category {
    /// Parse a stored category key. Unknown keys become [`Category::Custom`].
    pub fn from_key(key: &str) -> Self {
        KEYS.iter()
            .find(|(_, k)| *k == key)
            .map(|(category, _)| category.clone())
            .unwrap_or_else(|| Category::Custom(key.to_string()))
    }

    /// The key this category is stored under.
    pub fn key(&self) -> &str {
        match self {
            Category::Custom(key) => key.as_str(),
            known => KEYS
                .iter()
                .find(|(category, _)| category == known)
                .map(|(_, key)| *key)
                .unwrap_or_default(),
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::from_key(&value)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.key().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How important a category is to a disaster kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Essential,
    Important,
    Recommended,
}

/// Per-person daily consumption broken out by age band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgeBandRates {
    pub adult: f64,
    pub child: f64,
    pub infant: f64,
    pub elderly: f64,
}

/// One immutable catalog row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationEntry {
    pub category: Category,
    pub per_person_per_day: f64,
    pub age_bands: Option<AgeBandRates>,
    pub per_dog_per_day: Option<f64>,
    pub per_cat_per_day: Option<f64>,
    pub unit: &'static str,
    pub priority: PriorityTier,
    pub description: &'static str,
}

const fn bands(adult: f64, child: f64, infant: f64, elderly: f64) -> Option<AgeBandRates> {
    Some(AgeBandRates {
        adult,
        child,
        infant,
        elderly,
    })
}

/// Look up the recommendation for a category.
///
/// Returns `None` for [`Category::Other`] and [`Category::Custom`]; callers
/// treat that as "no recommendation applies", not as an error.
pub fn lookup(category: &Category) -> Option<RecommendationEntry> {
    use PriorityTier::{Essential, Important, Recommended};

    let (per_person, age_bands, dog, cat, unit, priority, description) = match category {
        Category::Water => (
            3.0,
            bands(3.0, 2.0, 1.0, 3.0),
            Some(1.0),
            Some(0.2),
            "L",
            Essential,
            "飲料水と調理用の水",
        ),
        Category::RiceBread => (
            3.0,
            bands(3.0, 3.0, 0.0, 3.0),
            None,
            None,
            "食",
            Essential,
            "主食（アルファ米・パンの缶詰など）",
        ),
        Category::Canned => (
            1.0,
            bands(1.0, 1.0, 0.0, 1.0),
            None,
            None,
            "缶",
            Important,
            "主菜・副菜になる缶詰",
        ),
        Category::Retort => (
            1.0,
            bands(1.0, 1.0, 0.0, 1.0),
            None,
            None,
            "袋",
            Important,
            "温めずに食べられるレトルト食品",
        ),
        Category::Noodles => (0.5, None, None, None, "食", Recommended, "カップ麺・乾麺"),
        Category::Snacks => (0.5, None, None, None, "個", Recommended, "栄養補助食品やお菓子"),
        Category::BabyFormula => (
            0.0,
            bands(0.0, 0.0, 1.0, 0.0),
            None,
            None,
            "本",
            Essential,
            "液体ミルクまたは粉ミルク",
        ),
        Category::Medicine => (0.1, None, None, None, "個", Essential, "常備薬・救急用品"),
        Category::PortableToilet => (
            5.0,
            bands(5.0, 5.0, 0.0, 6.0),
            None,
            None,
            "回",
            Essential,
            "断水時に使う簡易トイレ",
        ),
        Category::ToiletPaper => (
            0.25,
            None,
            None,
            None,
            "ロール",
            Important,
            "トイレットペーパー",
        ),
        Category::WetWipes => (
            0.25,
            None,
            None,
            None,
            "個",
            Recommended,
            "体を拭くためのウェットティッシュ",
        ),
        Category::Batteries => (0.5, None, None, None, "本", Important, "ライト・ラジオ用の電池"),
        Category::GasCartridge => (
            0.5,
            None,
            None,
            None,
            "本",
            Important,
            "カセットコンロ用のガスボンベ",
        ),
        Category::PetFood => (0.0, None, Some(1.0), Some(1.0), "食", Important, "ペットの食事"),
        Category::Masks => (1.0, None, None, None, "枚", Recommended, "衛生用マスク"),
        Category::SanitaryProducts => (0.5, None, None, None, "個", Recommended, "生理用品"),
        Category::Other | Category::Custom(_) => return None,
    };

    Some(RecommendationEntry {
        category: category.clone(),
        per_person_per_day: per_person,
        age_bands,
        per_dog_per_day: dog,
        per_cat_per_day: cat,
        unit,
        priority,
        description,
    })
}

/// One of the three preparedness targets a team can aim for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockLevel {
    #[default]
    Minimal,
    Standard,
    Advanced,
}

const MINIMAL: &[Category] = &[
    Category::Water,
    Category::RiceBread,
    Category::Medicine,
    Category::PortableToilet,
];

const STANDARD_EXTRA: &[Category] = &[
    Category::Canned,
    Category::Retort,
    Category::ToiletPaper,
    Category::Batteries,
    Category::GasCartridge,
];

const ADVANCED_EXTRA: &[Category] = &[
    Category::Noodles,
    Category::Snacks,
    Category::WetWipes,
    Category::Masks,
    Category::SanitaryProducts,
];

impl StockLevel {
    /// Required categories, in their declared order. Each level includes the
    /// requirements of every level below it.
    pub fn required_categories(self) -> Vec<Category> {
        let extras: &[&[Category]] = match self {
            StockLevel::Minimal => &[MINIMAL],
            StockLevel::Standard => &[MINIMAL, STANDARD_EXTRA],
            StockLevel::Advanced => &[MINIMAL, STANDARD_EXTRA, ADVANCED_EXTRA],
        };
        extras.iter().flat_map(|set| set.iter().cloned()).collect()
    }

    /// The next, more demanding level, if any.
    pub fn next(self) -> Option<StockLevel> {
        match self {
            StockLevel::Minimal => Some(StockLevel::Standard),
            StockLevel::Standard => Some(StockLevel::Advanced),
            StockLevel::Advanced => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StockLevel::Minimal => "最低限",
            StockLevel::Standard => "標準",
            StockLevel::Advanced => "充実",
        }
    }
}

/// Expiry policy bucket for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryClass {
    Food,
    Medical,
    Daily,
    Other,
    NoExpiry,
}

impl ExpiryClass {
    /// Map a category to its expiry policy.
    pub fn classify(category: &Category) -> Self {
        match category {
            Category::Water
            | Category::RiceBread
            | Category::Canned
            | Category::Retort
            | Category::Noodles
            | Category::Snacks
            | Category::BabyFormula
            | Category::PetFood => ExpiryClass::Food,
            Category::Medicine => ExpiryClass::Medical,
            Category::Batteries
            | Category::GasCartridge
            | Category::WetWipes
            | Category::Masks
            | Category::SanitaryProducts => ExpiryClass::Daily,
            Category::Other | Category::ToiletPaper | Category::PortableToilet => {
                ExpiryClass::NoExpiry
            }
            Category::Custom(_) => ExpiryClass::Other,
        }
    }

    /// How many days ahead of expiry a notification is due. `None` means the
    /// class is never notified.
    pub fn lead_days(self) -> Option<i64> {
        match self {
            ExpiryClass::Food => Some(30),
            ExpiryClass::Medical => Some(60),
            ExpiryClass::Daily => Some(90),
            ExpiryClass::Other => Some(30),
            ExpiryClass::NoExpiry => None,
        }
    }
}
