use serde::{Deserialize, Serialize};
use shared::protocol::LawyerQuery;

// Unset ranges are unbounded above; only rating has a natural ceiling.
pub const DEFAULT_EXPERIENCE_RANGE: ValueRange<u32> = ValueRange { min: 0, max: u32::MAX };
pub const DEFAULT_RATING_RANGE: ValueRange<f64> = ValueRange { min: 0.0, max: 5.0 };
pub const DEFAULT_PRICE_RANGE: ValueRange<u32> = ValueRange { min: 0, max: u32::MAX };

/// Inclusive `[min, max]` bound. A range with `min > max` matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> ValueRange<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn is_empty(&self) -> bool {
        !(self.min <= self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawyerFilters {
    /// Empty matches everything; otherwise any overlap with the lawyer's specialties.
    pub specialties: Vec<String>,
    pub experience: ValueRange<u32>,
    pub rating: ValueRange<f64>,
    pub price: ValueRange<u32>,
    /// Substring of `Lawyer::location`; empty matches everything.
    pub location: String,
    pub online: Option<bool>,
}

impl Default for LawyerFilters {
    fn default() -> Self {
        Self {
            specialties: Vec::new(),
            experience: DEFAULT_EXPERIENCE_RANGE,
            rating: DEFAULT_RATING_RANGE,
            price: DEFAULT_PRICE_RANGE,
            location: String::new(),
            online: None,
        }
    }
}

impl LawyerFilters {
    /// Shallow merge: every field set on the patch replaces the current value.
    pub fn merge(&mut self, patch: FilterPatch) {
        if let Some(specialties) = patch.specialties {
            self.specialties = specialties;
        }
        if let Some(experience) = patch.experience {
            self.experience = experience;
        }
        if let Some(rating) = patch.rating {
            self.rating = rating;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let Some(online) = patch.online {
            self.online = online;
        }
    }
}

/// Partial update for [`LawyerFilters`].
///
/// `online` is doubly optional so the flag can be cleared: `Some(None)`
/// removes the constraint, `None` leaves it as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPatch {
    pub specialties: Option<Vec<String>>,
    pub experience: Option<ValueRange<u32>>,
    pub rating: Option<ValueRange<f64>>,
    pub price: Option<ValueRange<u32>>,
    pub location: Option<String>,
    pub online: Option<Option<bool>>,
}

impl FilterPatch {
    pub fn specialties<I, S>(mut self, specialties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specialties = Some(specialties.into_iter().map(Into::into).collect());
        self
    }

    pub fn experience(mut self, min: u32, max: u32) -> Self {
        self.experience = Some(ValueRange::new(min, max));
        self
    }

    pub fn rating(mut self, min: f64, max: f64) -> Self {
        self.rating = Some(ValueRange::new(min, max));
        self
    }

    pub fn price(mut self, min: u32, max: u32) -> Self {
        self.price = Some(ValueRange::new(min, max));
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn online(mut self, online: Option<bool>) -> Self {
        self.online = Some(online);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Rating,
    Price,
    Experience,
    Reviews,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rating" => Some(Self::Rating),
            "price" => Some(Self::Price),
            "experience" => Some(Self::Experience),
            "reviews" | "review_count" => Some(Self::Reviews),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Asc),
            "desc" | "descending" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            key: SortKey::Rating,
            direction: SortDirection::Desc,
        }
    }
}

/// Complete input of one engine run, minus the collection itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryQuery {
    pub search: String,
    pub filters: LawyerFilters,
    pub sort: SortOrder,
}

impl From<&LawyerQuery> for DirectoryQuery {
    fn from(query: &LawyerQuery) -> Self {
        let defaults = LawyerFilters::default();
        let specialties = query
            .specialties
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let filters = LawyerFilters {
            specialties,
            experience: ValueRange::new(
                query.min_experience.unwrap_or(defaults.experience.min),
                query.max_experience.unwrap_or(defaults.experience.max),
            ),
            rating: ValueRange::new(
                query.min_rating.unwrap_or(defaults.rating.min),
                query.max_rating.unwrap_or(defaults.rating.max),
            ),
            price: ValueRange::new(
                query.min_price.unwrap_or(defaults.price.min),
                query.max_price.unwrap_or(defaults.price.max),
            ),
            location: query.location.clone().unwrap_or_default(),
            online: query.online,
        };

        let fallback = SortOrder::default();
        let sort = SortOrder {
            key: query
                .sort
                .as_deref()
                .and_then(SortKey::parse)
                .unwrap_or(fallback.key),
            direction: query
                .direction
                .as_deref()
                .and_then(SortDirection::parse)
                .unwrap_or(fallback.direction),
        };

        Self {
            search: query.search.clone().unwrap_or_default(),
            filters,
            sort,
        }
    }
}
