//! Filter/sort engine for the lawyer directory.
//!
//! A single linear scan keeps every lawyer that passes all predicates,
//! then one sort orders the survivors by the chosen numeric field. Equal
//! sort values fall back to ascending lawyer id so the output is fully
//! deterministic.

use std::cmp::Ordering;

use shared::domain::Lawyer;

use crate::query::{DirectoryQuery, LawyerFilters, SortDirection, SortKey, SortOrder};

/// Returns the visible subset of `lawyers` for `query`, in display order.
pub fn apply(lawyers: &[Lawyer], query: &DirectoryQuery) -> Vec<Lawyer> {
    let needle = query.search.trim().to_lowercase();
    let mut visible: Vec<Lawyer> = lawyers
        .iter()
        .filter(|lawyer| matches_search(lawyer, &needle) && matches_filters(lawyer, &query.filters))
        .cloned()
        .collect();
    sort_lawyers(&mut visible, query.sort);
    visible
}

/// Case-insensitive match against the name or any specialty. `needle` must
/// already be lowercased; empty matches everything.
pub fn matches_search(lawyer: &Lawyer, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    lawyer.name.to_lowercase().contains(needle)
        || lawyer
            .specialties
            .iter()
            .any(|specialty| specialty.to_lowercase().contains(needle))
}

pub fn matches_filters(lawyer: &Lawyer, filters: &LawyerFilters) -> bool {
    if !filters.specialties.is_empty()
        && !lawyer
            .specialties
            .iter()
            .any(|specialty| filters.specialties.contains(specialty))
    {
        return false;
    }
    if !filters.experience.contains(lawyer.experience) {
        return false;
    }
    if !filters.rating.contains(lawyer.rating) {
        return false;
    }
    if !filters.price.contains(lawyer.hourly_rate) {
        return false;
    }
    if !filters.location.is_empty() && !lawyer.location.contains(filters.location.as_str()) {
        return false;
    }
    match filters.online {
        Some(online) => lawyer.is_online == online,
        None => true,
    }
}

pub fn sort_lawyers(lawyers: &mut [Lawyer], order: SortOrder) {
    lawyers.sort_by(|a, b| {
        let primary = compare_field(a, b, order.key);
        let primary = match order.direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}

fn compare_field(a: &Lawyer, b: &Lawyer, key: SortKey) -> Ordering {
    match key {
        SortKey::Rating => a.rating.total_cmp(&b.rating),
        SortKey::Price => a.hourly_rate.cmp(&b.hourly_rate),
        SortKey::Experience => a.experience.cmp(&b.experience),
        SortKey::Reviews => a.review_count.cmp(&b.review_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixtures::sample_lawyers,
        query::{FilterPatch, ValueRange},
    };
    use shared::domain::LawyerId;

    fn query_with(patch: FilterPatch) -> DirectoryQuery {
        let mut query = DirectoryQuery::default();
        query.filters.merge(patch);
        query
    }

    fn ratings(lawyers: &[Lawyer]) -> Vec<f64> {
        lawyers.iter().map(|l| l.rating).collect()
    }

    #[test]
    fn sorts_by_rating_descending() {
        let visible = apply(&sample_lawyers(), &DirectoryQuery::default());
        assert_eq!(ratings(&visible), vec![4.9, 4.8, 4.7, 4.6]);
    }

    #[test]
    fn sorts_ascending_when_requested() {
        let query = DirectoryQuery {
            sort: SortOrder {
                key: SortKey::Price,
                direction: SortDirection::Asc,
            },
            ..DirectoryQuery::default()
        };
        let visible = apply(&sample_lawyers(), &query);
        for pair in visible.windows(2) {
            assert!(pair[0].hourly_rate <= pair[1].hourly_rate);
        }
        assert_eq!(visible.len(), 4);
    }

    #[test]
    fn specialty_filter_selects_single_match() {
        let visible = apply(
            &sample_lawyers(),
            &query_with(FilterPatch::default().specialties(["婚姻家庭"])),
        );
        assert_eq!(visible.len(), 1);
        assert!(visible[0].specialties.iter().any(|s| s == "婚姻家庭"));
    }

    #[test]
    fn search_matches_name_or_specialty_case_insensitively() {
        let mut lawyers = sample_lawyers();
        lawyers[0].name = "Alice Zhang".into();

        let by_name = apply(
            &lawyers,
            &DirectoryQuery {
                search: "  alice ".into(),
                ..DirectoryQuery::default()
            },
        );
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, lawyers[0].id);

        let by_specialty = apply(
            &lawyers,
            &DirectoryQuery {
                search: "刑事".into(),
                ..DirectoryQuery::default()
            },
        );
        assert!(!by_specialty.is_empty());
        assert!(by_specialty
            .iter()
            .all(|l| l.specialties.iter().any(|s| s.contains("刑事"))));
    }

    #[test]
    fn every_visible_lawyer_satisfies_active_predicates() {
        let lawyers = sample_lawyers();
        let query = query_with(
            FilterPatch::default()
                .experience(5, 20)
                .rating(4.7, 5.0)
                .price(0, 600)
                .online(Some(true)),
        );
        let visible = apply(&lawyers, &query);
        for lawyer in &visible {
            assert!(lawyers.contains(lawyer));
            assert!((5..=20).contains(&lawyer.experience));
            assert!(lawyer.rating >= 4.7);
            assert!(lawyer.hourly_rate <= 600);
            assert!(lawyer.is_online);
        }
    }

    #[test]
    fn location_is_substring_match() {
        let visible = apply(
            &sample_lawyers(),
            &query_with(FilterPatch::default().location("上海")),
        );
        assert!(!visible.is_empty());
        assert!(visible.iter().all(|l| l.location.contains("上海")));
    }

    #[test]
    fn empty_collection_yields_empty_result() {
        assert!(apply(&[], &DirectoryQuery::default()).is_empty());
    }

    #[test]
    fn impossible_range_yields_empty_result() {
        let mut query = DirectoryQuery::default();
        query.filters.price = ValueRange::new(900, 100);
        assert!(apply(&sample_lawyers(), &query).is_empty());
    }

    #[test]
    fn reapplying_same_query_is_idempotent() {
        let lawyers = sample_lawyers();
        let query = query_with(FilterPatch::default().rating(4.0, 5.0));
        assert_eq!(apply(&lawyers, &query), apply(&lawyers, &query));
    }

    #[test]
    fn ties_break_on_ascending_id_in_both_directions() {
        let mut lawyers = sample_lawyers();
        for lawyer in &mut lawyers {
            lawyer.review_count = 10;
        }
        lawyers.reverse();

        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let query = DirectoryQuery {
                sort: SortOrder {
                    key: SortKey::Reviews,
                    direction,
                },
                ..DirectoryQuery::default()
            };
            let ids: Vec<LawyerId> = apply(&lawyers, &query).iter().map(|l| l.id).collect();
            let mut expected = ids.clone();
            expected.sort();
            assert_eq!(ids, expected);
        }
    }
}
