//! Per-request filter set parsed from the query string. Ephemeral; exists for
//! one list-style request.

use crate::error::ApiError;

/// Parameters with reserved meaning; everything else is an exact-match filter.
pub const RESERVED_PARAMS: &[&str] = &["page", "limit", "with", "search", "withtrashed", "orderBy"];

pub const DEFAULT_LIMIT: u64 = 25;
pub const MAX_LIMIT: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RequestFilterSet {
    pub search: Option<String>,
    /// Raw exact-match filters in request order; typed later against the schema.
    pub filters: Vec<(String, String)>,
    /// Relation names from `with`, comma-separated.
    pub includes: Vec<String>,
    pub with_trashed: bool,
    /// `orderBy[field]=direction` pairs in request order.
    pub order_by: Vec<(String, SortDirection)>,
    /// Zero-based page index.
    pub page: u64,
    /// Page size, clamped to [1, 100].
    pub limit: u64,
}

impl RequestFilterSet {
    /// Parse ordered query pairs. Order matters for `orderBy` (first pair is
    /// the primary sort key) and is preserved for filters.
    pub fn parse(params: &[(String, String)]) -> Result<Self, ApiError> {
        let mut set = RequestFilterSet {
            search: None,
            filters: Vec::new(),
            includes: Vec::new(),
            with_trashed: false,
            order_by: Vec::new(),
            page: 0,
            limit: DEFAULT_LIMIT,
        };

        for (key, value) in params {
            match key.as_str() {
                "search" => {
                    let term = value.trim();
                    if !term.is_empty() {
                        set.search = Some(term.to_string());
                    }
                }
                "limit" => {
                    let limit: u64 = value.parse().unwrap_or(DEFAULT_LIMIT);
                    set.limit = limit.clamp(1, MAX_LIMIT);
                }
                "page" => {
                    let page: u64 = value.parse().unwrap_or(1);
                    set.page = page.saturating_sub(1);
                }
                "with" => {
                    set.includes = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                }
                "withtrashed" => {
                    set.with_trashed = true;
                }
                "orderBy" => {
                    return Err(ApiError::BadRequest(
                        "orderBy must be given as orderBy[field]=direction".into(),
                    ));
                }
                _ => {
                    if let Some(field) = order_by_field(key) {
                        set.order_by.push((field.to_string(), parse_direction(value)?));
                    } else if !key.starts_with('_') {
                        set.filters.push((key.clone(), value.clone()));
                    }
                    // `_`-prefixed keys are internal markers; never filters.
                }
            }
        }
        Ok(set)
    }
}

/// "orderBy[name]" -> Some("name")
fn order_by_field(key: &str) -> Option<&str> {
    key.strip_prefix("orderBy[")?.strip_suffix(']')
}

fn parse_direction(value: &str) -> Result<SortDirection, ApiError> {
    if value.eq_ignore_ascii_case("asc") {
        Ok(SortDirection::Asc)
    } else if value.eq_ignore_ascii_case("desc") {
        Ok(SortDirection::Desc)
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid sort direction '{}'; expected asc or desc",
            value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults() {
        let set = RequestFilterSet::parse(&[]).unwrap();
        assert_eq!(set.limit, 25);
        assert_eq!(set.page, 0);
        assert!(set.search.is_none());
        assert!(!set.with_trashed);
    }

    #[test]
    fn limit_clamped_to_bounds() {
        let set = RequestFilterSet::parse(&pairs(&[("limit", "500")])).unwrap();
        assert_eq!(set.limit, 100);
        let set = RequestFilterSet::parse(&pairs(&[("limit", "0")])).unwrap();
        assert_eq!(set.limit, 1);
        let set = RequestFilterSet::parse(&pairs(&[("limit", "abc")])).unwrap();
        assert_eq!(set.limit, 25);
    }

    #[test]
    fn page_is_zero_based_internally() {
        let set = RequestFilterSet::parse(&pairs(&[("page", "1")])).unwrap();
        assert_eq!(set.page, 0);
        let set = RequestFilterSet::parse(&pairs(&[("page", "3")])).unwrap();
        assert_eq!(set.page, 2);
        let set = RequestFilterSet::parse(&pairs(&[("page", "0")])).unwrap();
        assert_eq!(set.page, 0);
    }

    #[test]
    fn reserved_params_never_become_filters() {
        for &key in RESERVED_PARAMS {
            let result = RequestFilterSet::parse(&pairs(&[(key, "1")]));
            if key == "orderBy" {
                // bare orderBy is rejected, not filtered
                assert!(result.is_err());
            } else {
                let set = result.unwrap();
                assert!(set.filters.is_empty(), "'{}' leaked into filters", key);
            }
        }
    }

    #[test]
    fn non_reserved_keys_become_filters_in_order() {
        let set = RequestFilterSet::parse(&pairs(&[
            ("type", "image"),
            ("limit", "10"),
            ("ext", "png"),
            ("_method", "DELETE"),
        ]))
        .unwrap();
        assert_eq!(
            set.filters,
            vec![("type".to_string(), "image".to_string()), ("ext".to_string(), "png".to_string())]
        );
    }

    #[test]
    fn order_by_pairs_preserve_order() {
        let set = RequestFilterSet::parse(&pairs(&[
            ("orderBy[name]", "asc"),
            ("orderBy[id]", "DESC"),
        ]))
        .unwrap();
        assert_eq!(
            set.order_by,
            vec![
                ("name".to_string(), SortDirection::Asc),
                ("id".to_string(), SortDirection::Desc)
            ]
        );
    }

    #[test]
    fn bad_direction_rejected() {
        let err = RequestFilterSet::parse(&pairs(&[("orderBy[name]", "sideways")])).unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn with_parses_comma_separated_relations() {
        let set = RequestFilterSet::parse(&pairs(&[("with", "owner, tags"), ("withtrashed", "")])).unwrap();
        assert_eq!(set.includes, vec!["owner".to_string(), "tags".to_string()]);
        assert!(set.with_trashed);
    }

    #[test]
    fn blank_search_ignored() {
        let set = RequestFilterSet::parse(&pairs(&[("search", "  ")])).unwrap();
        assert!(set.search.is_none());
        let set = RequestFilterSet::parse(&pairs(&[("search", " abc ")])).unwrap();
        assert_eq!(set.search.as_deref(), Some("abc"));
    }
}
