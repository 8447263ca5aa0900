//! Pagination and sorting for owner-scoped listings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Raw listing parameters as supplied by a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    ExpiresAt,
    Size,
    Filename,
    Clicks,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::ExpiresAt => "expires_at",
            SortField::Size => "size",
            SortField::Filename => "filename",
            SortField::Clicks => "clicks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Whitelisted sort order, parsed from `"<field> <asc|desc>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl FromStr for SortSpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let field = match parts.next().map(str::to_lowercase).as_deref() {
            Some("created_at") => SortField::CreatedAt,
            Some("expires_at") => SortField::ExpiresAt,
            Some("size") => SortField::Size,
            Some("filename") => SortField::Filename,
            Some("clicks") => SortField::Clicks,
            _ => {
                return Err(AppError::InvalidInput(format!(
                    "Unsupported sort field in '{}'",
                    s
                )))
            }
        };
        let direction = match parts.next().map(str::to_lowercase).as_deref() {
            None | Some("desc") => SortDirection::Desc,
            Some("asc") => SortDirection::Asc,
            Some(other) => {
                return Err(AppError::InvalidInput(format!(
                    "Unsupported sort direction '{}'",
                    other
                )))
            }
        };
        if parts.next().is_some() {
            return Err(AppError::InvalidInput(format!("Malformed sort '{}'", s)));
        }
        Ok(SortSpec { field, direction })
    }
}

impl SortSpec {
    /// Rejects fields that do not exist on pastes.
    pub fn for_pastes(self) -> Result<Self, AppError> {
        match self.field {
            SortField::Clicks => Err(AppError::InvalidInput(
                "Pastes cannot be sorted by clicks".to_string(),
            )),
            _ => Ok(self),
        }
    }

    /// Rejects fields that do not exist on shortlinks.
    pub fn for_shortlinks(self) -> Result<Self, AppError> {
        match self.field {
            SortField::Size | SortField::Filename => Err(AppError::InvalidInput(format!(
                "Shortlinks cannot be sorted by {}",
                self.field.column()
            ))),
            _ => Ok(self),
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        write!(f, "{} {}", self.field.column(), direction)
    }
}

/// Listing request after defaults and caps are applied. Pages are 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub sort: SortSpec,
}

impl PageRequest {
    pub fn resolve(query: &ListQuery, default_limit: u32, max_limit: u32) -> Result<Self, AppError> {
        let page = query.page.filter(|p| *p > 0).unwrap_or(1);
        let limit = query
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(default_limit)
            .min(max_limit);
        let sort = match query.sort.as_deref().map(str::trim) {
            None | Some("") => SortSpec::default(),
            Some(raw) => raw.parse()?,
        };
        Ok(PageRequest { page, limit, sort })
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

/// One page of results plus the total matching count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.limit == 0 {
            return 0;
        }
        (self.total + self.limit as i64 - 1) / self.limit as i64
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parse() {
        assert_eq!(
            "size asc".parse::<SortSpec>().unwrap(),
            SortSpec {
                field: SortField::Size,
                direction: SortDirection::Asc
            }
        );
        assert_eq!("created_at".parse::<SortSpec>().unwrap(), SortSpec::default());
        assert!("size; drop table pastes".parse::<SortSpec>().is_err());
        assert!("size sideways".parse::<SortSpec>().is_err());
    }

    #[test]
    fn test_sort_field_applicability() {
        let clicks: SortSpec = "clicks desc".parse().unwrap();
        assert!(clicks.for_pastes().is_err());
        assert!(clicks.for_shortlinks().is_ok());

        let size: SortSpec = "size".parse().unwrap();
        assert!(size.for_shortlinks().is_err());
        assert!(size.for_pastes().is_ok());
    }

    #[test]
    fn test_page_request_defaults_and_caps() {
        let resolved = PageRequest::resolve(&ListQuery::default(), 20, 100).unwrap();
        assert_eq!(resolved.page, 1);
        assert_eq!(resolved.limit, 20);
        assert_eq!(resolved.offset(), 0);

        let capped = PageRequest::resolve(
            &ListQuery {
                page: Some(3),
                limit: Some(10_000),
                sort: None,
            },
            20,
            100,
        )
        .unwrap();
        assert_eq!(capped.limit, 100);
        assert_eq!(capped.offset(), 200);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let page: Page<()> = Page {
            items: vec![],
            total: 41,
            page: 1,
            limit: 20,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
