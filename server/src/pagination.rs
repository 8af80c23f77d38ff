//! Page, sort and search normalization for list endpoints.

use serde::Deserialize;

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Name,
    Email,
    Role,
    CreatedAt,
}

impl SortField {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "id" => Some(SortField::Id),
            "name" => Some(SortField::Name),
            "email" => Some(SortField::Email),
            "role" => Some(SortField::Role),
            "created_at" => Some(SortField::CreatedAt),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "_id",
            SortField::Name => "name",
            SortField::Email => "email",
            SortField::Role => "role",
            SortField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

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

impl SortSpec {
    /// Parses `field[:asc|desc]`; unknown fields fall back to newest first.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };

        let mut parts = raw.splitn(2, ':');
        let field = parts.next().and_then(SortField::parse);
        let direction = match parts.next() {
            Some(dir) if dir.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        };

        match field {
            Some(field) => Self { field, direction },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
    pub sort: SortSpec,
}

impl Page {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }
}

/// Raw paging parameters as they arrive from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
}

impl PageRequest {
    pub fn normalize(&self) -> Page {
        let page = self.page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;
        let limit = match self.limit {
            Some(limit) if limit >= 1 => limit.min(i64::from(MAX_LIMIT)) as u32,
            _ => DEFAULT_LIMIT,
        };

        Page {
            page,
            limit,
            sort: SortSpec::parse(self.sort.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    #[default]
    All,
    Name,
    Email,
    Id,
}

impl SearchScope {
    /// Blank selects `All`; unknown names yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Some(SearchScope::All),
            "name" => Some(SearchScope::Name),
            "email" => Some(SearchScope::Email),
            "id" => Some(SearchScope::Id),
            _ => None,
        }
    }
}
