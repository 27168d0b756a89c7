//! Query arguments, page results and page metadata

use crate::core::field::FieldValue;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Serializable query arguments for a page of entities
///
/// Every field is optional; an absent field applies no restriction.
///
/// # Example
/// ```rust,ignore
/// // In handler:
/// pub async fn list_songs(Query(args): Query<QueryArgs>) -> ... { }
///
/// // Usage:
/// GET /songs?filter=Title.Contains(@0)&filter_parameters=["Love"]&order_by=ReleaseDate desc&skip=10&top=10
/// GET /songs?select=new (Title, ReleaseDate)&expand=Artist
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryArgs {
    /// Filter expression, e.g. `Title.StartsWith(@0) && ArtistId == 2`
    pub filter: Option<String>,

    /// Positional parameters referenced as `@0`, `@1`, ... in the filter.
    ///
    /// In a URL query string this is a JSON array.
    #[serde(deserialize_with = "deserialize_parameters")]
    pub filter_parameters: Option<Vec<FieldValue>>,

    /// Sort expression, e.g. `ReleaseDate desc, Title`
    pub order_by: Option<String>,

    /// Number of rows to skip (applied only when > 0)
    pub skip: Option<i64>,

    /// Maximum number of rows to return (applied only when > 0)
    pub top: Option<i64>,

    /// Projection, e.g. `new (Title, ReleaseDate)`
    pub select: Option<String>,

    /// Navigation properties to eager-load, comma separated.
    ///
    /// A dotted path (`Artist.Songs`) loads through the navigations of each
    /// loaded target.
    pub expand: Option<String>,
}

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn parameters(mut self, parameters: Vec<FieldValue>) -> Self {
        self.filter_parameters = Some(parameters);
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn top(mut self, top: i64) -> Self {
        self.top = Some(top);
        self
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }
}

/// Accept either a JSON array or a string holding a JSON array.
///
/// URL query strings can only carry the latter.
fn deserialize_parameters<'de, D>(deserializer: D) -> Result<Option<Vec<FieldValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<FieldValue>),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::List(values)) => Ok(Some(values)),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Raw::Text(text)) => serde_json::from_str(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// A page of typed rows plus the count of rows across all pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub data: Vec<T>,

    /// Rows matching the filter, before skip/take
    pub count_across_pages: i64,
}

/// Rows of a dynamic query with page metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicQueryResult<T = Value> {
    pub data: Vec<T>,
    pub current_page: i64,
    pub page_count: i64,
    pub page_size: i64,
    pub row_count: i64,
}

/// Page metadata for the dynamic-query variants
///
/// `current_page` is derived from the caller-supplied `total_records`, while
/// `page_count` and `row_count` use the authoritative `count`. The two may
/// disagree when the caller's total is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub current_page: i64,
    pub page_count: i64,
    pub page_size: i64,
    pub row_count: i64,
}

impl PageMeta {
    pub fn compute(
        count: i64,
        skip: Option<i64>,
        take: Option<i64>,
        total_records: Option<i64>,
    ) -> Self {
        let total = total_records.unwrap_or(count);

        let mut skip_value = skip.unwrap_or(0).max(0);
        if skip_value > total {
            skip_value = total;
        }

        let take_value = match take {
            Some(take) => take,
            None => (total - skip_value).max(0),
        };

        let page_count = match take {
            Some(take) if take > 0 => ceil_div(count, take),
            _ if count > 0 => 1,
            _ => 0,
        };

        let current_page = if take_value > 0 {
            ceil_div(skip_value, take_value).saturating_add(1)
        } else {
            1
        };

        Self {
            current_page,
            page_count,
            page_size: take_value,
            row_count: count,
        }
    }

    pub fn into_result<T>(self, data: Vec<T>) -> DynamicQueryResult<T> {
        DynamicQueryResult {
            data,
            current_page: self.current_page,
            page_count: self.page_count,
            page_size: self.page_size,
            row_count: self.row_count,
        }
    }
}

fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    if numerator <= 0 {
        0
    } else {
        (numerator - 1) / denominator + 1
    }
}
