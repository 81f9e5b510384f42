//! Record listing queries.

use crate::record::MirrorRecord;
use std::cmp::Ordering;

/// Fields a listing may be sorted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Local insertion identity.
    Id,
    /// Upstream identity.
    RecordId,
    /// Source table name.
    TableName,
    /// First insertion time.
    CreatedAt,
    /// Last field change time.
    UpdatedAt,
}

impl SortField {
    /// Parses an API sort field name.
    ///
    /// Returns `None` for names outside the allow-list.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(SortField::Id),
            "record_id" => Some(SortField::RecordId),
            "table_name" => Some(SortField::TableName),
            "created_at" => Some(SortField::CreatedAt),
            "updated_at" => Some(SortField::UpdatedAt),
            _ => None,
        }
    }

    /// Returns the SQL column backing this field.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::RecordId => "record_id",
            SortField::TableName => "table_name",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }

    fn compare(&self, a: &MirrorRecord, b: &MirrorRecord) -> Ordering {
        match self {
            SortField::Id => a.id.cmp(&b.id),
            SortField::RecordId => a.identity.cmp(&b.identity),
            SortField::TableName => a.source_table.cmp(&b.source_table),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Parses an API sort order. `desc` in any case is descending,
    /// everything else ascending.
    pub fn parse(order: &str) -> Self {
        if order.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    /// Returns the SQL keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A resolved sort specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSort {
    /// Field to sort on.
    pub field: SortField,
    /// Direction.
    pub direction: SortDirection,
}

/// Filter, sort and paging for record listings.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    /// Only records from this source table.
    pub table: Option<String>,
    /// Sort order. `None` means insertion order.
    pub sort: Option<RecordSort>,
    /// Records to skip.
    pub skip: usize,
    /// Maximum records to return.
    pub limit: usize,
}

impl RecordQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: usize = 100;

    /// Creates a query with the default ordering (newest insertion first).
    pub fn new() -> Self {
        Self {
            table: None,
            sort: Some(RecordSort {
                field: SortField::Id,
                direction: SortDirection::Desc,
            }),
            skip: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Restricts the listing to one source table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sorts by an API field name and order.
    ///
    /// An unrecognized field silently falls back to insertion order.
    pub fn with_sort(mut self, field: &str, order: &str) -> Self {
        self.sort = SortField::parse(field).map(|field| RecordSort {
            field,
            direction: SortDirection::parse(order),
        });
        self
    }

    /// Sets the number of records to skip.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Returns true if the record passes the filter.
    pub(crate) fn matches(&self, record: &MirrorRecord) -> bool {
        self.table
            .as_deref()
            .map_or(true, |table| record.source_table == table)
    }

    /// Orders two records per this query, ties broken by insertion order.
    pub(crate) fn compare(&self, a: &MirrorRecord, b: &MirrorRecord) -> Ordering {
        let primary = match self.sort {
            Some(sort) => {
                let ord = sort.field.compare(a, b);
                match sort.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
            None => Ordering::Equal,
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }

    /// Renders the ORDER BY clause.
    pub(crate) fn order_by_sql(&self) -> String {
        match self.sort {
            Some(RecordSort {
                field: SortField::Id,
                direction,
            }) => format!("ORDER BY id {}", direction.keyword()),
            Some(sort) => format!(
                "ORDER BY {} {}, id ASC",
                sort.field.column(),
                sort.direction.keyword()
            ),
            None => "ORDER BY id ASC".to_string(),
        }
    }
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_query() {
        let query = RecordQuery::default();
        assert_eq!(query.skip, 0);
        assert_eq!(query.limit, 100);
        assert_eq!(
            query.sort,
            Some(RecordSort {
                field: SortField::Id,
                direction: SortDirection::Desc
            })
        );
        assert_eq!(query.order_by_sql(), "ORDER BY id DESC");
    }

    #[test]
    fn sort_direction_parsing() {
        assert_eq!(SortDirection::parse("desc"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("DESC"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("asc"), SortDirection::Asc);
        assert_eq!(SortDirection::parse("sideways"), SortDirection::Asc);
    }

    #[test]
    fn unknown_sort_field_falls_back_to_insertion_order() {
        let query = RecordQuery::new().with_sort("fields; DROP TABLE x", "desc");
        assert!(query.sort.is_none());
        assert_eq!(query.order_by_sql(), "ORDER BY id ASC");
    }

    #[test]
    fn known_sort_field_renders_tiebreak() {
        let query = RecordQuery::new().with_sort("created_at", "asc");
        assert_eq!(query.order_by_sql(), "ORDER BY created_at ASC, id ASC");
    }
}
