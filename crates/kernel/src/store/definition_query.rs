//! Definition listing query builder using SeaQuery.
//!
//! Generates the filtered, sorted, paginated SELECT and its COUNT companion
//! for component definition listings.

use sea_query::{
    Alias, Asterisk, Cond, Expr, Order, PostgresQueryBuilder, Query, SelectStatement,
};

use super::{DefinitionQuery, SortOrder};

const TABLE: &str = "component_definition";

/// Query builder for definition listings.
pub struct DefinitionQueryBuilder<'a> {
    query: &'a DefinitionQuery,
}

impl<'a> DefinitionQueryBuilder<'a> {
    pub fn new(query: &'a DefinitionQuery) -> Self {
        Self { query }
    }

    /// Build the main SELECT with ordering and pagination.
    pub fn build(&self) -> String {
        let mut select = Query::select();
        select.column(Asterisk).from(Alias::new(TABLE));
        self.add_filters(&mut select);

        let order = match self.query.sort_order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        select.order_by(Alias::new(self.query.sort_by.column()), order.clone());
        // Stable paging when the sort column ties.
        select.order_by(Alias::new("id"), order);

        select.limit(self.query.effective_limit());
        select.offset(self.query.offset);

        select.to_string(PostgresQueryBuilder)
    }

    /// Build a COUNT query over the same filters.
    pub fn build_count(&self) -> String {
        let mut select = Query::select();
        select.expr(Expr::col(Asterisk).count()).from(Alias::new(TABLE));
        self.add_filters(&mut select);
        select.to_string(PostgresQueryBuilder)
    }

    fn add_filters(&self, select: &mut SelectStatement) {
        if let Some(ref category) = self.query.category {
            select.and_where(Expr::col(Alias::new("category")).eq(category.as_str()));
        }

        if let Some(term) = self.query.search_term() {
            let pattern = format!("%{}%", escape_like_wildcards(term));
            select.and_where(Expr::cust_with_values(
                "(name ILIKE $1 OR COALESCE(description, '') ILIKE $2)",
                [pattern.clone(), pattern],
            ));
        }

        if !self.query.tags.is_empty() {
            let mut any_tag = Cond::any();
            for tag in &self.query.tags {
                any_tag = any_tag.add(Expr::cust_with_values("$1 = ANY(tags)", [tag.clone()]));
            }
            select.cond_where(any_tag);
        }
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DefinitionSort;

    #[test]
    fn default_listing() {
        let query = DefinitionQuery::default();
        let sql = DefinitionQueryBuilder::new(&query).build();
        assert!(sql.contains("FROM \"component_definition\""));
        assert!(sql.contains("ORDER BY \"created\" DESC"));
        assert!(sql.contains("LIMIT 20"));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn category_and_search_filters() {
        let query = DefinitionQuery {
            category: Some("heroes".into()),
            search: Some("banner".into()),
            ..Default::default()
        };
        let sql = DefinitionQueryBuilder::new(&query).build();
        assert!(sql.contains("\"category\" = 'heroes'"));
        assert!(sql.contains("ILIKE"));
        assert!(sql.contains("%banner%"));
    }

    #[test]
    fn tag_filter_matches_any() {
        let query = DefinitionQuery {
            tags: vec!["cta".into(), "footer".into()],
            ..Default::default()
        };
        let sql = DefinitionQueryBuilder::new(&query).build();
        assert!(sql.contains("'cta' = ANY(tags)"));
        assert!(sql.contains("'footer' = ANY(tags)"));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn sort_and_pagination() {
        let query = DefinitionQuery {
            sort_by: DefinitionSort::Name,
            sort_order: SortOrder::Asc,
            limit: 5,
            offset: 10,
            ..Default::default()
        };
        let sql = DefinitionQueryBuilder::new(&query).build();
        assert!(sql.contains("ORDER BY \"name\" ASC"));
        assert!(sql.contains("LIMIT 5"));
        assert!(sql.contains("OFFSET 10"));
    }

    #[test]
    fn count_query_has_no_pagination() {
        let query = DefinitionQuery {
            category: Some("cards".into()),
            offset: 40,
            ..Default::default()
        };
        let sql = DefinitionQueryBuilder::new(&query).build_count();
        assert!(sql.contains("COUNT(*)"));
        assert!(sql.contains("\"category\" = 'cards'"));
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("ORDER BY"));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like_wildcards("50%_off"), "50\\%\\_off");
    }
}
