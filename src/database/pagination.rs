use serde::Serialize;

use crate::{constants::MAX_PAGE_SIZE, error::Error, form::QueryParams};

/// `page` / `limit` taken from the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn from_query(params: &QueryParams, default_limit: i64) -> Self {
        let page = params
            .get_number::<i64>("page")
            .filter(|page| *page >= 1)
            .unwrap_or(1)
            .min(i64::MAX / MAX_PAGE_SIZE);
        let limit = params
            .get_number::<i64>("limit")
            .filter(|limit| *limit >= 1)
            .unwrap_or(default_limit)
            .min(MAX_PAGE_SIZE);

        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Serialize, Debug)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// `path` and `params` describe the request the page answers, so the
    /// links keep every other filter of that request. Any page after the
    /// first must hold at least one row.
    pub fn from_rows(
        rows: Vec<T>,
        total_rows: i64,
        request: PageRequest,
        path: &str,
        params: &QueryParams,
    ) -> Result<Self, Error> {
        if request.page > 1 && rows.is_empty() {
            return Err(Error::InvalidPage);
        }

        let link = |page: i64| {
            if page == 1 {
                let query = params.without("page");
                if query.is_empty() {
                    path.to_owned()
                } else {
                    format!("{path}?{query}")
                }
            } else {
                format!("{path}?{}", params.with("page", &page.to_string()))
            }
        };

        let next = (request.offset().saturating_add(request.limit) < total_rows)
            .then(|| link(request.page + 1));
        let previous = (request.page > 1).then(|| link(request.page - 1));

        Ok(Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_bounds() {
        let request = PageRequest::from_query(&QueryParams::parse("page=0&limit=abc"), 6);
        assert_eq!(request, PageRequest { page: 1, limit: 6 });

        let request = PageRequest::from_query(&QueryParams::parse("page=3&limit=1000"), 6);
        assert_eq!(request, PageRequest { page: 3, limit: MAX_PAGE_SIZE });
        assert_eq!(request.offset(), 2 * MAX_PAGE_SIZE);
    }

    #[test]
    fn middle_page_links_both_ways() {
        let params = QueryParams::parse("page=2&limit=2&author=5");
        let request = PageRequest::from_query(&params, 6);

        let page =
            PageContext::from_rows(vec![3, 4], 5, request, "/api/recipes/", &params).unwrap();

        assert_eq!(page.count, 5);
        assert_eq!(
            page.next.as_deref(),
            Some("/api/recipes/?limit=2&author=5&page=3")
        );
        assert_eq!(page.previous.as_deref(), Some("/api/recipes/?limit=2&author=5"));
    }

    #[test]
    fn single_page_has_no_links() {
        let params = QueryParams::default();
        let request = PageRequest::from_query(&params, 6);

        let page = PageContext::from_rows(vec![1, 2], 2, request, "/api/users/", &params).unwrap();

        assert!(page.next.is_none());
        assert!(page.previous.is_none());
        assert_eq!(page.results, vec![1, 2]);
    }

    #[test]
    fn huge_page_does_not_overflow() {
        let params = QueryParams::parse("page=9223372036854775807&limit=1000");
        let request = PageRequest::from_query(&params, 6);

        assert!(request.offset() >= 0);
        assert!(request.offset() <= i64::MAX - MAX_PAGE_SIZE);

        let page = PageContext::from_rows(vec![1], 5, request, "/api/users/", &params).unwrap();
        assert!(page.next.is_none());
        assert!(page.previous.is_some());
    }

    #[test]
    fn empty_page_past_the_first_is_invalid() {
        let params = QueryParams::parse("page=4&limit=2");
        let request = PageRequest::from_query(&params, 6);

        let result = PageContext::<i32>::from_rows(vec![], 0, request, "/api/recipes/", &params);
        assert!(matches!(result, Err(Error::InvalidPage)));

        let params = QueryParams::default();
        let request = PageRequest::from_query(&params, 6);

        let first = PageContext::<i32>::from_rows(vec![], 0, request, "/api/recipes/", &params).unwrap();
        assert_eq!(first.count, 0);
        assert!(first.next.is_none());
    }
}
