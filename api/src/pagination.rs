use board_shared::Paginated;

/// Splits `count` ordered items into pages of `per_page`. A trailing page with
/// `orphans` or fewer items is folded into the page before it.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    count: i64,
    per_page: i64,
    orphans: i64,
}

/// One resolved page: `offset`/`limit` are ready for a SQL `LIMIT ? OFFSET ?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub num_pages: i64,
    pub offset: i64,
    pub limit: i64,
}

impl Paginator {
    pub fn new(count: i64, per_page: i64, orphans: i64) -> Self {
        Self {
            count: count.max(0),
            per_page: per_page.max(1),
            orphans: orphans.max(0),
        }
    }

    /// Always at least 1; an empty sequence has a single empty page.
    pub fn num_pages(&self) -> i64 {
        let hits = (self.count - self.orphans).max(1);
        (hits + self.per_page - 1) / self.per_page
    }

    /// Out-of-range numbers (including 0 and negatives) resolve to the last page.
    pub fn page(&self, number: i64) -> Page {
        let num_pages = self.num_pages();
        let number = if (1..=num_pages).contains(&number) {
            number
        } else {
            num_pages
        };

        let bottom = (number - 1) * self.per_page;
        let mut top = bottom + self.per_page;
        if top + self.orphans >= self.count {
            top = self.count;
        }

        Page {
            number,
            num_pages,
            offset: bottom,
            limit: (top - bottom).max(0),
        }
    }

    /// Lenient lookup for a raw `?page=` value: missing or non-numeric means page 1.
    pub fn get_page(&self, raw: Option<&str>) -> Page {
        let number = raw
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(1);
        self.page(number)
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
    }
}

impl Page {
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }

    pub fn wrap<T>(&self, paginator: &Paginator, items: Vec<T>) -> Paginated<T> {
        Paginated {
            items,
            total: paginator.count(),
            page: self.number,
            per_page: paginator.per_page(),
            num_pages: self.num_pages,
            has_next: self.has_next(),
            has_previous: self.has_previous(),
            is_paginated: self.is_paginated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(count: i64, per_page: i64, orphans: i64) -> Vec<i64> {
        let p = Paginator::new(count, per_page, orphans);
        (1..=p.num_pages()).map(|n| p.page(n).limit).collect()
    }

    #[test]
    fn five_items_without_orphans() {
        assert_eq!(sizes(5, 2, 0), vec![2, 2, 1]);
    }

    #[test]
    fn small_last_page_is_absorbed() {
        assert_eq!(sizes(5, 2, 1), vec![2, 3]);
        let last = Paginator::new(5, 2, 1).page(2);
        assert_eq!(last.offset, 2);
        assert!(!last.has_next());
        assert!(last.has_previous());
    }

    #[test]
    fn exact_multiple_keeps_full_pages() {
        assert_eq!(sizes(4, 2, 0), vec![2, 2]);
        assert_eq!(sizes(4, 2, 1), vec![2, 2]);
        assert_eq!(sizes(7, 3, 2), vec![3, 4]);
    }

    #[test]
    fn empty_sequence_has_one_empty_page() {
        let p = Paginator::new(0, 2, 0);
        assert_eq!(p.num_pages(), 1);
        let page = p.page(1);
        assert_eq!(page.limit, 0);
        assert!(!page.is_paginated());
    }

    #[test]
    fn out_of_range_resolves_to_last_page() {
        let p = Paginator::new(5, 2, 0);
        assert_eq!(p.page(9).number, 3);
        assert_eq!(p.page(0).number, 3);
        assert_eq!(p.page(-4).number, 3);
    }

    #[test]
    fn raw_page_values_are_lenient() {
        let p = Paginator::new(5, 2, 0);
        assert_eq!(p.get_page(None).number, 1);
        assert_eq!(p.get_page(Some("abc")).number, 1);
        assert_eq!(p.get_page(Some(" 2 ")).number, 2);
        assert_eq!(p.get_page(Some("42")).number, 3);
    }

    #[test]
    fn wrap_reports_navigation() {
        let p = Paginator::new(5, 2, 0);
        let page = p.page(2);
        let out = page.wrap(&p, vec!["c", "d"]);
        assert_eq!(out.total, 5);
        assert_eq!(out.num_pages, 3);
        assert!(out.has_next && out.has_previous && out.is_paginated);
    }
}
