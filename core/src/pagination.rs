//! Cursor-driven pagination over list endpoints.
//!
//! [`Pages`] is a lazy, non-restartable iterator: each `next()` performs one
//! request (through the rate-limit backoff) and yields that page's results.
//! It stops after the page whose `paging.next.after` is absent or empty,
//! after the first error, or after a single page when the caller supplied
//! an explicit cursor.

use std::iter::FusedIterator;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::backoff::{send_with_backoff, RateLimitPolicy};
use crate::client::CrmClient;
use crate::error::ApiError;
use crate::http::{HttpExecutor, HttpRequest};

/// Builds the request for one page given the cursor to resume from.
pub type PageRequestFn<'a> = Box<dyn FnMut(&CrmClient, Option<&str>) -> HttpRequest + 'a>;

pub struct Pages<'a, E: ?Sized, T> {
    executor: &'a mut E,
    client: &'a CrmClient,
    policy: &'a RateLimitPolicy,
    build: PageRequestFn<'a>,
    cursor: Option<String>,
    single_page: bool,
    max_pages: Option<usize>,
    fetched: usize,
    done: bool,
    _results: PhantomData<fn() -> T>,
}

impl<'a, E, T> Pages<'a, E, T>
where
    E: HttpExecutor + ?Sized,
    T: DeserializeOwned,
{
    /// `start_after` selects single-page mode: that page is fetched and
    /// iteration ends regardless of the cursor it returns.
    pub fn new(
        executor: &'a mut E,
        client: &'a CrmClient,
        policy: &'a RateLimitPolicy,
        build: PageRequestFn<'a>,
        start_after: Option<String>,
        max_pages: Option<usize>,
    ) -> Self {
        Self {
            executor,
            client,
            policy,
            build,
            single_page: start_after.is_some(),
            cursor: start_after,
            max_pages,
            fetched: 0,
            done: false,
            _results: PhantomData,
        }
    }

    /// Number of requests issued so far.
    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }

    /// Drain every page into one vector, in page order.
    pub fn try_concat(self) -> Result<Vec<T>, ApiError> {
        let mut all = Vec::new();
        for page in self {
            all.extend(page?);
        }
        Ok(all)
    }

    fn fetch(&mut self) -> Result<Vec<T>, ApiError> {
        let request = (self.build)(self.client, self.cursor.as_deref());
        let response = send_with_backoff(&mut *self.executor, self.policy, &request)?;
        let page = self.client.parse_list_page::<T>(response)?;

        let next = page.next_after().map(str::to_owned);
        debug!(
            page = self.fetched,
            results = page.results.len(),
            next = ?next,
            "fetched page"
        );
        match next {
            Some(after) if !self.single_page => self.cursor = Some(after),
            _ => self.done = true,
        }
        Ok(page.results)
    }
}

impl<E, T> Iterator for Pages<'_, E, T>
where
    E: HttpExecutor + ?Sized,
    T: DeserializeOwned,
{
    type Item = Result<Vec<T>, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(max_pages) = self.max_pages {
            if self.fetched >= max_pages {
                self.done = true;
                return Some(Err(ApiError::PageLimitExceeded { max_pages }));
            }
        }
        let result = self.fetch();
        self.fetched += 1;
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

impl<E, T> FusedIterator for Pages<'_, E, T>
where
    E: HttpExecutor + ?Sized,
    T: DeserializeOwned,
{
}
