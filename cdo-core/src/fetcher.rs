use tracing::{debug, info, warn};

use crate::{
    chunk::ChunkPlan,
    error::FetchError,
    model::{DateRange, PageRequest, Record, ResultSet},
    retry::RetryPolicy,
    source::{
        PageSource,
        cdo::{FIRST_OFFSET, MAX_PAGE_SIZE},
    },
};

/// Pages through every chunk of a plan and merges the results in fetch order.
#[derive(Debug)]
pub struct BulkFetcher<S> {
    source: S,
    retry: RetryPolicy,
    start_offset: u32,
    max_page_size: u32,
}

impl<S: PageSource> BulkFetcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
            start_offset: FIRST_OFFSET,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Offset of the first row in a result set, as the service counts it.
    pub fn with_start_offset(mut self, start_offset: u32) -> Self {
        self.start_offset = start_offset;
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches every record for `station_id` over `range`, one chunk of `plan` at a time.
    ///
    /// Fails fast on the first page that cannot be fetched within the retry budget, and
    /// reports [`FetchError::NoData`] when every chunk comes back empty.
    pub async fn fetch(
        &self,
        station_id: &str,
        range: DateRange,
        plan: &ChunkPlan,
        page_size: u32,
    ) -> Result<ResultSet, FetchError> {
        self.validate(station_id, range, plan, page_size)?;

        let mut results = ResultSet::new();

        for chunk in plan.chunks() {
            let request = PageRequest {
                chunk: *chunk,
                station_id: station_id.to_string(),
                offset: self.start_offset,
                limit: page_size,
            };

            let count = self.fetch_chunk(request, &mut results).await?;
            if count == 0 {
                debug!(%chunk, "chunk returned no records");
            } else {
                info!(%chunk, records = count, "chunk complete");
            }
        }

        if results.is_empty() {
            return Err(FetchError::NoData { station: station_id.to_string(), range });
        }

        Ok(results)
    }

    fn validate(
        &self,
        station_id: &str,
        range: DateRange,
        plan: &ChunkPlan,
        page_size: u32,
    ) -> Result<(), FetchError> {
        if station_id.trim().is_empty() {
            return Err(FetchError::InvalidRequest("station id must not be empty".to_string()));
        }

        if page_size == 0 || page_size > self.max_page_size {
            return Err(FetchError::InvalidRequest(format!(
                "page size {page_size} is outside 1..={}",
                self.max_page_size
            )));
        }

        if plan.range() != range {
            return Err(FetchError::InvalidRequest(format!(
                "chunk plan covers {} but {range} was requested",
                plan.range()
            )));
        }

        Ok(())
    }

    async fn fetch_chunk(
        &self,
        mut request: PageRequest,
        results: &mut ResultSet,
    ) -> Result<usize, FetchError> {
        let mut total = 0;

        loop {
            let page = self.fetch_page(&request).await?;
            if page.is_empty() {
                return Ok(total);
            }

            info!(
                chunk = %request.chunk,
                offset = request.offset,
                records = page.len(),
                "retrieved page"
            );

            total += page.len();
            results.extend(page);
            if request.advance().is_none() {
                return Err(FetchError::OffsetOverflow {
                    chunk: request.chunk,
                    offset: request.offset,
                });
            }
        }
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Record>, FetchError> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let err = match self.source.fetch_page(request).await {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };

            if !self.retry.is_retryable(&err) || !self.retry.can_retry(attempts) {
                return Err(FetchError::Fetch {
                    chunk: request.chunk,
                    offset: request.offset,
                    attempts,
                    source: err,
                });
            }

            let delay = self.retry.delay_before(attempts);
            warn!(
                chunk = %request.chunk,
                offset = request.offset,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
