//! Batch synchronization engine.
//!
//! # Overview
//! `BatchEngine` owns a host-supplied [`HttpExecutor`] and drives it through
//! the paginator, the chunker and the recovery logic. Every request goes
//! through [`send_with_backoff`]. Pages and chunks are processed one at a
//! time, in order; recovery relies on knowing exactly which chunk produced
//! which error.
//!
//! # Failure contract
//! Batch operations are all-or-nothing from the caller's side: the first
//! chunk that fails for good aborts the operation and its error is returned.
//! Chunks committed before it are NOT rolled back on the server. The log
//! line for the failure records how many chunks were already committed.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::backoff::{send_with_backoff, RateLimitPolicy};
use crate::batch::{batches, Batch};
use crate::client::{BatchOperation, CrmClient};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpExecutor, HttpRequest, HttpResponse};
use crate::pagination::{PageRequestFn, Pages};
use crate::recovery::{quarantine_invalid_emails, ChunkOutcome};
use crate::types::{
    AssociationArchive, AssociationLink, AssociationResult, AssociationsOf, BatchInput,
    BatchItemError, BatchReadQuery, CrmObject, ListObjectsQuery, ObjectType,
};

pub struct BatchEngine<E> {
    client: CrmClient,
    executor: E,
    policy: RateLimitPolicy,
    max_pages: Option<usize>,
    object_batch_size: usize,
    association_batch_size: usize,
}

impl<E: HttpExecutor> BatchEngine<E> {
    pub fn new(config: &ClientConfig, executor: E) -> Result<Self, ApiError> {
        config.validate()?;
        Ok(Self {
            client: CrmClient::new(config),
            executor,
            policy: RateLimitPolicy::from_config(config),
            max_pages: config.max_pages,
            object_batch_size: config.object_batch_size,
            association_batch_size: config.association_batch_size,
        })
    }

    pub fn client(&self) -> &CrmClient {
        &self.client
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Lazily page through any list endpoint. `build` produces the request
    /// for a cursor; `start_after` selects single-page mode.
    pub fn pages_with<'a, T: DeserializeOwned>(
        &'a mut self,
        build: PageRequestFn<'a>,
        start_after: Option<String>,
    ) -> Pages<'a, E, T> {
        Pages::new(
            &mut self.executor,
            &self.client,
            &self.policy,
            build,
            start_after,
            self.max_pages,
        )
    }

    /// Lazily page through `/crm/v3/objects/{type}`.
    pub fn pages<'a>(
        &'a mut self,
        object_type: &'a ObjectType,
        query: &'a ListObjectsQuery,
    ) -> Pages<'a, E, CrmObject> {
        let build: PageRequestFn<'a> = Box::new(move |client: &CrmClient, after: Option<&str>| {
            client.build_list_objects(object_type, query, after)
        });
        self.pages_with(build, query.after.clone())
    }

    /// Fetch every page matching `query`, or only the page at `query.after`
    /// when it is set.
    pub fn list_objects(
        &mut self,
        object_type: &ObjectType,
        query: &ListObjectsQuery,
    ) -> Result<Vec<CrmObject>, ApiError> {
        self.pages(object_type, query).try_concat()
    }

    /// Create `items` in chunks of the object batch size.
    ///
    /// A chunk rejected only for invalid emails has those emails blanked in
    /// `items` (and copied to `invalid_email_property` when given) and is
    /// resubmitted once. Results are in submission order.
    pub fn batch_create(
        &mut self,
        object_type: &ObjectType,
        items: &mut [BatchInput],
        invalid_email_property: Option<&str>,
    ) -> Result<Vec<CrmObject>, ApiError> {
        self.batch_write(object_type, BatchOperation::Create, items, invalid_email_property)
    }

    /// Update `items` (each with an `id`) with the same chunking and
    /// recovery as [`BatchEngine::batch_create`].
    pub fn batch_update(
        &mut self,
        object_type: &ObjectType,
        items: &mut [BatchInput],
        invalid_email_property: Option<&str>,
    ) -> Result<Vec<CrmObject>, ApiError> {
        self.batch_write(object_type, BatchOperation::Update, items, invalid_email_property)
    }

    /// Archive objects by id, one request per chunk.
    pub fn batch_archive(
        &mut self,
        object_type: &ObjectType,
        ids: &[String],
    ) -> Result<(), ApiError> {
        let size = self.object_batch_size;
        self.run_chunks(
            object_type.as_str(),
            ids,
            size,
            |client, chunk| client.build_batch_archive(object_type, chunk),
            |client, response, _| client.parse_batch_archive(response).map(|()| Vec::<()>::new()),
        )
        .map(drop)
    }

    /// Read objects by id, or by the values of `query.id_property`.
    /// Ids the server cannot find are logged and left out of the result.
    pub fn batch_read(
        &mut self,
        object_type: &ObjectType,
        query: &BatchReadQuery,
        ids: &[String],
    ) -> Result<Vec<CrmObject>, ApiError> {
        let size = self.object_batch_size;
        self.run_chunks(
            object_type.as_str(),
            ids,
            size,
            |client, chunk| client.build_batch_read(object_type, query, chunk),
            accept_chunk::<CrmObject>,
        )
    }

    /// Create v4 associations in chunks of the association batch size.
    /// Multi-status item errors are logged; validation failures are fatal.
    pub fn batch_create_associations(
        &mut self,
        from: &ObjectType,
        to: &ObjectType,
        links: &[AssociationLink],
    ) -> Result<Vec<AssociationResult>, ApiError> {
        let size = self.association_batch_size;
        self.run_chunks(
            "associations",
            links,
            size,
            |client, chunk| client.build_batch_create_associations(from, to, chunk),
            accept_chunk::<AssociationResult>,
        )
    }

    /// Every `to`-typed association of each `from` object id.
    pub fn batch_read_associations(
        &mut self,
        from: &ObjectType,
        to: &ObjectType,
        ids: &[String],
    ) -> Result<Vec<AssociationsOf>, ApiError> {
        let size = self.object_batch_size;
        self.run_chunks(
            "associations",
            ids,
            size,
            |client, chunk| client.build_batch_read_associations(from, to, chunk),
            accept_chunk::<AssociationsOf>,
        )
    }

    pub fn batch_archive_associations(
        &mut self,
        from: &ObjectType,
        to: &ObjectType,
        inputs: &[AssociationArchive],
    ) -> Result<(), ApiError> {
        let size = self.object_batch_size;
        self.run_chunks(
            "associations",
            inputs,
            size,
            |client, chunk| client.build_batch_archive_associations(from, to, chunk),
            |client, response, _| client.parse_batch_archive(response).map(|()| Vec::<()>::new()),
        )
        .map(drop)
    }

    /// One request per chunk of at most `size` items, in order, stopping at
    /// the first chunk that fails.
    fn run_chunks<I, T>(
        &mut self,
        target: &str,
        items: &[I],
        size: usize,
        mut build: impl FnMut(&CrmClient, &[I]) -> Result<HttpRequest, ApiError>,
        mut accept: impl FnMut(&CrmClient, HttpResponse, Batch) -> Result<Vec<T>, ApiError>,
    ) -> Result<Vec<T>, ApiError> {
        let mut results = Vec::new();
        let total = batches(items.len(), size).count();
        for (index, batch) in batches(items.len(), size).enumerate() {
            let outcome = build(&self.client, &items[batch.range()])
                .and_then(|request| self.send(&request, batch))
                .and_then(|response| accept(&self.client, response, batch));
            match outcome {
                Ok(chunk) => results.extend(chunk),
                Err(err) => {
                    log_abort(target, index, total, &err);
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    fn batch_write(
        &mut self,
        object_type: &ObjectType,
        operation: BatchOperation,
        items: &mut [BatchInput],
        invalid_email_property: Option<&str>,
    ) -> Result<Vec<CrmObject>, ApiError> {
        let mut results = Vec::with_capacity(items.len());
        let total = batches(items.len(), self.object_batch_size).count();
        for (index, batch) in batches(items.len(), self.object_batch_size).enumerate() {
            match self.write_chunk(object_type, operation, items, batch, invalid_email_property) {
                Ok(chunk) => results.extend(chunk),
                Err(err) => {
                    log_abort(object_type.as_str(), index, total, &err);
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    /// Submit one chunk, repairing invalid emails and resubmitting at most
    /// once.
    fn write_chunk(
        &mut self,
        object_type: &ObjectType,
        operation: BatchOperation,
        items: &mut [BatchInput],
        batch: Batch,
        invalid_email_property: Option<&str>,
    ) -> Result<Vec<CrmObject>, ApiError> {
        let mut retried = false;
        loop {
            let request =
                self.client
                    .build_batch_write(object_type, operation, &items[batch.range()])?;
            let response = self.send(&request, batch)?;

            match self.client.classify_batch_write::<CrmObject>(response) {
                ChunkOutcome::Accepted(results) => return Ok(results),
                ChunkOutcome::AcceptedWithErrors { results, errors } => {
                    log_item_errors(batch, &errors);
                    return Ok(results);
                }
                ChunkOutcome::InvalidEmails { emails, .. } if !retried => {
                    let changed =
                        quarantine_invalid_emails(items, batch, &emails, invalid_email_property);
                    info!(
                        start = batch.start,
                        end = batch.end,
                        invalid = emails.len(),
                        changed,
                        "resubmitting batch after blanking invalid emails"
                    );
                    retried = true;
                }
                ChunkOutcome::InvalidEmails {
                    message, errors, ..
                } => return Err(ApiError::InvalidProperties { message, errors }),
                ChunkOutcome::Fatal(err) => return Err(err),
            }
        }
    }

    fn send(&mut self, request: &HttpRequest, batch: Batch) -> Result<HttpResponse, ApiError> {
        debug!(
            method = request.method.as_str(),
            path = %request.path,
            start = batch.start,
            end = batch.end,
            "submitting batch"
        );
        send_with_backoff(&mut self.executor, &self.policy, request)
    }
}

/// Results of a chunk that needs no repair. Validation failures of any kind
/// are fatal here.
fn accept_chunk<T: DeserializeOwned>(
    client: &CrmClient,
    response: HttpResponse,
    batch: Batch,
) -> Result<Vec<T>, ApiError> {
    match client.classify_batch_write::<T>(response) {
        ChunkOutcome::Accepted(results) => Ok(results),
        ChunkOutcome::AcceptedWithErrors { results, errors } => {
            log_item_errors(batch, &errors);
            Ok(results)
        }
        ChunkOutcome::InvalidEmails {
            message, errors, ..
        } => Err(ApiError::InvalidProperties { message, errors }),
        ChunkOutcome::Fatal(err) => Err(err),
    }
}

fn log_item_errors(batch: Batch, errors: &[BatchItemError]) {
    for error in errors {
        warn!(
            start = batch.start,
            end = batch.end,
            id = ?error.id,
            category = %error.category,
            message = %error.message,
            "batch item failed"
        );
    }
}

fn log_abort(target: &str, index: usize, total: usize, err: &ApiError) {
    warn!(
        target_type = target,
        committed_chunks = index,
        total_chunks = total,
        error = %err,
        "batch operation aborted; earlier chunks remain committed"
    );
}
