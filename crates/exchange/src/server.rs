use tracing::{debug, error, warn};

use sentinel_core_types::{Hash, Height};
use sentinel_store::Store;

use crate::params::ESTIMATED_HEADER_SIZE;
use crate::{Error, Metrics, Request, Response, ServerParams, StatusCode};

/// Serves header requests from the local store.
#[derive(Clone)]
pub struct ExchangeServer {
    store: Store,
    params: ServerParams,
    metrics: Metrics,
}

impl ExchangeServer {
    pub fn new(store: Store, params: ServerParams) -> Self {
        Self::with_metrics(store, params, Metrics::default())
    }

    pub fn with_metrics(store: Store, params: ServerParams, metrics: Metrics) -> Self {
        Self {
            store,
            params,
            metrics,
        }
    }

    pub fn params(&self) -> &ServerParams {
        &self.params
    }

    /// Check a request against the resource limits of the server.
    pub fn check_limits(&self, request: &Request) -> Result<(), Error> {
        let count = request.count();

        if count > self.params.max_headers_per_request {
            return Err(Error::ResourceLimit(format!(
                "{count} headers requested, at most {} allowed",
                self.params.max_headers_per_request
            )));
        }

        let estimated = count.saturating_mul(ESTIMATED_HEADER_SIZE);
        let max_size = self.params.max_request_size.as_u64();

        if estimated > max_size {
            return Err(Error::ResourceLimit(format!(
                "estimated response size of {estimated} bytes exceeds {max_size} bytes"
            )));
        }

        Ok(())
    }

    /// Answer a request, mapping errors to the status codes sent over the wire.
    pub async fn respond(&self, request: Request) -> Response {
        match self.handle(request).await {
            Ok(response) => response,
            Err(Error::ResourceLimit(reason)) => {
                debug!(%reason, "Rejecting request");
                Response::status(StatusCode::LimitExceeded)
            }
            Err(e) => {
                error!("Failed to serve request: {e}");
                Response::status(StatusCode::Internal)
            }
        }
    }

    #[tracing::instrument(skip_all, fields(count = request.count()))]
    pub async fn handle(&self, request: Request) -> Result<Response, Error> {
        if let Err(e) = self.check_limits(&request) {
            self.metrics.requests_rejected.inc();
            return Err(e);
        }

        let response = match request {
            Request::Head => self.head(),
            Request::Range { start, amount } => self.range(start, amount).await?,
            Request::Hashes(hashes) => self.hashes(hashes).await?,
        };

        self.metrics.requests_served.inc();
        debug!(status = ?response.status, headers = response.headers.len(), "Served request");

        Ok(response)
    }

    fn head(&self) -> Response {
        match self.store.head() {
            Some(head) => Response::ok(vec![head]),
            None => Response::status(StatusCode::NotFoundAbove(Height::ZERO)),
        }
    }

    async fn range(&self, start: Height, amount: u64) -> Result<Response, Error> {
        if start.is_zero() {
            return Ok(Response::status(StatusCode::NotFound));
        }

        if amount == 0 {
            return Ok(Response::ok(Vec::new()));
        }

        let head = self.store.height();
        let end = start.increment_by(amount - 1);

        let headers = self.store.get_range(start, end).await?;

        if end > head {
            return Ok(Response::new(StatusCode::NotFoundAbove(head), headers));
        }

        Ok(Response::ok(headers))
    }

    async fn hashes(&self, hashes: Vec<Hash>) -> Result<Response, Error> {
        let mut headers = Vec::with_capacity(hashes.len());
        let mut status = StatusCode::Ok;

        for hash in &hashes {
            match self.store.get_by_hash(hash).await {
                Ok(header) => headers.push(header),
                Err(e) if e.is_not_found() => {
                    warn!(%hash, "Requested header not found");
                    status = StatusCode::NotFound;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        headers.sort_by_key(|header| header.height());

        Ok(Response::new(status, headers))
    }
}
