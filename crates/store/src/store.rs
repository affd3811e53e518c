use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::{spawn_blocking, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use sentinel_core_types::{ExtendedHeader, Hash, HeaderError, Height};
use sentinel_datastore::{Batch, Datastore, Key};

use crate::{keys, Error, Metrics, Params};

/// Headers appended since the last flush, contiguous and in ascending height order.
#[derive(Default)]
struct WriteBuffer {
    headers: Vec<ExtendedHeader>,
}

impl WriteBuffer {
    fn get(&self, height: Height) -> Option<&ExtendedHeader> {
        let first = self.headers.first()?.height();
        let offset = height.as_u64().checked_sub(first.as_u64())?;
        self.headers.get(usize::try_from(offset).ok()?)
    }

    fn get_by_hash(&self, hash: &Hash) -> Option<&ExtendedHeader> {
        self.headers.iter().find(|h| h.hash() == *hash)
    }
}

struct Inner {
    ds: Arc<dyn Datastore>,
    params: Params,
    metrics: Metrics,

    /// Recently used headers, by height
    cache: Mutex<LruCache<Height, ExtendedHeader>>,

    /// Recently used hash to height mappings
    index: Mutex<LruCache<Hash, Height>>,

    /// Single writer: every append goes through this lock
    buffer: AsyncMutex<WriteBuffer>,

    /// The highest contiguous header, if any
    head: watch::Sender<Option<ExtendedHeader>>,

    /// Background flush task
    flusher: Mutex<Option<JoinHandle<()>>>,
}

/// A cached, height-indexed, append-only header store.
///
/// Cloning a [`Store`] is cheap, all clones share the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

impl Store {
    /// Open a store over the given datastore, restoring the head if one was persisted.
    pub fn new(ds: Arc<dyn Datastore>, params: Params) -> Result<Self, Error> {
        Self::with_metrics(ds, params, Metrics::default())
    }

    pub fn with_metrics(
        ds: Arc<dyn Datastore>,
        params: Params,
        metrics: Metrics,
    ) -> Result<Self, Error> {
        let head = load_head(ds.as_ref())?;

        if let Some(head) = &head {
            info!(height = %head.height(), hash = %head.hash(), "Restored header store head");
            metrics.head_height.set(head.height().as_u64() as i64);
        }

        let (head, _) = watch::channel(head);

        let inner = Inner {
            cache: Mutex::new(LruCache::new(capacity(params.store_cache_size))),
            index: Mutex::new(LruCache::new(capacity(params.index_cache_size))),
            buffer: AsyncMutex::new(WriteBuffer::default()),
            head,
            flusher: Mutex::new(None),
            ds,
            params,
            metrics,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    /// Spawn the background task flushing the write buffer every [`Params::flush_interval`].
    pub fn start(&self) {
        let mut flusher = self.inner.flusher.lock().expect("poisoned lock");
        if flusher.is_some() {
            return;
        }

        let inner = Arc::downgrade(&self.inner);
        let interval = self.inner.params.flush_interval;

        *flusher = Some(tokio::spawn(flush_periodically(inner, interval)));
    }

    /// Stop the background flush task and flush every buffered header.
    pub async fn stop(&self) -> Result<(), Error> {
        let flusher = self.inner.flusher.lock().expect("poisoned lock").take();
        if let Some(flusher) = flusher {
            flusher.abort();
        }

        self.flush().await
    }

    /// Seed an empty store with a trusted header, which may be at any height.
    pub async fn init(&self, trusted: ExtendedHeader) -> Result<(), Error> {
        trusted.validate_basic().map_err(Error::InvalidHeader)?;

        let mut buffer = self.inner.buffer.lock().await;

        if self.inner.head.borrow().is_some() {
            return Err(Error::AlreadyInitialized);
        }

        info!(height = %trusted.height(), hash = %trusted.hash(), "Initializing header store");

        self.stage(&mut buffer, trusted.clone(), true).await?;
        self.publish(trusted);

        Ok(())
    }

    /// Append a header, which must be the direct successor of the current head.
    pub async fn put(&self, header: ExtendedHeader) -> Result<(), Error> {
        header.validate_basic().map_err(Error::InvalidHeader)?;

        let mut buffer = self.inner.buffer.lock().await;

        self.check_successor(&header)?;

        let full = buffer.headers.len() + 1 >= self.inner.params.write_batch_size;
        self.stage(&mut buffer, header.clone(), full).await?;
        self.publish(header);

        Ok(())
    }

    /// Append headers in order, stopping at the first failure.
    ///
    /// On failure, returns how many headers were appended along with the error.
    pub async fn append(&self, headers: Vec<ExtendedHeader>) -> Result<usize, (usize, Error)> {
        let mut written = 0;

        for header in headers {
            self.put(header).await.map_err(|e| (written, e))?;
            written += 1;
        }

        Ok(written)
    }

    fn check_successor(&self, header: &ExtendedHeader) -> Result<(), Error> {
        let head = self.inner.head.borrow();

        let Some(head) = head.as_ref() else {
            if header.height() != Height::INITIAL {
                return Err(Error::OutOfOrder {
                    expected: Height::INITIAL,
                    actual: header.height(),
                });
            }

            return Ok(());
        };

        match header.verify_adjacent(head) {
            Ok(()) => Ok(()),
            Err(HeaderError::NotAdjacent {
                height,
                expected,
                actual,
            }) => Err(Error::NonAdjacent {
                height,
                expected,
                actual,
            }),
            Err(_) => Err(Error::OutOfOrder {
                expected: head.height().increment(),
                actual: header.height(),
            }),
        }
    }

    /// Buffer a header, flushing the buffer if asked to.
    ///
    /// If the flush fails the header is removed from the buffer again,
    /// so that nothing of it is visible and the same header can be retried.
    async fn stage(
        &self,
        buffer: &mut WriteBuffer,
        header: ExtendedHeader,
        flush: bool,
    ) -> Result<(), Error> {
        buffer.headers.push(header);

        if !flush {
            return Ok(());
        }

        if let Err(e) = self.flush_buffer(buffer).await {
            buffer.headers.pop();
            return Err(e);
        }

        Ok(())
    }

    /// Make a staged header the new head.
    fn publish(&self, header: ExtendedHeader) {
        let height = header.height();
        let hash = header.hash();

        trace!(%height, %hash, "Appending header");

        self.inner
            .index
            .lock()
            .expect("poisoned lock")
            .put(hash, height);

        self.inner
            .cache
            .lock()
            .expect("poisoned lock")
            .put(height, header.clone());

        self.inner.metrics.headers_written.inc();
        self.inner.metrics.head_height.set(height.as_u64() as i64);

        self.inner.head.send_replace(Some(header));
    }

    /// Write every buffered header to the datastore.
    pub async fn flush(&self) -> Result<(), Error> {
        let mut buffer = self.inner.buffer.lock().await;
        self.flush_buffer(&mut buffer).await
    }

    async fn flush_buffer(&self, buffer: &mut WriteBuffer) -> Result<(), Error> {
        let Some(last) = buffer.headers.last() else {
            return Ok(());
        };

        let head = last.height();
        let mut batch = Batch::with_capacity(buffer.headers.len() * 2 + 1);

        for header in &buffer.headers {
            let bytes = header.encode().map_err(Error::InvalidHeader)?;
            let height = keys::encode_height(header.height());

            batch.put(keys::header(header.height()), bytes);
            batch.put(keys::index(&header.hash()), Bytes::copy_from_slice(&height));
        }

        batch.put(keys::head(), Bytes::copy_from_slice(&keys::encode_height(head)));

        let count = buffer.headers.len();

        // On failure the buffer is kept, so that the next flush retries the same headers
        let ds = Arc::clone(&self.inner.ds);
        spawn_blocking(move || ds.put_batch(batch)).await??;
        buffer.headers.clear();

        self.inner.metrics.flushes.inc();
        debug!(%head, count, "Flushed headers to datastore");

        Ok(())
    }

    /// The highest contiguous header, if any.
    pub fn head(&self) -> Option<ExtendedHeader> {
        self.inner.head.borrow().clone()
    }

    /// Height of the head, or [`Height::ZERO`] for an empty store.
    pub fn height(&self) -> Height {
        self.inner
            .head
            .borrow()
            .as_ref()
            .map_or(Height::ZERO, |h| h.height())
    }

    /// Watch the head of the store.
    pub fn subscribe_head(&self) -> watch::Receiver<Option<ExtendedHeader>> {
        self.inner.head.subscribe()
    }

    /// Wait until the head reaches at least the given height.
    pub async fn wait_for_height(&self, height: Height) -> Result<ExtendedHeader, Error> {
        let mut rx = self.subscribe_head();

        let exact = rx
            .wait_for(|head| head.as_ref().is_some_and(|h| h.height() >= height))
            .await
            .map_err(|_| Error::Stopped)?
            .as_ref()
            .filter(|head| head.height() == height)
            .cloned();

        match exact {
            Some(head) => Ok(head),
            None => self.get_by_height(height).await,
        }
    }

    pub async fn get_by_height(&self, height: Height) -> Result<ExtendedHeader, Error> {
        if height.is_zero() || height > self.height() {
            return Err(Error::HeightNotFound(height));
        }

        if let Some(header) = self.inner.cache.lock().expect("poisoned lock").get(&height) {
            self.inner.metrics.cache_hits.inc();
            return Ok(header.clone());
        }

        self.inner.metrics.cache_misses.inc();

        if let Some(header) = self.inner.buffer.lock().await.get(height) {
            return Ok(header.clone());
        }

        let key = keys::header(height);
        let Some(bytes) = self.read(&key).await? else {
            return Err(Error::HeightNotFound(height));
        };

        let header = ExtendedHeader::decode(&bytes).map_err(|e| Error::Corrupted {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        self.inner
            .cache
            .lock()
            .expect("poisoned lock")
            .put(height, header.clone());

        Ok(header)
    }

    pub async fn get_by_hash(&self, hash: &Hash) -> Result<ExtendedHeader, Error> {
        let height = self.height_of(hash).await?;
        self.get_by_height(height).await
    }

    pub async fn has(&self, hash: &Hash) -> Result<bool, Error> {
        match self.height_of(hash).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn height_of(&self, hash: &Hash) -> Result<Height, Error> {
        if let Some(height) = self.inner.index.lock().expect("poisoned lock").get(hash) {
            return Ok(*height);
        }

        if let Some(header) = self.inner.buffer.lock().await.get_by_hash(hash) {
            return Ok(header.height());
        }

        let key = keys::index(hash);
        let Some(bytes) = self.read(&key).await? else {
            return Err(Error::HashNotFound(*hash));
        };

        let height = keys::decode_height(&bytes).ok_or_else(|| Error::Corrupted {
            key: key.to_string(),
            reason: format!("expected 8 bytes, got {}", bytes.len()),
        })?;

        self.inner
            .index
            .lock()
            .expect("poisoned lock")
            .put(*hash, height);

        Ok(height)
    }

    async fn read(&self, key: &Key) -> Result<Option<Bytes>, Error> {
        let ds = Arc::clone(&self.inner.ds);
        let key = key.clone();

        Ok(spawn_blocking(move || ds.get(&key)).await??)
    }

    /// Headers in `from..=to`, in ascending order, stopping at the head.
    pub async fn get_range(&self, from: Height, to: Height) -> Result<Vec<ExtendedHeader>, Error> {
        let to = to.min(self.height());

        if from.is_zero() || from > to {
            return Ok(Vec::new());
        }

        let mut headers = Vec::with_capacity((to.as_u64() - from.as_u64() + 1) as usize);
        let mut height = from;

        while height <= to {
            headers.push(self.get_by_height(height).await?);
            height = height.increment();
        }

        Ok(headers)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.get_mut().ok().and_then(Option::take) {
            flusher.abort();
        }

        let buffered = self.buffer.get_mut().headers.len();
        if buffered > 0 {
            warn!(buffered, "Header store dropped with unflushed headers");
        }
    }
}

async fn flush_periodically(inner: Weak<Inner>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(inner) = inner.upgrade() else {
            return;
        };

        if let Err(e) = (Store { inner }).flush().await {
            error!("Periodic flush of the header store failed: {e}");
        }
    }
}

fn load_head(ds: &dyn Datastore) -> Result<Option<ExtendedHeader>, Error> {
    let key = keys::head();
    let Some(bytes) = ds.get(&key)? else {
        return Ok(None);
    };

    let height = keys::decode_height(&bytes).ok_or_else(|| Error::Corrupted {
        key: key.to_string(),
        reason: format!("expected 8 bytes, got {}", bytes.len()),
    })?;

    let key = keys::header(height);
    let Some(bytes) = ds.get(&key)? else {
        return Err(Error::Corrupted {
            key: key.to_string(),
            reason: format!("head points to missing header at height {height}"),
        });
    };

    let header = ExtendedHeader::decode(&bytes).map_err(|e| Error::Corrupted {
        key: key.to_string(),
        reason: e.to_string(),
    })?;

    Ok(Some(header))
}
