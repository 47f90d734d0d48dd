use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use itertools::Itertools;
use object_store::path::Path;
use object_store::{DynObjectStore, PutMode};
use tracing::debug;
use url::Url;

use crate::engine::default::executor::TaskExecutor;
use crate::metrics::{MetricEvent, MetricsReporter};
use crate::{DeltaResult, Error, FileMeta, StorageHandler};

/// Listing stream wrapper that reports `StorageListCompleted` once, when the listing is
/// exhausted or dropped.
struct ReportingListStream<S> {
    inner: S,
    reporter: Option<Arc<dyn MetricsReporter>>,
    start: Instant,
    num_files: u64,
}

impl<S> ReportingListStream<S> {
    fn new(inner: S, reporter: Option<Arc<dyn MetricsReporter>>, start: Instant) -> Self {
        Self {
            inner,
            reporter,
            start,
            num_files: 0,
        }
    }

    fn report_once(&mut self) {
        if let Some(r) = self.reporter.take() {
            r.report(MetricEvent::StorageListCompleted {
                duration: self.start.elapsed(),
                num_files: self.num_files,
            });
        }
    }
}

impl<S> Drop for ReportingListStream<S> {
    fn drop(&mut self) {
        self.report_once();
    }
}

impl<S> Stream for ReportingListStream<S>
where
    S: Stream<Item = DeltaResult<FileMeta>> + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match futures::ready!(Pin::new(&mut self.inner).poll_next(cx)) {
            Some(item) => {
                if item.is_ok() {
                    self.num_files += 1;
                }
                Poll::Ready(Some(item))
            }
            None => {
                self.report_once();
                Poll::Ready(None)
            }
        }
    }
}

#[derive(Debug)]
pub struct ObjectStoreStorageHandler<E: TaskExecutor> {
    inner: Arc<DynObjectStore>,
    task_executor: Arc<E>,
    reporter: Option<Arc<dyn MetricsReporter>>,
}

impl<E: TaskExecutor> ObjectStoreStorageHandler<E> {
    pub(crate) fn new(
        store: Arc<DynObjectStore>,
        task_executor: Arc<E>,
        reporter: Option<Arc<dyn MetricsReporter>>,
    ) -> Self {
        Self {
            inner: store,
            task_executor,
            reporter,
        }
    }
}

async fn list_from_impl(
    store: Arc<DynObjectStore>,
    path: Url,
    reporter: Option<Arc<dyn MetricsReporter>>,
) -> DeltaResult<BoxStream<'static, DeltaResult<FileMeta>>> {
    let start = Instant::now();

    // The offset is used for list-after; the prefix is used to restrict the listing to a specific
    // directory. `Path` strips trailing '/', so directory-ness is read off the original URL.
    let offset = Path::from_url_path(path.path())?;
    let prefix = if path.path().ends_with('/') {
        offset.clone()
    } else {
        let mut parts = offset.parts().collect_vec();
        if parts.pop().is_none() {
            return Err(Error::Generic(format!(
                "Offset path must not be a root directory. Got: '{path}'",
            )));
        }
        Path::from_iter(parts)
    };

    // object_store makes no ordering promise, but every cloud store lists lexicographically.
    // The local filesystem does not, so that listing is collected and sorted.
    let has_ordered_listing = path.scheme() != "file";

    let stream = store
        .list_with_offset(Some(&prefix), &offset)
        .map(move |meta| {
            let meta = meta?;
            let mut location = path.clone();
            location.set_path(&format!("/{}", meta.location.as_ref()));
            Ok(FileMeta {
                location,
                last_modified: meta.last_modified.timestamp_millis(),
                size: meta.size,
            })
        });

    if has_ordered_listing {
        return Ok(Box::pin(ReportingListStream::new(stream, reporter, start)));
    }

    let mut items: Vec<_> = stream.try_collect().await?;
    items.sort_unstable();
    if let Some(r) = reporter {
        r.report(MetricEvent::StorageListCompleted {
            duration: start.elapsed(),
            num_files: items.len() as u64,
        });
    }
    Ok(Box::pin(stream::iter(items.into_iter().map(Ok))))
}

async fn copy_atomic_impl(
    store: Arc<DynObjectStore>,
    src_path: Path,
    dest_path: Path,
    reporter: Option<Arc<dyn MetricsReporter>>,
) -> DeltaResult<()> {
    let start = Instant::now();

    // GET then PUT-if-absent. The pair is not atomic, but the source is an immutable log file so
    // it cannot change underneath us; only the destination create needs to be atomic.
    let data = store.get(&src_path).await?.bytes().await?;
    let result = store
        .put_opts(&dest_path, data.into(), PutMode::Create.into())
        .await;

    if let Some(r) = reporter {
        r.report(MetricEvent::StorageCopyCompleted {
            duration: start.elapsed(),
        });
    }

    result.map_err(|e| match e {
        object_store::Error::AlreadyExists { .. } => {
            Error::FileAlreadyExists(dest_path.to_string())
        }
        e => e.into(),
    })?;
    debug!("copied {src_path} to {dest_path}");
    Ok(())
}

async fn head_impl(store: Arc<DynObjectStore>, url: Url) -> DeltaResult<FileMeta> {
    let meta = store.head(&Path::from_url_path(url.path())?).await?;
    Ok(FileMeta {
        location: url,
        last_modified: meta.last_modified.timestamp_millis(),
        size: meta.size,
    })
}

impl<E: TaskExecutor> StorageHandler for ObjectStoreStorageHandler<E> {
    fn list_from(
        &self,
        path: &Url,
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<FileMeta>>>> {
        let future = list_from_impl(self.inner.clone(), path.clone(), self.reporter.clone());
        let iter = super::stream_future_to_iter(self.task_executor.clone(), future)?;
        Ok(iter) // type coercion drops the unneeded Send bound
    }

    fn copy_atomic(&self, src: &Url, dest: &Url) -> DeltaResult<()> {
        let src_path = Path::from_url_path(src.path())?;
        let dest_path = Path::from_url_path(dest.path())?;
        let future = copy_atomic_impl(
            self.inner.clone(),
            src_path,
            dest_path,
            self.reporter.clone(),
        );
        self.task_executor.block_on(future)
    }

    fn head(&self, path: &Url) -> DeltaResult<FileMeta> {
        let future = head_impl(self.inner.clone(), path.clone());
        self.task_executor.block_on(future)
    }
}
