//! # The Default Engine
//!
//! The default implementation of [`Engine`] is [`DefaultEngine`], which performs all IO through
//! an [`object_store`] store.
//!
//! The underlying implementations use asynchronous IO. Async tasks are run on
//! a separate thread pool, provided by the [`TaskExecutor`] trait. Read more in
//! the [executor] module.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt as _};
use object_store::DynObjectStore;

use self::executor::TaskExecutor;
use self::filesystem::ObjectStoreStorageHandler;
use self::json::DefaultJsonHandler;
use crate::config::{ConfigurationProvider, EmptyConfigurationProvider};
use crate::metrics::MetricsReporter;
use crate::{DeltaResult, Engine, JsonHandler, StorageHandler};

pub mod executor;
pub mod filesystem;
pub mod json;

/// Converts a Stream-producing future to a synchronous iterator.
///
/// This method performs the initial blocking call to extract the stream from the future, and each
/// subsequent call to `next` on the iterator translates to a blocking `stream.next()` call, using
/// the provided `task_executor`. Buffered streams allow concurrency in the form of prefetching,
/// because that initial call will attempt to populate the N buffer slots.
pub(crate) fn stream_future_to_iter<T: Send + 'static, E: TaskExecutor>(
    task_executor: Arc<E>,
    stream_future: impl Future<Output = DeltaResult<BoxStream<'static, T>>> + Send + 'static,
) -> DeltaResult<Box<dyn Iterator<Item = T> + Send>> {
    Ok(Box::new(BlockingStreamIterator {
        stream: Some(task_executor.block_on(stream_future)?),
        task_executor,
    }))
}

struct BlockingStreamIterator<T: Send + 'static, E: TaskExecutor> {
    stream: Option<BoxStream<'static, T>>,
    task_executor: Arc<E>,
}

impl<T: Send + 'static, E: TaskExecutor> Iterator for BlockingStreamIterator<T, E> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        // Move the stream into the future so we can block on it.
        let mut stream = self.stream.take()?;
        let (item, stream) = self
            .task_executor
            .block_on(async move { (stream.next().await, stream) });

        // We must not poll an exhausted stream after it returned None.
        if item.is_some() {
            self.stream = Some(stream);
        }

        item
    }
}

#[derive(Debug)]
pub struct DefaultEngine<E: TaskExecutor> {
    object_store: Arc<DynObjectStore>,
    storage: Arc<ObjectStoreStorageHandler<E>>,
    json: Arc<DefaultJsonHandler<E>>,
    configuration: Arc<dyn ConfigurationProvider>,
    metrics_reporter: Option<Arc<dyn MetricsReporter>>,
}

#[cfg(any(feature = "tokio", test))]
impl DefaultEngine<executor::tokio::TokioBackgroundExecutor> {
    /// Create a new [`DefaultEngine`] instance with the default executor, no configuration and
    /// no metrics reporter. Use [`DefaultEngine::builder`] for anything else.
    ///
    /// # Parameters
    ///
    /// - `object_store`: The object store to use.
    pub fn new(object_store: Arc<DynObjectStore>) -> Self {
        Self::builder(object_store).build()
    }

    /// Start building a [`DefaultEngine`] on the default executor.
    pub fn builder(
        object_store: Arc<DynObjectStore>,
    ) -> DefaultEngineBuilder<executor::tokio::TokioBackgroundExecutor> {
        DefaultEngineBuilder::new(
            object_store,
            Arc::new(executor::tokio::TokioBackgroundExecutor::new()),
        )
    }
}

impl<E: TaskExecutor> DefaultEngine<E> {
    /// Create a new [`DefaultEngine`] instance with a custom executor.
    ///
    /// # Parameters
    ///
    /// - `object_store`: The object store to use.
    /// - `task_executor`: Used to spawn async IO tasks. See [executor::TaskExecutor].
    pub fn new_with_executor(object_store: Arc<DynObjectStore>, task_executor: Arc<E>) -> Self {
        DefaultEngineBuilder::new(object_store, task_executor).build()
    }

    /// The object store all IO goes through.
    pub fn object_store(&self) -> Arc<DynObjectStore> {
        self.object_store.clone()
    }
}

impl<E: TaskExecutor> Engine for DefaultEngine<E> {
    fn storage_handler(&self) -> Arc<dyn StorageHandler> {
        self.storage.clone()
    }

    fn json_handler(&self) -> Arc<dyn JsonHandler> {
        self.json.clone()
    }

    fn configuration(&self) -> Arc<dyn ConfigurationProvider> {
        self.configuration.clone()
    }

    fn get_metrics_reporter(&self) -> Option<Arc<dyn MetricsReporter>> {
        self.metrics_reporter.clone()
    }
}

/// Builder for [`DefaultEngine`]s that need engine configuration (e.g. commit coordinator
/// builder mappings) or a metrics reporter.
#[derive(Debug)]
pub struct DefaultEngineBuilder<E: TaskExecutor> {
    object_store: Arc<DynObjectStore>,
    task_executor: Arc<E>,
    configuration: Arc<dyn ConfigurationProvider>,
    metrics_reporter: Option<Arc<dyn MetricsReporter>>,
}

impl<E: TaskExecutor> DefaultEngineBuilder<E> {
    pub fn new(object_store: Arc<DynObjectStore>, task_executor: Arc<E>) -> Self {
        Self {
            object_store,
            task_executor,
            configuration: Arc::new(EmptyConfigurationProvider),
            metrics_reporter: None,
        }
    }

    /// Set the configuration the engine exposes through [`Engine::configuration`].
    pub fn with_configuration(mut self, configuration: Arc<dyn ConfigurationProvider>) -> Self {
        self.configuration = configuration;
        self
    }

    /// Set a metrics reporter for the engine to collect events and metrics during operations.
    /// The storage handler reports through it as well.
    pub fn with_metrics_reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.metrics_reporter = Some(reporter);
        self
    }

    pub fn build(self) -> DefaultEngine<E> {
        DefaultEngine {
            storage: Arc::new(ObjectStoreStorageHandler::new(
                self.object_store.clone(),
                self.task_executor.clone(),
                self.metrics_reporter.clone(),
            )),
            json: Arc::new(DefaultJsonHandler::new(
                self.object_store.clone(),
                self.task_executor,
            )),
            object_store: self.object_store,
            configuration: self.configuration,
            metrics_reporter: self.metrics_reporter,
        }
    }
}
