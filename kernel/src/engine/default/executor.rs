// The executors own their runtime threads; losing one is unrecoverable for the engine.
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

//! The default engine uses async IO to talk to object stores, while every kernel API (and the
//! commit coordinator contract) is synchronous and blocking. An executor bridges the two by
//! running futures somewhere other than the calling thread and blocking for the result.
//!
//! [TaskExecutor] can be implemented with your preferred async runtime. Behind the `tokio`
//! feature flag there is a single-threaded background executor and one that shares an existing
//! multi-threaded runtime.
use futures::Future;

/// An executor that can be used to run async tasks. This is used by IO functions
/// within the `DefaultEngine`, and by coordinator clients that speak async transports.
///
/// This must be capable of running within an async context and running futures
/// on another thread.
pub trait TaskExecutor: Send + Sync + 'static {
    /// Block on the given future, returning its output.
    ///
    /// This should NOT panic if called within an async context. Thus it can't
    /// be implemented by `tokio::runtime::Runtime::block_on`.
    fn block_on<T>(&self, task: T) -> T::Output
    where
        T: Future + Send + 'static,
        T::Output: Send + 'static;

    /// Run the future in the background.
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

#[cfg(any(feature = "tokio", test))]
pub mod tokio {
    use std::sync::mpsc::{channel, Receiver};

    use futures::future::BoxFuture;
    use futures::Future;
    use tokio::runtime::RuntimeFlavor;
    use tokio::sync::mpsc::error::TrySendError;

    use super::TaskExecutor;

    /// Wrap `task` so its output is delivered over a std channel. The send happens on a blocking
    /// thread so a receiver parked on a runtime worker can never starve the sender.
    fn with_result_channel<T>(task: T) -> (BoxFuture<'static, ()>, Receiver<T::Output>)
    where
        T: Future + Send + 'static,
        T::Output: Send + 'static,
    {
        let (sender, receiver) = channel::<T::Output>();
        let fut = Box::pin(async move {
            let output = task.await;
            tokio::task::spawn_blocking(move || {
                sender.send(output).ok();
            })
            .await
            .unwrap();
        });
        (fut, receiver)
    }

    /// A [`TaskExecutor`] that uses the tokio single-threaded runtime in a
    /// background thread to service tasks.
    #[derive(Debug)]
    pub struct TokioBackgroundExecutor {
        sender: tokio::sync::mpsc::Sender<BoxFuture<'static, ()>>,
        _thread: std::thread::JoinHandle<()>,
    }

    impl Default for TokioBackgroundExecutor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TokioBackgroundExecutor {
        pub fn new() -> Self {
            let (sender, mut receiver) = tokio::sync::mpsc::channel::<BoxFuture<'_, ()>>(50);
            let thread = std::thread::Builder::new()
                .name("cc-kernel-io".to_string())
                .spawn(move || {
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .unwrap();
                    rt.block_on(async move {
                        while let Some(task) = receiver.recv().await {
                            tokio::task::spawn(task);
                        }
                    });
                })
                .expect("failed to spawn executor thread");
            Self {
                sender,
                _thread: thread,
            }
        }

        // `blocking_send()` panics inside an async context, so spin on `try_send` instead.
        fn send_future(&self, fut: BoxFuture<'static, ()>) {
            let mut pending = fut;
            loop {
                match self.sender.try_send(pending) {
                    Ok(()) => return,
                    Err(TrySendError::Full(original)) => {
                        std::thread::yield_now();
                        pending = original;
                    }
                    Err(TrySendError::Closed(_)) => {
                        panic!("TokioBackgroundExecutor channel closed")
                    }
                }
            }
        }
    }

    impl TaskExecutor for TokioBackgroundExecutor {
        fn block_on<T>(&self, task: T) -> T::Output
        where
            T: Future + Send + 'static,
            T::Output: Send + 'static,
        {
            let (fut, receiver) = with_result_channel(task);
            self.send_future(fut);
            receiver
                .recv()
                .expect("TokioBackgroundExecutor has crashed")
        }

        fn spawn<F>(&self, task: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            self.send_future(Box::pin(task));
        }
    }

    /// A [`TaskExecutor`] that uses the tokio multi-threaded runtime. You can
    /// create one based on a handle to an existing runtime, so it can share
    /// the runtime with other parts of your application.
    #[derive(Debug)]
    pub struct TokioMultiThreadExecutor {
        handle: tokio::runtime::Handle,
    }

    impl TokioMultiThreadExecutor {
        pub fn new(handle: tokio::runtime::Handle) -> Self {
            assert_eq!(
                handle.runtime_flavor(),
                RuntimeFlavor::MultiThread,
                "TokioExecutor must be created with a multi-threaded runtime"
            );
            Self { handle }
        }
    }

    impl TaskExecutor for TokioMultiThreadExecutor {
        // Concurrent `block_on` calls beyond tokio's `max_blocking_threads` can deadlock, since
        // each one parks a worker in `block_in_place`.
        fn block_on<T>(&self, task: T) -> T::Output
        where
            T: Future + Send + 'static,
            T::Output: Send + 'static,
        {
            let (fut, receiver) = with_result_channel(task);
            self.handle.spawn(fut);
            let recv = || {
                receiver
                    .recv()
                    .expect("TokioMultiThreadExecutor has crashed")
            };
            // Off-runtime callers (plain threads) can block directly; runtime workers must
            // announce it so their queued tasks can be stolen.
            match tokio::runtime::Handle::try_current() {
                Ok(_) => tokio::task::block_in_place(recv),
                Err(_) => recv(),
            }
        }

        fn spawn<F>(&self, task: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            self.handle.spawn(task);
        }
    }

}
