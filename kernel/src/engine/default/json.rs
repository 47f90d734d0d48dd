//! Default Json handler implementation

use std::sync::Arc;

use bytes::{BufMut as _, Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use object_store::path::Path;
use object_store::{DynObjectStore, PutMode};
use tracing::debug;
use url::Url;

use super::executor::TaskExecutor;
use crate::actions::Action;
use crate::{DeltaResult, Error, FileMeta, JsonHandler};

/// Reads and writes newline-delimited JSON commit files through an object store.
#[derive(Debug)]
pub struct DefaultJsonHandler<E: TaskExecutor> {
    /// The object store to read files from
    store: Arc<DynObjectStore>,
    /// The executor to run async tasks on
    task_executor: Arc<E>,
    /// The maximum number of files to read in parallel
    readahead: usize,
}

impl<E: TaskExecutor> DefaultJsonHandler<E> {
    pub fn new(store: Arc<DynObjectStore>, task_executor: Arc<E>) -> Self {
        Self {
            store,
            task_executor,
            readahead: 10,
        }
    }

    /// Set the maximum number of files to read in parallel.
    ///
    /// Results are still returned in the order the files were requested.
    pub fn with_readahead(mut self, readahead: usize) -> Self {
        self.readahead = readahead;
        self
    }
}

/// Parse one commit file. Blank lines are skipped; anything else must be a JSON action.
pub(crate) fn parse_json_actions(bytes: &[u8], location: &Url) -> DeltaResult<Vec<Action>> {
    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(|line| {
            serde_json::from_slice(line).map_err(|e| {
                Error::generic(format!("Failed to parse commit file {location}: {e}"))
            })
        })
        .collect()
}

/// Serialize actions one per line, each line terminated by '\n'.
pub(crate) fn to_json_bytes(
    actions: impl Iterator<Item = DeltaResult<Action>>,
) -> DeltaResult<Bytes> {
    let mut writer = BytesMut::new().writer();
    for action in actions {
        serde_json::to_writer(&mut writer, &action?)?;
        std::io::Write::write_all(&mut writer, b"\n")?;
    }
    Ok(writer.into_inner().freeze())
}

async fn read_json_files_impl(
    store: Arc<DynObjectStore>,
    files: Vec<FileMeta>,
    readahead: usize,
) -> DeltaResult<BoxStream<'static, DeltaResult<Vec<Action>>>> {
    let reads = stream::iter(files).map(move |file| {
        let store = store.clone();
        async move {
            let path = Path::from_url_path(file.location.path())?;
            let bytes = store.get(&path).await?.bytes().await?;
            parse_json_actions(&bytes, &file.location)
        }
    });
    // `buffered` keeps request order while running up to `readahead` reads concurrently
    Ok(reads.buffered(readahead).boxed())
}

impl<E: TaskExecutor> JsonHandler for DefaultJsonHandler<E> {
    fn read_json_files(
        &self,
        files: &[FileMeta],
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<Vec<Action>>> + Send>> {
        if files.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }
        let future = read_json_files_impl(self.store.clone(), files.to_vec(), self.readahead);
        super::stream_future_to_iter(self.task_executor.clone(), future)
    }

    fn write_json_file(
        &self,
        path: &Url,
        data: Box<dyn Iterator<Item = DeltaResult<Action>> + Send + '_>,
        overwrite: bool,
    ) -> DeltaResult<()> {
        let buffer = to_json_bytes(data)?;
        let put_mode = if overwrite {
            PutMode::Overwrite
        } else {
            PutMode::Create
        };

        let store = self.store.clone(); // cheap Arc
        let path = Path::from_url_path(path.path())?;
        let path_str = path.to_string();
        let result = self.task_executor.block_on(async move {
            store
                .put_opts(&path, buffer.into(), put_mode.into())
                .await
        });
        result.map_err(|e| match e {
            object_store::Error::AlreadyExists { .. } => Error::FileAlreadyExists(path_str.clone()),
            e => e.into(),
        })?;
        debug!("wrote json file {path_str}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use object_store::memory::InMemory;
    use object_store::ObjectStore;
    use serde_json::json;

    use super::*;
    use crate::actions::CommitInfo;
    use crate::engine::default::executor::tokio::TokioBackgroundExecutor;

    fn handler(store: Arc<InMemory>) -> DefaultJsonHandler<TokioBackgroundExecutor> {
        DefaultJsonHandler::new(store, Arc::new(TokioBackgroundExecutor::new()))
    }

    #[test]
    fn test_parse_json_actions() {
        let url = Url::parse("memory:///_delta_log/00000000000000000000.json").unwrap();
        let data = b"{\"commitInfo\":{\"timestamp\":1}}\n\n{\"add\":{\"path\":\"a\"}}\n";
        let actions = parse_json_actions(data, &url).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions[0].as_commit_info().is_some());
        assert_eq!(actions[1], Action::Other(json!({"add": {"path": "a"}})));

        let err = parse_json_actions(b"{not json", &url).unwrap_err();
        assert!(err.to_string().contains("00000000000000000000.json"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = Arc::new(InMemory::new());
        let handler = handler(store.clone());
        let url = Url::parse("memory:///_delta_log/00000000000000000001.json").unwrap();
        let actions = vec![
            Action::CommitInfo(CommitInfo {
                timestamp: Some(5),
                ..Default::default()
            }),
            Action::Other(json!({"txn": {"appId": "a", "version": 1}})),
        ];

        handler
            .write_json_file(&url, Box::new(actions.clone().into_iter().map(Ok)), false)
            .unwrap();

        let raw = store
            .get(&Path::from("_delta_log/00000000000000000001.json"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(raw.iter().filter(|b| **b == b'\n').count(), 2);

        let meta = FileMeta::new(url.clone(), 0, raw.len() as u64);
        let read: Vec<_> = handler
            .read_json_files(&[meta])
            .unwrap()
            .try_collect()
            .unwrap();
        assert_eq!(read, vec![actions]);

        // create-if-absent unless asked to overwrite
        let again = handler.write_json_file(&url, Box::new(std::iter::empty()), false);
        assert!(matches!(again, Err(Error::FileAlreadyExists(_))));
        handler
            .write_json_file(&url, Box::new(std::iter::empty()), true)
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_preserves_order() {
        let store = Arc::new(InMemory::new());
        let handler = handler(store.clone()).with_readahead(3);
        let files: Vec<_> = (0..5u64)
            .map(|v| {
                Url::parse(&format!("memory:///_delta_log/{v:020}.json"))
                    .map(|url| FileMeta::new(url, 0, 0))
                    .unwrap()
            })
            .collect();
        for (v, file) in files.iter().enumerate() {
            let commit_info = CommitInfo {
                timestamp: Some(v as i64),
                ..Default::default()
            };
            handler
                .write_json_file(
                    &file.location,
                    Box::new(std::iter::once(Ok(commit_info.into()))),
                    false,
                )
                .unwrap();
        }

        let timestamps: Vec<_> = handler
            .read_json_files(&files)
            .unwrap()
            .map_ok(|actions| actions[0].as_commit_info().unwrap().timestamp.unwrap())
            .try_collect()
            .unwrap();
        assert_eq!(timestamps, vec![0, 1, 2, 3, 4]);
    }
}
