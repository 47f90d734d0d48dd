//! Utilities to make working with directory and file paths easier

use std::slice;
use std::str::FromStr;

use url::Url;
use uuid::Uuid;

use crate::actions::Action;
use crate::{DeltaResult, Engine, Error, FileMeta, Version};

/// How many characters a version tag has
const VERSION_LEN: usize = 20;

/// The number of characters in the uuid part of a staged commit or uuid checkpoint
const UUID_PART_LEN: usize = 36;

/// The subdirectory name within the table root where the delta log resides
const DELTA_LOG_DIR: &str = "_delta_log/";

/// The subdirectory of the delta log where coordinators stage commits before backfill
pub(crate) const STAGED_COMMITS_DIR: &str = "_staged_commits/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LogPathFileType {
    /// A published commit, `_delta_log/{version}.json`
    Commit,
    /// Staged commits are commits with UUID filenames, stored in _delta_log/_staged_commits dir.
    /// Only the commit coordinator knows which of them were ratified.
    StagedCommit,
    /// Any checkpoint flavor (classic, uuid-named or multi-part)
    Checkpoint,
    Crc,
    Unknown,
}

/// A ParsedLogPath is a well-understood path to a file in the _delta_log directory.
///
/// Every parsed log path has a version. And additionally, we implement a 'should_list' method
/// which controls whether or not we include this file in our listing. For example, when we list
/// the _delta_log we may see _staged_commits/00000000000000000000.{uuid}.json, but we MUST NOT
/// include those in listing, as only the commit coordinator can tell us which are valid commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedLogPath<Location: AsUrl = FileMeta> {
    pub location: Location,
    pub filename: String,
    pub extension: String,
    pub version: Version,
    pub file_type: LogPathFileType,
}

// Parses a fixed-length string into the numeric type expected by the caller. A wrong length
// produces an error, even if the parse succeeded.
fn parse_path_part<T: FromStr>(value: &str, expect_len: usize, location: &Url) -> DeltaResult<T> {
    match value.parse() {
        Ok(result) if value.len() == expect_len => Ok(result),
        _ => Err(Error::invalid_log_path(location)),
    }
}

// We normally construct ParsedLogPath from FileMeta, but in testing it's convenient to use
// a Url directly instead. This trait decouples the two.
pub(crate) trait AsUrl {
    fn as_url(&self) -> &Url;
}

impl AsUrl for FileMeta {
    fn as_url(&self) -> &Url {
        &self.location
    }
}

impl AsUrl for Url {
    fn as_url(&self) -> &Url {
        self
    }
}

impl<Location: AsUrl> ParsedLogPath<Location> {
    // NOTE: We can't actually impl TryFrom because Option<T> is a foreign struct even if T is local.
    pub(crate) fn try_from(location: Location) -> DeltaResult<Option<ParsedLogPath<Location>>> {
        let url = location.as_url();
        let mut path_segments = url
            .path_segments()
            .ok_or_else(|| Error::invalid_log_path(url))?;
        let filename = path_segments
            .next_back()
            .ok_or_else(|| Error::invalid_log_path(url))?
            .to_string();
        let subdir = path_segments.next_back();
        if filename.is_empty() {
            return Err(Error::invalid_log_path(url));
        }

        let mut split = filename.split('.');
        let version = split.next().unwrap_or_default();

        // Every valid log path starts with a numeric version part. If version parsing fails, it
        // must not be a log path and we simply return None. However, it is an error if version
        // parsing succeeds for a wrong-length numeric string.
        let version = match version.parse().ok() {
            Some(v) if version.len() == VERSION_LEN => v,
            Some(_) => return Err(Error::invalid_log_path(url)),
            None => return Ok(None),
        };

        // Every valid log path has a file extension as its last part. Return None if it's missing.
        let split: Vec<_> = split.collect();
        let extension = match split.last() {
            Some(extension) => extension.to_string(),
            None => return Ok(None),
        };

        let file_type = match split.as_slice() {
            ["json"] => LogPathFileType::Commit,
            [uuid, "json"] if subdir == Some("_staged_commits") => {
                match parse_path_part::<Uuid>(uuid, UUID_PART_LEN, url) {
                    Ok(_) => LogPathFileType::StagedCommit,
                    Err(_) => LogPathFileType::Unknown,
                }
            }
            ["crc"] => LogPathFileType::Crc,
            ["checkpoint", "parquet"]
            | ["checkpoint", _, "json" | "parquet"]
            | ["checkpoint", _, _, "parquet"] => LogPathFileType::Checkpoint,
            // Unrecognized log paths are allowed, so long as they have a valid version.
            _ => LogPathFileType::Unknown,
        };
        Ok(Some(ParsedLogPath {
            location,
            filename,
            extension,
            version,
            file_type,
        }))
    }

    pub(crate) fn should_list(&self) -> bool {
        !matches!(self.file_type, LogPathFileType::StagedCommit)
    }

    pub(crate) fn is_commit(&self) -> bool {
        matches!(
            self.file_type,
            LogPathFileType::Commit | LogPathFileType::StagedCommit
        )
    }

    pub(crate) fn is_checkpoint(&self) -> bool {
        matches!(self.file_type, LogPathFileType::Checkpoint)
    }

    pub(crate) fn is_unknown(&self) -> bool {
        matches!(self.file_type, LogPathFileType::Unknown)
    }
}

impl ParsedLogPath<FileMeta> {
    /// Read every action in this commit file.
    pub(crate) fn read_actions(&self, engine: &dyn Engine) -> DeltaResult<Vec<Action>> {
        if !self.is_commit() {
            return Err(Error::generic(format!(
                "Only commit files hold actions, got: {:?}",
                self.file_type
            )));
        }
        engine
            .json_handler()
            .read_json_files(slice::from_ref(&self.location))?
            .next()
            .unwrap_or_else(|| Err(Error::internal_error("Commit file read returned no data")))
    }

    /// Extract the In-Commit Timestamp from the CommitInfo action in this commit log file.
    ///
    /// This method performs IO by reading the commit log file from storage. A commit without a
    /// commit info, or whose commit info has no `inCommitTimestamp`, is reported as
    /// [`Error::MissingInCommitTimestamp`]. Callers should handle enablement version checks
    /// before calling this method.
    pub(crate) fn read_in_commit_timestamp(&self, engine: &dyn Engine) -> DeltaResult<i64> {
        self.read_actions(engine)?
            .iter()
            .find_map(Action::as_commit_info)
            .and_then(|commit_info| commit_info.in_commit_timestamp)
            .ok_or(Error::MissingInCommitTimestamp(self.version))
    }
}

/// A wrapper around the `_delta_log` url of a table, used to build the paths commits are
/// written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogRoot(Url);

impl LogRoot {
    /// Create a new LogRoot from the table root URL (e.g. s3://bucket/table/ ->
    /// s3://bucket/table/_delta_log/). The table root must end with '/'.
    pub(crate) fn new(table_root: Url) -> DeltaResult<Self> {
        if !table_root.path().ends_with('/') {
            return Err(Error::invalid_table_location(table_root));
        }
        Ok(Self(table_root.join(DELTA_LOG_DIR)?))
    }

    /// The `_delta_log/` url.
    pub(crate) fn log_url(&self) -> &Url {
        &self.0
    }

    /// The table root this log belongs to.
    pub(crate) fn table_root(&self) -> DeltaResult<Url> {
        Ok(self.0.join("../")?)
    }

    /// Create a new commit path (absolute path) for the given version.
    pub(crate) fn new_commit_path(&self, version: Version) -> DeltaResult<ParsedLogPath<Url>> {
        let filename = format!("{version:020}.json");
        let path = self.0.join(&filename)?;
        ParsedLogPath::try_from(path)?.ok_or_else(|| {
            Error::internal_error(format!("Attempted to create an invalid path: {filename}"))
        })
    }

    /// Create a new, uniquely named staged commit path (absolute path) for the given version.
    pub(crate) fn new_staged_commit_path(
        &self,
        version: Version,
    ) -> DeltaResult<ParsedLogPath<Url>> {
        let uuid = Uuid::new_v4();
        let filename = format!("{version:020}.{uuid}.json");
        let path = self.0.join(STAGED_COMMITS_DIR)?.join(&filename)?;
        let parsed = ParsedLogPath::try_from(path)?;
        match parsed {
            Some(path) if path.file_type == LogPathFileType::StagedCommit => Ok(path),
            _ => Err(Error::internal_error(format!(
                "Attempted to create an invalid staged commit path: {filename}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{
        actions_to_string, add_commit, assert_result_error_with_message, commit_info, protocol,
        setup_test,
    };

    fn table_log_dir_url() -> Url {
        Url::parse("memory:///test-table/_delta_log/").unwrap()
    }

    #[test]
    fn test_unknown_invalid_patterns() {
        let table_log_dir = table_log_dir_url();

        // invalid -- not a file
        let log_path = table_log_dir.join("subdir/").unwrap();
        ParsedLogPath::try_from(log_path).expect_err("directory path");

        // ignored - not versioned
        let log_path = table_log_dir.join("_last_checkpoint").unwrap();
        let log_path = ParsedLogPath::try_from(log_path).unwrap();
        assert!(log_path.is_none());

        // ignored - no extension
        let log_path = table_log_dir.join("00000000000000000010").unwrap();
        assert!(matches!(ParsedLogPath::try_from(log_path), Ok(None)));

        // ignored - version fails to parse
        let log_path = table_log_dir.join("abc.json").unwrap();
        let log_path = ParsedLogPath::try_from(log_path).unwrap();
        assert!(log_path.is_none());

        // invalid - version has too many digits
        let log_path = table_log_dir.join("000000000000000000010.json").unwrap();
        ParsedLogPath::try_from(log_path).expect_err("too many digits");

        // invalid - version has too few digits
        let log_path = table_log_dir.join("0000000000000000010.json").unwrap();
        ParsedLogPath::try_from(log_path).expect_err("too few digits");

        // unknown - many parts
        let log_path = table_log_dir
            .join("00000000000000000010.a.b.c.foo")
            .unwrap();
        let log_path = ParsedLogPath::try_from(log_path).unwrap().unwrap();
        assert_eq!(log_path.extension, "foo");
        assert_eq!(log_path.version, 10);
        assert!(log_path.is_unknown());
    }

    #[test]
    fn test_commit_and_checkpoint_patterns() {
        let table_log_dir = table_log_dir_url();

        let log_path = table_log_dir.join("00000000000000000005.json").unwrap();
        let log_path = ParsedLogPath::try_from(log_path).unwrap().unwrap();
        assert_eq!(log_path.filename, "00000000000000000005.json");
        assert_eq!(log_path.version, 5);
        assert!(log_path.is_commit());
        assert!(log_path.should_list());

        let log_path = table_log_dir.join("00000000000000000005.crc").unwrap();
        let log_path = ParsedLogPath::try_from(log_path).unwrap().unwrap();
        assert_eq!(log_path.file_type, LogPathFileType::Crc);

        for name in [
            "00000000000000000002.checkpoint.parquet",
            "00000000000000000002.checkpoint.3a0d65cd-4056-49b8-937b-95f9e3ee90e5.json",
            "00000000000000000002.checkpoint.0000000001.0000000002.parquet",
        ] {
            let log_path = table_log_dir.join(name).unwrap();
            let log_path = ParsedLogPath::try_from(log_path).unwrap().unwrap();
            assert!(log_path.is_checkpoint(), "{name}");
            assert!(!log_path.is_commit(), "{name}");
        }
    }

    #[test]
    fn test_staged_commit_paths() {
        let table_log_dir = table_log_dir_url();

        let log_path = table_log_dir
            .join("_staged_commits/00000000000000000010.3a0d65cd-4056-49b8-937b-95f9e3ee90e5.json")
            .unwrap();
        let log_path = ParsedLogPath::try_from(log_path).unwrap().unwrap();
        assert_eq!(log_path.version, 10);
        assert_eq!(log_path.file_type, LogPathFileType::StagedCommit);
        assert!(log_path.is_commit());
        assert!(!log_path.should_list());

        // invalid uuid
        let log_path = table_log_dir
            .join("_staged_commits/00000000000000000010.not-a-uuid.json")
            .unwrap();
        let log_path = ParsedLogPath::try_from(log_path).unwrap().unwrap();
        assert!(log_path.is_unknown());

        // outside _staged_commits directory
        let log_path = table_log_dir
            .join("00000000000000000010.3a0d65cd-4056-49b8-937b-95f9e3ee90e5.json")
            .unwrap();
        let log_path = ParsedLogPath::try_from(log_path).unwrap().unwrap();
        assert!(log_path.is_unknown());
        assert!(log_path.should_list());
    }

    #[test]
    fn test_log_root_paths() {
        let table_root = Url::parse("memory:///test-table/").unwrap();
        let log_root = LogRoot::new(table_root.clone()).unwrap();
        assert_eq!(log_root.log_url().as_str(), "memory:///test-table/_delta_log/");
        assert_eq!(log_root.table_root().unwrap(), table_root);

        let commit = log_root.new_commit_path(10).unwrap();
        assert_eq!(commit.filename, "00000000000000000010.json");
        assert_eq!(commit.file_type, LogPathFileType::Commit);

        let staged = log_root.new_staged_commit_path(10).unwrap();
        assert_eq!(staged.version, 10);
        assert!(staged
            .location
            .path()
            .starts_with("/test-table/_delta_log/_staged_commits/00000000000000000010."));
        // staged commit names are unique per attempt
        assert_ne!(staged, log_root.new_staged_commit_path(10).unwrap());

        let no_slash = Url::parse("memory:///test-table").unwrap();
        assert!(matches!(
            LogRoot::new(no_slash),
            Err(Error::InvalidTableLocation(_))
        ));
    }

    #[tokio::test]
    async fn test_read_in_commit_timestamp() {
        let (store, engine, table_root) = setup_test();
        let content = actions_to_string([commit_info(1000, Some(2000)), protocol(true)]);
        add_commit(store.as_ref(), 0, content).await.unwrap();
        let content = actions_to_string([commit_info(1000, None)]);
        add_commit(store.as_ref(), 1, content).await.unwrap();

        let read = |version: Version| {
            let location = LogRoot::new(table_root.clone())
                .unwrap()
                .new_commit_path(version)
                .unwrap()
                .location;
            let file_meta = engine.storage_handler().head(&location).unwrap();
            let path = ParsedLogPath::try_from(file_meta).unwrap().unwrap();
            path.read_in_commit_timestamp(engine.as_ref())
        };

        assert_eq!(read(0).unwrap(), 2000);
        let err = read(1).unwrap_err();
        assert!(matches!(err, Error::MissingInCommitTimestamp(1)));
        assert_result_error_with_message(read(1), "In-Commit Timestamp not found");
    }
}
