use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumCount, EnumString};

/// Table features represent protocol capabilities required to correctly read or write a given table.
/// - Readers must implement all features required for correct table reads.
/// - Writers must implement all features required for correct table writes.
///
/// Only the features that matter to commit coordination are named here. Anything else a table
/// lists parses as [`TableFeature::Unknown`], which writers refuse (see
/// [`SUPPORTED_WRITER_FEATURES`]).
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Eq,
    PartialEq,
    EnumString,
    StrumDisplay,
    AsRefStr,
    EnumCount,
    Hash,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum TableFeature {
    //////////////////////////
    // Writer-only features //
    //////////////////////////
    /// Append Only Tables
    AppendOnly,
    /// Table invariants
    Invariants,
    /// Monotonically increasing timestamps in the CommitInfo
    InCommitTimestamp,
    /// domain specific metadata
    DomainMetadata,
    /// Commits are ratified by an external commit coordinator before they are backfilled into
    /// `_delta_log`
    #[strum(serialize = "coordinatedCommits-preview")]
    #[serde(rename = "coordinatedCommits-preview")]
    CoordinatedCommitsPreview,

    ///////////////////////////
    // ReaderWriter features //
    ///////////////////////////
    /// Deletion vectors for merge, update, delete
    DeletionVectors,
    /// version 2 of checkpointing
    V2Checkpoint,
    /// vacuumProtocolCheck ReaderWriter feature ensures consistent application of reader and writer
    /// protocol checks during VACUUM operations
    VacuumProtocolCheck,

    #[serde(untagged)]
    #[strum(default)]
    Unknown(String),
}

/// Classifies table features by their type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeatureType {
    /// Feature only affects write operations
    Writer,
    /// Feature affects both read and write operations (must appear in both feature lists)
    ReaderWriter,
    /// Unknown feature type (for forward compatibility)
    Unknown,
}

impl TableFeature {
    pub(crate) fn feature_type(&self) -> FeatureType {
        match self {
            TableFeature::DeletionVectors
            | TableFeature::V2Checkpoint
            | TableFeature::VacuumProtocolCheck => FeatureType::ReaderWriter,
            TableFeature::AppendOnly
            | TableFeature::Invariants
            | TableFeature::InCommitTimestamp
            | TableFeature::DomainMetadata
            | TableFeature::CoordinatedCommitsPreview => FeatureType::Writer,
            TableFeature::Unknown(_) => FeatureType::Unknown,
        }
    }

    pub(crate) fn unknown(s: impl ToString) -> Self {
        TableFeature::Unknown(s.to_string())
    }
}

/// Writers only append commit-level actions, so every named feature except `AppendOnly`'s data
/// restrictions is trivially honored. Unknown features are refused.
pub(crate) static SUPPORTED_WRITER_FEATURES: LazyLock<Vec<TableFeature>> = LazyLock::new(|| {
    vec![
        TableFeature::AppendOnly,
        TableFeature::CoordinatedCommitsPreview,
        TableFeature::DeletionVectors,
        TableFeature::DomainMetadata,
        TableFeature::InCommitTimestamp,
        TableFeature::Invariants,
        TableFeature::V2Checkpoint,
        TableFeature::VacuumProtocolCheck,
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_features() {
        let mixed_writer = &[
            TableFeature::InCommitTimestamp,
            TableFeature::unknown("cool_feature"),
            TableFeature::CoordinatedCommitsPreview,
        ];

        let writer_string = serde_json::to_string(mixed_writer).unwrap();
        assert_eq!(
            &writer_string,
            "[\"inCommitTimestamp\",\"cool_feature\",\"coordinatedCommits-preview\"]"
        );

        let typed_writer: Vec<TableFeature> = serde_json::from_str(&writer_string).unwrap();
        assert_eq!(&typed_writer, mixed_writer);
        assert_eq!(typed_writer[1].feature_type(), FeatureType::Unknown);
    }

    #[test]
    fn test_roundtrip_table_features() {
        let cases = [
            (TableFeature::AppendOnly, "appendOnly"),
            (TableFeature::Invariants, "invariants"),
            (TableFeature::InCommitTimestamp, "inCommitTimestamp"),
            (TableFeature::DomainMetadata, "domainMetadata"),
            (
                TableFeature::CoordinatedCommitsPreview,
                "coordinatedCommits-preview",
            ),
            (TableFeature::DeletionVectors, "deletionVectors"),
            (TableFeature::V2Checkpoint, "v2Checkpoint"),
            (TableFeature::VacuumProtocolCheck, "vacuumProtocolCheck"),
            (TableFeature::unknown("something"), "something"),
        ];

        assert_eq!(TableFeature::COUNT, cases.len());

        for (feature, expected) in cases {
            assert_eq!(feature.to_string(), expected);
            let serialized = serde_json::to_string(&feature).unwrap();
            assert_eq!(serialized, format!("\"{expected}\""));

            let deserialized: TableFeature = serde_json::from_str(&serialized).unwrap();
            assert_eq!(deserialized, feature);

            let from_str: TableFeature = expected.parse().unwrap();
            assert_eq!(from_str, feature);
        }
    }
}
