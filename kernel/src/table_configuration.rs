//! This module defines [`TableConfiguration`], a high level api to check feature support and
//! feature enablement for a table at a given version. This encapsulates [`Protocol`], [`Metadata`]
//! and [`TableProperties`]. These structs in isolation should be considered raw and unvalidated if
//! they are not a part of [`TableConfiguration`]. For example: to check that in-commit timestamps
//! are enabled, you must check both the protocol's writer features and the
//! `delta.enableInCommitTimestamps` table property.
use std::collections::HashMap;

use url::Url;

use crate::actions::{Metadata, Protocol};
use crate::table_features::TableFeature;
use crate::table_properties::{
    TableProperties, COORDINATED_COMMITS_COORDINATOR_CONF, COORDINATED_COMMITS_TABLE_CONF,
};
use crate::{DeltaResult, Error, Version};

/// Information about in-commit timestamp enablement state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InCommitTimestampEnablement {
    /// In-commit timestamps is not enabled
    NotEnabled,
    /// In-commit timestamps is enabled
    Enabled {
        /// Enablement information, if available. `None` indicates the table was created
        /// with ICT enabled from the beginning (no enablement properties needed).
        enablement: Option<(Version, i64)>,
    },
}

/// The coordinated-commits settings of a table, read from its metadata configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CoordinatedCommitsConfig<'a> {
    /// Registry name of the coordinator
    pub(crate) coordinator_name: &'a str,
    /// Backend configuration handed to the coordinator builder
    pub(crate) coordinator_conf: HashMap<String, String>,
    /// Per-table coordinator state
    pub(crate) table_conf: HashMap<String, String>,
}

/// Holds all the configuration for a table at a specific version: protocol, metadata, parsed
/// table properties, table root and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableConfiguration {
    metadata: Metadata,
    protocol: Protocol,
    table_properties: TableProperties,
    table_root: Url,
    version: Version,
}

impl TableConfiguration {
    /// Constructs a [`TableConfiguration`] for a table located in `table_root` at `version`.
    pub(crate) fn try_new(
        metadata: Metadata,
        protocol: Protocol,
        table_root: Url,
        version: Version,
    ) -> DeltaResult<Self> {
        let table_properties = metadata.parse_table_properties();
        Ok(Self {
            metadata,
            protocol,
            table_properties,
            table_root,
            version,
        })
    }

    pub(crate) fn try_new_from(
        table_configuration: &Self,
        new_metadata: Option<Metadata>,
        new_protocol: Option<Protocol>,
        new_version: Version,
    ) -> DeltaResult<Self> {
        // simplest case: no new P/M, just return the existing table configuration with new version
        if new_metadata.is_none() && new_protocol.is_none() {
            return Ok(Self {
                version: new_version,
                ..table_configuration.clone()
            });
        }

        Self::try_new(
            new_metadata.unwrap_or_else(|| table_configuration.metadata.clone()),
            new_protocol.unwrap_or_else(|| table_configuration.protocol.clone()),
            table_configuration.table_root.clone(),
            new_version,
        )
    }

    /// The [`Metadata`] for this table at this version.
    pub(crate) fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The [`Protocol`] of this table at this version.
    pub(crate) fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// The [`TableProperties`] of this table at this version.
    pub(crate) fn table_properties(&self) -> &TableProperties {
        &self.table_properties
    }

    /// The [`Url`] of the table this [`TableConfiguration`] belongs to
    pub(crate) fn table_root(&self) -> &Url {
        &self.table_root
    }

    /// The [`Version`] which this [`TableConfiguration`] belongs to.
    pub(crate) fn version(&self) -> Version {
        self.version
    }

    /// Returns `Ok` if the kernel supports writing to this table.
    pub(crate) fn ensure_write_supported(&self) -> DeltaResult<()> {
        self.protocol.ensure_write_supported()
    }

    /// Returns `true` if the table supports writing in-commit timestamps.
    ///
    /// To support this feature the table must:
    /// - Have a min_writer_version of 7
    /// - Have the [`TableFeature::InCommitTimestamp`] writer feature.
    pub(crate) fn is_in_commit_timestamps_supported(&self) -> bool {
        self.protocol().min_writer_version() == 7
            && self
                .protocol()
                .has_table_feature(&TableFeature::InCommitTimestamp)
    }

    /// Returns `true` if in-commit timestamps is supported and it is enabled. In-commit timestamps
    /// is enabled when the `delta.enableInCommitTimestamps` configuration is set to `true`.
    pub(crate) fn is_in_commit_timestamps_enabled(&self) -> bool {
        self.is_in_commit_timestamps_supported()
            && self
                .table_properties()
                .enable_in_commit_timestamps
                .unwrap_or(false)
    }

    /// Returns information about in-commit timestamp enablement state.
    ///
    /// Returns an error if only one of the enablement properties is present, as this indicates
    /// an inconsistent state.
    pub(crate) fn in_commit_timestamp_enablement(
        &self,
    ) -> DeltaResult<InCommitTimestampEnablement> {
        if !self.is_in_commit_timestamps_enabled() {
            return Ok(InCommitTimestampEnablement::NotEnabled);
        }

        let enablement_version = self
            .table_properties()
            .in_commit_timestamp_enablement_version;
        let enablement_timestamp = self
            .table_properties()
            .in_commit_timestamp_enablement_timestamp;

        match (enablement_version, enablement_timestamp) {
            (Some(version), Some(timestamp)) => Ok(InCommitTimestampEnablement::Enabled {
                enablement: Some((version, timestamp)),
            }),
            (Some(_), None) => Err(Error::generic(
                "In-commit timestamp enabled, but enablement timestamp is missing",
            )),
            (None, Some(_)) => Err(Error::generic(
                "In-commit timestamp enabled, but enablement version is missing",
            )),
            // If InCommitTimestamps was enabled at the beginning of the table's history,
            // it may have an empty enablement version and timestamp
            (None, None) => Ok(InCommitTimestampEnablement::Enabled { enablement: None }),
        }
    }

    /// Whether a commit coordinator owns this table's commits.
    pub(crate) fn is_coordinated_commits_enabled(&self) -> bool {
        self.table_properties()
            .coordinated_commits_commit_coordinator
            .is_some()
    }

    /// The coordinated-commits settings, or `None` when no coordinator name is configured and
    /// commits go straight to the filesystem. The backend and table configurations default to
    /// empty maps when absent, and fail when they are not JSON objects of strings.
    pub(crate) fn coordinated_commits_config(
        &self,
    ) -> DeltaResult<Option<CoordinatedCommitsConfig<'_>>> {
        let props = self.table_properties();
        let Some(coordinator_name) = props.coordinated_commits_commit_coordinator.as_deref()
        else {
            return Ok(None);
        };
        Ok(Some(CoordinatedCommitsConfig {
            coordinator_name,
            coordinator_conf: parse_conf(
                COORDINATED_COMMITS_COORDINATOR_CONF,
                props.coordinated_commits_commit_coordinator_conf.as_deref(),
            )?,
            table_conf: parse_conf(
                COORDINATED_COMMITS_TABLE_CONF,
                props.coordinated_commits_table_conf.as_deref(),
            )?,
        }))
    }
}

fn parse_conf(key: &str, value: Option<&str>) -> DeltaResult<HashMap<String, String>> {
    let Some(value) = value else {
        return Ok(HashMap::new());
    };
    serde_json::from_str(value).map_err(|e| {
        Error::invalid_coordinated_commits_config(format!(
            "{key} must be a JSON object of strings, got {value:?}: {e}"
        ))
    })
}
