//! The process-wide mapping from coordinator names to the builders that create their clients.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, OnceLock, RwLock};

use itertools::Itertools;
use tracing::debug;

use super::CommitCoordinatorClient;
use crate::{AsAny, DeltaResult, Engine, Error};

/// Prefix of the engine configuration keys that map a coordinator name to a builder.
pub const COMMIT_COORDINATOR_BUILDER_CONF_PREFIX: &str = "io.delta.kernel.commitCoordinatorBuilder.";

/// The engine configuration key naming the builder to use for the coordinator called `name`:
/// `io.delta.kernel.commitCoordinatorBuilder.<name>.impl`.
pub fn commit_coordinator_builder_conf_key(name: &str) -> String {
    format!("{COMMIT_COORDINATOR_BUILDER_CONF_PREFIX}{name}.impl")
}

/// Creates [`CommitCoordinatorClient`]s for one kind of coordinator.
pub trait CommitCoordinatorBuilder: AsAny + Debug {
    /// The name tables use to refer to this coordinator in
    /// `delta.coordinatedCommits.commitCoordinator-preview`.
    fn name(&self) -> &str;

    /// Build a client. `conf` is the coordinator backend configuration stored in the table's
    /// metadata (endpoint, credentials source, ...); engine-level settings are reachable through
    /// [`Engine::configuration`].
    fn build(
        &self,
        engine: &dyn Engine,
        conf: &HashMap<String, String>,
    ) -> DeltaResult<Arc<dyn CommitCoordinatorClient>>;
}

type BuilderMap = HashMap<String, Arc<dyn CommitCoordinatorBuilder>>;

/// A name-keyed set of [`CommitCoordinatorBuilder`]s.
///
/// Registration is append-only: a name belongs to the first builder registered under it, and
/// registering another fails rather than shadowing it. Lookups vastly outnumber registrations,
/// so the map sits behind a [`RwLock`].
///
/// Most applications register their builders once at startup on [`global`](Self::global).
/// Snapshots and transactions can be pointed at a separate registry, which keeps tests isolated
/// from process-wide state.
#[derive(Debug, Default)]
pub struct CommitCoordinatorRegistry {
    builders: RwLock<BuilderMap>,
}

impl CommitCoordinatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry. It is created empty on first access and lives until the
    /// process exits.
    pub fn global() -> &'static CommitCoordinatorRegistry {
        static GLOBAL: OnceLock<CommitCoordinatorRegistry> = OnceLock::new();
        GLOBAL.get_or_init(CommitCoordinatorRegistry::new)
    }

    /// Register `builder` under [`CommitCoordinatorBuilder::name`]. Fails with
    /// [`Error::CommitCoordinatorAlreadyRegistered`] if the name is taken, leaving the existing
    /// builder in place.
    pub fn register(&self, builder: Arc<dyn CommitCoordinatorBuilder>) -> DeltaResult<()> {
        let name = builder.name().to_string();
        // check and insert under one write lock so two registrants cannot both win
        let mut builders = self.write()?;
        if let Some(existing) = builders.get(&name) {
            return Err(Error::CommitCoordinatorAlreadyRegistered {
                name,
                existing: (**existing).type_name().to_string(),
            });
        }
        debug!("registered commit coordinator builder {name}");
        builders.insert(name, builder);
        Ok(())
    }

    /// Whether a builder is registered under `name`.
    pub fn contains(&self, name: &str) -> DeltaResult<bool> {
        Ok(self.read()?.contains_key(name))
    }

    /// The registered names, sorted.
    pub fn names(&self) -> DeltaResult<Vec<String>> {
        Ok(self.read()?.keys().cloned().sorted().collect())
    }

    /// Build a client with the builder registered under `name`. Fails with
    /// [`Error::UnknownCommitCoordinator`] if there is none.
    pub fn resolve(
        &self,
        name: &str,
        engine: &dyn Engine,
        conf: &HashMap<String, String>,
    ) -> DeltaResult<Arc<dyn CommitCoordinatorClient>> {
        // the lock is released before building; builders may do IO
        let builder = self
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_commit_coordinator(name))?;
        debug!("resolving commit coordinator {name}");
        builder.build(engine, conf)
    }

    /// Like [`resolve`](Self::resolve), but `name` is first mapped through the engine's
    /// configuration: the value of [`commit_coordinator_builder_conf_key`]`(name)` is the
    /// registered name of the builder to use. Fails with [`Error::UnknownCommitCoordinator`] if
    /// the key is not set or its value is not registered.
    pub fn resolve_configured(
        &self,
        name: &str,
        engine: &dyn Engine,
        conf: &HashMap<String, String>,
    ) -> DeltaResult<Arc<dyn CommitCoordinatorClient>> {
        let key = commit_coordinator_builder_conf_key(name);
        let builder_name = engine.configuration().get(&key).ok_or_else(|| {
            Error::unknown_commit_coordinator(format!("{name} (no builder configured at {key})"))
        })?;
        self.resolve(&builder_name, engine, conf)
    }

    fn read(&self) -> DeltaResult<std::sync::RwLockReadGuard<'_, BuilderMap>> {
        self.builders
            .read()
            .map_err(|_| Error::generic("poisoned commit coordinator registry lock"))
    }

    fn write(&self) -> DeltaResult<std::sync::RwLockWriteGuard<'_, BuilderMap>> {
        self.builders
            .write()
            .map_err(|_| Error::generic("poisoned commit coordinator registry lock"))
    }
}
