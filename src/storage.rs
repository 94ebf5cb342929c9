//! A storage session: the probed and staging devicegraphs plus everything
//! needed to plan and commit the difference between them.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use log::{debug, info};

use devicegraph::{Devicegraph, IdentityRegistry};

use crate::{
    actiongraph::Actiongraph,
    commit::{self, CommitObserver, CommitReport, ToolSet},
    config::{Environment, StorageConfig},
    error::StorageError,
    probe::{self, Prober},
};

pub const PROBED: &str = "probed";
pub const STAGING: &str = "staging";

/// Storage shared between threads. The mutex serializes all callers.
pub type SharedStorage = Arc<Mutex<Storage>>;

pub struct Storage {
    environment: Environment,
    registry: IdentityRegistry,
    prober: Box<dyn Prober>,
    tools: ToolSet,
    probed: Devicegraph,
    staging: Devicegraph,
    /// Additional devicegraphs saved by name.
    backups: BTreeMap<String, Devicegraph>,
}

impl Storage {
    /// Creates a session with empty devicegraphs. Call [`Storage::probe`] to
    /// fill them.
    pub fn new(environment: Environment, prober: Box<dyn Prober>, tools: ToolSet) -> Self {
        let registry = IdentityRegistry::new();
        Self {
            environment,
            probed: Devicegraph::new(&registry),
            staging: Devicegraph::new(&registry),
            registry,
            prober,
            tools,
            backups: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        let environment = config.environment();
        let prober = probe::prober_for(&environment.probe_mode);
        let tools = if config.dry_run {
            ToolSet::dry_run()
        } else {
            ToolSet::system()
        };
        Self::new(environment, prober, tools)
    }

    pub fn into_shared(self) -> SharedStorage {
        Arc::new(Mutex::new(self))
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Registry all devicegraphs of this session allocate their sids from.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Replaces the probed devicegraph and resets staging to a copy of it.
    pub fn probe(&mut self) -> Result<(), StorageError> {
        info!("Probing storage");
        self.probed = self.prober.probe(&self.registry)?;
        self.staging = self.probed.copy();
        debug!(
            "Probed {} devices and {} holders",
            self.probed.num_devices(),
            self.probed.num_holders()
        );
        Ok(())
    }

    pub fn probed(&self) -> &Devicegraph {
        &self.probed
    }

    pub fn staging(&self) -> &Devicegraph {
        &self.staging
    }

    pub fn staging_mut(&mut self) -> &mut Devicegraph {
        &mut self.staging
    }

    /// Replaces staging, e.g. with a devicegraph loaded through
    /// [`Storage::registry`].
    pub fn set_staging(&mut self, staging: Devicegraph) {
        self.staging = staging;
    }

    pub fn calculate_actiongraph(&self) -> Result<Actiongraph, StorageError> {
        Ok(Actiongraph::new(
            &self.probed,
            &self.staging,
            self.environment.target_mode,
        )?)
    }

    /// Makes the system look like staging. After a partial failure the
    /// probed devicegraph is stale and the caller should probe again.
    #[tracing::instrument(skip_all)]
    pub fn commit(
        &mut self,
        observer: &mut dyn CommitObserver,
    ) -> Result<CommitReport, StorageError> {
        let actiongraph = self.calculate_actiongraph()?;
        let report = commit::commit(&actiongraph, &self.tools, observer)?;
        self.probed = self.staging.copy();
        Ok(report)
    }

    pub fn devicegraph(&self, name: &str) -> Result<&Devicegraph, StorageError> {
        match name {
            PROBED => Ok(&self.probed),
            STAGING => Ok(&self.staging),
            _ => self
                .backups
                .get(name)
                .ok_or_else(|| StorageError::DevicegraphNotFound { name: name.into() }),
        }
    }

    pub fn exist_devicegraph(&self, name: &str) -> bool {
        self.devicegraph(name).is_ok()
    }

    /// Names of all devicegraphs, the built-in ones first.
    pub fn devicegraph_names(&self) -> Vec<String> {
        [PROBED, STAGING]
            .into_iter()
            .map(String::from)
            .chain(self.backups.keys().cloned())
            .collect()
    }

    /// Saves a copy of `source` under `dest`, replacing any previous backup
    /// of that name.
    pub fn copy_devicegraph(&mut self, source: &str, dest: &str) -> Result<(), StorageError> {
        ensure_not_reserved(dest)?;
        let copy = self.devicegraph(source)?.copy();
        self.backups.insert(dest.into(), copy);
        Ok(())
    }

    pub fn remove_devicegraph(&mut self, name: &str) -> Result<(), StorageError> {
        ensure_not_reserved(name)?;
        self.backups
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::DevicegraphNotFound { name: name.into() })
    }

    /// Moves the backup `name` into staging.
    pub fn restore_devicegraph(&mut self, name: &str) -> Result<(), StorageError> {
        ensure_not_reserved(name)?;
        self.staging = self
            .backups
            .remove(name)
            .ok_or_else(|| StorageError::DevicegraphNotFound { name: name.into() })?;
        Ok(())
    }

    /// Whether both devicegraphs hold the same devices and holders, sids
    /// included.
    pub fn equal_devicegraph(&self, lhs: &str, rhs: &str) -> Result<bool, StorageError> {
        Ok(self.devicegraph(lhs)? == self.devicegraph(rhs)?)
    }
}

fn ensure_not_reserved(name: &str) -> Result<(), StorageError> {
    if name == PROBED || name == STAGING {
        return Err(StorageError::ReservedName { name: name.into() });
    }
    Ok(())
}
