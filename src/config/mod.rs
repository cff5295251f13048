//! Engine configuration.

mod settings;

pub use settings::{
    ConsensusConfig, DecomposerConfig, EnsembleConfig, PoolConfig, ResolvedOptions,
    SchedulerConfig, TaskOptions,
};
