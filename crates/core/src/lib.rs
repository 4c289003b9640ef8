pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod logging;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use config::{
    AppConfig, CircuitBreakerSettings, ClusterConfig, ObservabilityConfig, QueueConfig,
    RecoveryConfig, TierSettings, WorkerConfig,
};
pub use errors::{OrchestratorError, OrchestratorResult};
pub use logging::init_logging;
