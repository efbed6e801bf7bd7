//! Application state wiring the engine to its infrastructure.
//!
//! AppState holds the concrete node executor used by both CLI and REST API.
//! `NodeRunner` is generic over provider/retriever traits; AppState pins it
//! to the infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use pipeloom_core::llm::box_provider::BoxLlmProvider;
use pipeloom_core::workflow::engine::{ExecutionEngine, StopHandle};
use pipeloom_core::workflow::node_runner::NodeRunner;
use pipeloom_infra::config::{load_global_config, resolve_data_dir};
use pipeloom_infra::context::FsContextRetriever;
use pipeloom_infra::llm::create_provider_from_env;
use pipeloom_types::config::GlobalConfig;

/// Concrete node executor pinned to infra implementations.
pub type ConcreteRunner = NodeRunner<BoxLlmProvider, FsContextRetriever>;

pub type ConcreteEngine = ExecutionEngine<ConcreteRunner>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
    pub runner: Arc<ConcreteRunner>,
    /// Stop handles of runs currently in flight, keyed by run id.
    pub runs: Arc<DashMap<Uuid, StopHandle>>,
}

impl AppState {
    /// Resolve the data directory, load `pipeloom.toml` and build the provider.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_global_config(&data_dir).await;

        let provider = create_provider_from_env(&config.llm).map_err(|e| {
            anyhow::anyhow!(
                "cannot create LLM provider '{}': {e} (set {} or use provider = \"echo\")",
                config.llm.provider,
                config.llm.api_key_env
            )
        })?;

        Ok(Self::with_provider(config, data_dir, provider))
    }

    pub fn with_provider(config: GlobalConfig, data_dir: PathBuf, provider: BoxLlmProvider) -> Self {
        let retriever = FsContextRetriever::new(
            config.context.knowledge_dir.clone(),
            config.context.max_chars,
        );
        let runner = NodeRunner::new(Arc::new(provider), Arc::new(retriever), config.llm.clone());

        Self {
            config: Arc::new(config),
            data_dir,
            runner: Arc::new(runner),
            runs: Arc::new(DashMap::new()),
        }
    }

    /// A fresh engine sharing this state's executor.
    ///
    /// Each run gets its own engine so a stop request only reaches that run.
    pub fn engine(&self) -> ConcreteEngine {
        ExecutionEngine::with_shared(Arc::clone(&self.runner), self.config.engine.clone())
    }

    /// Track `run_id` until the returned guard is dropped.
    pub fn register_run(&self, run_id: Uuid, stop: StopHandle) -> RunRegistration {
        self.runs.insert(run_id, stop);
        RunRegistration {
            runs: Arc::clone(&self.runs),
            run_id,
        }
    }
}

/// Removes a run from [`AppState::runs`] on drop.
pub struct RunRegistration {
    runs: Arc<DashMap<Uuid, StopHandle>>,
    run_id: Uuid,
}

impl Drop for RunRegistration {
    fn drop(&mut self) {
        self.runs.remove(&self.run_id);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_removed_on_drop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = test_support::echo_state(tmp.path().to_path_buf());
        let run_id = Uuid::now_v7();

        let guard = state.register_run(run_id, StopHandle::new());
        assert!(state.runs.contains_key(&run_id));
        drop(guard);
        assert!(!state.runs.contains_key(&run_id));
    }

    #[test]
    fn engines_do_not_share_stop_flags() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = test_support::echo_state(tmp.path().to_path_buf());
        let a = state.engine();
        let b = state.engine();
        a.stop();
        assert!(a.stop_handle().is_stopped());
        assert!(!b.stop_handle().is_stopped());
    }
}
