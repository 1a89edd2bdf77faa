use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::adapter::{Engine, IntoResult, SessionApi};
use crate::config::InstanceConfig;
use crate::error::{Error, Result};
use crate::memory::MemoryEngine;
use crate::session::Session;
use crate::types::{InstanceId, SessionId};

/// A running engine instance. Sessions borrow the instance, so none can
/// outlive it.
pub struct Instance {
    /// Engine the instance runs on
    engine: Arc<dyn Engine>,
    /// Native instance handle
    id: InstanceId,
    /// Instance configuration
    config: InstanceConfig,
    /// Instance has been terminated
    terminated: AtomicBool,
}

impl Instance {
    /// Start an instance on `engine`
    pub fn new(engine: Arc<dyn Engine>, config: InstanceConfig) -> Result<Self> {
        config.validate()?;
        let mut id = InstanceId::NIL;
        engine
            .init_instance(&config.engine_params(), &mut id)
            .into_result("init_instance")?;
        debug!("instance {} started as {}", config.name, id);
        Ok(Instance {
            engine,
            id,
            config,
            terminated: AtomicBool::new(false),
        })
    }

    /// Start an instance on a fresh in-memory engine
    pub fn in_memory(config: InstanceConfig) -> Result<Self> {
        Self::new(Arc::new(MemoryEngine::new()), config)
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn begin_session(&self) -> Result<Session<'_>> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(Error::InvalidHandle);
        }
        let mut sesid = SessionId::NIL;
        self.engine
            .begin_session(self.id, &mut sesid)
            .into_result("begin_session")?;
        Ok(Session::new(
            self,
            SessionApi::new(Arc::clone(&self.engine), sesid),
        ))
    }

    /// Terminate the instance, ending any sessions the engine still holds
    pub fn term(self) -> Result<()> {
        self.terminate()
    }

    fn terminate(&self) -> Result<()> {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.engine
            .term_instance(self.id)
            .into_result("term_instance")?;
        debug!("instance {} terminated", self.config.name);
        Ok(())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("failed to terminate instance {}: {}", self.config.name, e);
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("terminated", &self.terminated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_rejects_invalid_config() {
        let result = Instance::in_memory(InstanceConfig::default().max_sessions(0));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_session_limit() {
        let instance = Instance::in_memory(InstanceConfig::new("limit").max_sessions(1)).unwrap();
        let first = instance.begin_session().unwrap();
        assert_eq!(instance.begin_session().unwrap_err(), Error::TooManySessions);
        first.close().unwrap();
        assert!(instance.begin_session().is_ok());
    }

    #[test]
    fn test_term_is_idempotent() {
        let instance = Instance::in_memory(InstanceConfig::default()).unwrap();
        assert!(instance.terminate().is_ok());
        assert!(instance.terminate().is_ok());
        assert_eq!(instance.begin_session().unwrap_err(), Error::InvalidHandle);
    }
}
