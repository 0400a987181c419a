//! Compute device selection and fit context
//!
//! The training orchestrator picks a `Device` from configuration and hands the
//! classifier backend a `FitContext` carrying that device, an optional
//! deadline and a cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::utils::error::{RecognitionError, Result};

/// Device type for backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Device {
    /// CPU backend
    #[default]
    Cpu,
    /// GPU backend with device id
    Gpu(usize),
}

impl Device {
    /// Device requested by configuration
    pub fn from_config(use_gpu: bool, device_id: usize) -> Self {
        if use_gpu {
            Device::Gpu(device_id)
        } else {
            Device::Cpu
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Gpu(_))
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Gpu(id) => write!(f, "GPU:{}", id),
        }
    }
}

/// Everything a backend needs to know about how to run one fit
#[derive(Debug, Clone)]
pub struct FitContext {
    device: Device,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl FitContext {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort the fit once `timeout` has elapsed from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Share an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    /// Same deadline and cancellation flag, different device
    pub fn on_device(&self, device: Device) -> Self {
        Self {
            device,
            ..self.clone()
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Fail with `Cancelled` if the fit was cancelled or ran past its deadline.
    ///
    /// Backends call this between units of work.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(RecognitionError::Cancelled("fit was cancelled".to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(RecognitionError::Cancelled("fit exceeded its time limit".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Cpu.to_string(), "CPU");
        assert_eq!(Device::Gpu(0).to_string(), "GPU:0");
        assert_eq!(Device::Gpu(1).to_string(), "GPU:1");
    }

    #[test]
    fn test_device_from_config() {
        assert_eq!(Device::from_config(false, 3), Device::Cpu);
        assert_eq!(Device::from_config(true, 3), Device::Gpu(3));
        assert!(Device::Gpu(0).is_gpu());
        assert!(!Device::default().is_gpu());
    }

    #[test]
    fn test_checkpoint_passes_by_default() {
        let ctx = FitContext::new(Device::Cpu);
        assert!(ctx.checkpoint().is_ok());
    }

    #[test]
    fn test_checkpoint_after_cancel() {
        let ctx = FitContext::new(Device::Cpu);
        let retry = ctx.on_device(Device::Gpu(0));
        ctx.cancel();

        assert!(matches!(ctx.checkpoint(), Err(RecognitionError::Cancelled(_))));
        // the flag is shared with derived contexts
        assert!(retry.checkpoint().is_err());
        assert_eq!(retry.device(), Device::Gpu(0));
    }

    #[test]
    fn test_checkpoint_after_deadline() {
        let ctx = FitContext::new(Device::Cpu).with_timeout(Duration::ZERO);
        assert!(matches!(ctx.checkpoint(), Err(RecognitionError::Cancelled(_))));
    }
}
