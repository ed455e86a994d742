// src/engine/reload.rs

//! Configuration hot-reload.
//!
//! The reload lock guards [`ReloadState`]; holding it is what makes a
//! reload "in flight". The poll path only ever `try_lock`s, so a slow
//! manual reload never stalls the event loop.

use tracing::{debug, info, warn};

use crate::config::ConfigSource;
use crate::errors::{Result, WatchflowError};

use super::runtime::{ActiveConfig, Engine};
use super::Notification;

/// Fingerprints the reload routine has already acted on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadState {
    /// Fingerprint of the configuration currently in effect.
    applied: Option<String>,
    /// Last fingerprint that failed to load; not retried until it changes.
    rejected: Option<String>,
}

impl ReloadState {
    pub(crate) fn applied(fingerprint: Option<String>) -> Self {
        Self {
            applied: fingerprint,
            rejected: None,
        }
    }

    fn is_known(&self, fingerprint: &str) -> bool {
        self.applied.as_deref() == Some(fingerprint) || self.rejected.as_deref() == Some(fingerprint)
    }
}

impl Engine {
    /// Poll tick: reload when the source fingerprint moved.
    pub(crate) async fn reload_if_changed(&self) {
        let Some(source) = self.inner.source.as_ref() else {
            return;
        };
        let Ok(mut reload) = self.inner.reload.try_lock() else {
            debug!("reload already in flight; skipping poll");
            return;
        };

        let fingerprint = match source.fingerprint() {
            Ok(fp) => fp,
            Err(err) => {
                // Editors often replace the file non-atomically.
                debug!(error = %err, "config fingerprint unavailable");
                return;
            }
        };
        if reload.is_known(&fingerprint) {
            return;
        }

        info!(?source, "configuration changed; reloading");
        let _ = self.apply_reload(source.as_ref(), &mut reload, fingerprint);
    }

    /// Reload the configuration now, whether or not it changed.
    ///
    /// On failure the previous configuration stays in effect and the error
    /// is both reported to the sink and returned.
    pub async fn reload_now(&self) -> Result<()> {
        let Some(source) = self.inner.source.as_ref() else {
            return Err(WatchflowError::ConfigError(
                "engine has no configuration source to reload from".to_string(),
            ));
        };
        let mut reload = self.inner.reload.lock().await;
        let fingerprint = match source.fingerprint() {
            Ok(fp) => fp,
            Err(err) => {
                self.inner.sink.notify(Notification::ConfigReloadFailed {
                    error: err.to_string(),
                });
                return Err(err);
            }
        };
        self.apply_reload(source.as_ref(), &mut reload, fingerprint)
    }

    fn apply_reload(
        &self,
        source: &dyn ConfigSource,
        reload: &mut ReloadState,
        fingerprint: String,
    ) -> Result<()> {
        match source.load() {
            Ok(config) => {
                let executor = self.inner.build_executor(&config);
                let max_parallel = executor.max_parallel();
                self.inner.swap_active(ActiveConfig { config, executor });
                *reload = ReloadState::applied(Some(fingerprint));

                info!(max_parallel, "configuration reloaded");
                self.inner.sink.notify(Notification::ConfigReloaded);
                Ok(())
            }
            Err(err) => {
                reload.rejected = Some(fingerprint);
                warn!(error = %err, "configuration reload failed; keeping previous");
                self.inner.sink.notify(Notification::ConfigReloadFailed {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}
