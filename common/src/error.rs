use crate::flags::Link;
use crate::session::SessionError;
use crate::settings::SettingsError;

/// Failures that abort bring-up. Everything that can go wrong once the node is running is
/// logged and contained where it happens instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn the {name} task: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out waiting for the {0} link to come up")]
    StartupTimeout(Link),
    #[error("the {0} link gave up connecting")]
    LinkFailed(Link),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
