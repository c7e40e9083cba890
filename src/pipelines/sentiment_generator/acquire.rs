use tracing::warn;

use crate::error::{PipelineError, Result};

/// Outcome of one load attempt.
pub(crate) enum LoadOutcome<T> {
    Loaded(T),
    Failed(PipelineError),
}

impl<T> LoadOutcome<T> {
    fn attempt(load: impl FnOnce() -> Result<T>) -> Self {
        match load() {
            Ok(model) => LoadOutcome::Loaded(model),
            Err(e) => LoadOutcome::Failed(e),
        }
    }
}

/// A model together with the id it was actually loaded from.
pub(crate) struct Acquired<T> {
    pub model: T,
    pub model_id: String,
    pub fell_back: bool,
}

/// Load `requested`, falling back to `fallback` exactly once.
///
/// The first failure is logged and swallowed; a failure of the fallback is returned.
pub(crate) fn acquire<T>(
    role: &str,
    requested: &str,
    fallback: &str,
    load: impl Fn(&str) -> Result<T>,
) -> Result<Acquired<T>> {
    let reason = match LoadOutcome::attempt(|| load(requested)) {
        LoadOutcome::Loaded(model) => {
            return Ok(Acquired {
                model,
                model_id: requested.to_string(),
                fell_back: false,
            })
        }
        LoadOutcome::Failed(reason) => reason,
    };

    warn!(
        role,
        requested,
        fallback,
        error = %reason,
        "failed to load {role} model, falling back to default"
    );

    match LoadOutcome::attempt(|| load(fallback)) {
        LoadOutcome::Loaded(model) => Ok(Acquired {
            model,
            model_id: fallback.to_string(),
            fell_back: true,
        }),
        LoadOutcome::Failed(fatal) => Err(PipelineError::ModelLoad(format!(
            "Failed to load {role} model '{requested}' ({reason}) and fallback '{fallback}' ({fatal})"
        ))),
    }
}
