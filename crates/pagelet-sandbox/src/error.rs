//! Execute and render errors.

/// Errors that can occur while evaluating a compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    /// The artifact was produced against a different capability registry.
    #[error("Artifact targets capability registry v{found}, but this sandbox provides v{expected}")]
    IncompatibleArtifact { expected: u32, found: u32 },

    /// Names and values passed to the executor differ in length.
    #[error("{names} capability names were bound to {values} values")]
    BindingMismatch { names: usize, values: usize },

    /// Evaluation threw, referenced an unknown name, or exhausted its budget.
    #[error("{message}")]
    Thrown { message: String },
}

/// Errors that can occur while rendering or interacting with a mounted element.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// A component, effect or event handler threw.
    #[error("{message}")]
    Thrown { message: String },

    /// State kept changing during render.
    #[error("Too many re-renders. The render limit of {limit} passes was reached to prevent an infinite loop.")]
    TooManyRenders { limit: usize },

    /// A child value that cannot be rendered.
    #[error("Objects are not valid as a React child (found: {found}). If you meant to render a collection of children, use an array instead.")]
    InvalidChild { found: String },
}
