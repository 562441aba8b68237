use snafu::Snafu;

/// Per-block rendering failure. Recovered with an inline placeholder.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RenderError {
    #[snafu(display("rendering engine for '{kind}' is unavailable: {reason}"))]
    EngineUnavailable { kind: String, reason: String },
    #[snafu(display("invalid {kind} input: {reason}"))]
    InvalidSpec { kind: &'static str, reason: String },
}
