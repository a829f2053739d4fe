#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("request illegal in phase {phase:?}: {message}")]
    WrongPhase { phase: crate::phase::SlavePhase, message: String },

    #[error(transparent)]
    Proto(#[from] cosim_proto::ProtoError),

    #[error(transparent)]
    Model(#[from] cosim_model::ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
