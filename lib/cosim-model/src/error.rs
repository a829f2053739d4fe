#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("unknown variable id {0:?}")]
    UnknownVariable(cosim_proto::model::VariableId),

    #[error("variable {0:?} is not of the requested type")]
    WrongType(cosim_proto::model::VariableId),

    #[error("{0}")]
    Rejected(String),
}
