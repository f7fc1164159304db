use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Invalid schedule constraints: {reason}")]
    InvalidConstraints { reason: String },
}
