//! Model lookup and inference components

pub mod classifier;
pub mod inference;
pub mod registry;

pub use classifier::{Classifier, MlflowClassifier};
pub use inference::VerdictStage;
pub use registry::{ModelHandle, ModelRegistry};
