pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod prompt;
pub mod traits;


pub use classifier::{parse_classification, Classification, ClassificationError, Classifier};
pub use dispatcher::{HybridDispatcher, Reply, ReplyKind};
pub use error::DispatchError;
pub use traits::{LanguageModel, ModelRole, ProviderModel};
