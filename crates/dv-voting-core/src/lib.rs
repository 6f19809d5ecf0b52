pub mod binding;
pub mod config;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod submitter;

pub use binding::ChainBinding;
pub use config::VotingConfig;
pub use error::{ErrorKind, VoteError};
pub use registry::{NetworkRegistry, RegistryError};
pub use resolver::{BoundContract, ContractResolver};
pub use session::{Session, VotingSnapshot};
pub use submitter::{ErrorClass, VoteSubmitter, classify_provider_error};
