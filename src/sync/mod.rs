pub mod cache;
pub mod intent;
pub mod mutation;
pub mod mutator;
pub mod radar;

pub use cache::{Phase, TaskCache};
pub use intent::{Intent, IntentError, IntentPayload, IntentRequest, IntentStore};
pub use mutation::{Mutation, MutationError};
pub use mutator::{MutationAttempt, OptimisticMutator, ToggleOutcome};
pub use radar::{ConfirmedSuggestion, Suggestion};
