pub mod checkpoint;
pub mod index;
pub mod lens;
pub mod mirror;
pub mod stats;
pub mod status;
pub mod visibility;

pub use checkpoint::{GateRejection, check_completion, missing_checkpoints};
pub use index::{NodeIndex, TreeError};
pub use stats::{NodeStats, build_stats};
pub use status::{StepStatus, node_status_code, step_status};
pub use visibility::{StatusFilter, Visibility, compute_visibility, flatten_visible};
