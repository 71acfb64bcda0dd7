pub mod accounts;
pub mod metrics;
pub mod policy;
pub mod quota_evaluator;
pub mod quota_manager;

pub use accounts::*;
pub use metrics::*;
pub use policy::*;
pub use quota_manager::*;
