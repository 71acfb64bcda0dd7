pub mod account;
pub mod job;
pub mod quota;

pub use account::*;
pub use job::*;
pub use quota::*;
