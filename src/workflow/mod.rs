pub mod batch_ctx;
pub mod batch_flow;
pub mod duplication_flow;

pub use batch_ctx::BatchCtx;
pub use batch_flow::{BatchFlow, BatchOutcome, QuestionOutcome};
pub use duplication_flow::{variation_key, DuplicationJob, DuplicationOutcome};
