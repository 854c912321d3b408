pub mod batch;
pub mod loaders;
pub mod question_spec;
pub mod record;

pub use batch::{batch_key, question_key, Batch, BatchEntry};
pub use loaders::{load_generation_request, GenerationRequest};
pub use question_spec::{
    ConceptSource, DokLevel, DuplicationTarget, QuestionSpec, QuestionType, RegenerationContext,
    RegenerationTarget, SubpartSpec, Taxonomy,
};
pub use record::{CanonicalField, CanonicalRecord, FieldKey};
