//! Graph engine: a fixed routing table over named stages.
//!
//! A campaign moves through `Stage`s. Each stage handler returns a `Decision`
//! (or asks to suspend), and the pair `(stage, decision)` selects the next
//! stage from the static edge table. The `GraphEngine` walks the table until
//! the campaign suspends for human feedback or reaches `End`/`Aborted`.

pub mod edge;
pub mod executor;
pub mod stage;

pub use edge::{next_stage, Edge, EDGES};
pub use executor::{validate_resume, FeedbackRequest, GraphEngine, PendingDraft, RunOutcome};
pub use stage::{StageContext, StageHandler, StageRegistry, Transition};
