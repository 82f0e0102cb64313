pub mod decision;
pub mod manual;
pub mod recon_job;
pub mod scorer;
pub mod strategy;

pub use decision::{decide, LinkDecision};
pub use manual::LinkService;
pub use recon_job::{cancel_flag, CancelFlag, ReconciliationJob};
pub use scorer::score_and_rank;
pub use strategy::{propose_candidates, NormalizedItem, ProductEntry};
