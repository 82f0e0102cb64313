pub mod candidate;
pub mod line_item;
pub mod product;
pub mod stats;

pub use candidate::{MatchCandidate, SuggestionRecord};
pub use line_item::{LinkFields, LinkStrategy, OrderLineItem};
pub use product::Product;
pub use stats::{PlatformLinkRate, ReconFilter, ReconciliationRunStats};
