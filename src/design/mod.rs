mod types;
mod error;
mod nucleotides;
mod targets;
mod thermo;
mod scoring;
mod candidates;
mod graph;
mod paths;
mod pairs;
mod lp;
mod optimizer;
mod pipeline;

pub use types::*;
pub use error::*;
pub use nucleotides::*;
pub use targets::*;
pub use thermo::*;
pub use scoring::*;
pub use candidates::*;
pub use graph::*;
pub use paths::*;
pub use pairs::*;
pub use lp::*;
pub use optimizer::*;
pub use pipeline::*;
