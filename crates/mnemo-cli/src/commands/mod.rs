pub mod distribution;
pub mod item;
pub mod optimize;
pub mod protection;
pub mod stats;

pub use distribution::DistributionCommand;
pub use item::ItemCommand;
pub use optimize::OptimizeCommand;
pub use protection::{ProtectCommand, ProtectedCommand, UnprotectCommand};
pub use stats::StatsCommand;
