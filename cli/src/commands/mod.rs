//! CLI Commands

mod decrypt;
mod init;
mod portfolio;
mod status;

pub use decrypt::DecryptCommand;
pub use init::InitCommand;
pub use portfolio::PortfolioCommand;
pub use status::StatusCommand;
