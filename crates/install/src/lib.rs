//! Closure installation for larder.
//!
//! Given one or more store paths, traverses their reference graphs and
//! extracts every path in the closure into a destination directory:
//! metadata discovery runs at higher scheduling priority than bulk
//! downloads, each path is installed at most once, and a failed or
//! cancelled extraction rolls back to leave no partial store path behind.

pub mod error;
pub mod installer;
pub mod queue;

pub use error::{InstallError, InstallResult};
pub use installer::{ClosureInstaller, InstallOptions};
pub use queue::{Band, TaskQueue};
