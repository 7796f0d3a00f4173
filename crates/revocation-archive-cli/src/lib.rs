//! revocation-archive CLI support: input loading, table output, logging.

pub mod config;
pub mod logging;
pub mod output;

pub use config::{load_archive_config, load_identities, load_roster, resolve_path};
pub use output::write_tables;
