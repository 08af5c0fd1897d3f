//! `xnat-sync whoami` command implementation

use crate::commands::connect;
use crate::config::Config;
use crate::error::Result;

/// Print the authenticated username
pub async fn run(config: &Config) -> Result<()> {
    let session = connect(config).await?;
    println!("{}", session.username);
    Ok(())
}
