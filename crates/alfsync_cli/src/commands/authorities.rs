//! Authorities command implementation.

use alfsync_engine::ChangeFeed;
use std::io::Write;

/// Prints the authorities of `username`, or of every user, as JSON.
pub fn run<F, W>(
    feed: &F,
    username: Option<&str>,
    mut output: W,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: ChangeFeed,
    W: Write,
{
    let json = match username {
        Some(username) => serde_json::to_string_pretty(&feed.fetch_user_authorities(username)?)?,
        None => serde_json::to_string_pretty(&feed.fetch_all_user_authorities()?)?,
    };
    writeln!(output, "{}", json)?;
    Ok(())
}
