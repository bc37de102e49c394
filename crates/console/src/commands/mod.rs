//! Console subcommand implementations.

pub mod navigation;
pub mod session;

use serde::Serialize;

/// Print `value` as pretty JSON on stdout.
pub(crate) fn emit<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
