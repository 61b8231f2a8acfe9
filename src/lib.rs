// Sheets quickstart - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod report;
pub mod sheets;

use std::io::Write;

use anyhow::Context;

use crate::auth::{Authorizer, ConsentFlow};
use crate::error::Result;
use crate::sheets::SheetsClient;

/// Authorize, fetch the range, and print names and majors to `out`
///
/// Nothing is fetched unless authorization (including caching a new
/// credential) succeeded.
pub async fn list_majors<C: ConsentFlow, W: Write>(
    authorizer: &Authorizer<C>,
    sheets: &SheetsClient,
    spreadsheet_id: &str,
    range: &str,
    out: &mut W,
) -> Result<()> {
    let mut client = authorizer.authorize().await?;

    let values = sheets.get_values(&mut client, spreadsheet_id, range).await?;

    report::print_majors(out, values.rows()).context("Failed to write report")?;
    Ok(())
}
