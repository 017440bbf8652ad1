//! Line-oriented terminal chat.

use super::reply_for;
use crate::agent::HybridDispatcher;
use crate::infra::{UsagePeriod, UsageTracker};
use anyhow::{Context, Result};
use console::style;
use std::io::{BufRead, Write};

pub const DEFAULT_USER_ID: &str = "user1";

fn read_trimmed_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let read = input.read_line(&mut line).context("Failed to read input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Run the interactive loop until `exit` or end of input.
///
/// Without `user_id` the loop first asks for one, falling back to
/// [`DEFAULT_USER_ID`] on an empty answer.
pub async fn run_interactive<R: BufRead, W: Write>(
    dispatcher: &HybridDispatcher,
    user_id: Option<&str>,
    mut input: R,
    mut out: W,
) -> Result<()> {
    writeln!(out, "{}", style("Deskhand terminal chat (type 'exit' to quit)").bold())?;

    let user_id = match user_id.map(str::trim).filter(|u| !u.is_empty()) {
        Some(id) => id.to_string(),
        None => {
            write!(out, "Enter your user ID [{DEFAULT_USER_ID}]: ")?;
            out.flush()?;
            read_trimmed_line(&mut input)?
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| DEFAULT_USER_ID.to_string())
        }
    };
    tracing::info!(user_id = %user_id, "Interactive session started");

    loop {
        write!(out, "{} ", style(format!("{user_id}:")).cyan())?;
        out.flush()?;

        let Some(line) = read_trimmed_line(&mut input)? else {
            writeln!(out)?;
            break;
        };
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") {
            writeln!(out, "👋 Bye!")?;
            break;
        }

        let reply = reply_for(dispatcher, &user_id, &line).await;
        writeln!(out, "{} {reply}", style("Agent:").green())?;
    }

    write_usage_summary(dispatcher.usage(), &mut out).await
}

/// One message in, one reply out. Used by `deskhand chat -m`.
pub async fn run_once(dispatcher: &HybridDispatcher, user_id: &str, message: &str) -> String {
    reply_for(dispatcher, user_id, message).await
}

pub async fn write_usage_summary<W: Write>(usage: &dyn UsageTracker, out: &mut W) -> Result<()> {
    let summary = usage.summary(&UsagePeriod::All).await?;
    if summary.total_requests == 0 {
        return Ok(());
    }
    writeln!(
        out,
        "📊 Usage: {} model calls, {} tokens ({} in / {} out)",
        summary.total_requests,
        summary.total_tokens(),
        summary.total_input_tokens,
        summary.total_output_tokens
    )?;
    for row in usage.breakdown(&UsagePeriod::All).await? {
        writeln!(
            out,
            "   {:<10} {:<20} {:>4} calls {:>8} in {:>8} out",
            row.role, row.model, row.requests, row.input_tokens, row.output_tokens
        )?;
    }
    Ok(())
}
