use std::io::Write;

use crate::classify::Verdict;
use crate::error::ReportError;

/// `<address>:<name>:<arity>:<float slot>:<returns>:<narrow int slots>`
pub fn format_line(verdict: &Verdict) -> String {
    let narrow: Vec<String> = verdict.narrow_slots.iter().map(ToString::to_string).collect();
    format!(
        "{}:{}:{}:{}:{}:{}",
        verdict.address,
        verdict.name,
        verdict.arity,
        verdict.float_slot.unwrap_or(0),
        verdict.returns_value as u8,
        narrow.join(","),
    )
}

pub fn write_text<W: Write>(out: &mut W, verdicts: &[Verdict]) -> Result<(), ReportError> {
    for verdict in verdicts {
        writeln!(out, "{}", format_line(verdict))?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(out: &mut W, verdicts: &[Verdict]) -> Result<(), ReportError> {
    serde_json::to_writer_pretty(&mut *out, verdicts)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
