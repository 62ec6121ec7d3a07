//! REPL helpers for the `chnative_cli` binary.
//!
//! Input lines are either SQL, sent to the server as is, or meta-commands starting with `.`.
use std::io::{self, BufRead, Write};

use crate::block::Block;

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `.exit`, or end of input
    Exit,
    /// `.ping`
    Ping,
    /// Anything not starting with `.`
    Sql(String),
}

/// Prompts for one command.
///
/// Unknown meta-commands are reported as an error message.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, String>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ").map_err(|e| format!("failed to write prompt: {e}"))?;
    writer.flush().map_err(|e| format!("failed to write prompt: {e}"))?;

    let n = reader
        .read_line(&mut s)
        .map_err(|e| format!("failed to read input: {e}"))?;
    if n == 0 {
        return Ok(Command::Exit);
    }

    match s.trim() {
        ".exit" | ".quit" => Ok(Command::Exit),
        ".ping" => Ok(Command::Ping),
        s if !s.starts_with('.') => Ok(Command::Sql(s.trim_end_matches(';').to_string())),
        s => Err(format!("unrecognized command '{}'", s)),
    }
}

/// Writes the rows of `block` as tab-separated values, optionally preceded by the column
/// names.
pub fn write_tsv<W: Write>(mut writer: W, block: &Block, header: bool) -> io::Result<()> {
    if header {
        let names: Vec<&str> = block.columns().iter().map(|c| c.name.as_str()).collect();
        writeln!(writer, "{}", names.join("\t"))?;
    }
    for i in 0..block.rows() {
        let mut first = true;
        for column in block.columns() {
            if !first {
                write!(writer, "\t")?;
            }
            first = false;
            write!(writer, "{}", column.values[i])?;
        }
        writeln!(writer)?;
    }
    Ok(())
}
