//! Interactive peer commands

pub const USAGE: &str = "commands: catalog | get <filename> | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCommand {
    Catalog,
    Get(String),
    Help,
    Quit,
}

/// Parse one input line; `Ok(None)` for a blank line
///
/// The filename of `get` is everything after the command word, so names
/// with spaces work.
pub fn parse_command(line: &str) -> Result<Option<PeerCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match (cmd, rest) {
        ("catalog" | "list", "") => Ok(Some(PeerCommand::Catalog)),
        ("get", "") => Err("usage: get <filename>".to_string()),
        ("get", name) => Ok(Some(PeerCommand::Get(name.to_string()))),
        ("help", _) => Ok(Some(PeerCommand::Help)),
        ("quit" | "exit", "") => Ok(Some(PeerCommand::Quit)),
        _ => Err(USAGE.to_string()),
    }
}
