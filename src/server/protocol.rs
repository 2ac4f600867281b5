//! Client-to-server command protocol and the per-client option mask
//! used to filter broadcasts.

/// `-1` means "unspecified; do not gate" for [`ClientOptions`] fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub send_strings: i8,
    pub send_packtype: i8,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            send_strings: -1,
            send_packtype: -1,
        }
    }
}

impl ClientOptions {
    /// Whether a broadcast gated by `mask` should reach a client with
    /// these options: every enabled (non `-1`) bit in `mask` must equal
    /// the client's own bit.
    pub fn matches(&self, mask: ClientOptions) -> bool {
        (mask.send_strings == -1 || mask.send_strings == self.send_strings)
            && (mask.send_packtype == -1 || mask.send_packtype == self.send_packtype)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Pause,
    Resume,
    Strings,
    NoStrings,
    PackTypes,
    NoPackTypes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub stamp: u64,
    pub verb: Verb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    Unknown,
}

/// Parse one command line of the form `[!<stamp>] <verb> [args...]`.
/// Arguments beyond the verb are accepted but ignored, since none of
/// the recognized verbs take any.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (stamp, rest) = match line.strip_prefix('!') {
        Some(rest) => {
            let mut parts = rest.splitn(2, char::is_whitespace);
            let stamp_str = parts.next().unwrap_or("");
            let stamp: u64 = stamp_str.parse().map_err(|_| ParseError::Unknown)?;
            (stamp, parts.next().unwrap_or("").trim())
        }
        None => (0, line),
    };
    let verb_str = rest.split_whitespace().next().unwrap_or("");
    let verb = match verb_str {
        "pause" => Verb::Pause,
        "resume" => Verb::Resume,
        "strings" => Verb::Strings,
        "nostrings" => Verb::NoStrings,
        "packtypes" => Verb::PackTypes,
        "nopacktypes" => Verb::NoPackTypes,
        _ => return Err(ParseError::Unknown),
    };
    Ok(Command { stamp, verb })
}

/// Apply a parsed verb's effect to a client's option mask. `pause` and
/// `resume` mutate packet-source state instead and are reported to the
/// caller as `true` so it can act on them.
pub fn apply_verb(verb: Verb, options: &mut ClientOptions) -> bool {
    match verb {
        Verb::Pause | Verb::Resume => true,
        Verb::Strings => {
            options.send_strings = 1;
            false
        }
        Verb::NoStrings => {
            options.send_strings = 0;
            false
        }
        Verb::PackTypes => {
            options.send_packtype = 1;
            false
        }
        Verb::NoPackTypes => {
            options.send_packtype = 0;
            false
        }
    }
}

/// Build the response line for a stamped command, or `None` if the
/// command had stamp `0` (no response expected).
pub fn response_line(stamp: u64, ok: bool) -> Option<String> {
    if stamp == 0 {
        None
    } else {
        Some(format!("!{stamp} {}\n", if ok { "ok" } else { "err" }))
    }
}

pub fn unknown_response_line(stamp: u64) -> Option<String> {
    if stamp == 0 {
        None
    } else {
        Some(format!("!{stamp} unknown\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stamped_and_unstamped_commands() {
        assert_eq!(
            parse_command("!42 pause"),
            Ok(Command {
                stamp: 42,
                verb: Verb::Pause
            })
        );
        assert_eq!(
            parse_command("resume"),
            Ok(Command {
                stamp: 0,
                verb: Verb::Resume
            })
        );
    }

    #[test]
    fn unknown_verb_is_rejected() {
        assert_eq!(parse_command("frobnicate"), Err(ParseError::Unknown));
    }

    #[test]
    fn stamp_zero_gets_no_response_nonzero_does() {
        assert_eq!(response_line(0, true), None);
        assert_eq!(response_line(7, true), Some("!7 ok\n".to_string()));
        assert_eq!(unknown_response_line(7), Some("!7 unknown\n".to_string()));
    }

    #[test]
    fn option_mask_filtering_gates_on_matching_bits_only() {
        let client = ClientOptions {
            send_strings: 1,
            send_packtype: 0,
        };
        let strings_only = ClientOptions {
            send_strings: 1,
            send_packtype: -1,
        };
        let packtype_only = ClientOptions {
            send_strings: -1,
            send_packtype: 1,
        };
        assert!(client.matches(strings_only));
        assert!(!client.matches(packtype_only));
        assert!(client.matches(ClientOptions::default()));
    }
}
