use shared::domain::{CandidateId, Decision};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Decide(Decision),
    DecideFor(CandidateId, Decision),
    Drag { dx: f64, dy: f64 },
    Release { dx: f64, dy: f64 },
    Cancel,
    Refresh,
    Prune,
    List,
    Tally,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  a | accept                 accept the current candidate
  r | reject                 reject the current candidate
  decide <identity> <a|r>    decide a specific candidate
  drag <dx> [dy]             move the current card
  release <dx> [dy]          let go of the card at the given offset
  cancel                     abandon the drag in progress
  refresh                    fetch a new batch
  prune                      drop decided cards from the deck
  list | tally | help | quit";

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Err("empty command".into());
    };
    let args: Vec<&str> = parts.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("a" | "accept", []) => Command::Decide(Decision::Accepted),
        ("r" | "reject", []) => Command::Decide(Decision::Rejected),
        ("decide", [identity, decision]) => {
            Command::DecideFor(CandidateId::new(*identity), parse_decision(decision)?)
        }
        ("drag", [dx]) => Command::Drag {
            dx: parse_offset(dx)?,
            dy: 0.0,
        },
        ("drag", [dx, dy]) => Command::Drag {
            dx: parse_offset(dx)?,
            dy: parse_offset(dy)?,
        },
        ("release", [dx]) => Command::Release {
            dx: parse_offset(dx)?,
            dy: 0.0,
        },
        ("release", [dx, dy]) => Command::Release {
            dx: parse_offset(dx)?,
            dy: parse_offset(dy)?,
        },
        ("cancel", []) => Command::Cancel,
        ("refresh", []) => Command::Refresh,
        ("prune", []) => Command::Prune,
        ("list" | "ls", []) => Command::List,
        ("tally", []) => Command::Tally,
        ("help" | "?", []) => Command::Help,
        ("quit" | "q" | "exit", []) => Command::Quit,
        (verb, _) => return Err(format!("unrecognized command '{verb}', try 'help'")),
    };
    Ok(command)
}

fn parse_decision(raw: &str) -> Result<Decision, String> {
    match raw.to_ascii_lowercase().as_str() {
        "a" => Ok(Decision::Accepted),
        "r" => Ok(Decision::Rejected),
        other => match Decision::parse(other) {
            Some(decision) if decision.is_terminal() => Ok(decision),
            _ => Err(format!("expected accept or reject, got '{raw}'")),
        },
    }
}

fn parse_offset(raw: &str) -> Result<f64, String> {
    raw.parse()
        .map_err(|_| format!("'{raw}' is not a number"))
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
