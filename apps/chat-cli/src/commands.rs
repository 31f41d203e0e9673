//! Parsing of lines typed at the prompt.

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Plain text, sent to the current room.
    Say(String),
    Join(String),
    Leave(String),
    /// Room name followed by participant ids.
    Create {
        name: String,
        participants: Vec<String>,
    },
    Info(String),
    Clear,
    History,
    Quit,
    Empty,
    Invalid(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Input::Say(line.to_string());
        };

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.map(str::to_string).collect();

        match (name, args.as_slice()) {
            ("join", [room]) => Input::Join(room.clone()),
            ("leave", [room]) => Input::Leave(room.clone()),
            ("create", [room, participants @ ..]) => Input::Create {
                name: room.clone(),
                participants: participants.to_vec(),
            },
            ("info", [room]) => Input::Info(room.clone()),
            ("clear", []) => Input::Clear,
            ("history", []) => Input::History,
            ("quit" | "exit", []) => Input::Quit,
            _ => Input::Invalid(line.to_string()),
        }
    }
}

pub const HELP: &str = "\
commands:
  /join <room>              subscribe to a room and make it current
  /leave <room>             unsubscribe from a room
  /create <name> [ids...]   ask the server to create a room
  /info <room>              request room details
  /history                  print received messages
  /clear                    clear received messages
  /quit                     disconnect and exit
anything else is sent to the current room";
