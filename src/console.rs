//! Line-oriented text protocol for playing against the engine.
//!
//! Modelled on GTP: each request is one line, optionally prefixed by a
//! numeric id, and each response starts with `=` (success) or `?` (failure)
//! followed by the id and ends with a blank line.
//!
//! ## Supported Commands
//!
//! - `name`, `version`, `list_commands`, `known_command <cmd>`
//! - `new [height width win_length]` - Start a new game
//! - `play <column>` - Drop a piece for the side to move
//! - `genmove` - Let the engine choose and play a move
//! - `show` - Print the board
//! - `legal` - List the legal columns
//! - `result` - Report the game result, if decided
//! - `quit`

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use log::info;

use crate::board::{Board, Geometry};
use crate::player::ComputerPlayer;

const KNOWN_COMMANDS: &[&str] = &[
    "genmove",
    "known_command",
    "legal",
    "list_commands",
    "name",
    "new",
    "play",
    "quit",
    "result",
    "show",
    "version",
];

pub struct ConsoleEngine {
    board: Board,
    player: ComputerPlayer,
}

impl ConsoleEngine {
    pub fn new(board: Board, player: ComputerPlayer) -> Self {
        Self { board, player }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Serve commands from `input` until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line.context("reading command")?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (id, command_line) = Self::parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            let Some((command, args)) = parts.split_first() else {
                continue;
            };
            let command = command.to_lowercase();

            let (success, message) = self.execute(&command, args);
            let prefix = if success { '=' } else { '?' };
            let id_str = id.map(|i| i.to_string()).unwrap_or_default();
            writeln!(output, "{prefix}{id_str} {message}\n").context("writing response")?;
            output.flush().context("flushing response")?;

            if command == "quit" {
                break;
            }
        }
        Ok(())
    }

    /// Split an optional numeric id off the front of a command line.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let trimmed = line.trim();
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        match trimmed[..end].parse::<u32>() {
            Ok(id) => (Some(id), trimmed[end..].trim()),
            Err(_) => (None, trimmed),
        }
    }

    /// Execute one command, returning (success, response).
    fn execute(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        match command {
            "name" => (true, env!("CARGO_PKG_NAME").to_string()),

            "version" => (true, env!("CARGO_PKG_VERSION").to_string()),

            "list_commands" => (true, KNOWN_COMMANDS.join("\n")),

            "known_command" => match args.first() {
                Some(cmd) => {
                    let known = KNOWN_COMMANDS.contains(&cmd.to_lowercase().as_str());
                    (true, known.to_string())
                }
                None => (false, "missing argument".to_string()),
            },

            "quit" => (true, String::new()),

            "new" => {
                let geometry = match args {
                    [] => Ok(self.board.geometry()),
                    [h, w, k] => match (h.parse::<usize>(), w.parse::<usize>(), k.parse::<usize>()) {
                        (Ok(h), Ok(w), Ok(k)) => Geometry::new(h, w, k).map_err(|e| e.to_string()),
                        _ => Err("invalid geometry".to_string()),
                    },
                    _ => Err("expected no arguments or height width win_length".to_string()),
                };
                match geometry {
                    Ok(geometry) => {
                        self.board = Board::new(geometry);
                        self.player.reset();
                        (true, String::new())
                    }
                    Err(message) => (false, message),
                }
            }

            "play" => {
                let Some(arg) = args.first() else {
                    return (false, "missing argument".to_string());
                };
                match arg.parse::<usize>() {
                    Ok(mv) if self.board.is_legal(mv) => {
                        self.board.play(mv);
                        (true, String::new())
                    }
                    Ok(_) => (false, "illegal move".to_string()),
                    Err(_) => (false, "invalid column".to_string()),
                }
            }

            "genmove" => match self.player.make_move(&mut self.board) {
                Ok(record) => {
                    info!(
                        "engine plays {} (value {:.3}, {} sims)",
                        record.mv, record.value, record.stats.simulations
                    );
                    (true, record.mv.to_string())
                }
                Err(e) => (false, e.to_string()),
            },

            "show" => (true, format!("\n{}", self.board)),

            "legal" => {
                let moves: Vec<String> = self
                    .board
                    .legal_moves()
                    .iter()
                    .map(usize::to_string)
                    .collect();
                (true, moves.join(" "))
            }

            "result" => match self.board.result() {
                Some(result) => (true, result.to_string()),
                None => (true, "undecided".to_string()),
            },

            _ => (false, format!("unknown command: {command}")),
        }
    }
}
