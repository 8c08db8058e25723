//! Line commands for the headless front end.
//!
//! Coordinates given to `click` and `drag` are canvas pixels at the current
//! zoom, the same space a pointer event would report.  `read` takes page
//! points.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::geometry::{Point, Rect};
use crate::session::Mode;

pub const HELP: &str = "\
commands:
  open <file.pdf>            open a document
  next | prev                change page
  mode <select|draw>         switch interaction mode
  click <x> <y>              select the image under a canvas point
  replace <image>            schedule the selected image's replacement
  clear                      drop pending edits on this page
  drag <x0> <y0> <x1> <y1>   read the text under a canvas rectangle
  read <x0> <y0> <x1> <y1>   read the text under a page rectangle
  stop                       stop speaking
  save <file.pdf>            write pending edits to a new file
  render <file.png>          write the current view to an image
  status                     show session state
  help                       show this text
  quit                       exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open(PathBuf),
    Next,
    Prev,
    Mode(Mode),
    Click(Point),
    Replace(PathBuf),
    Clear,
    Drag(Point, Point),
    Read(Rect),
    Stop,
    Save(PathBuf),
    Render(PathBuf),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("`{0}` is not a number")]
    Number(String),

    #[error("{0}")]
    Mode(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "open" => path_arg(rest, "open <file.pdf>").map(Command::Open),
            "next" | "n" => Ok(Command::Next),
            "prev" | "p" => Ok(Command::Prev),
            "mode" => rest.parse().map(Command::Mode).map_err(CommandError::Mode),
            "click" => {
                let [x, y] = numbers(rest, "click <x> <y>")?;
                Ok(Command::Click(Point::new(x, y)))
            }
            "replace" => path_arg(rest, "replace <image>").map(Command::Replace),
            "clear" => Ok(Command::Clear),
            "drag" => {
                let [x0, y0, x1, y1] = numbers(rest, "drag <x0> <y0> <x1> <y1>")?;
                Ok(Command::Drag(Point::new(x0, y0), Point::new(x1, y1)))
            }
            "read" => {
                let [x0, y0, x1, y1] = numbers(rest, "read <x0> <y0> <x1> <y1>")?;
                Ok(Command::Read(Rect::from_corners(
                    Point::new(x0, y0),
                    Point::new(x1, y1),
                )))
            }
            "stop" => Ok(Command::Stop),
            "save" => path_arg(rest, "save <file.pdf>").map(Command::Save),
            "render" => path_arg(rest, "render <file.png>").map(Command::Render),
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// The rest of the line as a path; quotes around it are stripped so paths
/// with spaces work.
fn path_arg(rest: &str, usage: &'static str) -> Result<PathBuf, CommandError> {
    let path = rest.trim_matches('"');
    if path.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    Ok(PathBuf::from(path))
}

fn numbers<const N: usize>(rest: &str, usage: &'static str) -> Result<[f32; N], CommandError> {
    let words: Vec<&str> = rest.split_whitespace().collect();
    if words.len() != N {
        return Err(CommandError::Usage(usage));
    }
    let mut out = [0.0; N];
    for (slot, word) in out.iter_mut().zip(words) {
        *slot = word
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| CommandError::Number(word.to_string()))?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
