//! Reference event-stream decoder: one JSON object per line.
//!
//! Each line maps raw branch names to numbers or arrays of numbers; names
//! the [`Branch`] schema does not know are skipped, so a decoded [`Event`]
//! only ever carries typed identifiers. Production tree decoding lives
//! outside this crate — this decoder exists so the pipeline has a concrete
//! [`EventUnit`] to run on and the tests something to chew.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::pipeline::{EventUnit, StreamError};
use crate::record::{Branch, Column, ColumnKind, Event};
use crate::stage::{unit_id, LocalCopy};

/// A JSONL event file, optionally staged to a local scratch directory
/// before reading.
#[derive(Debug, Clone)]
pub struct JsonlUnit {
    path: PathBuf,
    id: String,
    stage_dir: Option<PathBuf>,
}

impl JsonlUnit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = unit_id(&path);
        Self {
            path,
            id,
            stage_dir: None,
        }
    }

    /// Copy the file under `stage_dir` before reading; the copy is removed
    /// when the event stream is dropped.
    pub fn staged(path: impl Into<PathBuf>, stage_dir: impl Into<PathBuf>) -> Self {
        let mut unit = Self::new(path);
        unit.stage_dir = Some(stage_dir.into());
        unit
    }
}

impl EventUnit for JsonlUnit {
    type Events = JsonlEvents;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn events(&self) -> Result<JsonlEvents, StreamError> {
        let (path, staged) = match &self.stage_dir {
            Some(stage_dir) => {
                let staged = LocalCopy::stage(&self.path, stage_dir)?;
                (staged.path().to_path_buf(), Some(staged))
            }
            None => (self.path.clone(), None),
        };
        let file = File::open(&path)?;
        Ok(JsonlEvents {
            lines: BufReader::new(file).lines(),
            line: 0,
            _staged: staged,
        })
    }
}

/// Iterator over the events of one JSONL file.
pub struct JsonlEvents {
    lines: Lines<BufReader<File>>,
    line: usize,
    // keeps a staged copy alive (and cleaned up) for the stream's lifetime
    _staged: Option<LocalCopy>,
}

impl Iterator for JsonlEvents {
    type Item = Result<Event, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line += 1;
            match line {
                Err(err) => {
                    return Some(Err(StreamError::Truncated {
                        reason: format!("read failed at line {}: {err}", self.line),
                    }))
                }
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => return Some(decode_event(&text, self.line)),
            }
        }
    }
}

fn decode_event(text: &str, line: usize) -> Result<Event, StreamError> {
    // A torn tail line is the usual way a partially-transferred file shows
    // up; the rows before it are still usable.
    let object: Map<String, Value> =
        serde_json::from_str(text).map_err(|err| StreamError::Truncated {
            reason: format!("undecodable event at line {line}: {err}"),
        })?;
    let mut event = Event::new();
    for (name, value) in &object {
        let Some(branch) = Branch::from_name(name) else {
            continue;
        };
        let column = decode_column(branch.kind(), value).ok_or_else(|| StreamError::Decode {
            line,
            message: format!("branch {name:?} is not a valid {:?}", branch.kind()),
        })?;
        event.insert(branch, column);
    }
    Ok(event)
}

fn decode_column(kind: ColumnKind, value: &Value) -> Option<Column> {
    match kind {
        ColumnKind::Float => value.as_f64().map(Column::Float),
        ColumnKind::Int => as_i64(value).map(Column::Int),
        ColumnKind::Floats => value
            .as_array()?
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<f64>>>()
            .map(Column::Floats),
        ColumnKind::Ints => value
            .as_array()?
            .iter()
            .map(as_i64)
            .collect::<Option<Vec<i64>>>()
            .map(Column::Ints),
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        // trees often store counts and flags as floats with integral values
        let float = value.as_f64()?;
        (float.fract() == 0.0).then_some(float as i64)
    })
}
