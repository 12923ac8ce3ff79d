use std::str::FromStr;

use serde_json::{Map, Value};

use crate::{ExperimentErr, Result};

/// A `key.path=value` assignment given on the command line.
///
/// The value is read as json and taken as a plain string when it isn't valid json.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    path: String,
    value: Value,
}

impl FromStr for Override {
    type Err = ExperimentErr;

    fn from_str(s: &str) -> Result<Self> {
        let (path, raw) = s.split_once('=').ok_or_else(|| {
            ExperimentErr::InvalidOverride(format!("{s:?} is not of the form key=value"))
        })?;

        let path = path.trim();
        if path.is_empty() {
            return Err(ExperimentErr::InvalidOverride(format!("{s:?} has no key")));
        }

        let raw = raw.trim();
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        Ok(Self {
            path: path.to_string(),
            value,
        })
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();

    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(i) => part.split_at(i),
            None => (part, ""),
        };

        if key.is_empty() {
            return Err(ExperimentErr::InvalidOverride(format!("empty key in {path:?}")));
        }
        segments.push(Segment::Key(key));

        while let Some(stripped) = rest.strip_prefix('[') {
            let (index, tail) = stripped.split_once(']').ok_or_else(|| {
                ExperimentErr::InvalidOverride(format!("unclosed index in {path:?}"))
            })?;
            let index = index.parse().map_err(|_| {
                ExperimentErr::InvalidOverride(format!("{index:?} is not an index in {path:?}"))
            })?;
            segments.push(Segment::Index(index));
            rest = tail;
        }

        if !rest.is_empty() {
            return Err(ExperimentErr::InvalidOverride(format!(
                "unexpected {rest:?} in {path:?}"
            )));
        }
    }

    Ok(segments)
}

impl Override {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Assigns the value into `target`, creating missing objects along the path.
    ///
    /// # Errors
    /// `ExperimentErr::InvalidOverride` if the path crosses a scalar or indexes out of bounds.
    pub fn apply(&self, target: &mut Value) -> Result<()> {
        let mut current = target;

        for segment in parse_path(&self.path)? {
            current = match segment {
                Segment::Key(key) => {
                    if current.is_null() {
                        *current = Value::Object(Map::new());
                    }
                    current
                        .as_object_mut()
                        .ok_or_else(|| {
                            ExperimentErr::InvalidOverride(format!(
                                "{key:?} of {:?} is not inside an object",
                                self.path
                            ))
                        })?
                        .entry(key)
                        .or_insert(Value::Null)
                }
                Segment::Index(index) => current
                    .as_array_mut()
                    .and_then(|array| array.get_mut(index))
                    .ok_or_else(|| {
                        ExperimentErr::InvalidOverride(format!(
                            "index {index} of {:?} is out of bounds",
                            self.path
                        ))
                    })?,
            };
        }

        *current = self.value.clone();
        Ok(())
    }
}
