#![forbid(unsafe_code)]

const MIN_SEQUENCE_DIGITS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    Requirement,
    Task,
    Subtask,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Requirement => "requirement",
            Level::Task => "task",
            Level::Subtask => "subtask",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Level::Requirement => "REQ",
            Level::Task => "TSK",
            Level::Subtask => "SUB",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "requirement" => Some(Level::Requirement),
            "task" => Some(Level::Task),
            "subtask" => Some(Level::Subtask),
            _ => None,
        }
    }

    pub fn from_prefix(value: &str) -> Option<Self> {
        match value {
            "REQ" => Some(Level::Requirement),
            "TSK" => Some(Level::Task),
            "SUB" => Some(Level::Subtask),
            _ => None,
        }
    }

    pub fn depth(self) -> usize {
        match self {
            Level::Requirement => 1,
            Level::Task => 2,
            Level::Subtask => 3,
        }
    }

    pub fn child(self) -> Option<Self> {
        match self {
            Level::Requirement => Some(Level::Task),
            Level::Task => Some(Level::Subtask),
            Level::Subtask => None,
        }
    }

    pub fn parent(self) -> Option<Self> {
        match self {
            Level::Requirement => None,
            Level::Task => Some(Level::Requirement),
            Level::Subtask => Some(Level::Task),
        }
    }
}

/// One `PREFIX-NNN` component of a hierarchical identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub level: Level,
    pub sequence: i64,
}

impl Segment {
    /// Sequences render with at least three digits; larger values widen.
    pub fn format(&self) -> String {
        format!("{}-{:03}", self.level.prefix(), self.sequence)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseIdError {
    Empty,
    MissingDash,
    UnknownPrefix,
    SequenceTooShort,
    InvalidSequence,
    ZeroSequence,
    TooDeep,
    WrongOrder,
}

impl ParseIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "identifier segment must not be empty",
            Self::MissingDash => "identifier segment must look like PREFIX-NNN",
            Self::UnknownPrefix => "identifier prefix must be REQ, TSK or SUB",
            Self::SequenceTooShort => "identifier sequence must have at least 3 digits",
            Self::InvalidSequence => "identifier sequence must be a decimal number",
            Self::ZeroSequence => "identifier sequence must be positive",
            Self::TooDeep => "identifier has more than 3 segments",
            Self::WrongOrder => "identifier segments must descend REQ > TSK > SUB",
        }
    }
}

/// Lazy walk over the segments of a composite identifier. The iterator is
/// finite (at most 3 items) and restartable via `Clone` or a fresh `parse`
/// call; after the first error it yields nothing further.
#[derive(Clone, Debug)]
pub struct Segments<'a> {
    parts: std::str::Split<'a, char>,
    expect: Option<Level>,
    failed: bool,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<Segment, ParseIdError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let part = self.parts.next()?;
        let result = parse_segment(part, self.expect);
        match &result {
            Ok(segment) => self.expect = segment.level.child(),
            Err(_) => self.failed = true,
        }
        Some(result)
    }
}

pub fn parse(value: &str) -> Segments<'_> {
    Segments {
        parts: value.split('.'),
        expect: Some(Level::Requirement),
        failed: false,
    }
}

pub fn parse_all(value: &str) -> Result<Vec<Segment>, ParseIdError> {
    parse(value).collect()
}

fn parse_segment(part: &str, expect: Option<Level>) -> Result<Segment, ParseIdError> {
    let Some(expect) = expect else {
        return Err(ParseIdError::TooDeep);
    };
    if part.is_empty() {
        return Err(ParseIdError::Empty);
    }
    let Some((prefix, digits)) = part.split_once('-') else {
        return Err(ParseIdError::MissingDash);
    };
    let Some(level) = Level::from_prefix(prefix) else {
        return Err(ParseIdError::UnknownPrefix);
    };
    if level != expect {
        return Err(ParseIdError::WrongOrder);
    }
    if digits.len() < MIN_SEQUENCE_DIGITS {
        return Err(ParseIdError::SequenceTooShort);
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseIdError::InvalidSequence);
    }
    let sequence = digits
        .parse::<i64>()
        .map_err(|_| ParseIdError::InvalidSequence)?;
    if sequence == 0 {
        return Err(ParseIdError::ZeroSequence);
    }
    Ok(Segment { level, sequence })
}

pub fn compose(parent: Option<&str>, segment: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}.{segment}"),
        None => segment.to_string(),
    }
}

pub fn depth_of(value: &str) -> usize {
    value.split('.').count()
}
