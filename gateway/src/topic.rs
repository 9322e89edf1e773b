//! Topic grammar
//!
//! Gateway topics have the form `<root>/<class>/<entity>/<property>[/<command>]`.
//! Without a command level the topic is the event topic of a property, which
//! carries the retained last known value.

use std::fmt;
use std::str::FromStr;

use crate::error::TopicError;

pub const SEPARATOR: char = '/';
pub const SINGLE_LEVEL_WILDCARD: char = '+';
pub const MULTI_LEVEL_WILDCARD: char = '#';

pub const CLASS_CS: &str = "cs";
pub const CLASS_LOCO: &str = "loco";
pub const CLASS_ERROR: &str = "error";

pub const PROPERTY_ENABLED: &str = "enabled";
pub const PROPERTY_TEMP: &str = "temp";
pub const PROPERTY_DIR: &str = "dir";
pub const PROPERTY_SPEED: &str = "speed";

/// Loco property names that cannot be used as function names.
pub const RESERVED_FUNCTION_NAMES: [&str; 2] = [PROPERTY_DIR, PROPERTY_SPEED];

/// Station properties an IO name would shadow.
pub const RESERVED_IO_NAMES: [&str; 2] = [PROPERTY_ENABLED, PROPERTY_TEMP];

const MAX_LEVELS: usize = 5;

/// Check that `name` can be used as a topic level.
pub fn check_level_name(name: &str) -> Result<(), TopicError> {
    if name.is_empty() {
        return Err(TopicError::EmptyLevel);
    }
    if name.contains([SEPARATOR, SINGLE_LEVEL_WILDCARD, MULTI_LEVEL_WILDCARD]) {
        return Err(TopicError::InvalidLevel(name.to_string()));
    }
    Ok(())
}

/// Action requested on a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {
    Get,
    Set,
    Toggle,
    Stop,
    Add,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Get,
        Command::Set,
        Command::Toggle,
        Command::Stop,
        Command::Add,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Get => "get",
            Command::Set => "set",
            Command::Toggle => "toggle",
            Command::Stop => "stop",
            Command::Add => "add",
        }
    }

    /// Whether executing the command twice has the same effect as once.
    pub fn is_idempotent(self) -> bool {
        !matches!(self, Command::Toggle | Command::Add)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| TopicError::UnknownCommand(s.to_string()))
    }
}

/// A parsed gateway topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    /// root, class, entity and property, as far as present
    levels: Vec<String>,
    command: Option<Command>,
}

impl Topic {
    /// Parse and validate a topic string.
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let mut levels: Vec<String> = topic.split(SEPARATOR).map(str::to_string).collect();
        if levels.len() > MAX_LEVELS {
            return Err(TopicError::LevelCount(levels.len()));
        }

        let command = if levels.len() == MAX_LEVELS {
            levels.pop().map(|level| level.parse::<Command>()).transpose()?
        } else {
            None
        };

        for level in &levels {
            check_level_name(level)?;
        }
        Ok(Self { levels, command })
    }

    /// Event topic of a property.
    pub fn event(root: &str, class: &str, entity: &str, property: &str) -> Result<Self, TopicError> {
        let levels = [root, class, entity, property];
        for level in levels {
            check_level_name(level)?;
        }
        Ok(Self {
            levels: levels.map(str::to_string).to_vec(),
            command: None,
        })
    }

    /// Command topic of a property.
    pub fn action(
        root: &str,
        class: &str,
        entity: &str,
        property: &str,
        command: Command,
    ) -> Result<Self, TopicError> {
        let mut topic = Self::event(root, class, entity, property)?;
        topic.command = Some(command);
        Ok(topic)
    }

    /// Number of levels including the command level.
    pub fn len(&self) -> usize {
        self.levels.len() + usize::from(self.command.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn root(&self) -> &str {
        &self.levels[0]
    }

    pub fn class(&self) -> Option<&str> {
        self.levels.get(1).map(String::as_str)
    }

    pub fn entity(&self) -> Option<&str> {
        self.levels.get(2).map(String::as_str)
    }

    pub fn property(&self) -> Option<&str> {
        self.levels.get(3).map(String::as_str)
    }

    pub fn command(&self) -> Option<Command> {
        self.command
    }

    /// Topic string without the root level, used as the subscription key.
    pub fn without_root(&self) -> String {
        let mut key = self.levels[1..].join("/");
        if let Some(command) = self.command {
            key.push(SEPARATOR);
            key.push_str(command.as_str());
        }
        key
    }

    /// The event topic a command reports its result to.
    pub fn without_command(&self) -> Topic {
        Topic {
            levels: self.levels.clone(),
            command: None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.levels.join("/"))?;
        if let Some(command) = self.command {
            write!(f, "{SEPARATOR}{command}")?;
        }
        Ok(())
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::parse(s)
    }
}
