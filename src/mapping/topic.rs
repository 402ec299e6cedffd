//! Topic grammar of a SelfMon VMOD module.
//!
//! Every topic a module publishes lives below `selfmon/vmod.<id>/`:
//!
//! ```text
//! selfmon/vmod.<id>/prio/inputs/read/<n>     physical zone input
//! selfmon/vmod.<id>/vrio/inputs/read/<n>     virtual zone input
//! selfmon/vmod.<id>/prio/outputs/<n>         physical output
//! selfmon/vmod.<id>/vrio/outputs/<n>         virtual output
//! selfmon/vmod.<id>/temperature
//! selfmon/vmod.<id>/vkp/display/line1
//! selfmon/vmod.<id>/vkp/display/line2
//! selfmon/vmod.<id>/version
//! ```
//!
//! Parsing is pure. Paths outside the grammar still carry the module id so
//! that discovery can learn ids from any topic a module emits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal prefix shared by every module topic.
pub const TOPIC_PREFIX: &str = "selfmon/vmod.";

/// Filter used for module discovery.
///
/// `selfmon/vmod.#` is not a legal filter because `#` has to take a whole
/// level, so discovery listens one level higher and lets [`parse`] keep the
/// `vmod.` topics.
pub const DISCOVERY_FILTER: &str = "selfmon/#";

/// Identifier of one VMOD instance, e.g. `010aa1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Builds an id from user input.
    ///
    /// Accepts either the bare id or the full `selfmon/vmod.<id>` path.
    /// Whitespace and trailing slashes are stripped; only emptiness is
    /// rejected, since an unknown id simply never produces traffic.
    pub fn from_user_input(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_end_matches('/');
        let id = trimmed.strip_prefix(TOPIC_PREFIX).unwrap_or(trimmed).trim();
        if id.is_empty() || id.contains('/') {
            None
        } else {
            Some(Self(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `selfmon/vmod.<id>`
    pub fn root_topic(&self) -> String {
        format!("{}{}", TOPIC_PREFIX, self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote I/O bus: physical (`prio`) or virtual (`vrio`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    Prio,
    Vrio,
}

impl Bus {
    pub const ALL: [Bus; 2] = [Bus::Prio, Bus::Vrio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bus::Prio => "prio",
            Bus::Vrio => "vrio",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "prio" => Some(Bus::Prio),
            "vrio" => Some(Bus::Vrio),
            _ => None,
        }
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a channel is a zone input or an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// Path segment(s) between the bus and the index.
    pub fn subcategory(&self) -> &'static str {
        match self {
            Direction::Input => "inputs/read",
            Direction::Output => "outputs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeypadLine {
    Line1,
    Line2,
}

impl KeypadLine {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeypadLine::Line1 => "line1",
            KeypadLine::Line2 => "line2",
        }
    }
}

/// Sub-path below the module root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicPath {
    /// `<bus>/inputs/read[/<n>]` or `<bus>/outputs[/<n>]`
    Channel {
        bus: Bus,
        direction: Direction,
        index: Option<u32>,
    },
    Temperature,
    Keypad(KeypadLine),
    Version,
    /// Anything the grammar does not model (e.g. `heartbeat`).
    Unsupported(String),
}

impl TopicPath {
    pub fn parse(path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').collect();

        match segments.as_slice() {
            [bus, "inputs", "read", rest @ ..] if rest.len() <= 1 => match Bus::from_segment(bus) {
                Some(bus) => TopicPath::Channel {
                    bus,
                    direction: Direction::Input,
                    index: rest.first().and_then(|s| parse_index(s)),
                },
                None => TopicPath::Unsupported(path.to_string()),
            },
            [bus, "outputs", rest @ ..] if rest.len() <= 1 => match Bus::from_segment(bus) {
                Some(bus) => TopicPath::Channel {
                    bus,
                    direction: Direction::Output,
                    index: rest.first().and_then(|s| parse_index(s)),
                },
                None => TopicPath::Unsupported(path.to_string()),
            },
            ["temperature"] => TopicPath::Temperature,
            ["vkp", "display", "line1"] => TopicPath::Keypad(KeypadLine::Line1),
            ["vkp", "display", "line2"] => TopicPath::Keypad(KeypadLine::Line2),
            ["version"] => TopicPath::Version,
            _ => TopicPath::Unsupported(path.to_string()),
        }
    }

    /// Top-level category segment, `None` for unsupported paths.
    pub fn category(&self) -> Option<&'static str> {
        match self {
            TopicPath::Channel { bus, .. } => Some(bus.as_str()),
            TopicPath::Temperature => Some("temperature"),
            TopicPath::Keypad(_) => Some("vkp"),
            TopicPath::Version => Some("version"),
            TopicPath::Unsupported(_) => None,
        }
    }

    pub fn subcategory(&self) -> Option<&'static str> {
        match self {
            TopicPath::Channel { direction, .. } => Some(direction.subcategory()),
            TopicPath::Keypad(KeypadLine::Line1) => Some("display/line1"),
            TopicPath::Keypad(KeypadLine::Line2) => Some("display/line2"),
            _ => None,
        }
    }

    pub fn index(&self) -> Option<u32> {
        match self {
            TopicPath::Channel { index, .. } => *index,
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            TopicPath::Channel {
                bus,
                direction,
                index: Some(index),
            } => format!("{}/{}/{}", bus, direction.subcategory(), index),
            TopicPath::Channel {
                bus,
                direction,
                index: None,
            } => format!("{}/{}", bus, direction.subcategory()),
            TopicPath::Temperature => "temperature".to_string(),
            TopicPath::Keypad(line) => format!("vkp/display/{}", line.as_str()),
            TopicPath::Version => "version".to_string(),
            TopicPath::Unsupported(raw) => raw.clone(),
        }
    }
}

/// A parsed module topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicAddress {
    pub module_id: ModuleId,
    pub path: TopicPath,
}

impl TopicAddress {
    pub fn new(module_id: ModuleId, path: TopicPath) -> Self {
        Self { module_id, path }
    }

    pub fn render(&self) -> String {
        let path = self.path.render();
        if path.is_empty() {
            self.module_id.root_topic()
        } else {
            format!("{}/{}", self.module_id.root_topic(), path)
        }
    }
}

/// Splits a raw topic into module id and sub-path.
///
/// Returns `None` when the topic does not start with [`TOPIC_PREFIX`] or the
/// identifier segment is empty.
pub fn parse(topic: &str) -> Option<TopicAddress> {
    let rest = topic.strip_prefix(TOPIC_PREFIX)?;
    let (id, path) = rest.split_once('/').unwrap_or((rest, ""));
    if id.is_empty() {
        return None;
    }

    Some(TopicAddress {
        module_id: ModuleId(id.to_string()),
        path: TopicPath::parse(path),
    })
}

// Canonical decimal only; `03` or `+3` would not render back to the same topic.
fn parse_index(segment: &str) -> Option<u32> {
    let canonical = !segment.is_empty()
        && segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'));
    if canonical {
        segment.parse().ok()
    } else {
        None
    }
}

/// MQTT filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str) -> ModuleId {
        ModuleId::from_user_input(id).unwrap()
    }

    #[test]
    fn parses_zone_input_with_index() {
        let parsed = parse("selfmon/vmod.010aa1/prio/inputs/read/3").unwrap();
        assert_eq!(parsed.module_id.as_str(), "010aa1");
        assert_eq!(parsed.path.category(), Some("prio"));
        assert_eq!(parsed.path.subcategory(), Some("inputs/read"));
        assert_eq!(parsed.path.index(), Some(3));
    }

    #[test]
    fn parses_fixed_topics() {
        let cases = [
            ("selfmon/vmod.a/temperature", TopicPath::Temperature),
            ("selfmon/vmod.a/version", TopicPath::Version),
            (
                "selfmon/vmod.a/vkp/display/line1",
                TopicPath::Keypad(KeypadLine::Line1),
            ),
            (
                "selfmon/vmod.a/vkp/display/line2",
                TopicPath::Keypad(KeypadLine::Line2),
            ),
        ];
        for (topic, expected) in cases {
            assert_eq!(parse(topic).unwrap().path, expected, "{}", topic);
        }
    }

    #[test]
    fn rejects_foreign_prefix_and_empty_id() {
        assert!(parse("frigate/events").is_none());
        assert!(parse("selfmon/other/temperature").is_none());
        assert!(parse("selfmon/vmod./temperature").is_none());
        assert!(parse("selfmon/vmod.").is_none());
    }

    #[test]
    fn non_numeric_index_degrades_to_category_only() {
        let parsed = parse("selfmon/vmod.a/vrio/outputs/siren").unwrap();
        assert_eq!(
            parsed.path,
            TopicPath::Channel {
                bus: Bus::Vrio,
                direction: Direction::Output,
                index: None
            }
        );
        assert_eq!(parse("selfmon/vmod.a/prio/inputs/read/03").unwrap().path.index(), None);
        assert_eq!(parse("selfmon/vmod.a/prio/inputs/read/+3").unwrap().path.index(), None);
    }

    #[test]
    fn unknown_shapes_keep_module_id() {
        let parsed = parse("selfmon/vmod.bbb/heartbeat").unwrap();
        assert_eq!(parsed.module_id.as_str(), "bbb");
        assert_eq!(parsed.path, TopicPath::Unsupported("heartbeat".to_string()));
        assert_eq!(parsed.path.category(), None);

        let deep = parse("selfmon/vmod.bbb/prio/inputs/read/3/extra").unwrap();
        assert!(matches!(deep.path, TopicPath::Unsupported(_)));
    }

    #[test]
    fn grammar_topics_render_back_unchanged() {
        let topics = [
            "selfmon/vmod.010aa1/prio/inputs/read/1",
            "selfmon/vmod.010aa1/vrio/inputs/read/1042",
            "selfmon/vmod.010aa1/prio/outputs/0",
            "selfmon/vmod.010aa1/vrio/outputs",
            "selfmon/vmod.010aa1/temperature",
            "selfmon/vmod.010aa1/vkp/display/line1",
            "selfmon/vmod.010aa1/vkp/display/line2",
            "selfmon/vmod.010aa1/version",
        ];
        for topic in topics {
            assert_eq!(parse(topic).unwrap().render(), topic);
        }
    }

    #[test]
    fn user_input_accepts_bare_and_full_forms() {
        assert_eq!(module("010aa1").as_str(), "010aa1");
        assert_eq!(module("  selfmon/vmod.010aa1/ ").as_str(), "010aa1");
        assert!(ModuleId::from_user_input("   ").is_none());
        assert!(ModuleId::from_user_input("selfmon/vmod.").is_none());
        assert!(ModuleId::from_user_input("a/b").is_none());
    }

    #[test]
    fn filter_matching_follows_mqtt_rules() {
        assert!(topic_matches("selfmon/#", "selfmon/vmod.a/temperature"));
        assert!(topic_matches("selfmon/#", "selfmon"));
        assert!(topic_matches(
            "selfmon/vmod.a/prio/inputs/read/#",
            "selfmon/vmod.a/prio/inputs/read/7"
        ));
        assert!(topic_matches("selfmon/+/version", "selfmon/vmod.a/version"));
        assert!(!topic_matches("selfmon/+/version", "selfmon/vmod.a/vkp/version"));
        assert!(!topic_matches(
            "selfmon/vmod.a/prio/outputs/#",
            "selfmon/vmod.b/prio/outputs/1"
        ));
        assert!(!topic_matches("#", "$SYS/broker/uptime"));
        assert!(topic_matches("a/b", "a/b"));
        assert!(!topic_matches("a/b", "a/b/c"));
    }
}
