//! Topic matching for routing rules

/// How a rule tests a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicMatch {
    /// Topic ends with the given text
    Suffix(&'static str),
    /// Topic contains the given text anywhere
    Contains(&'static str),
}

impl TopicMatch {
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicMatch::Suffix(suffix) => topic.ends_with(suffix),
            TopicMatch::Contains(needle) => topic.contains(needle),
        }
    }
}

impl std::fmt::Display for TopicMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicMatch::Suffix(s) => write!(f, "*{}", s),
            TopicMatch::Contains(s) => write!(f, "*{}*", s),
        }
    }
}

/// Return the `/`-separated segment at `index`, or `""` when the topic is shorter.
///
/// ```
/// use mqtt_fluent_bridge::router::topic_segment;
///
/// assert_eq!(topic_segment("tele/PlugA/SENSOR", 1), "PlugA");
/// assert_eq!(topic_segment("tele/PlugA/SENSOR", 9), "");
/// ```
pub fn topic_segment(topic: &str, index: usize) -> &str {
    topic.split('/').nth(index).unwrap_or("")
}
