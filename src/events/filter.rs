use std::fmt;

use super::{Event, EventData, Topic};

/// Subscription predicate over an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Topic(Topic),
    /// `source.user.username` equals the value.
    SourceUsername(String),
    /// `data.actionIdentifier` equals the value; only launch events have one.
    ActionIdentifier(String),
    All(Vec<Filter>),
}

impl Filter {
    pub fn topic(topic: Topic) -> Self {
        Self::Topic(topic)
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::All(mut filters) => {
                filters.push(other);
                Self::All(filters)
            }
            first => Self::All(vec![first, other]),
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Topic(topic) => event.topic() == *topic,
            Self::SourceUsername(username) => event.username() == Some(username.as_str()),
            Self::ActionIdentifier(identifier) => match &event.data {
                EventData::ActionLaunch(launch) => launch.action_identifier == *identifier,
                _ => false,
            },
            Self::All(filters) => filters.iter().all(|f| f.matches(event)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic(topic) => write!(f, "topic={}", topic),
            Self::SourceUsername(username) => write!(f, "source.user.username={}", username),
            Self::ActionIdentifier(identifier) => write!(f, "data.actionIdentifier={}", identifier),
            Self::All(filters) => {
                let parts: Vec<String> = filters.iter().map(|p| p.to_string()).collect();
                f.write_str(&parts.join(" and "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActionLaunch, LaunchOptions};

    fn launch(identifier: &str) -> Event {
        Event::new(EventData::ActionLaunch(ActionLaunch {
            action_identifier: identifier.into(),
            selection: Vec::new(),
            values: None,
            options: LaunchOptions::default(),
        }))
        .from_user("u1", "artist")
    }

    #[test]
    fn matches_topic_user_and_identifier() {
        let filter = Filter::topic(Topic::ActionLaunch)
            .and(Filter::ActionIdentifier("transfer.components".into()))
            .and(Filter::SourceUsername("artist".into()));

        assert!(filter.matches(&launch("transfer.components")));
        assert!(!filter.matches(&launch("other.action")));

        let mut foreign = launch("transfer.components");
        foreign.source.user = None;
        assert!(!filter.matches(&foreign));
    }

    #[test]
    fn identifier_never_matches_other_topics() {
        let discover = Event::new(EventData::ActionDiscover {
            selection: Vec::new(),
        });
        assert!(!Filter::ActionIdentifier("x".into()).matches(&discover));
    }

    #[test]
    fn renders_subscription_expression() {
        let filter = Filter::topic(Topic::ActionDiscover).and(Filter::SourceUsername("artist".into()));
        assert_eq!(
            filter.to_string(),
            "topic=ftrack.action.discover and source.user.username=artist"
        );
    }
}
