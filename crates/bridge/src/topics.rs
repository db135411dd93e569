use schema::StreamKind;

/// Events the terminal publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    /// Frame for emotion classification.
    FunFrame,
    /// Frame for identity recognition.
    AttFrame,
    /// Identity stream configuration (`{th, mark}`).
    AttCfg,
}

impl Outbound {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outbound::FunFrame => "fun_frame",
            Outbound::AttFrame => "att_frame",
            Outbound::AttCfg => "att_cfg",
        }
    }

    pub fn frame_for(stream: StreamKind) -> Self {
        match stream {
            StreamKind::Emotion => Outbound::FunFrame,
            StreamKind::Identity => Outbound::AttFrame,
        }
    }
}

/// Events the backend publishes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    FunResult,
    AttResult,
}

impl Inbound {
    pub const ALL: [Inbound; 2] = [Inbound::FunResult, Inbound::AttResult];

    pub fn as_str(&self) -> &'static str {
        match self {
            Inbound::FunResult => "fun_result",
            Inbound::AttResult => "att_result",
        }
    }

    pub fn stream(&self) -> StreamKind {
        match self {
            Inbound::FunResult => StreamKind::Emotion,
            Inbound::AttResult => StreamKind::Identity,
        }
    }
}

/// Topic layout: `{prefix}/{device_id}/{event}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(prefix: &str, device_id: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        let device_id = device_id.trim_matches('/');
        let base = if prefix.is_empty() {
            device_id.to_string()
        } else {
            format!("{}/{}", prefix, device_id)
        };
        Self { base }
    }

    pub fn outbound(&self, event: Outbound) -> String {
        format!("{}/{}", self.base, event.as_str())
    }

    pub fn inbound(&self, event: Inbound) -> String {
        format!("{}/{}", self.base, event.as_str())
    }

    /// Which result event a received topic carries, if it is one of ours.
    pub fn parse_inbound(&self, topic: &str) -> Option<Inbound> {
        let event = topic.strip_prefix(&self.base)?.strip_prefix('/')?;
        Inbound::ALL.into_iter().find(|e| e.as_str() == event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_namespaced_by_device() {
        let topics = Topics::new("kiosk", "terminal-01");
        assert_eq!(topics.outbound(Outbound::FunFrame), "kiosk/terminal-01/fun_frame");
        assert_eq!(topics.outbound(Outbound::AttCfg), "kiosk/terminal-01/att_cfg");
        assert_eq!(topics.inbound(Inbound::AttResult), "kiosk/terminal-01/att_result");
    }

    #[test]
    fn stray_slashes_are_trimmed() {
        let topics = Topics::new("/kiosk/", "terminal-01/");
        assert_eq!(topics.outbound(Outbound::AttFrame), "kiosk/terminal-01/att_frame");

        let bare = Topics::new("", "t1");
        assert_eq!(bare.inbound(Inbound::FunResult), "t1/fun_result");
    }

    #[test]
    fn inbound_topics_parse() {
        let topics = Topics::new("kiosk", "terminal-01");
        assert_eq!(
            topics.parse_inbound("kiosk/terminal-01/fun_result"),
            Some(Inbound::FunResult)
        );
        assert_eq!(
            topics.parse_inbound("kiosk/terminal-01/att_result"),
            Some(Inbound::AttResult)
        );
        assert_eq!(topics.parse_inbound("kiosk/terminal-02/fun_result"), None);
        assert_eq!(topics.parse_inbound("kiosk/terminal-01/fun_frame"), None);
        assert_eq!(topics.parse_inbound("kiosk/terminal-01fun_result"), None);
    }

    #[test]
    fn frame_events_follow_stream() {
        assert_eq!(Outbound::frame_for(StreamKind::Emotion), Outbound::FunFrame);
        assert_eq!(Outbound::frame_for(StreamKind::Identity), Outbound::AttFrame);
        assert_eq!(Inbound::AttResult.stream(), StreamKind::Identity);
    }
}
