use picnam_core::StimulusItem;

/// Presentation surface driven by the session. The session holds no
/// presentation state of its own.
pub trait UiSink {
    /// Blank screen with a fixation point, used for rests and gaps.
    fn show_fixation(&mut self);
    fn show_stimulus(&mut self, item: &StimulusItem);
    fn show_message(&mut self, text: &str);
    fn set_status(&mut self, text: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Fixation,
    Stimulus(u32),
    Message(String),
    Status(String),
}

/// Sink that only remembers what it was asked to show.
#[derive(Debug, Default)]
pub struct EventLog {
    pub events: Vec<UiEvent>,
}

impl EventLog {
    pub fn stimuli(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Stimulus(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match e {
            UiEvent::Message(text) => Some(text.as_str()),
            _ => None,
        })
    }
}

impl UiSink for EventLog {
    fn show_fixation(&mut self) {
        self.events.push(UiEvent::Fixation);
    }

    fn show_stimulus(&mut self, item: &StimulusItem) {
        self.events.push(UiEvent::Stimulus(item.word_id));
    }

    fn show_message(&mut self, text: &str) {
        self.events.push(UiEvent::Message(text.to_string()));
    }

    fn set_status(&mut self, text: &str) {
        self.events.push(UiEvent::Status(text.to_string()));
    }
}
