//! Transcript accumulator for the current conversational turn

/// Accumulates partial transcription text until a turn boundary
///
/// Appended on each transcript fragment, cleared when the remote signals
/// turn-complete. Never persisted past a turn boundary.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    text: String,
}

impl TranscriptBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transcript fragment
    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    /// Clear the buffer at a turn boundary
    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Current in-progress transcript text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_fragments_in_order() {
        let mut buf = TranscriptBuffer::new();
        buf.push("Check soil ");
        buf.push("moisture before ");
        buf.push("irrigating.");
        assert_eq!(buf.text(), "Check soil moisture before irrigating.");
    }

    #[test]
    fn clear_resets_regardless_of_content() {
        let mut buf = TranscriptBuffer::new();
        buf.clear();
        assert!(buf.is_empty());

        buf.push("partial");
        buf.clear();
        assert!(buf.is_empty());
    }
}
