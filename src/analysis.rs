use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use microv_remote::ReasoningService;
use microv_state::prompts::{ANALYSIS_ERROR, PLACEHOLDER};
use microv_state::{EntryId, Transcript};

use crate::events::{EventSink, UiEvent};

pub type SharedTranscript = Arc<Mutex<Transcript>>;

pub(crate) fn lock(transcript: &SharedTranscript) -> MutexGuard<'_, Transcript> {
    transcript.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An analysis whose placeholder has been appended and whose request is
/// running in the background
#[derive(Debug)]
pub struct PendingAnalysis {
    pub placeholder: EntryId,
    pub task: JoinHandle<()>,
}

/// Sends (image, instruction) pairs to the reasoning service and keeps the
/// transcript consistent with the results.
#[derive(Clone)]
pub struct AnalysisPipeline {
    reasoning: Arc<dyn ReasoningService>,
    transcript: SharedTranscript,
    events: EventSink,
}

impl AnalysisPipeline {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        transcript: SharedTranscript,
        events: EventSink,
    ) -> Self {
        Self {
            reasoning,
            transcript,
            events,
        }
    }

    /// Append the user entry and its placeholder, then resolve the
    /// placeholder from a background task. Must be called inside a tokio
    /// runtime.
    pub fn analyze(&self, image: Vec<u8>, instruction: &str) -> PendingAnalysis {
        let (user, placeholder) = lock(&self.transcript).begin_exchange(instruction, PLACEHOLDER);
        let id = placeholder.id;

        self.events.emit(UiEvent::TranscriptAppended { entry: user });
        self.events
            .emit(UiEvent::TranscriptAppended { entry: placeholder });

        info!(entry_id = %id, bytes = image.len(), "Analysis dispatched");

        let reasoning = self.reasoning.clone();
        let transcript = self.transcript.clone();
        let events = self.events.clone();
        let instruction = instruction.to_string();

        let task = tokio::spawn(async move {
            let text = match reasoning.analyze(&image, &instruction).await {
                Ok(response) => {
                    info!(entry_id = %id, "Analysis resolved");
                    response
                }
                Err(e) => {
                    warn!(entry_id = %id, error = %e, "Analysis failed");
                    ANALYSIS_ERROR.to_string()
                }
            };

            let resolved = lock(&transcript).resolve(id, &text);
            match resolved {
                Ok(entry) => events.emit(UiEvent::TranscriptUpdated { entry }),
                Err(e) => debug!(entry_id = %id, "Result not applied: {}", e),
            }
        });

        PendingAnalysis {
            placeholder: id,
            task,
        }
    }

    pub fn transcript(&self) -> &SharedTranscript {
        &self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use microv_remote::RemoteError;
    use microv_state::Sender;
    use std::time::Duration;

    /// Answers `"<prompt> done"` after a delay encoded in the first image byte
    struct DelayedEcho;

    #[async_trait]
    impl ReasoningService for DelayedEcho {
        async fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, RemoteError> {
            let delay = image.first().copied().unwrap_or(0) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!("{prompt} done"))
        }
    }

    struct Failing;

    #[async_trait]
    impl ReasoningService for Failing {
        async fn analyze(&self, _image: &[u8], _prompt: &str) -> Result<String, RemoteError> {
            Err(RemoteError::Api {
                status: 500,
                body: "AI service error.".into(),
            })
        }
    }

    fn pipeline(reasoning: Arc<dyn ReasoningService>) -> AnalysisPipeline {
        AnalysisPipeline::new(
            reasoning,
            Arc::new(Mutex::new(Transcript::new())),
            EventSink::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_requests_resolve_their_own_entries() {
        let pipeline = pipeline(Arc::new(DelayedEcho));

        // The first request is the slower one
        let slow = pipeline.analyze(vec![200], "whole");
        let fast = pipeline.analyze(vec![10], "crop");
        assert_eq!(lock(pipeline.transcript()).unresolved(), 2);

        fast.task.await.unwrap();
        {
            let transcript = lock(pipeline.transcript());
            assert_eq!(transcript.get(fast.placeholder).unwrap().text, "crop done");
            assert!(transcript.get(slow.placeholder).unwrap().placeholder);
        }

        slow.task.await.unwrap();
        let transcript = lock(pipeline.transcript());
        let texts: Vec<(Sender, &str)> = transcript
            .entries()
            .iter()
            .map(|e| (e.sender, e.text.as_str()))
            .collect();
        assert_eq!(
            texts,
            vec![
                (Sender::User, "whole"),
                (Sender::Assistant, "whole done"),
                (Sender::User, "crop"),
                (Sender::Assistant, "crop done"),
            ]
        );
        assert_eq!(transcript.unresolved(), 0);
    }

    #[tokio::test]
    async fn test_failure_resolves_placeholder_with_error_text() {
        let pipeline = pipeline(Arc::new(Failing));
        let mut events = pipeline.events.subscribe();

        let pending = pipeline.analyze(vec![1, 2, 3], "describe");
        let len_before = lock(pipeline.transcript()).len();
        pending.task.await.unwrap();

        let transcript = lock(pipeline.transcript());
        let entry = transcript.get(pending.placeholder).unwrap();
        assert_eq!(entry.text, ANALYSIS_ERROR);
        assert!(!entry.placeholder);
        assert_eq!(transcript.len(), len_before);

        // Two appends, then exactly one update
        let mut appended = 0;
        let mut updated = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                UiEvent::TranscriptAppended { .. } => appended += 1,
                UiEvent::TranscriptUpdated { entry } => {
                    assert_eq!(entry.id, pending.placeholder);
                    updated += 1;
                }
                _ => {}
            }
        }
        assert_eq!((appended, updated), (2, 1));
    }
}
