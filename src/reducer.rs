//! Stream reducer
//!
//! Folds response events into the transcript. Atomic and streamed
//! deliveries converge here so both share the finalize and failure
//! semantics. Fragments are applied exactly as received, in arrival
//! order; duplicates or reordering upstream are the collaborator's
//! defect and are not corrected.

use crate::completion::ResponseEvent;
use crate::transcript::{Transcript, TranscriptError};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReducerError {
    #[error("response event arrived after the stream was finalized")]
    StreamAlreadyFinalized,
}

/// Whether the exchange is still accepting events after a reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDisposition {
    Open,
    Finalized,
}

/// Apply one response event to the transcript.
///
/// Returns `StreamAlreadyFinalized` when no message is in flight; the
/// caller logs and drops the event, leaving the transcript untouched.
pub fn reduce(
    transcript: &mut Transcript,
    event: &ResponseEvent,
) -> Result<StreamDisposition, ReducerError> {
    match event {
        ResponseEvent::Fragment { delta } => {
            transcript.append_delta(delta).map_err(already_finalized)?;
            Ok(StreamDisposition::Open)
        }
        ResponseEvent::Atomic { text, citations } => {
            transcript
                .set_content(text.clone())
                .map_err(already_finalized)?;
            transcript
                .finalize(citations.clone())
                .map_err(already_finalized)?;
            Ok(StreamDisposition::Finalized)
        }
        ResponseEvent::Terminal => {
            transcript.finalize(Vec::new()).map_err(already_finalized)?;
            Ok(StreamDisposition::Finalized)
        }
        ResponseEvent::Failed { error } => {
            transcript
                .set_content(error.user_facing_text())
                .map_err(already_finalized)?;
            transcript.finalize(Vec::new()).map_err(already_finalized)?;
            Ok(StreamDisposition::Finalized)
        }
    }
}

fn already_finalized(_: TranscriptError) -> ReducerError {
    ReducerError::StreamAlreadyFinalized
}
